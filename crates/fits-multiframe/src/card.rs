//! FITS header cards: parsing, formatting and editing 80-column records.
//!
//! A card is kept as its three fields plus the formatted record. Any edit
//! goes through the formatter again, so the cached record always obeys the
//! card grammar:
//!
//! * plain keywords occupy columns 1-8, followed by the `= ` value indicator;
//! * extended keywords are written as `HIERARCH` plus space-separated
//!   segments and exposed with dots (`HIERARCH ESO DET DIT` is `ESO.DET.DIT`);
//! * commentary cards (`COMMENT`, `HISTORY`, blank) carry free text in
//!   columns 9-80;
//! * logical values sit in column 30, numbers end in column 30, strings and
//!   compound values start right after the value indicator;
//! * a comment follows a ` / ` separator and is dropped when it cannot fit.

use core::fmt;

use tracing::debug;

use crate::block::CARD_SIZE;
use crate::error::{Error, Result};
use crate::value::{format_value, parse_value, quoted_len, unquote, Value};

/// Width of the plain keyword field.
pub const KEY_FIELD: usize = 8;

/// Column (1-based) in which logical values sit and numbers end.
pub const VALUE_COLUMN: usize = 30;

/// Columns available to the text of a commentary card.
pub const TEXT_WIDTH: usize = CARD_SIZE - KEY_FIELD;

const HIERARCH_PREFIX: &str = "HIERARCH ";
const VALUE_INDICATOR: &str = "= ";
const COMMENT_SEPARATOR: &str = " / ";

/// Smallest tail that still holds a separator and one comment character.
const MIN_COMMENT_ROOM: usize = 4;

/// A single header card.
#[derive(Debug, Clone, PartialEq)]
pub struct FitsCard {
    key: String,
    value: Option<String>,
    comment: Option<String>,
    commentary: bool,
    raw: String,
}

/// Returns `true` if `key` fits the plain 8-column keyword field.
pub fn is_plain_keyword(key: &str) -> bool {
    key.len() <= KEY_FIELD
        && key
            .bytes()
            .all(|b| matches!(b, b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_'))
}

/// Returns `true` for keywords that never carry a value (COMMENT, HISTORY, blank).
pub fn is_commentary_keyword(key: &str) -> bool {
    matches!(key, "COMMENT" | "HISTORY" | "")
}

/// Bring a caller-supplied key into its stored form.
///
/// Plain keywords are kept as they are. Anything else is an extended key:
/// an optional leading `HIERARCH ` is dropped and the segments, separated by
/// blanks or dots, are joined with dots. Case is preserved.
pub fn normalize_key(key: &str) -> Result<String> {
    if key.is_empty() {
        return Ok(String::new());
    }
    if key.starts_with(['.', '-', ' ']) {
        return Err(Error::InvalidKey(key.to_string()));
    }

    let (hierarch, body) = match key.strip_prefix(HIERARCH_PREFIX) {
        Some(rest) => (true, rest.trim()),
        None => (false, key.trim_end()),
    };
    if !hierarch && is_plain_keyword(body) {
        return Ok(body.to_string());
    }

    let allowed = body
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b' '));
    if body.is_empty() || !allowed {
        return Err(Error::InvalidKey(key.to_string()));
    }

    let segments: Vec<&str> = body.split([' ', '.']).filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(Error::InvalidKey(key.to_string()));
    }
    Ok(segments.join("."))
}

// ── Formatting ──

enum Placement {
    /// Logical token in the fixed value column.
    Fixed,
    /// Right-justified to end in the fixed value column.
    Right,
    /// Directly after the value indicator.
    Natural,
}

struct Rendered {
    raw: String,
    value: Option<String>,
    comment_kept: bool,
}

fn pad_to(s: &mut String, width: usize) {
    while s.len() < width {
        s.push(' ');
    }
}

fn value_text(key: &str, value: &str) -> Result<(String, Placement)> {
    if value.starts_with('\'') {
        if value.len() < 2 || !value.ends_with('\'') {
            return Err(Error::UnterminatedQuote(key.to_string()));
        }
        let content = value[1..value.len() - 1].replace("''", "'");
        let escaped = content.replace('\'', "''");
        return Ok((format!("'{escaped:<8}'"), Placement::Natural));
    }

    if value.starts_with('(') || value.ends_with(')') {
        let balanced = value.starts_with('(')
            && value.ends_with(')')
            && value.matches('(').count() == value.matches(')').count();
        if !balanced {
            return Err(Error::MismatchedParen(key.to_string()));
        }
        return Ok((value.to_string(), Placement::Natural));
    }

    match value {
        "T" | "F" => Ok((value.to_string(), Placement::Fixed)),
        _ => Ok((value.to_string(), Placement::Right)),
    }
}

fn render(
    key: &str,
    value: Option<&str>,
    comment: Option<&str>,
    commentary: bool,
) -> Result<Rendered> {
    if commentary {
        let text = comment.unwrap_or("");
        if text.len() > TEXT_WIDTH {
            return Err(Error::CommentTooLong(key.to_string()));
        }
        if !text.is_ascii() {
            return Err(Error::BadSyntax(format!("non-ASCII text in {key} card")));
        }
        let mut raw = format!("{key:<KEY_FIELD$}{text}");
        pad_to(&mut raw, CARD_SIZE);
        return Ok(Rendered {
            raw,
            value: None,
            comment_kept: !text.is_empty(),
        });
    }

    if is_commentary_keyword(key) {
        return Err(Error::BadSyntax(format!(
            "commentary keyword '{key}' cannot carry a value"
        )));
    }

    let mut raw = if is_plain_keyword(key) {
        format!("{key:<KEY_FIELD$}{VALUE_INDICATOR}")
    } else {
        let prefix = format!("{HIERARCH_PREFIX}{} {VALUE_INDICATOR}", key.replace('.', " "));
        if prefix.len() >= CARD_SIZE {
            return Err(Error::KeyTooLong(key.to_string()));
        }
        prefix
    };

    let mut stored_value = None;
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        if !value.is_ascii() {
            return Err(Error::BadSyntax(format!("non-ASCII value for '{key}'")));
        }
        let (text, placement) = value_text(key, value)?;
        match placement {
            Placement::Fixed => pad_to(&mut raw, VALUE_COLUMN - text.len()),
            Placement::Right if raw.len() + text.len() <= VALUE_COLUMN => {
                pad_to(&mut raw, VALUE_COLUMN - text.len())
            }
            Placement::Right | Placement::Natural => {}
        }
        raw.push_str(&text);
        if raw.len() > CARD_SIZE {
            return Err(Error::ValueTooLong(key.to_string()));
        }
        stored_value = Some(text);
    }

    let mut comment_kept = false;
    if let Some(comment) = comment.filter(|c| !c.is_empty()) {
        let start = raw.len().max(VALUE_COLUMN);
        let room = CARD_SIZE.saturating_sub(start);
        if room >= MIN_COMMENT_ROOM
            && COMMENT_SEPARATOR.len() + comment.len() <= room
            && comment.is_ascii()
        {
            pad_to(&mut raw, start);
            raw.push_str(COMMENT_SEPARATOR);
            raw.push_str(comment);
            comment_kept = true;
        } else {
            debug!(key, "comment does not fit in the card and is dropped");
        }
    }

    pad_to(&mut raw, CARD_SIZE);
    Ok(Rendered {
        raw,
        value: stored_value,
        comment_kept,
    })
}

// ── Parsing ──

/// Split the text after a value indicator into value text and comment.
fn split_value_field(field: &str) -> (Option<String>, Option<String>) {
    let trimmed = field.trim_start();
    let (value, rest) = if trimmed.starts_with('\'') {
        match quoted_len(trimmed) {
            Some(len) => (trimmed[..len].to_string(), &trimmed[len..]),
            // Unterminated string: be lenient and close it at the end of the record.
            None => (format!("{}'", trimmed.trim_end()), ""),
        }
    } else {
        match trimmed.find('/') {
            Some(i) => (trimmed[..i].trim_end().to_string(), &trimmed[i..]),
            None => (trimmed.trim_end().to_string(), ""),
        }
    };

    let comment = rest
        .trim_start()
        .strip_prefix('/')
        .map(|c| c.strip_prefix(' ').unwrap_or(c).trim_end())
        .filter(|c| !c.is_empty())
        .map(String::from);
    let value = (!value.is_empty()).then_some(value);
    (value, comment)
}

impl FitsCard {
    /// Parse one raw record of at most 80 columns.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() > CARD_SIZE {
            return Err(Error::BadSyntax(format!(
                "record is {} columns long, limit is {CARD_SIZE}",
                raw.len()
            )));
        }
        if !raw.is_ascii() {
            return Err(Error::BadSyntax(String::from(
                "record contains non-ASCII characters",
            )));
        }
        let mut record = raw.to_string();
        pad_to(&mut record, CARD_SIZE);

        if let Some(body) = record.strip_prefix(HIERARCH_PREFIX) {
            let (key_text, field) = body.split_once('=').ok_or_else(|| {
                Error::BadSyntax(format!(
                    "HIERARCH record without value indicator: {}",
                    raw.trim_end()
                ))
            })?;
            let key = normalize_key(&format!("{HIERARCH_PREFIX}{}", key_text.trim()))
                .map_err(|_| {
                    Error::BadSyntax(format!("invalid HIERARCH keyword '{}'", key_text.trim()))
                })?;
            let (value, comment) = split_value_field(field);
            return Ok(FitsCard {
                key,
                value,
                comment,
                commentary: false,
                raw: record,
            });
        }

        let keyword = record[..KEY_FIELD].trim_end();
        if !is_plain_keyword(keyword) {
            return Err(Error::BadSyntax(format!("invalid keyword '{keyword}'")));
        }
        let key = keyword.to_string();

        if is_commentary_keyword(&key) || &record[KEY_FIELD..KEY_FIELD + 2] != VALUE_INDICATOR {
            let text = record[KEY_FIELD..].trim_end();
            let comment = (!text.is_empty()).then(|| text.to_string());
            return Ok(FitsCard {
                key,
                value: None,
                comment,
                commentary: true,
                raw: record,
            });
        }

        let (value, comment) = split_value_field(&record[KEY_FIELD + VALUE_INDICATOR.len()..]);
        Ok(FitsCard {
            key,
            value,
            comment,
            commentary: false,
            raw: record,
        })
    }

    /// Format a `(key, value, comment)` triple into a card.
    ///
    /// `value` is value text: `'...'` for strings, `(...)` for compound
    /// values, `T`/`F` for logicals, anything else is treated as a number.
    /// `None` gives a commentary card for COMMENT/HISTORY/blank keys and an
    /// undefined-value card otherwise.
    pub fn new(key: &str, value: Option<&str>, comment: Option<&str>) -> Result<Self> {
        let key = normalize_key(key)?;
        let commentary = value.is_none() && is_commentary_keyword(&key);
        Self::build(key, value, comment, commentary)
    }

    /// Format a card from a typed [`Value`].
    pub fn from_value(key: &str, value: &Value, comment: Option<&str>) -> Result<Self> {
        Self::new(key, Some(&format_value(value)), comment)
    }

    fn build(
        key: String,
        value: Option<&str>,
        comment: Option<&str>,
        commentary: bool,
    ) -> Result<Self> {
        let rendered = render(&key, value, comment, commentary)?;
        let comment = if rendered.comment_kept {
            comment.map(String::from)
        } else {
            None
        };
        Ok(FitsCard {
            key,
            value: rendered.value,
            comment,
            commentary,
            raw: rendered.raw,
        })
    }

    /// The key in its stored form (dotted for extended keywords).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The value text as it appears in the record, if any.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// The comment, or the free text of a commentary card.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// The formatted 80-column record.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_hierarch(&self) -> bool {
        !is_plain_keyword(&self.key)
    }

    /// Returns `true` if the card carries free text instead of a value.
    pub fn is_commentary(&self) -> bool {
        self.commentary
    }

    /// Returns `true` if `key` names this card, in any accepted spelling.
    pub fn matches_key(&self, key: &str) -> bool {
        key == self.key || normalize_key(key).is_ok_and(|k| k == self.key)
    }

    /// The value interpreted as a typed [`Value`].
    pub fn parsed_value(&self) -> Option<Value> {
        self.value.as_deref().and_then(parse_value)
    }

    /// The unquoted content of a string value.
    pub fn as_str(&self) -> Option<String> {
        self.value.as_deref().and_then(unquote)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.parsed_value() {
            Some(Value::Integer(n)) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.parsed_value() {
            Some(Value::Logical(b)) => Some(b),
            _ => None,
        }
    }

    /// Rename the card. The new key must use only ASCII letters, digits,
    /// `_`, `-`, `.` and blanks and must not start with `.`, `-` or a blank.
    pub fn set_key(&mut self, key: &str) -> Result<()> {
        let key = normalize_key(key)?;
        let commentary =
            self.value.is_none() && (self.commentary || is_commentary_keyword(&key));
        let card = Self::build(key, self.value.as_deref(), self.comment.as_deref(), commentary)?;
        *self = card;
        Ok(())
    }

    /// Replace the value text. The card is left untouched on error.
    pub fn set_value(&mut self, value: Option<&str>) -> Result<()> {
        let commentary =
            value.is_none() && (self.commentary || is_commentary_keyword(&self.key));
        let card = Self::build(self.key.clone(), value, self.comment.as_deref(), commentary)?;
        *self = card;
        Ok(())
    }

    /// Replace the comment. The card is left untouched on error.
    pub fn set_comment(&mut self, comment: Option<&str>) -> Result<()> {
        let card = Self::build(
            self.key.clone(),
            self.value.as_deref(),
            comment,
            self.commentary,
        )?;
        *self = card;
        Ok(())
    }
}

impl fmt::Display for FitsCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ── Tests ──



#[cfg(test)]
mod edit_tests {
    use super::*;

    #[test]
    fn set_value_reformats() {
        let mut c = FitsCard::new("NAXIS1", Some("10"), Some("width")).unwrap();
        c.set_value(Some("2048")).unwrap();
        assert_eq!(c.as_int(), Some(2048));
        assert_eq!(c.comment(), Some("width"));
        assert_eq!(&c.raw()[26..30], "2048");
    }

    #[test]
    fn set_comment_on_parsed_card() {
        let mut c =
            FitsCard::parse("NAXIS   =                    2 / number of data axes").unwrap();
        c.set_comment(Some("2-dimensional binary table")).unwrap();
        assert!(c.raw().contains(" / 2-dimensional binary table"));
        assert_eq!(c.as_int(), Some(2));
    }

    #[test]
    fn set_key_moves_to_hierarch() {
        let mut c = FitsCard::new("DIT", Some("1.5"), None).unwrap();
        c.set_key("ESO DET DIT").unwrap();
        assert_eq!(c.key(), "ESO.DET.DIT");
        assert!(c.raw().starts_with("HIERARCH ESO DET DIT ="));
    }

    #[test]
    fn set_key_rejects_forbidden_characters() {
        let mut c = FitsCard::new("OBJECT", Some("'M31'"), None).unwrap();
        let before = c.clone();
        assert!(matches!(c.set_key("BAD=KEY"), Err(Error::InvalidKey(_))));
        assert!(matches!(c.set_key(".LEADING"), Err(Error::InvalidKey(_))));
        assert!(matches!(c.set_key("-LEADING"), Err(Error::InvalidKey(_))));
        assert_eq!(c, before);
    }

    #[test]
    fn failed_set_value_leaves_card_untouched() {
        let mut c = FitsCard::new("OBJECT", Some("'M31'"), None).unwrap();
        let before = c.clone();
        assert!(c.set_value(Some("'open")).is_err());
        assert_eq!(c, before);
    }

    #[test]
    fn matches_key_accepts_any_spelling() {
        let c = FitsCard::new("ESO.DET.DIT", Some("1"), None).unwrap();
        assert!(c.matches_key("ESO.DET.DIT"));
        assert!(c.matches_key("ESO DET DIT"));
        assert!(c.matches_key("HIERARCH ESO DET DIT"));
        assert!(!c.matches_key("ESO.DET"));
    }
}
