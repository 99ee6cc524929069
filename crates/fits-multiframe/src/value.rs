//! Typed interpretation of card value text.
//!
//! Cards keep their value as the text that appears in the record (for
//! strings that includes the quotes and padding). This module turns that
//! text into a [`Value`] and back.

/// A parsed FITS header value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// FITS logical value (`T` or `F`).
    Logical(bool),
    /// FITS integer value.
    Integer(i64),
    /// FITS floating-point value.
    Float(f64),
    /// FITS character string (content between single quotes).
    String(String),
    /// FITS complex integer `(real, imaginary)`.
    ComplexInt(i64, i64),
    /// FITS complex float `(real, imaginary)`.
    ComplexFloat(f64, f64),
}

/// Wrap `s` in single quotes, doubling any embedded quote.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Extract the content of a quoted string value.
///
/// The text must start with `'`. Doubled quotes inside the string collapse
/// to a single quote; trailing blanks (the FITS minimum-width padding) are
/// removed. An unterminated string is accepted up to the end of the text.
pub fn unquote(text: &str) -> Option<String> {
    let body = text.strip_prefix('\'')?;
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\'' {
            if chars.peek() == Some(&'\'') {
                out.push('\'');
                chars.next();
            } else {
                break;
            }
        } else {
            out.push(ch);
        }
    }
    Some(out.trim_end().to_string())
}

/// Byte length of the leading quoted string in `text`, closing quote
/// included, or `None` when the string is not terminated.
pub(crate) fn quoted_len(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'\'') {
        return None;
    }
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return Some(i + 1);
        }
        i += 1;
    }
    None
}

/// Try to parse a complex value `(real, imag)`.
fn parse_complex(text: &str) -> Option<Value> {
    let inner = text.strip_prefix('(')?.strip_suffix(')')?;
    let (left, right) = inner.split_once(',')?;
    let left = left.trim();
    let right = right.trim();

    if !left.contains('.') && !right.contains('.') {
        if let (Ok(re), Ok(im)) = (left.parse::<i64>(), right.parse::<i64>()) {
            return Some(Value::ComplexInt(re, im));
        }
    }

    let re = parse_float_str(left)?;
    let im = parse_float_str(right)?;
    Some(Value::ComplexFloat(re, im))
}

/// Parse a float string, handling FITS `D` exponent notation.
fn parse_float_str(s: &str) -> Option<f64> {
    let normalized = s.replace('D', "E").replace('d', "e");
    normalized.parse::<f64>().ok()
}

/// Parse the value text of a card into a [`Value`].
///
/// Returns `None` for empty (undefined) values and for text that is not a
/// recognizable FITS value.
pub fn parse_value(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.starts_with('\'') {
        return unquote(text).map(Value::String);
    }

    match text {
        "T" => return Some(Value::Logical(true)),
        "F" => return Some(Value::Logical(false)),
        _ => {}
    }

    if text.starts_with('(') {
        return parse_complex(text);
    }

    if !text.contains(['.', 'E', 'e', 'D', 'd']) {
        if let Ok(n) = text.parse::<i64>() {
            return Some(Value::Integer(n));
        }
    }

    parse_float_str(text).map(Value::Float)
}

/// Render a [`Value`] as card value text.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Logical(b) => String::from(if *b { "T" } else { "F" }),
        Value::Integer(n) => n.to_string(),
        Value::Float(f) => format_float_with_max(*f, 20),
        Value::String(s) => quote(s),
        Value::ComplexInt(re, im) => format!("({re}, {im})"),
        Value::ComplexFloat(re, im) => format!(
            "({}, {})",
            format_float_with_max(*re, 20),
            format_float_with_max(*im, 20)
        ),
    }
}

fn format_float_with_max(f: f64, max_len: usize) -> String {
    if f == 0.0 {
        return String::from("0.0");
    }
    // Start with high precision and reduce until the result fits.
    let mut precision = 15usize;
    loop {
        let s = format!("{:.prec$E}", f, prec = precision);
        if s.len() <= max_len || precision == 0 {
            return s;
        }
        precision -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Logical ----

    #[test]
    fn parse_logical() {
        assert_eq!(parse_value("T"), Some(Value::Logical(true)));
        assert_eq!(parse_value("   F"), Some(Value::Logical(false)));
    }

    // ---- Integer ----

    #[test]
    fn parse_integer_values() {
        assert_eq!(parse_value("42"), Some(Value::Integer(42)));
        assert_eq!(parse_value("-99"), Some(Value::Integer(-99)));
        assert_eq!(parse_value("0"), Some(Value::Integer(0)));
    }

    // ---- Float ----

    #[test]
    fn parse_float_d_exponent() {
        match parse_value("1.234D+05") {
            Some(Value::Float(f)) => assert!((f - 1.234e5).abs() < 1e-5),
            other => panic!("Expected Float, got {:?}", other),
        }
    }

    #[test]
    fn parse_float_negative_exponent() {
        match parse_value("-2.5E-03") {
            Some(Value::Float(f)) => assert!((f + 2.5e-3).abs() < 1e-15),
            other => panic!("Expected Float, got {:?}", other),
        }
    }

    // ---- String ----

    #[test]
    fn parse_string_trims_padding() {
        assert_eq!(
            parse_value("'Hubble  '"),
            Some(Value::String(String::from("Hubble")))
        );
    }

    #[test]
    fn parse_string_doubled_quote() {
        assert_eq!(
            parse_value("'it''s ok'"),
            Some(Value::String(String::from("it's ok")))
        );
    }

    #[test]
    fn unquote_unterminated_is_lenient() {
        assert_eq!(unquote("'open"), Some(String::from("open")));
        assert_eq!(unquote("bare"), None);
    }

    #[test]
    fn quoted_len_skips_doubled_quotes() {
        assert_eq!(quoted_len("'a''b' / c"), Some(6));
        assert_eq!(quoted_len("'never"), None);
        assert_eq!(quoted_len("12"), None);
    }

    // ---- Complex ----

    #[test]
    fn parse_complex_values() {
        assert_eq!(parse_value("(1, -2)"), Some(Value::ComplexInt(1, -2)));
        assert_eq!(
            parse_value("(1.5, 2.0)"),
            Some(Value::ComplexFloat(1.5, 2.0))
        );
    }

    #[test]
    fn parse_empty_is_undefined() {
        assert_eq!(parse_value("   "), None);
        assert_eq!(parse_value("not-a-number"), None);
    }

    // ---- Formatting ----

    #[test]
    fn format_values() {
        assert_eq!(format_value(&Value::Logical(true)), "T");
        assert_eq!(format_value(&Value::Integer(-7)), "-7");
        assert_eq!(format_value(&Value::String(String::from("O'Neil"))), "'O''Neil'");
        assert_eq!(format_value(&Value::ComplexInt(3, 4)), "(3, 4)");
        assert_eq!(format_value(&Value::Float(0.0)), "0.0");
    }

    #[test]
    fn float_text_parses_back() {
        let text = format_value(&Value::Float(273.15));
        assert!(text.len() <= 20);
        match parse_value(&text) {
            Some(Value::Float(f)) => assert!((f - 273.15).abs() < 1e-9),
            other => panic!("Expected Float, got {:?}", other),
        }
    }
}
