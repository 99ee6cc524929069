//! Regular-expression keyword filters.
//!
//! A [`FitsFilter`] selects header cards by matching a pattern against the
//! card's raw 80-column record text. Negated filters select everything the
//! pattern does *not* match, which is how format plumbing is stripped.

use regex::{Regex, RegexBuilder};

use crate::card::FitsCard;
use crate::error::{Error, Result};

/// Syntax options applied when compiling a filter pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Match letters without regard to case.
    pub case_insensitive: bool,
    /// Let `^` and `$` match at line boundaries.
    pub multi_line: bool,
}

/// A compiled pattern plus a negation flag.
#[derive(Debug, Clone)]
pub struct FitsFilter {
    regex: Regex,
    negate: bool,
}

impl FitsFilter {
    /// Compile `pattern` with the default syntax options.
    pub fn new(pattern: &str, negate: bool) -> Result<Self> {
        Self::with_options(pattern, negate, FilterOptions::default())
    }

    /// Compile `pattern` with explicit syntax options.
    pub fn with_options(pattern: &str, negate: bool, options: FilterOptions) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::InvalidArgument("filter pattern must not be empty"));
        }
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(options.case_insensitive)
            .multi_line(options.multi_line)
            .build()
            .map_err(|e| Error::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
        Ok(FitsFilter { regex, negate })
    }

    /// Returns `true` if `text` passes the filter (match XOR negate).
    pub fn apply(&self, text: &str) -> bool {
        self.regex.is_match(text) != self.negate
    }

    /// Apply the filter to a card's raw record.
    pub fn matches_card(&self, card: &FitsCard) -> bool {
        self.apply(card.raw())
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    pub fn toggle_negation(&mut self) {
        self.negate = !self.negate;
    }

    /// The pattern this filter was compiled from.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_filter_selects_matches() {
        let f = FitsFilter::new("^ESO ", false).unwrap();
        assert!(f.apply("ESO DET DIT"));
        assert!(!f.apply("EXPTIME"));
    }

    #[test]
    fn negated_filter_inverts() {
        let f = FitsFilter::new("^CHECKSUM", true).unwrap();
        assert!(!f.apply("CHECKSUM= 'abc'"));
        assert!(f.apply("OBJECT  = 'M31'"));
        assert!(f.is_negated());
    }

    #[test]
    fn toggle_negation_flips_result() {
        let mut f = FitsFilter::new("^OBJECT", false).unwrap();
        assert!(f.apply("OBJECT  = 'M31'"));
        f.toggle_negation();
        assert!(!f.apply("OBJECT  = 'M31'"));
        assert!(f.is_negated());
    }

    #[test]
    fn case_insensitive_option() {
        let options = FilterOptions {
            case_insensitive: true,
            ..FilterOptions::default()
        };
        let f = FitsFilter::with_options("^object", false, options).unwrap();
        assert!(f.apply("OBJECT  = 'M31'"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = FitsFilter::new("([unclosed", true).unwrap_err();
        match err {
            Error::InvalidPattern { pattern, .. } => assert_eq!(pattern, "([unclosed"),
            other => panic!("Expected InvalidPattern, got {:?}", other),
        }
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(matches!(
            FitsFilter::new("", false),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn filter_sees_raw_record() {
        let card = FitsCard::new("ESO.DET.DIT", Some("1.5"), None).unwrap();
        let f = FitsFilter::new("^HIERARCH ESO DET ", false).unwrap();
        assert!(f.matches_card(&card));
        assert_eq!(f.pattern(), "^HIERARCH ESO DET ");
    }
}
