//! Ordered card sequences.

use tracing::warn;

use crate::block::CARD_SIZE;
use crate::card::FitsCard;
use crate::error::{Error, Result};
use crate::filter::FitsFilter;
use crate::source::FitsSource;

// ── Types ──

/// How cards of equal rank are ordered by [`FitsHeader::sort_by_rank`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// Keep the original relative order.
    #[default]
    Stable,
    /// Compare the raw record text.
    RawText,
}

/// An ordered, duplicate-tolerant sequence of cards.
///
/// Insertion order is significant until an explicit sort. Lookups by key
/// return the first match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<FitsCard>,
}

impl FitsHeader {
    pub fn new() -> Self {
        FitsHeader { cards: Vec::new() }
    }

    /// Parse raw records into a header.
    ///
    /// Records longer than a card are cut to 80 columns before parsing.
    /// This is the only place where input is truncated instead of rejected.
    pub fn from_records<I, S>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cards = Vec::new();
        for record in records {
            let record = record.as_ref();
            let record = if record.len() > CARD_SIZE {
                warn!(len = record.len(), "oversized header record truncated to 80 columns");
                record.get(..CARD_SIZE).ok_or_else(|| {
                    Error::BadSyntax(String::from("record cannot be cut at column 80"))
                })?
            } else {
                record
            };
            cards.push(FitsCard::parse(record)?);
        }
        Ok(FitsHeader { cards })
    }

    /// Read every card of the unit at `position` (up to, excluding, `END`).
    pub fn load(source: &FitsSource, position: usize) -> Result<Self> {
        Self::from_records(source.records(position)?)
    }

    // ── Filtering and merging ──

    /// A copy holding only the cards whose raw record passes `filter`.
    pub fn filter(&self, filter: &FitsFilter) -> FitsHeader {
        self.cards
            .iter()
            .filter(|card| filter.matches_card(card))
            .cloned()
            .collect()
    }

    /// Drop every card whose raw record fails `filter`.
    pub fn retain(&mut self, filter: &FitsFilter) {
        self.cards.retain(|card| filter.matches_card(card));
    }

    /// Append a copy of every card of `other`.
    pub fn join(&mut self, other: &FitsHeader) {
        self.cards.extend(other.cards.iter().cloned());
    }

    /// Stable sort by a caller-supplied rank.
    pub fn sort_by_rank<K, F>(&mut self, rank: F, tie_break: TieBreak)
    where
        K: Ord,
        F: Fn(&FitsCard) -> K,
    {
        match tie_break {
            TieBreak::Stable => self.cards.sort_by_cached_key(|card| rank(card)),
            TieBreak::RawText => self.cards.sort_by(|a, b| {
                rank(a)
                    .cmp(&rank(b))
                    .then_with(|| a.raw().cmp(b.raw()))
            }),
        }
    }

    // ── Lookup ──

    pub fn find(&self, key: &str) -> Option<&FitsCard> {
        self.cards.iter().find(|card| card.matches_key(key))
    }

    pub fn find_mut(&mut self, key: &str) -> Option<&mut FitsCard> {
        self.cards.iter_mut().find(|card| card.matches_key(key))
    }

    /// Every card named `key`, in header order.
    pub fn find_all_mut<'a>(
        &'a mut self,
        key: &'a str,
    ) -> impl Iterator<Item = &'a mut FitsCard> + 'a {
        self.cards.iter_mut().filter(move |card| card.matches_key(key))
    }

    pub fn position_of(&self, key: &str) -> Option<usize> {
        self.cards.iter().position(|card| card.matches_key(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position_of(key).is_some()
    }

    pub fn get(&self, index: usize) -> Option<&FitsCard> {
        self.cards.get(index)
    }

    /// The unquoted string value of the first card named `key`.
    pub fn string_value(&self, key: &str) -> Option<String> {
        self.find(key).and_then(FitsCard::as_str)
    }

    pub fn integer_value(&self, key: &str) -> Option<i64> {
        self.find(key).and_then(FitsCard::as_int)
    }

    pub fn logical_value(&self, key: &str) -> Option<bool> {
        self.find(key).and_then(FitsCard::as_bool)
    }

    /// Like [`find`](Self::find), but a missing key is an error.
    pub fn require(&self, key: &str) -> Result<&FitsCard> {
        self.find(key)
            .ok_or_else(|| Error::MissingKeyword(key.to_string()))
    }

    /// The integer value of a keyword that must be present.
    pub fn require_integer(&self, key: &str) -> Result<i64> {
        self.require(key)?
            .as_int()
            .ok_or_else(|| Error::MissingKeyword(format!("{key} (integer)")))
    }

    // ── Editing ──

    pub fn append(&mut self, card: FitsCard) {
        self.cards.push(card);
    }

    /// Insert `card` before position `index`.
    pub fn insert(&mut self, index: usize, card: FitsCard) -> Result<()> {
        if index > self.cards.len() {
            return Err(Error::InvalidArgument("insert position past end of header"));
        }
        self.cards.insert(index, card);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<FitsCard> {
        (index < self.cards.len()).then(|| self.cards.remove(index))
    }

    /// Remove the first card named `key`.
    pub fn remove_key(&mut self, key: &str) -> Option<FitsCard> {
        let index = self.position_of(key)?;
        Some(self.cards.remove(index))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, FitsCard> {
        self.cards.iter()
    }
}

impl FromIterator<FitsCard> for FitsHeader {
    fn from_iter<I: IntoIterator<Item = FitsCard>>(iter: I) -> Self {
        FitsHeader {
            cards: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FitsHeader {
    type Item = FitsCard;
    type IntoIter = std::vec::IntoIter<FitsCard>;

    fn into_iter(self) -> Self::IntoIter {
        self.cards.into_iter()
    }
}

impl<'a> IntoIterator for &'a FitsHeader {
    type Item = &'a FitsCard;
    type IntoIter = core::slice::Iter<'a, FitsCard>;

    fn into_iter(self) -> Self::IntoIter {
        self.cards.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(key: &str, value: &str) -> FitsCard {
        FitsCard::new(key, Some(value), None).unwrap()
    }

    fn sample() -> FitsHeader {
        FitsHeader::from_records([
            "OBJECT  = 'M31     '",
            "EXPTIME =                  300",
            "HIERARCH ESO DET DIT = 1.5",
            "COMMENT first",
            "EXPTIME =                  999",
            "COMMENT second",
        ])
        .unwrap()
    }

    #[test]
    fn from_records_parses_in_order() {
        let h = sample();
        assert_eq!(h.len(), 6);
        assert_eq!(h.get(0).map(FitsCard::key), Some("OBJECT"));
        assert_eq!(h.get(2).map(FitsCard::key), Some("ESO.DET.DIT"));
    }

    #[test]
    fn from_records_truncates_oversized() {
        let long = format!("{:<80}{}", "BITPIX  =                    8", "overflow");
        let h = FitsHeader::from_records([long]).unwrap();
        assert_eq!(h.integer_value("BITPIX"), Some(8));
        assert!(!h.get(0).unwrap().raw().contains("overflow"));
    }

    #[test]
    fn from_records_rejects_bad_syntax() {
        assert!(matches!(
            FitsHeader::from_records(["lower   = 1"]),
            Err(Error::BadSyntax(_))
        ));
    }

    #[test]
    fn first_match_wins() {
        let h = sample();
        assert_eq!(h.integer_value("EXPTIME"), Some(300));
        assert_eq!(h.position_of("EXPTIME"), Some(1));
        assert_eq!(h.find("COMMENT").and_then(FitsCard::comment), Some("first"));
    }

    #[test]
    fn find_all_mut_visits_duplicates() {
        let mut h = sample();
        for card in h.find_all_mut("EXPTIME") {
            card.set_value(Some("1")).unwrap();
        }
        let values: Vec<i64> = h.iter().filter_map(FitsCard::as_int).collect();
        assert_eq!(values, [1, 1]);
    }

    #[test]
    fn lookup_by_hierarch_spelling() {
        let h = sample();
        assert!(h.contains("ESO DET DIT"));
        assert!(h.contains("HIERARCH ESO DET DIT"));
        assert!(!h.contains("ESO DET NDIT"));
    }

    #[test]
    fn filter_keeps_passing_cards() {
        let h = sample();
        let no_comments = h.filter(&FitsFilter::new("^COMMENT ", true).unwrap());
        assert_eq!(no_comments.len(), 4);
        assert_eq!(h.len(), 6);
    }

    #[test]
    fn retain_in_place() {
        let mut h = sample();
        h.retain(&FitsFilter::new("^HIERARCH ", false).unwrap());
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn join_copies_other() {
        let mut a = FitsHeader::new();
        a.append(card("A", "1"));
        let mut b = FitsHeader::new();
        b.append(card("B", "2"));
        a.join(&b);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
        assert_eq!(a.get(1), b.get(0));
    }

    #[test]
    fn insert_and_remove() {
        let mut h = FitsHeader::new();
        h.append(card("A", "1"));
        h.append(card("C", "3"));
        h.insert(1, card("B", "2")).unwrap();
        assert_eq!(h.position_of("B"), Some(1));
        assert!(matches!(
            h.insert(9, card("Z", "0")),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(h.remove_key("A").map(|c| c.key().to_string()), Some(String::from("A")));
        assert!(h.remove(5).is_none());
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn stable_sort_keeps_bucket_order() {
        let mut h = FitsHeader::new();
        for (key, value) in [("ZETA", "1"), ("ALPHA", "2"), ("MID", "3"), ("BETA", "4")] {
            h.append(card(key, value));
        }
        h.sort_by_rank(|c| if c.key() == "MID" { 0 } else { 1 }, TieBreak::Stable);
        let keys: Vec<&str> = h.iter().map(FitsCard::key).collect();
        assert_eq!(keys, ["MID", "ZETA", "ALPHA", "BETA"]);
    }

    #[test]
    fn raw_text_tie_break() {
        let mut h = FitsHeader::new();
        for (key, value) in [("ZETA", "1"), ("ALPHA", "2"), ("MID", "3"), ("BETA", "4")] {
            h.append(card(key, value));
        }
        h.sort_by_rank(|c| if c.key() == "MID" { 0 } else { 1 }, TieBreak::RawText);
        let keys: Vec<&str> = h.iter().map(FitsCard::key).collect();
        assert_eq!(keys, ["MID", "ALPHA", "BETA", "ZETA"]);
    }

    #[test]
    fn require_reports_missing_keyword() {
        let h = sample();
        assert!(matches!(h.require("NAXIS"), Err(Error::MissingKeyword(k)) if k == "NAXIS"));
        assert!(matches!(h.require_integer("OBJECT"), Err(Error::MissingKeyword(_))));
        assert_eq!(h.require_integer("EXPTIME").unwrap(), 300);
    }
}
