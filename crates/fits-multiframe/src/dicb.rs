//! DICB keyword ordering.
//!
//! Every card falls into a numbered bucket. Standard keywords rank first
//! (structural, table structure, identity, provenance, observation, WCS,
//! scaling, housekeeping), unrecognized keys come next, then the ESO
//! `HIERARCH` subsystems, and commentary cards close the header. Sorting is
//! stable, so cards sharing a bucket keep their relative order.

use crate::card::FitsCard;
use crate::header::{FitsHeader, TieBreak};

/// Position of a card's bucket in the DICB order.
pub type Rank = u32;

/// Bucket of keys outside every known vocabulary.
pub const DEFAULT_RANK: Rank = 1000;

/// Bucket of `ESO` keys whose subsystem is not listed.
pub const ESO_DEFAULT_RANK: Rank = 1999;

const HISTORY_RANK: Rank = 2100;
const COMMENT_RANK: Rank = 2200;
const BLANK_RANK: Rank = 2300;

/// Exact standard keywords.
const STANDARD: &[(&str, Rank)] = &[
    // Structure
    ("SIMPLE", 100),
    ("XTENSION", 101),
    ("BITPIX", 102),
    ("NAXIS", 103),
    ("EXTEND", 105),
    ("PCOUNT", 106),
    ("GCOUNT", 107),
    ("GROUPS", 108),
    ("TFIELDS", 109),
    ("THEAP", 201),
    // Identity
    ("EXTNAME", 300),
    ("EXTVER", 301),
    ("EXTLEVEL", 302),
    ("INHERIT", 303),
    // Provenance
    ("ORIGIN", 400),
    ("DATE", 401),
    ("TELESCOP", 402),
    ("INSTRUME", 403),
    ("OBJECT", 404),
    ("OBSERVER", 405),
    ("PI-COI", 406),
    ("AUTHOR", 407),
    ("REFERENC", 408),
    // Observation
    ("RA", 500),
    ("DEC", 501),
    ("EQUINOX", 502),
    ("RADESYS", 503),
    ("RADECSYS", 503),
    ("EXPTIME", 504),
    ("MJD-OBS", 505),
    ("MJD-END", 506),
    ("DATE-OBS", 507),
    ("DATE-END", 508),
    ("UTC", 509),
    ("LST", 510),
    ("TIMESYS", 511),
    // World coordinates
    ("WCSAXES", 600),
    ("WCSNAME", 601),
    ("LONPOLE", 619),
    ("LATPOLE", 620),
    // Scaling
    ("BSCALE", 700),
    ("BZERO", 701),
    ("BUNIT", 702),
    ("BLANK", 703),
    ("DATAMIN", 704),
    ("DATAMAX", 705),
    // Housekeeping
    ("ARCFILE", 800),
    ("ORIGFILE", 801),
    ("CHECKSUM", 802),
    ("DATASUM", 803),
];

/// Standard keyword families: a stem followed by an index (`NAXIS1`, `CRVAL2`).
const INDEXED: &[(&str, Rank)] = &[
    ("NAXIS", 104),
    ("TFORM", 200),
    ("TBCOL", 200),
    ("TTYPE", 200),
    ("TUNIT", 200),
    ("TDISP", 200),
    ("TDIM", 200),
    ("TSCAL", 200),
    ("TZERO", 200),
    ("TNULL", 200),
    ("CTYPE", 610),
    ("CUNIT", 611),
    ("CRVAL", 612),
    ("CRPIX", 613),
    ("CDELT", 614),
    ("CROTA", 615),
];

/// Matrix families indexed as `<stem><i>_<j>`.
const MATRIX: &[(&str, Rank)] = &[("CD", 616), ("PC", 617), ("PV", 618)];

/// ESO subsystems in `HIERARCH ESO <subsystem> ...` keys.
const ESO_SUBSYSTEMS: &[(&str, Rank)] = &[
    ("DPR", 1100),
    ("OBS", 1200),
    ("TPL", 1300),
    ("GEN", 1400),
    ("TEL", 1500),
    ("ADA", 1550),
    ("INS", 1600),
    ("DET", 1700),
    ("OCS", 1750),
    ("LOG", 1800),
    ("PRO", 1850),
    ("QC", 1900),
];

fn lookup(table: &[(&str, Rank)], key: &str) -> Option<Rank> {
    table
        .iter()
        .find_map(|&(name, rank)| (name == key).then_some(rank))
}

fn is_index(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn standard_rank(key: &str) -> Option<Rank> {
    if let Some(rank) = lookup(STANDARD, key) {
        return Some(rank);
    }
    let indexed = INDEXED.iter().find_map(|&(stem, rank)| {
        key.strip_prefix(stem)
            .filter(|rest| is_index(rest))
            .map(|_| rank)
    });
    if indexed.is_some() {
        return indexed;
    }
    MATRIX.iter().find_map(|&(stem, rank)| {
        let (i, j) = key.strip_prefix(stem)?.split_once('_')?;
        (is_index(i) && is_index(j)).then_some(rank)
    })
}

fn hierarch_rank(key: &str) -> Rank {
    let mut segments = key.split('.');
    if segments.next() != Some("ESO") {
        return DEFAULT_RANK;
    }
    segments
        .next()
        .and_then(|subsystem| lookup(ESO_SUBSYSTEMS, subsystem))
        .unwrap_or(ESO_DEFAULT_RANK)
}

/// The DICB bucket of `card`.
pub fn dicb_rank(card: &FitsCard) -> Rank {
    match card.key() {
        "HISTORY" => HISTORY_RANK,
        "COMMENT" => COMMENT_RANK,
        "" => BLANK_RANK,
        key if card.is_hierarch() => hierarch_rank(key),
        key => standard_rank(key).unwrap_or(DEFAULT_RANK),
    }
}

/// Sort `header` into DICB order.
pub fn sort(header: &mut FitsHeader) {
    header.sort_by_rank(dicb_rank, TieBreak::Stable);
}
