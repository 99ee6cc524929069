//! Builders for small FITS files used by the unit tests.

use std::fs;
use std::path::Path;

use crate::block::{header_blocks, padding_len, DATA_PAD_BYTE};
use crate::card::FitsCard;

/// One formatted record.
pub(crate) fn rec(key: &str, value: &str) -> String {
    FitsCard::new(key, Some(value), None).unwrap().raw().to_string()
}

pub(crate) fn commentary(key: &str, text: &str) -> String {
    FitsCard::new(key, None, Some(text)).unwrap().raw().to_string()
}

pub(crate) fn primary(naxes: &[usize]) -> Vec<String> {
    let mut records = vec![
        rec("SIMPLE", "T"),
        rec("BITPIX", "8"),
        rec("NAXIS", &naxes.len().to_string()),
    ];
    for (i, n) in naxes.iter().enumerate() {
        records.push(rec(&format!("NAXIS{}", i + 1), &n.to_string()));
    }
    records.push(rec("EXTEND", "T"));
    records
}

pub(crate) fn image(name: &str, bitpix: i64, naxes: &[usize]) -> Vec<String> {
    let mut records = vec![
        rec("XTENSION", "'IMAGE'"),
        rec("BITPIX", &bitpix.to_string()),
        rec("NAXIS", &naxes.len().to_string()),
    ];
    for (i, n) in naxes.iter().enumerate() {
        records.push(rec(&format!("NAXIS{}", i + 1), &n.to_string()));
    }
    records.push(rec("PCOUNT", "0"));
    records.push(rec("GCOUNT", "1"));
    if !name.is_empty() {
        records.push(rec("EXTNAME", &format!("'{name}'")));
    }
    records
}

/// A binary table with one `1J` column per entry of `units`.
pub(crate) fn bintable(name: &str, rows: usize, units: &[&str]) -> Vec<String> {
    let mut records = vec![
        rec("XTENSION", "'BINTABLE'"),
        rec("BITPIX", "8"),
        rec("NAXIS", "2"),
        rec("NAXIS1", &(4 * units.len()).to_string()),
        rec("NAXIS2", &rows.to_string()),
        rec("PCOUNT", "0"),
        rec("GCOUNT", "1"),
        rec("TFIELDS", &units.len().to_string()),
    ];
    for (i, unit) in units.iter().enumerate() {
        records.push(rec(&format!("TFORM{}", i + 1), "'1J'"));
        records.push(rec(&format!("TTYPE{}", i + 1), &format!("'COL{}'", i + 1)));
        records.push(rec(&format!("TUNIT{}", i + 1), &format!("'{unit}'")));
    }
    records.push(rec("EXTNAME", &format!("'{name}'")));
    records
}

/// Payload bytes with a recognizable pattern.
pub(crate) fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Write `units` (records plus payload length) as one FITS file.
pub(crate) fn write_fits(path: &Path, units: &[(Vec<String>, usize)]) {
    let mut bytes = Vec::new();
    for (records, data_len) in units {
        bytes.extend(header_blocks(records.iter().map(String::as_str)));
        bytes.extend(payload(*data_len));
        let pad = padding_len(*data_len as u64) as usize;
        bytes.resize(bytes.len() + pad, DATA_PAD_BYTE);
    }
    fs::write(path, bytes).unwrap();
}
