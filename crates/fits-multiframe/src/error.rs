//! Error types for reading, composing and writing FITS units.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// All errors that can occur while composing a FITS product.
#[derive(Debug, Error)]
pub enum Error {
    // ── Input errors ──
    /// A required argument was empty or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A dataset identifier was empty where one is required.
    #[error("dataset identifier must not be empty")]
    EmptyId,

    /// The naming mode cannot be used with the requested operation.
    #[error("naming mode {mode} is not allowed for {operation}")]
    IllegalMode {
        mode: &'static str,
        operation: &'static str,
    },

    /// A keyword filter pattern failed to compile.
    #[error("invalid filter pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A keyword name uses characters outside the permitted set.
    #[error("invalid keyword name '{0}'")]
    InvalidKey(String),

    // ── Lookup errors ──
    /// The source has no file name.
    #[error("source has no file name")]
    NoFilename,

    /// A file or a named unit could not be found.
    #[error("{what} not found: {}", path.display())]
    NotFound { path: PathBuf, what: String },

    /// The head dataset carries no name to join unit names onto.
    #[error("head dataset has no name to join with")]
    HeadUnnamed,

    // ── Format errors ──
    /// A raw record does not follow the card grammar.
    #[error("bad card syntax: {0}")]
    BadSyntax(String),

    /// A unit's header blocks are malformed.
    #[error("malformed unit {position} in {}: {message}", path.display())]
    BadFormat {
        path: PathBuf,
        position: usize,
        message: String,
    },

    /// The keyword does not leave room for a value within one card.
    #[error("keyword '{0}' does not fit in a card")]
    KeyTooLong(String),

    /// The formatted value runs past the end of the card.
    #[error("value of '{0}' does not fit in a card")]
    ValueTooLong(String),

    /// Commentary text is longer than the 72 free-text columns.
    #[error("commentary text of '{0}' exceeds 72 characters")]
    CommentTooLong(String),

    /// A string value has no closing quote.
    #[error("unterminated string value for '{0}'")]
    UnterminatedQuote(String),

    /// A compound value has unbalanced parentheses.
    #[error("mismatched parentheses in value of '{0}'")]
    MismatchedParen(String),

    /// The unit does not hold an image.
    #[error("unit {position} is not an image")]
    NotImage { position: usize },

    /// The unit does not hold a table.
    #[error("unit {position} is not a table")]
    NotTable { position: usize },

    /// BITPIX is not valid for the unit's kind.
    #[error("unit {position} has invalid BITPIX {bitpix}")]
    BadElementWidth { position: usize, bitpix: i64 },

    /// NAXIS is not valid for the unit's kind.
    #[error("unit {position} has invalid axis count {naxis}")]
    BadAxisCount { position: usize, naxis: i64 },

    /// PCOUNT/GCOUNT are not valid for the unit's kind.
    #[error("unit {position} has invalid group layout (PCOUNT={pcount}, GCOUNT={gcount})")]
    BadGroupCount {
        position: usize,
        pcount: i64,
        gcount: i64,
    },

    /// The unit kind is not one of primary, IMAGE, TABLE or BINTABLE.
    #[error("unsupported unit kind: {0}")]
    UnsupportedExtension(String),

    /// A table layout was requested for the primary unit.
    #[error("a table cannot be written as the primary unit")]
    TableAsPrimary,

    /// A link keyword holds something other than a string.
    #[error("link keyword '{0}' does not hold a string value")]
    LinkNotString(String),

    /// A required keyword was not found in the header.
    #[error("missing required keyword: {0}")]
    MissingKeyword(String),

    // ── I/O errors ──
    /// An I/O operation on a file failed.
    #[error("cannot {op} {}: {source}", path.display())]
    Io {
        path: PathBuf,
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The output file could not be created.
    #[error("cannot create {}: {source}", path.display())]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Nothing to write.
    #[error("no datasets to write")]
    NoDatasets,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Returns a `map_err` adapter that wraps an I/O error with its path and
    /// the failed operation.
    pub(crate) fn io(path: &Path, op: &'static str) -> impl FnOnce(io::Error) -> Error {
        let path = path.to_path_buf();
        move |source| Error::Io { path, op, source }
    }
}
