//! Compose multi-extension FITS products from units scattered across
//! several source files.
//!
//! Headers are copied card by card (filtered, merged and put into DICB
//! order), structural keywords are re-created from a description of each
//! payload, and payload bytes are streamed through unchanged.
//!
//! ```no_run
//! use fits_multiframe::{FitsFilter, IdMode, Multiframe};
//!
//! # fn main() -> fits_multiframe::Result<()> {
//! let mut product = Multiframe::new("head.fits", "ID", None)?;
//! let no_qc = FitsFilter::new("^HIERARCH ESO QC ", true)?;
//! product.append_one("P_", "frame.fits", "EXT1", Some(&no_qc), None, IdMode::Prefix)?;
//! product.append_placeholder("NOTES")?;
//! product.write("product.fits")?;
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod card;
pub mod data_unit;
pub mod dataset;
pub mod dicb;
pub mod error;
pub mod filter;
pub mod header;
pub mod multiframe;
pub mod source;
pub mod target;
pub mod value;

#[cfg(test)]
mod test_support;

pub use block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
pub use card::FitsCard;
pub use data_unit::{DataUnitKind, FitsDataUnit, PayloadOrigin, TableColumn, TableKind};
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use filter::{FilterOptions, FitsFilter};
pub use header::{FitsHeader, TieBreak};
pub use multiframe::{IdMode, Multiframe};
pub use source::{DescribesUnit, FitsSource, SourceId, SourceRegistry};
pub use target::{FitsTarget, TargetOptions};
pub use value::Value;
