//! Write side of the file layer.
//!
//! A [`FitsTarget`] writes units strictly in order. Header cards are
//! collected until [`FitsTarget::end_header`], which lays them out as whole
//! header blocks; the payload follows and is zero padded to the block
//! boundary when the next unit begins or the target is closed. Cards of
//! finished units can still be rewritten in place with
//! [`FitsTarget::update_record`].

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::mem;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::block::{header_blocks, padding_len, CARD_SIZE, DATA_PAD_BYTE};
use crate::card::FitsCard;
use crate::error::{Error, Result};
use crate::source::FitsSource;
use crate::value::Value;

/// Options for [`FitsTarget::create_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetOptions {
    /// Replace an existing file instead of failing.
    pub overwrite: bool,
}

#[derive(Debug)]
struct WrittenUnit {
    header_start: u64,
    cards: Vec<FitsCard>,
}

#[derive(Debug)]
enum State {
    Idle,
    Header(Vec<FitsCard>),
    Data { written: u64 },
}

/// An output file being written unit by unit.
#[derive(Debug)]
pub struct FitsTarget {
    path: PathBuf,
    writer: BufWriter<File>,
    units: Vec<WrittenUnit>,
    state: State,
    offset: u64,
}

impl FitsTarget {
    /// Create `path`, failing if it already exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with(path, TargetOptions::default())
    }

    pub fn create_with<P: AsRef<Path>>(path: P, options: TargetOptions) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::NoFilename);
        }

        let mut open = OpenOptions::new();
        open.write(true);
        if options.overwrite {
            open.create(true).truncate(true);
        } else {
            open.create_new(true);
        }
        let file = open.open(path).map_err(|source| Error::CreateFailed {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), overwrite = options.overwrite, "created target");
        Ok(FitsTarget {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            units: Vec::new(),
            state: State::Idle,
            offset: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of units whose header has been written.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Finish the current unit (if any) and start collecting a new header.
    pub fn begin_unit(&mut self) -> Result<()> {
        self.finish_unit()?;
        self.state = State::Header(Vec::new());
        Ok(())
    }

    fn pending(&mut self) -> Result<&mut Vec<FitsCard>> {
        match &mut self.state {
            State::Header(cards) => Ok(cards),
            _ => Err(Error::InvalidArgument("no unit header is open")),
        }
    }

    /// Append a card to the open header.
    pub fn write_record(&mut self, card: FitsCard) -> Result<()> {
        self.pending()?.push(card);
        Ok(())
    }

    /// Format and append a typed card to the open header.
    pub fn write_value(&mut self, key: &str, value: &Value, comment: Option<&str>) -> Result<()> {
        let card = FitsCard::from_value(key, value, comment)?;
        self.write_record(card)
    }

    /// Replace the comment of the first open-header card named `key`.
    pub fn set_comment(&mut self, key: &str, comment: &str) -> Result<()> {
        self.pending()?
            .iter_mut()
            .find(|card| card.matches_key(key))
            .ok_or_else(|| Error::MissingKeyword(key.to_string()))?
            .set_comment(Some(comment))
    }

    /// Write the open header as header blocks, followed by `END`.
    pub fn end_header(&mut self) -> Result<()> {
        let cards = match mem::replace(&mut self.state, State::Idle) {
            State::Header(cards) => cards,
            other => {
                self.state = other;
                return Err(Error::InvalidArgument("no unit header is open"));
            }
        };

        let bytes = header_blocks(cards.iter().map(FitsCard::raw));
        self.writer
            .write_all(&bytes)
            .map_err(Error::io(&self.path, "write header to"))?;
        debug!(
            unit = self.units.len(),
            cards = cards.len(),
            bytes = bytes.len(),
            "wrote header"
        );

        self.units.push(WrittenUnit {
            header_start: self.offset,
            cards,
        });
        self.offset += bytes.len() as u64;
        self.state = State::Data { written: 0 };
        Ok(())
    }

    /// Stream the payload of unit `position` of `source` into the current unit.
    pub fn copy_payload(&mut self, source: &mut FitsSource, position: usize) -> Result<u64> {
        if !matches!(self.state, State::Data { .. }) {
            return Err(Error::InvalidArgument("payload written before end of header"));
        }

        let expected = source.data_len(position)?;
        let copied = {
            let mut reader = source.payload_reader(position)?;
            io::copy(&mut reader, &mut self.writer)
                .map_err(Error::io(&self.path, "copy payload into"))?
        };
        if copied != expected {
            return Err(Error::BadFormat {
                path: source.path().to_path_buf(),
                position,
                message: format!("payload truncated: {copied} of {expected} bytes"),
            });
        }

        if let State::Data { written } = &mut self.state {
            *written += copied;
        }
        self.offset += copied;
        Ok(copied)
    }

    fn finish_unit(&mut self) -> Result<()> {
        if matches!(self.state, State::Header(_)) {
            self.end_header()?;
        }
        if let State::Data { written } = mem::replace(&mut self.state, State::Idle) {
            let pad = padding_len(written);
            self.writer
                .write_all(&vec![DATA_PAD_BYTE; pad as usize])
                .map_err(Error::io(&self.path, "pad"))?;
            self.offset += pad;
        }
        Ok(())
    }

    /// Rewrite the first card named like `card` in a finished unit header.
    pub fn update_record(&mut self, unit: usize, card: FitsCard) -> Result<()> {
        let written = self
            .units
            .get_mut(unit)
            .ok_or(Error::InvalidArgument("unit has not been written"))?;
        let index = written
            .cards
            .iter()
            .position(|c| c.matches_key(card.key()))
            .ok_or_else(|| Error::MissingKeyword(card.key().to_string()))?;
        let at = written.header_start + (index * CARD_SIZE) as u64;

        self.writer
            .seek(SeekFrom::Start(at))
            .and_then(|_| self.writer.write_all(card.raw().as_bytes()))
            .and_then(|_| self.writer.seek(SeekFrom::Start(self.offset)))
            .map_err(Error::io(&self.path, "update record in"))?;

        debug!(unit, key = card.key(), "updated record in place");
        written.cards[index] = card;
        Ok(())
    }

    /// Finish the last unit and flush everything to disk.
    pub fn close(mut self) -> Result<()> {
        self.finish_unit()?;
        self.writer
            .flush()
            .map_err(Error::io(&self.path, "close"))?;
        info!(
            path = %self.path.display(),
            units = self.units.len(),
            bytes = self.offset,
            "closed target"
        );
        Ok(())
    }
}
