//! Read side of the file layer: source files and the registry that owns them.
//!
//! A [`FitsSource`] scans the unit layout of a file once when it is opened
//! and keeps every header record in memory. Payload bytes are only touched
//! by [`FitsSource::payload_reader`], which streams them without decoding.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Take};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::block::{checked_padded_byte_len, is_end_card, BLOCK_SIZE, CARD_SIZE};
use crate::card::FitsCard;
use crate::error::{Error, Result};
use crate::header::FitsHeader;

/// Index of a source inside a [`SourceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub(crate) usize);

#[derive(Debug)]
struct UnitInfo {
    header_start: u64,
    data_start: u64,
    data_len: u64,
    records: Vec<String>,
}

/// An open source file with its unit layout.
#[derive(Debug)]
pub struct FitsSource {
    path: PathBuf,
    file: File,
    units: Vec<UnitInfo>,
    current: usize,
}

fn not_found(path: &Path, what: impl Into<String>) -> Error {
    Error::NotFound {
        path: path.to_path_buf(),
        what: what.into(),
    }
}

fn open_error<'a>(path: &'a Path, op: &'static str) -> impl FnOnce(io::Error) -> Error + 'a {
    move |e| match e.kind() {
        io::ErrorKind::NotFound => not_found(path, "file"),
        _ => Error::io(path, op)(e),
    }
}

impl FitsSource {
    /// Open `path` for reading and scan its units.
    ///
    /// The first unit must be a primary header. Bytes after the last unit
    /// that do not form a header are ignored. A recognized header whose
    /// payload size overflows or runs past the end of the file is an error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::NoFilename);
        }
        let mut file = File::open(path).map_err(open_error(path, "open"))?;
        let len = file.metadata().map_err(Error::io(path, "stat"))?.len();

        let mut units = Vec::new();
        let mut offset = 0u64;
        {
            let mut reader = BufReader::new(&mut file);
            while offset < len {
                match read_unit(&mut reader, offset, len, units.is_empty()) {
                    Ok((unit, next)) => {
                        offset = next;
                        units.push(unit);
                    }
                    Err(ScanError::Malformed(message) | ScanError::Unrecognized(message))
                        if units.is_empty() =>
                    {
                        return Err(Error::BadFormat {
                            path: path.to_path_buf(),
                            position: 0,
                            message,
                        });
                    }
                    Err(ScanError::Malformed(message)) => {
                        return Err(Error::BadFormat {
                            path: path.to_path_buf(),
                            position: units.len(),
                            message,
                        });
                    }
                    Err(ScanError::Unrecognized(message)) => {
                        warn!(
                            path = %path.display(),
                            position = units.len(),
                            %message,
                            "ignoring bytes after the last valid unit"
                        );
                        break;
                    }
                }
            }
        }
        if units.is_empty() {
            return Err(Error::BadFormat {
                path: path.to_path_buf(),
                position: 0,
                message: String::from("file holds no units"),
            });
        }

        debug!(path = %path.display(), units = units.len(), "scanned source");
        Ok(FitsSource {
            path: path.to_path_buf(),
            file,
            units,
            current: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of units in the file.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn unit(&self, position: usize) -> Result<&UnitInfo> {
        self.units
            .get(position)
            .ok_or_else(|| not_found(&self.path, format!("unit {position}")))
    }

    /// Make `position` the current unit.
    pub fn move_to(&mut self, position: usize) -> Result<()> {
        self.unit(position)?;
        self.current = position;
        Ok(())
    }

    /// The current unit.
    pub fn position(&self) -> usize {
        self.current
    }

    /// Raw header records of the unit at `position`, without `END`.
    pub fn records(&self, position: usize) -> Result<&[String]> {
        Ok(&self.unit(position)?.records)
    }

    /// First card named `key` in the header of the unit at `position`.
    pub fn keyword(&self, position: usize, key: &str) -> Result<Option<FitsCard>> {
        Ok(self
            .records(position)?
            .iter()
            .filter_map(|record| FitsCard::parse(record).ok())
            .find(|card| card.matches_key(key)))
    }

    /// Position of the first unit whose `EXTNAME` is `name`.
    pub fn find_unit(&self, name: &str) -> Option<usize> {
        (0..self.units.len()).find(|&position| {
            self.keyword(position, "EXTNAME")
                .ok()
                .flatten()
                .and_then(|card| card.as_str())
                .is_some_and(|extname| extname == name)
        })
    }

    /// Byte offset of the header of the unit at `position`.
    pub fn header_start(&self, position: usize) -> Result<u64> {
        Ok(self.unit(position)?.header_start)
    }

    /// Unpadded payload length of the unit at `position`.
    pub fn data_len(&self, position: usize) -> Result<u64> {
        Ok(self.unit(position)?.data_len)
    }

    /// Position the file at the payload of `position` and return a reader
    /// limited to the payload bytes.
    pub fn payload_reader(&mut self, position: usize) -> Result<Take<&mut File>> {
        let (start, len) = {
            let unit = self.unit(position)?;
            (unit.data_start, unit.data_len)
        };
        self.file
            .seek(SeekFrom::Start(start))
            .map_err(Error::io(&self.path, "seek"))?;
        self.current = position;
        Ok((&mut self.file).take(len))
    }
}

/// Why a scan stopped: no header where one was expected, or a header that
/// cannot describe a payload inside the file.
enum ScanError {
    Unrecognized(String),
    Malformed(String),
}

/// Read the unit whose header starts at `offset`; returns the unit and the
/// offset of the next one.
fn read_unit<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    file_len: u64,
    primary: bool,
) -> core::result::Result<(UnitInfo, u64), ScanError> {
    reader
        .seek(SeekFrom::Start(offset))
        .map_err(|e| ScanError::Unrecognized(e.to_string()))?;

    let mut block = [0u8; BLOCK_SIZE];
    let mut records = Vec::new();
    let mut header_len = 0u64;
    'blocks: loop {
        reader.read_exact(&mut block).map_err(|_| {
            ScanError::Unrecognized(String::from("header ends before the END card"))
        })?;
        header_len += BLOCK_SIZE as u64;
        for card in block.chunks_exact(CARD_SIZE) {
            if is_end_card(card) {
                break 'blocks;
            }
            let text = core::str::from_utf8(card)
                .ok()
                .filter(|text| text.is_ascii())
                .ok_or_else(|| {
                    ScanError::Unrecognized(String::from("header record is not ASCII"))
                })?;
            records.push(text.trim_end().to_string());
        }
    }

    let leading = if primary { "SIMPLE  =" } else { "XTENSION=" };
    if !records.first().is_some_and(|first| first.starts_with(leading)) {
        return Err(ScanError::Unrecognized(format!(
            "unit does not start with {}",
            leading.trim_end_matches([' ', '='])
        )));
    }

    let header: FitsHeader = records
        .iter()
        .filter_map(|record| FitsCard::parse(record).ok())
        .collect();
    let data_len = payload_len(&header, primary).map_err(ScanError::Malformed)?;

    let data_start = offset + header_len;
    let data_end = data_start
        .checked_add(data_len)
        .ok_or_else(|| ScanError::Malformed(String::from("payload size overflow")))?;
    if data_end > file_len {
        return Err(ScanError::Malformed(format!(
            "payload of {data_len} bytes runs past the end of the file"
        )));
    }
    let next = checked_padded_byte_len(data_len)
        .and_then(|padded| data_start.checked_add(padded))
        .ok_or_else(|| ScanError::Malformed(String::from("payload size overflow")))?;

    let unit = UnitInfo {
        header_start: offset,
        data_start,
        data_len,
        records,
    };
    Ok((unit, next))
}

/// Payload size in bytes: `|BITPIX| / 8 * GCOUNT * (PCOUNT + NAXIS1 * ... * NAXISn)`.
///
/// For random groups `NAXIS1` is zero and left out of the product.
fn payload_len(header: &FitsHeader, primary: bool) -> core::result::Result<u64, String> {
    let bitpix = header
        .integer_value("BITPIX")
        .ok_or_else(|| String::from("missing BITPIX"))?;
    let naxis = header
        .integer_value("NAXIS")
        .ok_or_else(|| String::from("missing NAXIS"))?;
    if !(0..=999).contains(&naxis) {
        return Err(format!("invalid NAXIS {naxis}"));
    }
    if naxis == 0 {
        return Ok(0);
    }

    let mut dims = Vec::with_capacity(naxis as usize);
    for i in 1..=naxis {
        let dim = header
            .integer_value(&format!("NAXIS{i}"))
            .filter(|d| *d >= 0)
            .ok_or_else(|| format!("missing or negative NAXIS{i}"))?;
        dims.push(dim as u64);
    }

    let groups = primary && dims[0] == 0 && header.logical_value("GROUPS") == Some(true);
    let (pcount, gcount, axes) = if groups {
        (
            header.integer_value("PCOUNT").unwrap_or(0),
            header.integer_value("GCOUNT").unwrap_or(1),
            &dims[1..],
        )
    } else if primary {
        (0, 1, &dims[..])
    } else {
        (
            header.integer_value("PCOUNT").unwrap_or(0),
            header.integer_value("GCOUNT").unwrap_or(1),
            &dims[..],
        )
    };
    if pcount < 0 || gcount < 0 {
        return Err(format!("invalid PCOUNT {pcount} / GCOUNT {gcount}"));
    }

    let overflow = || String::from("payload size overflow");
    let product = axes
        .iter()
        .try_fold(1u64, |acc, &d| acc.checked_mul(d))
        .ok_or_else(overflow)?;
    (bitpix.unsigned_abs() / 8)
        .checked_mul(gcount as u64)
        .and_then(|n| n.checked_mul((pcount as u64).checked_add(product)?))
        .ok_or_else(overflow)
}

// ── Unit lookup ──

/// Anything that names a unit of a source: a position or an `EXTNAME`.
pub trait DescribesUnit {
    /// Resolve to a unit position in `source`.
    fn locate(&self, source: &FitsSource) -> Result<usize>;
}

impl DescribesUnit for usize {
    fn locate(&self, source: &FitsSource) -> Result<usize> {
        source.unit(*self).map(|_| *self)
    }
}

impl DescribesUnit for &str {
    fn locate(&self, source: &FitsSource) -> Result<usize> {
        source
            .find_unit(self)
            .ok_or_else(|| not_found(source.path(), format!("unit '{self}'")))
    }
}

impl DescribesUnit for String {
    fn locate(&self, source: &FitsSource) -> Result<usize> {
        self.as_str().locate(source)
    }
}

// ── Registry ──

/// Every source a composition has opened, keyed by canonical path.
///
/// The first request for a path opens it; later requests for the same file
/// (under any spelling) get the same [`SourceId`]. Handles are closed when
/// the registry is dropped.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: Vec<FitsSource>,
    index: HashMap<PathBuf, SourceId>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path`, or return the id of the already open source.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<SourceId> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::NoFilename);
        }
        let key = fs::canonicalize(path).map_err(open_error(path, "resolve"))?;
        if let Some(&id) = self.index.get(&key) {
            debug!(path = %key.display(), "reusing open source");
            return Ok(id);
        }

        let source = FitsSource::open(&key)?;
        let id = SourceId(self.sources.len());
        info!(path = %key.display(), units = source.len(), "opened source");
        self.sources.push(source);
        self.index.insert(key, id);
        Ok(id)
    }

    pub fn get(&self, id: SourceId) -> Option<&FitsSource> {
        self.sources.get(id.0)
    }

    pub fn get_mut(&mut self, id: SourceId) -> Option<&mut FitsSource> {
        self.sources.get_mut(id.0)
    }

    /// Like [`get`](Self::get), but an unknown id is an error.
    pub fn source(&self, id: SourceId) -> Result<&FitsSource> {
        self.get(id)
            .ok_or(Error::InvalidArgument("source id is not registered"))
    }

    pub fn source_mut(&mut self, id: SourceId) -> Result<&mut FitsSource> {
        self.get_mut(id)
            .ok_or(Error::InvalidArgument("source id is not registered"))
    }

    pub fn contains(&self, id: SourceId) -> bool {
        id.0 < self.sources.len()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Close every source opened after the registry held `len` of them.
    pub(crate) fn truncate(&mut self, len: usize) {
        if len >= self.sources.len() {
            return;
        }
        self.sources.truncate(len);
        self.index.retain(|_, id| id.0 < len);
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
