//! Structural descriptions of unit payloads.
//!
//! A [`FitsDataUnit`] knows enough about a payload to re-create the
//! structural keywords that describe it and to copy its bytes, without ever
//! decoding them.

use crate::card::FitsCard;
use crate::error::{Error, Result};
use crate::header::FitsHeader;
use crate::source::{SourceId, SourceRegistry};
use crate::target::FitsTarget;
use crate::value::Value;

/// Valid BITPIX values.
pub const VALID_BITPIX: [i64; 6] = [8, 16, 32, 64, -32, -64];

/// Where a payload lives: a unit of a registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadOrigin {
    pub source: SourceId,
    pub position: usize,
    /// Unpadded payload length in bytes.
    pub data_len: u64,
}

/// The variant of a [`FitsDataUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataUnitKind {
    Empty,
    Image,
    Table,
}

/// ASCII (`TABLE`) or binary (`BINTABLE`) table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Ascii,
    Binary,
}

impl TableKind {
    /// The `XTENSION` value naming this table kind.
    pub fn xtension(self) -> &'static str {
        match self {
            TableKind::Ascii => "TABLE",
            TableKind::Binary => "BINTABLE",
        }
    }

    fn label(self) -> &'static str {
        match self {
            TableKind::Ascii => "ASCII",
            TableKind::Binary => "binary",
        }
    }
}

/// Structural cards of one table column, each present only if the source had it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableColumn {
    pub tform: Option<FitsCard>,
    pub tbcol: Option<FitsCard>,
    pub tunit: Option<FitsCard>,
    pub tdisp: Option<FitsCard>,
    pub tdim: Option<FitsCard>,
    pub tscal: Option<FitsCard>,
    pub tzero: Option<FitsCard>,
    pub tnull: Option<FitsCard>,
}

impl TableColumn {
    fn read(header: &FitsHeader, n: i64) -> Self {
        let card = |stem: &str| header.find(&format!("{stem}{n}")).cloned();
        TableColumn {
            tform: card("TFORM"),
            tbcol: card("TBCOL"),
            tunit: card("TUNIT"),
            tdisp: card("TDISP"),
            tdim: card("TDIM"),
            tscal: card("TSCAL"),
            tzero: card("TZERO"),
            tnull: card("TNULL"),
        }
    }

    /// The present cards in write order.
    pub fn cards(&self) -> impl Iterator<Item = &FitsCard> {
        [
            &self.tform,
            &self.tbcol,
            &self.tunit,
            &self.tdisp,
            &self.tdim,
            &self.tscal,
            &self.tzero,
            &self.tnull,
        ]
        .into_iter()
        .flatten()
    }
}

/// Structural description of a unit payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FitsDataUnit {
    /// No payload; only the element width is kept.
    Empty { bitpix: i64 },
    /// An N-dimensional image.
    Image {
        bitpix: i64,
        naxes: Vec<u64>,
        origin: PayloadOrigin,
    },
    /// An ASCII or binary table.
    Table {
        kind: TableKind,
        /// Row width in bytes.
        naxis1: u64,
        /// Number of rows.
        naxis2: u64,
        /// Size of the heap area.
        pcount: u64,
        tfields: FitsCard,
        columns: Vec<TableColumn>,
        theap: Option<FitsCard>,
        origin: PayloadOrigin,
    },
}

/// What a header declares, before any invariant is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Declared {
    Empty,
    Image,
    Table(TableKind),
}

fn declared(header: &FitsHeader) -> Result<Declared> {
    let naxis = header.require_integer("NAXIS")?;
    let by_axes = if naxis == 0 {
        Declared::Empty
    } else {
        Declared::Image
    };

    if header.contains("SIMPLE") {
        if header.logical_value("GROUPS") == Some(true) {
            return Err(Error::UnsupportedExtension(String::from("random groups")));
        }
        return Ok(by_axes);
    }

    let xtension = header
        .string_value("XTENSION")
        .ok_or_else(|| Error::MissingKeyword(String::from("XTENSION")))?;
    match xtension.as_str() {
        "IMAGE" => Ok(by_axes),
        "TABLE" => Ok(Declared::Table(TableKind::Ascii)),
        "BINTABLE" => Ok(Declared::Table(TableKind::Binary)),
        other => Err(Error::UnsupportedExtension(other.to_string())),
    }
}

fn non_negative(value: i64, position: usize) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::BadAxisCount {
        position,
        naxis: value,
    })
}

impl FitsDataUnit {
    /// A payload-less unit with the default element width.
    pub fn empty() -> Self {
        FitsDataUnit::Empty { bitpix: 8 }
    }

    /// Inspect unit `position` of a registered source; the variant follows
    /// the unit's declared kind.
    pub fn inspect(registry: &SourceRegistry, id: SourceId, position: usize) -> Result<Self> {
        let (header, origin) = load(registry, id, position)?;
        Self::from_header(&header, origin)
    }

    /// Inspect unit `position`, insisting on the variant `kind`.
    pub fn inspect_as(
        kind: DataUnitKind,
        registry: &SourceRegistry,
        id: SourceId,
        position: usize,
    ) -> Result<Self> {
        let (header, origin) = load(registry, id, position)?;
        Self::from_header_as(kind, &header, origin)
    }

    /// Build the description declared by an unfiltered unit header.
    pub fn from_header(header: &FitsHeader, origin: PayloadOrigin) -> Result<Self> {
        let kind = match declared(header)? {
            Declared::Empty => DataUnitKind::Empty,
            Declared::Image => DataUnitKind::Image,
            Declared::Table(_) => DataUnitKind::Table,
        };
        Self::from_header_as(kind, header, origin)
    }

    /// Build a description of variant `kind` from an unfiltered unit header.
    ///
    /// All invariants are checked here, before any payload byte is read.
    pub fn from_header_as(
        kind: DataUnitKind,
        header: &FitsHeader,
        origin: PayloadOrigin,
    ) -> Result<Self> {
        let position = origin.position;
        match (kind, declared(header)?) {
            (DataUnitKind::Empty, Declared::Empty) => {
                let bitpix = header.require_integer("BITPIX")?;
                if !VALID_BITPIX.contains(&bitpix) {
                    return Err(Error::BadElementWidth { position, bitpix });
                }
                Ok(FitsDataUnit::Empty { bitpix })
            }
            (DataUnitKind::Empty, _) => Err(Error::BadAxisCount {
                position,
                naxis: header.require_integer("NAXIS")?,
            }),
            (DataUnitKind::Image, Declared::Empty | Declared::Image) => {
                image_from_header(header, origin)
            }
            (DataUnitKind::Image, Declared::Table(_)) => Err(Error::NotImage { position }),
            (DataUnitKind::Table, Declared::Table(table)) => {
                table_from_header(table, header, origin)
            }
            (DataUnitKind::Table, _) => Err(Error::NotTable { position }),
        }
    }

    /// Re-inspect the payload `other` describes as a new description of
    /// variant `kind`.
    ///
    /// Returns `None` when `other` has no payload origin, its source is not
    /// open in `registry`, it is not of variant `kind`, or the source unit no
    /// longer satisfies the variant's invariants.
    pub fn clone_as(
        kind: DataUnitKind,
        other: &FitsDataUnit,
        registry: &SourceRegistry,
    ) -> Option<Self> {
        let origin = *other.origin()?;
        if other.kind() != kind {
            return None;
        }
        let source = registry.get(origin.source)?;
        let header = FitsHeader::load(source, origin.position).ok()?;
        Self::from_header_as(kind, &header, origin).ok()
    }

    pub fn kind(&self) -> DataUnitKind {
        match self {
            FitsDataUnit::Empty { .. } => DataUnitKind::Empty,
            FitsDataUnit::Image { .. } => DataUnitKind::Image,
            FitsDataUnit::Table { .. } => DataUnitKind::Table,
        }
    }

    pub fn origin(&self) -> Option<&PayloadOrigin> {
        match self {
            FitsDataUnit::Empty { .. } => None,
            FitsDataUnit::Image { origin, .. } | FitsDataUnit::Table { origin, .. } => Some(origin),
        }
    }

    pub fn bitpix(&self) -> i64 {
        match self {
            FitsDataUnit::Empty { bitpix } | FitsDataUnit::Image { bitpix, .. } => *bitpix,
            FitsDataUnit::Table { .. } => 8,
        }
    }

    /// Axis lengths; a table has two (row width, row count).
    pub fn naxes(&self) -> Vec<u64> {
        match self {
            FitsDataUnit::Empty { .. } => Vec::new(),
            FitsDataUnit::Image { naxes, .. } => naxes.clone(),
            FitsDataUnit::Table { naxis1, naxis2, .. } => vec![*naxis1, *naxis2],
        }
    }

    /// Unpadded payload length in bytes.
    pub fn data_len(&self) -> u64 {
        self.origin().map_or(0, |origin| origin.data_len)
    }

    /// Emit the structural keywords for this payload into the open header
    /// of `target`.
    pub fn write_layout(&self, target: &mut FitsTarget, is_primary: bool) -> Result<()> {
        match self {
            FitsDataUnit::Empty { bitpix } => {
                write_structure(target, is_primary, "IMAGE", *bitpix, &[], 0)
            }
            FitsDataUnit::Image { bitpix, naxes, .. } => {
                write_structure(target, is_primary, "IMAGE", *bitpix, naxes, 0)
            }
            FitsDataUnit::Table {
                kind,
                naxis1,
                naxis2,
                pcount,
                tfields,
                columns,
                theap,
                ..
            } => {
                if is_primary {
                    return Err(Error::TableAsPrimary);
                }
                write_structure(target, false, kind.xtension(), 8, &[*naxis1, *naxis2], *pcount)?;
                target.write_record(tfields.clone())?;
                for column in columns {
                    for card in column.cards() {
                        target.write_record(card.clone())?;
                    }
                }
                if let Some(theap) = theap {
                    target.write_record(theap.clone())?;
                }

                target.set_comment("NAXIS", &format!("2-dimensional {} table", kind.label()))?;
                target.set_comment("NAXIS1", "width of table in bytes")?;
                target.set_comment("NAXIS2", "number of rows in table")?;
                target.set_comment("PCOUNT", "size of special data area")?;
                target.set_comment("GCOUNT", "one data group (required keyword)")
            }
        }
    }

    /// Stream the payload bytes into the current unit of `target`.
    pub fn copy_payload(
        &self,
        registry: &mut SourceRegistry,
        target: &mut FitsTarget,
    ) -> Result<()> {
        let Some(origin) = self.origin() else {
            return Ok(());
        };
        let source = registry.source_mut(origin.source)?;
        target.copy_payload(source, origin.position)?;
        Ok(())
    }
}

fn load(
    registry: &SourceRegistry,
    id: SourceId,
    position: usize,
) -> Result<(FitsHeader, PayloadOrigin)> {
    let source = registry.source(id)?;
    let header = FitsHeader::load(source, position)?;
    let origin = PayloadOrigin {
        source: id,
        position,
        data_len: source.data_len(position)?,
    };
    Ok((header, origin))
}

fn image_from_header(header: &FitsHeader, origin: PayloadOrigin) -> Result<FitsDataUnit> {
    let position = origin.position;
    let bitpix = header.require_integer("BITPIX")?;
    if !VALID_BITPIX.contains(&bitpix) {
        return Err(Error::BadElementWidth { position, bitpix });
    }
    let pcount = header.integer_value("PCOUNT").unwrap_or(0);
    let gcount = header.integer_value("GCOUNT").unwrap_or(1);
    if pcount != 0 || gcount != 1 {
        return Err(Error::BadGroupCount {
            position,
            pcount,
            gcount,
        });
    }
    let naxis = header.require_integer("NAXIS")?;
    if !(0..=999).contains(&naxis) {
        return Err(Error::BadAxisCount { position, naxis });
    }
    let naxes = (1..=naxis)
        .map(|i| non_negative(header.require_integer(&format!("NAXIS{i}"))?, position))
        .collect::<Result<Vec<_>>>()?;
    Ok(FitsDataUnit::Image {
        bitpix,
        naxes,
        origin,
    })
}

fn table_from_header(
    kind: TableKind,
    header: &FitsHeader,
    origin: PayloadOrigin,
) -> Result<FitsDataUnit> {
    let position = origin.position;
    let bitpix = header.require_integer("BITPIX")?;
    if bitpix != 8 {
        return Err(Error::BadElementWidth { position, bitpix });
    }
    let naxis = header.require_integer("NAXIS")?;
    if naxis != 2 {
        return Err(Error::BadAxisCount { position, naxis });
    }
    let pcount = header.integer_value("PCOUNT").unwrap_or(0);
    let gcount = header.integer_value("GCOUNT").unwrap_or(1);
    if pcount < 0 || gcount != 1 {
        return Err(Error::BadGroupCount {
            position,
            pcount,
            gcount,
        });
    }
    let naxis1 = non_negative(header.require_integer("NAXIS1")?, position)?;
    let naxis2 = non_negative(header.require_integer("NAXIS2")?, position)?;

    let tfields = header.require("TFIELDS")?.clone();
    let count = tfields
        .as_int()
        .filter(|n| (0..=999).contains(n))
        .ok_or_else(|| Error::MissingKeyword(String::from("TFIELDS (0..=999)")))?;
    let columns = (1..=count).map(|n| TableColumn::read(header, n)).collect();

    Ok(FitsDataUnit::Table {
        kind,
        naxis1,
        naxis2,
        pcount: pcount as u64,
        tfields,
        columns,
        theap: header.find("THEAP").cloned(),
        origin,
    })
}

/// Mandatory keywords shared by every unit kind, with the generic comments.
fn write_structure(
    target: &mut FitsTarget,
    is_primary: bool,
    xtension: &str,
    bitpix: i64,
    naxes: &[u64],
    pcount: u64,
) -> Result<()> {
    if is_primary {
        target.write_value(
            "SIMPLE",
            &Value::Logical(true),
            Some("file does conform to FITS standard"),
        )?;
    } else {
        target.write_value(
            "XTENSION",
            &Value::String(xtension.to_string()),
            Some(&format!("{xtension} extension")),
        )?;
    }
    target.write_value(
        "BITPIX",
        &Value::Integer(bitpix),
        Some("number of bits per data pixel"),
    )?;
    target.write_value(
        "NAXIS",
        &Value::Integer(naxes.len() as i64),
        Some("number of data axes"),
    )?;
    for (i, n) in naxes.iter().enumerate() {
        target.write_value(
            &format!("NAXIS{}", i + 1),
            &Value::Integer(*n as i64),
            Some(&format!("length of data axis {}", i + 1)),
        )?;
    }
    if is_primary {
        target.write_value(
            "EXTEND",
            &Value::Logical(true),
            Some("FITS dataset may contain extensions"),
        )
    } else {
        target.write_value(
            "PCOUNT",
            &Value::Integer(pcount as i64),
            Some("number of random group parameters"),
        )?;
        target.write_value(
            "GCOUNT",
            &Value::Integer(1),
            Some("number of random groups"),
        )
    }
}
