//! A header paired with a payload description and an identity.

use std::sync::LazyLock;

use tracing::debug;

use crate::card::FitsCard;
use crate::data_unit::FitsDataUnit;
use crate::dicb;
use crate::error::Result;
use crate::filter::FitsFilter;
use crate::header::FitsHeader;
use crate::source::{SourceId, SourceRegistry};
use crate::target::FitsTarget;
use crate::value::Value;

/// Drops format plumbing: structural, table-structure, checksum and
/// extension-identity keywords plus the standard FITS boilerplate comments.
/// These are always re-created on write and never copied between files.
static PLUMBING: LazyLock<FitsFilter> = LazyLock::new(|| {
    FitsFilter::new(
        concat!(
            r"^(SIMPLE|XTENSION|BITPIX|NAXIS[0-9]*|EXTEND|PCOUNT|GCOUNT|GROUPS|TFIELDS",
            r"|TFORM[0-9]+|TBCOL[0-9]+|TUNIT[0-9]+|TDISP[0-9]+|TDIM[0-9]+|TSCAL[0-9]+",
            r"|TZERO[0-9]+|TNULL[0-9]+|THEAP|CHECKSUM|DATASUM|EXTNAME|EXTVER|EXTLEVEL|END)( |=)",
            r"|^COMMENT +FITS \(Flexible Image Transport System\) format",
            r"|^COMMENT +and Astrophysics', volume 376",
        ),
        true,
    )
    .expect("plumbing filter pattern is valid")
});

pub(crate) const DATE_COMMENT: &str = "file creation date (YYYY-MM-DDThh:mm:ss UT)";

/// One unit of the output: header, payload description and identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    header: FitsHeader,
    data: FitsDataUnit,
    name: String,
    version: u32,
    level: u32,
}

/// Remove format plumbing from a loaded header.
pub fn strip_plumbing(header: &FitsHeader) -> FitsHeader {
    header.filter(&PLUMBING)
}

fn identity_number(header: &FitsHeader, key: &str) -> u32 {
    header
        .integer_value(key)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

impl Dataset {
    /// Pair a header with a payload description; the identity starts unset.
    pub fn new(header: FitsHeader, data: FitsDataUnit) -> Self {
        Dataset {
            header,
            data,
            name: String::new(),
            version: 0,
            level: 0,
        }
    }

    /// Load unit `position` of a registered source.
    ///
    /// The unit header is stripped of plumbing and passed through
    /// `pre_filter`. For an extension unit the primary header of the same
    /// source is merged in as well: plumbing stripped, `secondary_filter`
    /// applied, and keys the unit already carries skipped. The result is in
    /// DICB order and the identity comes from `EXTNAME`/`EXTVER`/`EXTLEVEL`.
    pub fn inspect(
        registry: &SourceRegistry,
        id: SourceId,
        position: usize,
        pre_filter: Option<&FitsFilter>,
        secondary_filter: Option<&FitsFilter>,
    ) -> Result<Self> {
        let source = registry.source(id)?;
        let raw = FitsHeader::load(source, position)?;
        let data = FitsDataUnit::inspect(registry, id, position)?;

        let name = raw.string_value("EXTNAME").unwrap_or_default();
        let version = identity_number(&raw, "EXTVER");
        let level = identity_number(&raw, "EXTLEVEL");

        let mut header = strip_plumbing(&raw);
        if let Some(filter) = pre_filter {
            header.retain(filter);
        }

        if position > 0 {
            let mut inherited = strip_plumbing(&FitsHeader::load(source, 0)?);
            if let Some(filter) = secondary_filter {
                inherited.retain(filter);
            }
            let before = header.len();
            let extra: FitsHeader = inherited
                .into_iter()
                .filter(|card| card.is_commentary() || !header.contains(card.key()))
                .collect();
            header.join(&extra);
            debug!(position, own = before, inherited = extra.len(), "merged primary header");
        }
        dicb::sort(&mut header);

        Ok(Dataset {
            header,
            data,
            name,
            version,
            level,
        })
    }

    pub fn set_identity(&mut self, name: &str, version: u32, level: u32) {
        self.name = name.to_string();
        self.version = version;
        self.level = level;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn header(&self) -> &FitsHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut FitsHeader {
        &mut self.header
    }

    pub fn data(&self) -> &FitsDataUnit {
        &self.data
    }

    /// A structural copy whose payload description is re-inspected from
    /// the live source. `None` when the payload cannot be cloned.
    pub fn try_clone(&self, registry: &SourceRegistry) -> Option<Dataset> {
        let data = match &self.data {
            FitsDataUnit::Empty { .. } => self.data.clone(),
            other => FitsDataUnit::clone_as(other.kind(), other, registry)?,
        };
        Some(Dataset {
            header: self.header.clone(),
            data,
            name: self.name.clone(),
            version: self.version,
            level: self.level,
        })
    }

    /// Write this dataset as the next unit of `target`.
    ///
    /// Order: structural layout, identity keywords, the `DATE` placeholder
    /// (primary only), `CHECKSUM`/`DATASUM` placeholders (when asked), the
    /// header cards in their current order, then the payload.
    pub fn write(
        &self,
        registry: &mut SourceRegistry,
        target: &mut FitsTarget,
        is_primary: bool,
        with_signatures: bool,
    ) -> Result<()> {
        target.begin_unit()?;
        self.data.write_layout(target, is_primary)?;

        if !self.name.is_empty() {
            target.write_value(
                "EXTNAME",
                &Value::String(self.name.clone()),
                Some("FITS extension name"),
            )?;
        }
        if self.version > 0 {
            target.write_value(
                "EXTVER",
                &Value::Integer(i64::from(self.version)),
                Some("FITS extension version"),
            )?;
        }
        if self.level > 0 {
            target.write_value(
                "EXTLEVEL",
                &Value::Integer(i64::from(self.level)),
                Some("FITS extension level"),
            )?;
        }

        if is_primary {
            target.write_record(FitsCard::new("DATE", Some("''"), Some(DATE_COMMENT))?)?;
        }
        if with_signatures {
            target.write_record(FitsCard::new(
                "CHECKSUM",
                Some("'0000000000000000'"),
                Some("HDU checksum"),
            )?)?;
            let datasum = FitsCard::new("DATASUM", Some("'0'"), Some("data unit checksum"))?;
            target.write_record(datasum)?;
        }

        for card in &self.header {
            if is_primary && card.key() == "DATE" {
                continue;
            }
            target.write_record(card.clone())?;
        }
        target.end_header()?;
        self.data.copy_payload(registry, target)?;

        debug!(
            name = %self.name,
            primary = is_primary,
            cards = self.header.len(),
            bytes = self.data.data_len(),
            "wrote dataset"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FitsSource;
    use crate::test_support::{commentary, image, primary, rec, write_fits};
    use tempfile::TempDir;

    fn sample(dir: &TempDir) -> (SourceRegistry, SourceId) {
        let mut head = primary(&[]);
        head.push(commentary(
            "COMMENT",
            "  FITS (Flexible Image Transport System) format is defined in 'Astronomy",
        ));
        head.push(rec("OBJECT", "'M31'"));
        head.push(rec("EXPTIME", "300"));
        head.push(rec("ESO.OBS.NAME", "'run-1'"));
        head.push(commentary("HISTORY", "from the head"));

        let mut sci = image("SCI", 16, &[4, 4]);
        sci.push(rec("EXTVER", "2"));
        sci.push(rec("ESO.DET.DIT", "1.5"));
        sci.push(rec("EXPTIME", "12"));
        sci.push(rec("CHECKSUM", "'abc'"));

        let path = dir.path().join("raw.fits");
        write_fits(&path, &[(head, 0), (sci, 32)]);
        let mut registry = SourceRegistry::new();
        let id = registry.open(&path).unwrap();
        (registry, id)
    }

    fn keys(dataset: &Dataset) -> Vec<&str> {
        dataset.header().iter().map(FitsCard::key).collect()
    }

    #[test]
    fn primary_inspection_strips_plumbing() {
        let dir = TempDir::new().unwrap();
        let (registry, id) = sample(&dir);
        let ds = Dataset::inspect(&registry, id, 0, None, None).unwrap();
        assert_eq!(keys(&ds), ["OBJECT", "EXPTIME", "ESO.OBS.NAME", "HISTORY"]);
        assert_eq!(ds.name(), "");
        assert!(matches!(ds.data(), FitsDataUnit::Empty { .. }));
    }

    #[test]
    fn extension_inherits_primary_keys() {
        let dir = TempDir::new().unwrap();
        let (registry, id) = sample(&dir);
        let ds = Dataset::inspect(&registry, id, 1, None, None).unwrap();
        assert_eq!(ds.name(), "SCI");
        assert_eq!(ds.version(), 2);
        assert_eq!(ds.level(), 0);
        assert_eq!(
            keys(&ds),
            ["OBJECT", "EXPTIME", "ESO.OBS.NAME", "ESO.DET.DIT", "HISTORY"]
        );
        assert_eq!(ds.header().integer_value("EXPTIME"), Some(12));
    }

    #[test]
    fn filters_apply_per_pass() {
        let dir = TempDir::new().unwrap();
        let (registry, id) = sample(&dir);
        let pre = FitsFilter::new("^HIERARCH ", true).unwrap();
        let secondary = FitsFilter::new("^OBJECT ", false).unwrap();
        let ds = Dataset::inspect(&registry, id, 1, Some(&pre), Some(&secondary)).unwrap();
        assert_eq!(keys(&ds), ["OBJECT", "EXPTIME"]);
    }

    #[test]
    fn write_emits_identity_and_placeholders() {
        let dir = TempDir::new().unwrap();
        let (mut registry, id) = sample(&dir);
        let head = Dataset::inspect(&registry, id, 0, None, None).unwrap();
        let mut sci = Dataset::inspect(&registry, id, 1, None, None).unwrap();
        sci.set_identity("P_SCI", 3, 1);

        let out = dir.path().join("out.fits");
        let mut target = FitsTarget::create(&out).unwrap();
        head.write(&mut registry, &mut target, true, false).unwrap();
        sci.write(&mut registry, &mut target, false, true).unwrap();
        target.close().unwrap();

        let written = FitsSource::open(&out).unwrap();
        let primary = FitsHeader::load(&written, 0).unwrap();
        assert!(primary.contains("DATE"));
        assert!(!primary.contains("EXTNAME"));
        assert!(!primary.contains("CHECKSUM"));

        let ext = FitsHeader::load(&written, 1).unwrap();
        assert_eq!(ext.string_value("EXTNAME").as_deref(), Some("P_SCI"));
        assert_eq!(ext.integer_value("EXTVER"), Some(3));
        assert_eq!(ext.integer_value("EXTLEVEL"), Some(1));
        assert!(ext.contains("CHECKSUM"));
        assert!(ext.contains("DATASUM"));
        assert!(!ext.contains("DATE"));
        assert_eq!(ext.position_of("EXTNAME"), Some(7));
        assert_eq!(written.data_len(1).unwrap(), 32);
    }

    #[test]
    fn try_clone_reinspects_payload() {
        let dir = TempDir::new().unwrap();
        let (registry, id) = sample(&dir);
        let ds = Dataset::inspect(&registry, id, 1, None, None).unwrap();
        assert_eq!(ds.try_clone(&registry), Some(ds.clone()));
        assert!(ds.try_clone(&SourceRegistry::new()).is_none());

        let empty = Dataset::new(FitsHeader::new(), FitsDataUnit::empty());
        assert!(empty.try_clone(&SourceRegistry::new()).is_some());
    }
}
