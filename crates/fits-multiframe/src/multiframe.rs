//! Composition of one output file from units of many source files.
//!
//! A [`Multiframe`] starts from the primary header of a head file and
//! accumulates datasets from any number of sources. Each source is opened
//! once and shared by every dataset taken from it. [`Multiframe::write`]
//! serializes everything, in order, into a new file.

use std::path::Path;
use std::sync::LazyLock;

use chrono::Utc;
use tracing::info;

use crate::card::FitsCard;
use crate::data_unit::FitsDataUnit;
use crate::dataset::{Dataset, DATE_COMMENT};
use crate::dicb;
use crate::error::{Error, Result};
use crate::filter::FitsFilter;
use crate::header::FitsHeader;
use crate::source::{DescribesUnit, SourceId, SourceRegistry};
use crate::target::{FitsTarget, TargetOptions};
use crate::value::{quote, Value};

/// Payload statistics that make no sense on a unit without data.
static STATISTICS: LazyLock<FitsFilter> = LazyLock::new(|| {
    FitsFilter::new(
        r"^(BSCALE|BZERO|BUNIT|BLANK|DATAMIN|DATAMAX|DATAMEAN|DATAMED|DATARMS)( |=)",
        true,
    )
    .expect("statistics filter pattern is valid")
});

/// How an appended dataset is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdMode {
    /// Use the identifier as given.
    Set,
    /// Identifier followed by the unit's own name.
    Prefix,
    /// Head name, identifier, unit name; the head name alone for a nameless unit.
    Join,
}

impl IdMode {
    fn label(self) -> &'static str {
        match self {
            IdMode::Set => "SET",
            IdMode::Prefix => "PREFIX",
            IdMode::Join => "JOIN",
        }
    }
}

/// Build the output name of a unit called `unit`.
pub fn compose_name(mode: IdMode, head: &str, id: &str, unit: &str) -> Result<String> {
    match mode {
        IdMode::Set | IdMode::Prefix if id.is_empty() => Err(Error::EmptyId),
        IdMode::Set => Ok(id.to_string()),
        IdMode::Prefix => Ok(format!("{id}{unit}")),
        IdMode::Join if head.is_empty() => Err(Error::HeadUnnamed),
        IdMode::Join if unit.is_empty() => Ok(head.to_string()),
        IdMode::Join => Ok(format!("{head}{id}{unit}")),
    }
}

/// An ordered list of datasets plus the sources they come from.
///
/// The list is never empty: entry 0 is built from the head file and is
/// always written as the primary unit.
#[derive(Debug)]
pub struct Multiframe {
    datasets: Vec<Dataset>,
    sources: SourceRegistry,
}

impl Multiframe {
    /// Start a composition from the primary header of `head`.
    ///
    /// Payload statistics are dropped, `filter` is applied, and the result
    /// becomes an empty-payload dataset named `id`.
    pub fn new<P: AsRef<Path>>(head: P, id: &str, filter: Option<&FitsFilter>) -> Result<Self> {
        let head = head.as_ref();
        let mut sources = SourceRegistry::new();
        let source = sources.open(head)?;
        let inspected = Dataset::inspect(&sources, source, 0, None, None)?;

        let mut header = inspected.header().filter(&STATISTICS);
        if let Some(filter) = filter {
            header.retain(filter);
        }
        let mut dataset = Dataset::new(header, FitsDataUnit::empty());
        dataset.set_identity(id, 0, 0);

        info!(head = %head.display(), id, cards = dataset.header().len(), "started multiframe");
        Ok(Multiframe {
            datasets: vec![dataset],
            sources,
        })
    }

    fn head_name(&self) -> &str {
        self.datasets.first().map_or("", Dataset::name)
    }

    /// Fail early, before touching any file, when `mode` cannot name anything.
    fn check_naming(&self, mode: IdMode, id: &str) -> Result<()> {
        compose_name(mode, self.head_name(), id, "").map(|_| ())
    }

    fn locate<U: DescribesUnit>(&mut self, id: SourceId, unit: &U) -> Result<usize> {
        let source = self.sources.source_mut(id)?;
        let position = unit.locate(source)?;
        source.move_to(position)?;
        Ok(position)
    }

    /// Run `append`, closing any source it opened if it fails.
    fn atomically<F>(&mut self, append: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let opened = self.sources.len();
        let result = append(self);
        if result.is_err() {
            self.sources.truncate(opened);
        }
        result
    }

    /// Append one unit of `source`, named according to `mode`.
    ///
    /// On failure the composition, including its set of open sources, is
    /// left as it was.
    pub fn append_one<P: AsRef<Path>, U: DescribesUnit>(
        &mut self,
        id: &str,
        source: P,
        unit: U,
        pre_filter: Option<&FitsFilter>,
        secondary_filter: Option<&FitsFilter>,
        mode: IdMode,
    ) -> Result<()> {
        self.atomically(|this| {
            this.push_one(id, source.as_ref(), &unit, pre_filter, secondary_filter, mode)
        })
    }

    fn push_one<U: DescribesUnit>(
        &mut self,
        id: &str,
        source: &Path,
        unit: &U,
        pre_filter: Option<&FitsFilter>,
        secondary_filter: Option<&FitsFilter>,
        mode: IdMode,
    ) -> Result<()> {
        self.check_naming(mode, id)?;
        let source_id = self.sources.open(source)?;
        let position = self.locate(source_id, unit)?;

        let mut dataset =
            Dataset::inspect(&self.sources, source_id, position, pre_filter, secondary_filter)?;
        let name = compose_name(mode, self.head_name(), id, dataset.name())?;
        let (version, level) = (dataset.version(), dataset.level());
        dataset.set_identity(&name, version, level);

        info!(
            name = %name,
            source = %source.display(),
            position,
            "appended dataset"
        );
        self.datasets.push(dataset);
        Ok(())
    }

    /// Append two or more units of one source as a group.
    ///
    /// Every unit is named by the same rule, and each card listed in
    /// `link_keys` has its string value (the name of another unit) renamed
    /// by that rule too, so references inside the group stay valid. Filter
    /// slices are either empty or hold one entry per unit. Nothing is
    /// appended, and no source stays open, unless every unit succeeds.
    #[allow(clippy::too_many_arguments)]
    pub fn append_group<P: AsRef<Path>, U: DescribesUnit>(
        &mut self,
        id: &str,
        source: P,
        units: &[U],
        pre_filters: &[Option<&FitsFilter>],
        secondary_filters: &[Option<&FitsFilter>],
        link_keys: &[&str],
        mode: IdMode,
    ) -> Result<()> {
        if units.len() < 2 {
            return Err(Error::InvalidArgument("a unit group needs at least two units"));
        }
        if mode == IdMode::Set {
            return Err(Error::IllegalMode {
                mode: mode.label(),
                operation: "a unit group",
            });
        }
        if !pre_filters.is_empty() && pre_filters.len() != units.len() {
            return Err(Error::InvalidArgument("pre-filters must match the units one to one"));
        }
        if !secondary_filters.is_empty() && secondary_filters.len() != units.len() {
            return Err(Error::InvalidArgument(
                "secondary filters must match the units one to one",
            ));
        }
        self.check_naming(mode, id)?;
        self.atomically(|this| {
            this.push_group(
                id,
                source.as_ref(),
                units,
                pre_filters,
                secondary_filters,
                link_keys,
                mode,
            )
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn push_group<U: DescribesUnit>(
        &mut self,
        id: &str,
        source: &Path,
        units: &[U],
        pre_filters: &[Option<&FitsFilter>],
        secondary_filters: &[Option<&FitsFilter>],
        link_keys: &[&str],
        mode: IdMode,
    ) -> Result<()> {
        let head = self.head_name().to_string();
        let source_id = self.sources.open(source)?;
        let mut group = Vec::with_capacity(units.len());
        for (i, unit) in units.iter().enumerate() {
            let position = self.locate(source_id, unit)?;
            let pre = pre_filters.get(i).copied().flatten();
            let secondary = secondary_filters.get(i).copied().flatten();
            let mut dataset = Dataset::inspect(&self.sources, source_id, position, pre, secondary)?;

            for key in link_keys {
                for card in dataset.header_mut().find_all_mut(key) {
                    rename_link(card, key, mode, &head, id)?;
                }
            }
            let name = compose_name(mode, &head, id, dataset.name())?;
            let (version, level) = (dataset.version(), dataset.level());
            dataset.set_identity(&name, version, level);
            group.push(dataset);
        }

        info!(
            source = %source.display(),
            units = group.len(),
            mode = mode.label(),
            "appended unit group"
        );
        self.datasets.extend(group);
        Ok(())
    }

    /// Append a named unit with no header content and no payload.
    pub fn append_placeholder(&mut self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::EmptyId);
        }
        let mut dataset = Dataset::new(FitsHeader::new(), FitsDataUnit::empty());
        dataset.set_identity(id, 0, 0);
        self.datasets.push(dataset);
        Ok(())
    }

    /// Write every dataset, in order, into a new file at `path`.
    ///
    /// An existing file is replaced. Each header is put into DICB order
    /// first; the primary unit gets its creation date once everything else
    /// has been written.
    pub fn write<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        if self.datasets.is_empty() {
            return Err(Error::NoDatasets);
        }
        let path = path.as_ref();
        let mut target = FitsTarget::create_with(path, TargetOptions { overwrite: true })?;

        for (i, dataset) in self.datasets.iter_mut().enumerate() {
            dicb::sort(dataset.header_mut());
            dataset.write(&mut self.sources, &mut target, i == 0, false)?;
        }

        let stamp = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        target.update_record(
            0,
            FitsCard::new("DATE", Some(&quote(&stamp)), Some(DATE_COMMENT))?,
        )?;
        target.close()?;

        info!(path = %path.display(), datasets = self.datasets.len(), "wrote multiframe");
        Ok(())
    }

    /// Number of datasets.
    pub fn size(&self) -> usize {
        self.datasets.len()
    }

    /// Number of distinct source files opened so far.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn dataset(&self, index: usize) -> Option<&Dataset> {
        self.datasets.get(index)
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }
}

fn rename_link(card: &mut FitsCard, key: &str, mode: IdMode, head: &str, id: &str) -> Result<()> {
    let linked = match card.parsed_value() {
        Some(Value::String(name)) => name,
        _ => return Err(Error::LinkNotString(key.to_string())),
    };
    let renamed = compose_name(mode, head, id, &linked)?;
    card.set_value(Some(&quote(&renamed)))
}
