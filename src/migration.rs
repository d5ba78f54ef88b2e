//! Schema Migration
//!
//! Containers carry a `version` string attribute on their root. A [`Migrator`]
//! holds in-place migration steps sorted by the version each step upgrades
//! a container to, and applies every step newer than the stamped version in
//! ascending order.

use crate::codec::columnar::{self, Column};
use crate::error::{Result, StoreError};
use crate::store::{AttrValue, DType, Dataset, Node};
use crate::types::ArrayValue;
use std::fmt;
use std::str::FromStr;

pub const VERSION_ATTR: &str = "version";

const MICROS_PER_SECOND: i64 = 1_000_000;

/// `major.minor.patch`, compared numerically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for SchemaVersion {
    type Err = StoreError;

    /// Missing trailing components are zero: "2" is 2.0.0
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || StoreError::InvalidVersion(s.to_string());
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(invalid());
        }
        let mut parts = [0u32; 3];
        let mut count = 0;
        for part in trimmed.split('.') {
            if count == 3 {
                return Err(invalid());
            }
            parts[count] = part.parse().map_err(|_| invalid())?;
            count += 1;
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Version stamped on `root`; an unstamped container is 0.0.0
pub fn stored_version(root: &Node) -> Result<SchemaVersion> {
    match root.attr(VERSION_ATTR)? {
        None => Ok(SchemaVersion::default()),
        Some(AttrValue::Str(raw)) => raw.parse(),
        Some(other) => Err(StoreError::corrupt(
            root.path(),
            format!("version attribute is {}, expected str", other.type_name()),
        )),
    }
}

pub fn stamp_version(root: &Node, version: &SchemaVersion) -> Result<()> {
    root.set_attr(VERSION_ATTR, AttrValue::Str(version.to_string()))
}

pub type MigrationFn = Box<dyn Fn(&Node) -> Result<()> + Send + Sync>;

struct Step {
    version: SchemaVersion,
    apply: MigrationFn,
}

#[derive(Default)]
pub struct Migrator {
    /// Sorted by version, no duplicates
    steps: Vec<Step>,
}

impl Migrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the step that upgrades a container to `version`
    pub fn register<F>(&mut self, version: &str, apply: F) -> Result<&mut Self>
    where
        F: Fn(&Node) -> Result<()> + Send + Sync + 'static,
    {
        let version: SchemaVersion = version.parse()?;
        match self.steps.binary_search_by(|step| step.version.cmp(&version)) {
            Ok(_) => Err(StoreError::DuplicateMigration(version.to_string())),
            Err(position) => {
                self.steps.insert(
                    position,
                    Step {
                        version,
                        apply: Box::new(apply),
                    },
                );
                Ok(self)
            }
        }
    }

    pub fn latest(&self) -> Option<SchemaVersion> {
        self.steps.last().map(|step| step.version)
    }

    pub fn versions(&self) -> Vec<SchemaVersion> {
        self.steps.iter().map(|step| step.version).collect()
    }

    pub fn need_update(&self, version: &SchemaVersion) -> bool {
        self.latest().map_or(false, |latest| *version < latest)
    }

    /// Apply every step newer than the stamped version, then stamp the newest.
    /// Returns whether any step ran.
    pub fn update(&self, root: &Node) -> Result<bool> {
        let current = stored_version(root)?;
        let first = self.steps.partition_point(|step| step.version <= current);
        let pending = &self.steps[first..];
        let Some(last) = pending.last() else {
            tracing::debug!(version = %current, "container schema is current");
            return Ok(false);
        };

        for step in pending {
            tracing::info!(from = %current, to = %step.version, "applying schema migration");
            (step.apply)(root)?;
        }
        stamp_version(root, &last.version)?;
        root.flush()?;
        Ok(true)
    }
}

/// Step converting legacy seconds-resolution time attributes named in
/// `attr_names`, anywhere below the migrated node, to integer microseconds.
pub fn seconds_to_micros(attr_names: &[&str]) -> impl Fn(&Node) -> Result<()> + Send + Sync + 'static {
    let names: Vec<String> = attr_names.iter().map(|name| name.to_string()).collect();
    move |root: &Node| convert_subtree(root, &names)
}

fn convert_subtree(node: &Node, names: &[String]) -> Result<()> {
    for name in names {
        let converted = match node.attr(name)? {
            Some(AttrValue::Int(seconds)) => seconds.checked_mul(MICROS_PER_SECOND).ok_or_else(|| {
                StoreError::corrupt(node.path(), format!("'{}' overflows as microseconds", name))
            })?,
            Some(AttrValue::Float(seconds)) => (seconds * 1e6).round() as i64,
            _ => continue,
        };
        node.set_attr(name, AttrValue::Int(converted))?;
    }
    for child in node.children()? {
        convert_subtree(&node.child(&child)?, names)?;
    }
    Ok(())
}

/// Step converting legacy seconds stored in datasets to integer microseconds.
///
/// Every dataset node below the migrated node whose name is in
/// `dataset_keys` is rescaled: homogeneous numeric datasets as a whole,
/// compound ones only in the columns named in `column_names`. Integer and
/// float seconds both become i64 microseconds.
pub fn column_seconds_to_micros(
    dataset_keys: &[&str],
    column_names: &[&str],
) -> impl Fn(&Node) -> Result<()> + Send + Sync + 'static {
    let datasets: Vec<String> = dataset_keys.iter().map(|name| name.to_string()).collect();
    let columns: Vec<String> = column_names.iter().map(|name| name.to_string()).collect();
    move |root: &Node| convert_datasets(root, &datasets, &columns)
}

fn convert_datasets(node: &Node, datasets: &[String], columns: &[String]) -> Result<()> {
    for name in node.children()? {
        let child = node.child(&name)?;
        if datasets.contains(&name) {
            if let Some(dataset) = child.dataset()? {
                if let Some(converted) = rescale_dataset(&dataset, child.path(), columns)? {
                    tracing::debug!(path = %child.path(), "rescaled seconds to microseconds");
                    node.write_dataset(&name, converted)?;
                }
                continue;
            }
        }
        convert_datasets(&child, datasets, columns)?;
    }
    Ok(())
}

fn rescale_dataset(dataset: &Dataset, path: &str, columns: &[String]) -> Result<Option<Dataset>> {
    match &dataset.dtype {
        DType::Scalar(_) => {
            let values = columnar::decode_array(dataset, path)?;
            Ok(seconds_array_to_micros(&values, path)?.map(|micros| columnar::encode_array(&micros)))
        }
        DType::Compound(_) => {
            let set = columnar::read_columns(dataset, path)?;
            let len = set.len();
            let mut changed = false;
            let mut rescaled = Vec::new();
            for (name, column) in set.into_columns() {
                let column = match column {
                    Column::Scalar(values) if columns.contains(&name) => {
                        match seconds_array_to_micros(&values, path)? {
                            Some(micros) => {
                                changed = true;
                                Column::Scalar(micros)
                            }
                            None => Column::Scalar(values),
                        }
                    }
                    other => other,
                };
                rescaled.push((name, column));
            }
            if !changed {
                return Ok(None);
            }
            columnar::encode_columns(path, len, &rescaled).map(Some)
        }
        DType::Text => Ok(None),
    }
}

/// `None` when the array type cannot hold seconds
fn seconds_array_to_micros(values: &ArrayValue, path: &str) -> Result<Option<ArrayValue>> {
    let micros = match values {
        ArrayValue::I64(v) => v
            .iter()
            .map(|seconds| {
                seconds.checked_mul(MICROS_PER_SECOND).ok_or_else(|| {
                    StoreError::corrupt(path, format!("{} seconds overflows as microseconds", seconds))
                })
            })
            .collect::<Result<Vec<_>>>()?,
        ArrayValue::I32(v) => v.iter().map(|seconds| i64::from(*seconds) * MICROS_PER_SECOND).collect(),
        ArrayValue::F64(v) => v.iter().map(|seconds| (seconds * 1e6).round() as i64).collect(),
        ArrayValue::F32(v) => v
            .iter()
            .map(|seconds| (f64::from(*seconds) * 1e6).round() as i64)
            .collect(),
        ArrayValue::Bool(_) | ArrayValue::U8(_) => return Ok(None),
    };
    Ok(Some(ArrayValue::I64(micros)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::collection::{KEYS, ROWS, VALUES};
    use crate::codec::record::TYPE_ATTR;
    use crate::registry::{self, RecordSchema};
    use crate::store::Container;
    use crate::types::{TypeDescriptor, Value};
    use chrono::{DateTime, TimeDelta};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_version_parsing_and_order() {
        let v: SchemaVersion = "1.10".parse().unwrap();
        assert_eq!(v, SchemaVersion::new(1, 10, 0));
        assert!(SchemaVersion::new(1, 9, 0) < v);
        assert_eq!("v2.0.1".parse::<SchemaVersion>().unwrap().to_string(), "2.0.1");
        assert!("1.2.3.4".parse::<SchemaVersion>().is_err());
        assert!("one".parse::<SchemaVersion>().is_err());
        assert!("".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn test_steps_apply_in_version_order() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let mut migrator = Migrator::new();
        for version in ["3", "4", "2"] {
            let applied = applied.clone();
            migrator
                .register(version, move |_: &Node| {
                    applied.lock().push(version);
                    Ok(())
                })
                .unwrap();
        }

        let root = Container::in_memory().root();
        stamp_version(&root, &SchemaVersion::new(1, 0, 0)).unwrap();
        assert!(migrator.need_update(&stored_version(&root).unwrap()));
        assert!(migrator.update(&root).unwrap());
        assert_eq!(*applied.lock(), vec!["2", "3", "4"]);
        assert_eq!(stored_version(&root).unwrap(), SchemaVersion::new(4, 0, 0));

        assert!(!migrator.update(&root).unwrap());
        assert_eq!(applied.lock().len(), 3);
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let mut migrator = Migrator::new();
        migrator.register("1.1", |_: &Node| Ok(())).unwrap();
        let err = migrator.register("1.1.0", |_: &Node| Ok(())).err().unwrap();
        assert!(matches!(err, StoreError::DuplicateMigration(_)));
    }

    #[test]
    fn test_column_seconds_to_micros_rescales_datasets() {
        registry::register_schema(
            RecordSchema::new("MigrationTestRun")
                .field("label", TypeDescriptor::Str)
                .field("start", TypeDescriptor::DateTime),
        )
        .unwrap();
        let root = Container::in_memory().root();
        let runs = root.require_group("runs").unwrap();
        runs.set_attr(TYPE_ATTR, AttrValue::Str("MigrationTestRun".into())).unwrap();
        columnar::write_columns(
            &runs,
            ROWS,
            2,
            &[
                ("label".to_string(), Column::Text(vec!["a".into(), "b".into()])),
                ("start".to_string(), Column::Scalar(ArrayValue::I64(vec![3, 5]))),
            ],
        )
        .unwrap();
        columnar::write_array(&root, "stamps", &ArrayValue::F64(vec![1.5])).unwrap();
        let offsets = root.require_group("offsets").unwrap();
        columnar::write_strings(&offsets, KEYS, &["x".to_string()]).unwrap();
        columnar::write_array(&offsets, VALUES, &ArrayValue::I32(vec![2])).unwrap();

        column_seconds_to_micros(&["rows", "stamps", "values"], &["start"])(&root).unwrap();

        let runs = registry::resolve(&TypeDescriptor::list(TypeDescriptor::record("MigrationTestRun")))
            .unwrap()
            .read(&root, "runs")
            .unwrap();
        let Value::List(items) = runs else {
            panic!("expected a list");
        };
        let Value::Record(second) = &items[1] else {
            panic!("expected a record");
        };
        assert_eq!(second.get("label"), Some(&Value::Str("b".into())));
        assert_eq!(
            second.get("start"),
            Some(&Value::DateTime(DateTime::from_timestamp(5, 0).unwrap()))
        );

        let stamps = registry::resolve(&TypeDescriptor::list(TypeDescriptor::DateTime))
            .unwrap()
            .read(&root, "stamps")
            .unwrap();
        assert_eq!(
            stamps,
            Value::List(vec![Value::DateTime(DateTime::from_timestamp_micros(1_500_000).unwrap())])
        );

        let offsets = registry::resolve(&TypeDescriptor::map(TypeDescriptor::Str, TypeDescriptor::Duration))
            .unwrap()
            .read(&root, "offsets")
            .unwrap();
        assert_eq!(
            offsets,
            Value::Map(vec![(Value::Str("x".into()), Value::Duration(TimeDelta::seconds(2)))])
        );
    }

    #[test]
    fn test_seconds_to_micros_walks_subtree() {
        let root = Container::in_memory().root();
        root.set_attr("acquired", AttrValue::Int(3)).unwrap();
        let nested = root.require_group("runs").unwrap().require_group("0").unwrap();
        nested.set_attr("acquired", AttrValue::Float(1.5)).unwrap();
        nested.set_attr("other", AttrValue::Int(7)).unwrap();

        seconds_to_micros(&["acquired"])(&root).unwrap();

        assert_eq!(root.int_attr("acquired").unwrap(), Some(3_000_000));
        assert_eq!(nested.int_attr("acquired").unwrap(), Some(1_500_000));
        assert_eq!(nested.int_attr("other").unwrap(), Some(7));
    }
}
