//! Record (structure) codec.
//!
//! A record becomes a child group carrying a `type` attribute with its kind
//! name. Each field is written through the handler its descriptor resolves to.
//! Reads dispatch on the stored kind, so a subtype written into a field
//! declared as its parent comes back as the subtype.
//!
//! A field that fails to decode does not abort the read: its default is
//! substituted and `(path, field)` lands in the process-wide broken-entries
//! list, inspectable after a load.

use crate::codec::attribute::zero_value;
use crate::error::{Result, StoreError};
use crate::registry::{self, FieldDefault, FieldSpec, Handler, Record};
use crate::store::{join_path, AttrValue, Container, Node};
use crate::types::{RecordValue, TypeDescriptor, TypeKind, Value};
use parking_lot::Mutex;
use std::sync::Arc;

/// Attribute naming the stored record kind
pub const TYPE_ATTR: &str = "type";

/// One field that could not be read and was reset to its default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenEntry {
    /// Path of the record node owning the field
    pub path: String,
    pub field: String,
}

static BROKEN_ENTRIES: Mutex<Vec<BrokenEntry>> = parking_lot::const_mutex(Vec::new());

pub fn broken_entries() -> Vec<BrokenEntry> {
    BROKEN_ENTRIES.lock().clone()
}

/// Drain the list, typically after a full load has been reported
pub fn take_broken_entries() -> Vec<BrokenEntry> {
    std::mem::take(&mut *BROKEN_ENTRIES.lock())
}

pub fn clear_broken_entries() {
    BROKEN_ENTRIES.lock().clear();
}

fn report_broken(path: &str, field: &str, err: &StoreError) {
    tracing::warn!(path, field, error = %err, "field unreadable, default substituted");
    BROKEN_ENTRIES.lock().push(BrokenEntry {
        path: path.to_string(),
        field: field.to_string(),
    });
}

/// Write `record` as the child `key` of `node`, replacing whatever was there.
/// `declared` is the statically expected kind; the record may be a subkind.
///
/// The record is built in a scratch container at the same path and copied
/// over the slot only once every field has been written, so a rejected value
/// leaves the previous record untouched.
pub fn write_record(node: &Node, key: &str, record: &RecordValue, declared: &str) -> Result<()> {
    let target = node.child(key)?;
    let staged = Container::in_memory().root().descend(target.path())?;
    staged.ensure()?;
    fill_record(&staged, record, declared)?;
    staged.copy_to(&target)
}

/// Write the fields of `record` into the empty group `group`
fn fill_record(group: &Node, record: &RecordValue, declared: &str) -> Result<()> {
    let schema = registry::record_schema(&record.kind)?;
    if !registry::is_subkind(&record.kind, declared) {
        return Err(StoreError::schema(
            group.path(),
            format!("'{}' is not a '{}'", record.kind, declared),
        ));
    }
    if let Some(unknown) = record
        .fields
        .keys()
        .find(|name| schema.field_spec(name).is_none())
    {
        return Err(StoreError::schema(
            group.path(),
            format!("'{}' has no field '{}'", record.kind, unknown),
        ));
    }

    group.set_attr(TYPE_ATTR, AttrValue::Str(record.kind.clone()))?;
    for field in schema.fields() {
        let value = match record.fields.get(&field.name) {
            None | Some(Value::Absent) => continue,
            Some(value) => value,
        };
        match (&field.ty, value) {
            (TypeDescriptor::Record(inner), Value::Record(nested)) => {
                fill_record(&group.require_group(&field.storage_key)?, nested, inner)?
            }
            (ty, value) => registry::resolve(ty)?.write(group, &field.storage_key, value)?,
        }
    }
    Ok(())
}

/// Read the record stored at child `key` of `node` as `declared` or a subkind
pub fn read_record(node: &Node, key: &str, declared: &str) -> Result<RecordValue> {
    let child = node.child(key)?;
    if !child.exists()? {
        return Err(StoreError::schema(
            child.path(),
            format!("no '{}' record stored", declared),
        ));
    }
    let kind = match child.str_attr(TYPE_ATTR) {
        Ok(Some(kind)) => kind,
        Ok(None) => return Err(StoreError::schema(child.path(), "record lacks a type attribute")),
        Err(err) => return Err(StoreError::schema(child.path(), err.to_string())),
    };
    let schema = registry::record_schema(&kind).map_err(|_| {
        StoreError::schema(child.path(), format!("stored kind '{}' is not registered", kind))
    })?;
    if !registry::is_subkind(&kind, declared) {
        return Err(StoreError::schema(
            child.path(),
            format!("stored kind '{}' is not a '{}'", kind, declared),
        ));
    }

    let mut record = RecordValue::new(kind);
    for field in schema.fields() {
        let value = match read_field(&child, field) {
            Ok(value) => value,
            Err(err) if err.is_field_local() => {
                report_broken(child.path(), &field.name, &err);
                fallback(field)
            }
            Err(err) => return Err(err),
        };
        record.fields.insert(field.name.clone(), value);
    }
    Ok(record)
}

fn read_field(node: &Node, field: &FieldSpec) -> Result<Value> {
    if let TypeDescriptor::Record(inner) = &field.ty {
        if !node.has_child(&field.storage_key)? {
            return absent_default(node, field);
        }
        return read_record(node, &field.storage_key, inner).map(Value::Record);
    }
    let handler = registry::resolve(&field.ty)?;
    if !handler.exists(node, &field.storage_key)? {
        return absent_default(node, field);
    }
    handler.read(node, &field.storage_key)
}

fn absent_default(node: &Node, field: &FieldSpec) -> Result<Value> {
    let nested = matches!(field.ty, TypeDescriptor::Record(_));
    match &field.default {
        FieldDefault::Value(value) => Ok(value.clone()),
        FieldDefault::Zero if !nested => Ok(zero_value(&field.ty)),
        FieldDefault::Required if !nested => Err(StoreError::missing_field(node.path(), &field.name)),
        _ => Err(StoreError::schema(
            node.path(),
            format!("required record field '{}' is missing", field.name),
        )),
    }
}

/// Value substituted for a field whose storage could not be decoded
fn fallback(field: &FieldSpec) -> Value {
    match &field.default {
        FieldDefault::Value(value) => value.clone(),
        _ => zero_value(&field.ty),
    }
}

/// Write a typed record, registering its kind on first use
pub fn write<T: Record>(node: &Node, key: &str, value: &T) -> Result<()> {
    registry::register::<T>()?;
    write_record(node, key, &value.to_record(), T::KIND)
}

/// Read a typed record. The stored kind must be `T::KIND` itself; use
/// [`read_record`] to read subkinds dynamically.
pub fn read<T: Record>(node: &Node, key: &str) -> Result<T> {
    registry::register::<T>()?;
    let record = read_record(node, key, T::KIND)?;
    if record.kind != T::KIND {
        return Err(StoreError::schema(
            join_path(node.path(), key),
            format!("stored kind '{}' cannot be read as {}", record.kind, T::KIND),
        ));
    }
    T::from_record(record)
}

/// Nested record stored as a child group
pub struct RecordHandler {
    descriptor: TypeDescriptor,
    kind: String,
}

impl RecordHandler {
    pub fn new(kind: String) -> Self {
        Self {
            descriptor: TypeDescriptor::Record(kind.clone()),
            kind,
        }
    }
}

impl Handler for RecordHandler {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Record
    }

    fn write(&self, node: &Node, key: &str, value: &Value) -> Result<()> {
        match value {
            Value::Absent => node.delete(key),
            Value::Record(record) => write_record(node, key, record, &self.kind),
            other => Err(StoreError::schema(
                node.path(),
                format!("cannot store {} as {}", other.type_name(), self.kind),
            )),
        }
    }

    fn read(&self, node: &Node, key: &str) -> Result<Value> {
        read_record(node, key, &self.kind).map(Value::Record)
    }

    fn exists(&self, node: &Node, key: &str) -> Result<bool> {
        node.has_child(key)
    }
}

/// Wraps a handler so that absence round-trips as [`Value::Absent`]
pub struct OptionalHandler {
    descriptor: TypeDescriptor,
    inner: Arc<dyn Handler>,
}

impl OptionalHandler {
    pub fn new(inner: Arc<dyn Handler>) -> Self {
        Self {
            descriptor: TypeDescriptor::optional(inner.descriptor().clone()),
            inner,
        }
    }
}

impl Handler for OptionalHandler {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn kind(&self) -> TypeKind {
        self.inner.kind()
    }

    fn write(&self, node: &Node, key: &str, value: &Value) -> Result<()> {
        self.inner.write(node, key, value)
    }

    fn read(&self, node: &Node, key: &str) -> Result<Value> {
        if !self.inner.exists(node, key)? {
            return Ok(Value::Absent);
        }
        self.inner.read(node, key)
    }

    fn exists(&self, node: &Node, key: &str) -> Result<bool> {
        self.inner.exists(node, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RecordSchema;
    use crate::store::Container;
    use crate::types::{ArrayValue, ScalarType};
    use chrono::{DateTime, TimeDelta, Utc};

    #[derive(Debug, Clone, PartialEq)]
    struct Sample {
        name: String,
        rate: f64,
        acquired: DateTime<Utc>,
        note: Option<String>,
        trace: Vec<f64>,
    }

    impl Record for Sample {
        const KIND: &'static str = "RecordTestSample";

        fn schema() -> RecordSchema {
            RecordSchema::new(Self::KIND)
                .field("name", TypeDescriptor::Str)
                .field("rate", TypeDescriptor::Float)
                .field("acquired", TypeDescriptor::DateTime)
                .field("note", TypeDescriptor::optional(TypeDescriptor::Str))
                .field("trace", TypeDescriptor::Array(ScalarType::F64))
        }

        fn to_record(&self) -> RecordValue {
            RecordValue::new(Self::KIND)
                .with("name", self.name.clone())
                .with("rate", self.rate)
                .with("acquired", self.acquired)
                .with("note", self.note.clone())
                .with("trace", self.trace.clone())
        }

        fn from_record(mut record: RecordValue) -> Result<Self> {
            Ok(Self {
                name: record.take("name")?,
                rate: record.take("rate")?,
                acquired: record.take("acquired")?,
                note: record.take("note")?,
                trace: record.take("trace")?,
            })
        }
    }

    fn sample() -> Sample {
        Sample {
            name: "blank".into(),
            rate: 0.25,
            acquired: DateTime::from_timestamp_micros(1_600_000_000_123_456).unwrap(),
            note: None,
            trace: vec![1.0, 2.5, -3.0],
        }
    }

    #[test]
    fn test_typed_round_trip() {
        let root = Container::in_memory().root();
        write(&root, "sample", &sample()).unwrap();
        let back: Sample = read(&root, "sample").unwrap();
        assert_eq!(back, sample());
        let node = root.child("sample").unwrap();
        assert_eq!(node.str_attr(TYPE_ATTR).unwrap().as_deref(), Some(Sample::KIND));
        assert!(!node.has_attr("note").unwrap());
    }

    #[test]
    fn test_rewrite_replaces_previous_slot() {
        let root = Container::in_memory().root();
        let mut first = sample();
        first.note = Some("first".into());
        write(&root, "sample", &first).unwrap();
        write(&root, "sample", &sample()).unwrap();
        let back: Sample = read(&root, "sample").unwrap();
        assert_eq!(back.note, None);
    }

    #[test]
    fn test_corrupt_field_is_isolated() {
        let root = Container::in_memory().root();
        write(&root, "corrupt_iso", &sample()).unwrap();
        let node = root.child("corrupt_iso").unwrap();
        node.set_attr("rate", AttrValue::Str("garbage".into())).unwrap();

        let back: Sample = read(&root, "corrupt_iso").unwrap();
        assert_eq!(back.rate, 0.0);
        assert_eq!(back.name, "blank");
        assert_eq!(back.trace, vec![1.0, 2.5, -3.0]);

        let broken: Vec<_> = broken_entries()
            .into_iter()
            .filter(|entry| entry.path == node.path())
            .collect();
        assert_eq!(
            broken,
            vec![BrokenEntry {
                path: node.path().to_string(),
                field: "rate".into()
            }]
        );
    }

    #[test]
    fn test_unknown_stored_kind_is_schema_error() {
        let root = Container::in_memory().root();
        write(&root, "sample", &sample()).unwrap();
        root.child("sample")
            .unwrap()
            .set_attr(TYPE_ATTR, AttrValue::Str("RecordTestNoSuchKind".into()))
            .unwrap();
        let err = read::<Sample>(&root, "sample").unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }));
    }

    #[test]
    fn test_subkind_read_through_parent_field() {
        registry::register_schema(RecordSchema::new("RecordTestShape").field("id", TypeDescriptor::Int))
            .unwrap();
        registry::register_schema(
            RecordSchema::new("RecordTestCircle")
                .extends("RecordTestShape")
                .field("radius", TypeDescriptor::Float),
        )
        .unwrap();
        registry::register_schema(
            RecordSchema::new("RecordTestDrawing").field("shape", TypeDescriptor::record("RecordTestShape")),
        )
        .unwrap();

        let circle = RecordValue::new("RecordTestCircle")
            .with("id", 3i64)
            .with("radius", 1.5);
        let drawing = RecordValue::new("RecordTestDrawing").with("shape", circle.clone());
        let root = Container::in_memory().root();
        write_record(&root, "drawing", &drawing, "RecordTestDrawing").unwrap();

        let back = read_record(&root, "drawing", "RecordTestDrawing").unwrap();
        assert_eq!(back.get("shape"), Some(&Value::Record(circle)));
    }

    #[test]
    fn test_missing_required_nested_record() {
        registry::register_schema(RecordSchema::new("RecordTestInner").field("v", TypeDescriptor::Int))
            .unwrap();
        registry::register_schema(
            RecordSchema::new("RecordTestOuter").field("inner", TypeDescriptor::record("RecordTestInner")),
        )
        .unwrap();
        let root = Container::in_memory().root();
        write_record(&root, "outer", &RecordValue::new("RecordTestOuter"), "RecordTestOuter").unwrap();
        let err = read_record(&root, "outer", "RecordTestOuter").unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }));
    }

    #[test]
    fn test_defaults_fill_fields_added_later() {
        registry::register_schema(
            RecordSchema::new("RecordTestEvolved")
                .field("old", TypeDescriptor::Int)
                .field_with_default("added", TypeDescriptor::Str, "fallback")
                .field("samples", TypeDescriptor::Array(ScalarType::I32)),
        )
        .unwrap();
        let root = Container::in_memory().root();
        let node = root.require_group("legacy").unwrap();
        node.set_attr(TYPE_ATTR, AttrValue::Str("RecordTestEvolved".into())).unwrap();
        node.set_attr("old", AttrValue::Int(9)).unwrap();

        let back = read_record(&root, "legacy", "RecordTestEvolved").unwrap();
        assert_eq!(back.get("old"), Some(&Value::Int(9)));
        assert_eq!(back.get("added"), Some(&Value::Str("fallback".into())));
        assert_eq!(
            back.get("samples"),
            Some(&Value::Array(ArrayValue::I32(Vec::new())))
        );
    }

    #[test]
    fn test_failed_overwrite_keeps_previous_record() {
        registry::register_schema(
            RecordSchema::new("RecordTestTimed")
                .field("label", TypeDescriptor::Str)
                .field("span", TypeDescriptor::Duration),
        )
        .unwrap();
        let root = Container::in_memory().root();
        let good = RecordValue::new("RecordTestTimed")
            .with("label", "ok")
            .with("span", TimeDelta::seconds(1));
        write_record(&root, "timed", &good, "RecordTestTimed").unwrap();

        let bad = RecordValue::new("RecordTestTimed")
            .with("label", "bad")
            .with("span", TimeDelta::MAX);
        let err = write_record(&root, "timed", &bad, "RecordTestTimed").unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }));
        assert_eq!(read_record(&root, "timed", "RecordTestTimed").unwrap(), good);

        let err = write_record(&root, "fresh", &bad, "RecordTestTimed").unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }));
        assert!(!root.has_child("fresh").unwrap());
    }

    #[test]
    fn test_nested_write_keeps_full_paths() {
        registry::register_schema(RecordSchema::new("RecordTestLeaf").field("v", TypeDescriptor::Int))
            .unwrap();
        registry::register_schema(
            RecordSchema::new("RecordTestBranch").field("leaf", TypeDescriptor::record("RecordTestLeaf")),
        )
        .unwrap();
        let root = Container::in_memory().root();
        let branch = RecordValue::new("RecordTestBranch")
            .with("leaf", RecordValue::new("RecordTestLeaf").with("v", "not an int"));
        match write_record(&root, "branch", &branch, "RecordTestBranch").unwrap_err() {
            StoreError::Schema { path, .. } => assert!(path.starts_with("/branch/leaf")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_wrong_value_kind_rejected_on_write() {
        let root = Container::in_memory().root();
        registry::register::<Sample>().unwrap();
        let record = RecordValue::new(Sample::KIND).with("rate", "fast");
        let err = write_record(&root, "bad", &record, Sample::KIND).unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }));
    }
}
