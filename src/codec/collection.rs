//! Handlers for `list[T]` and `map[K, V]` fields.
//!
//! [`select`] picks the most compact layout for the element type:
//!
//! ```text
//! list[flat record]        <key>/rows (compound) + <key>/ragged/<field>
//! map[k, flat record]      same, with a `_key` column
//! list[numeric|time|str]   <key> (one homogeneous or text dataset)
//! list[array]              <key>/{data,index} (ragged)
//! map[k, numeric|time|str] <key>/{keys,values}
//! anything else            <key>/{0,1,..} + `length`, or <key>/_keys manifest
//! ```
//!
//! A record kind is flat when every field is a non-byte primitive or a 1-D
//! numeric array. Rows hold exactly the declared kind; a value holding any of
//! its registered subkinds is written as nested groups instead, one typed
//! group per element, so each element reads back as its stored subkind.

use crate::codec::attribute::{duration_to_micros, micros_to_datetime, micros_to_duration, zero_value};
use crate::codec::columnar::{self, Column};
use crate::codec::record::TYPE_ATTR;
use crate::error::{Result, StoreError};
use crate::registry::{self, FieldDefault, FieldSpec, Handler, RecordSchema};
use crate::store::{join_path, AttrValue, DType, Node};
use crate::types::{ArrayValue, CollectionKind, RecordValue, ScalarType, TypeDescriptor, TypeKind, Value};
use std::sync::Arc;

pub const ROWS: &str = "rows";
pub const RAGGED: &str = "ragged";
pub const KEY_COLUMN: &str = "_key";
pub const KEYS: &str = "keys";
pub const VALUES: &str = "values";
pub const LENGTH_ATTR: &str = "length";
/// Manifest of nested-group maps
pub const MAP_MANIFEST: &str = "_keys";

/// Choose the handler for a list or map descriptor
pub fn select(descriptor: &TypeDescriptor) -> Result<Arc<dyn Handler>> {
    let handler: Arc<dyn Handler> = match descriptor {
        TypeDescriptor::List(elem) => match elem.as_ref() {
            TypeDescriptor::Record(kind) if is_flat(kind)? => {
                Arc::new(RowStoreHandler::new(descriptor.clone(), kind, None)?)
            }
            TypeDescriptor::Array(scalar) => Arc::new(RaggedListHandler {
                descriptor: descriptor.clone(),
                elem: *scalar,
            }),
            elem if is_columnar(elem) => Arc::new(HomogeneousHandler {
                descriptor: descriptor.clone(),
                elem: elem.clone(),
            }),
            elem => Arc::new(NestedGroupHandler {
                descriptor: descriptor.clone(),
                key: None,
                inner: registry::resolve(elem)?,
            }),
        },
        TypeDescriptor::Map(key, value) => {
            if !matches!(key.as_ref(), TypeDescriptor::Str | TypeDescriptor::Int) {
                return Err(StoreError::UnregisteredType(format!(
                    "map keys must be str or int, got '{}'",
                    key
                )));
            }
            let key = key.as_ref().clone();
            match value.as_ref() {
                TypeDescriptor::Record(kind) if is_flat(kind)? => {
                    Arc::new(RowStoreHandler::new(descriptor.clone(), kind, Some(key))?)
                }
                value if is_columnar(value) => Arc::new(PrimitiveMapHandler {
                    descriptor: descriptor.clone(),
                    key,
                    value: value.clone(),
                }),
                value => Arc::new(NestedGroupHandler {
                    descriptor: descriptor.clone(),
                    key: Some(key),
                    inner: registry::resolve(value)?,
                }),
            }
        }
        other => {
            return Err(StoreError::UnregisteredType(format!(
                "'{}' is not a collection",
                other
            )))
        }
    };
    Ok(handler)
}

fn is_columnar(ty: &TypeDescriptor) -> bool {
    ty.column_scalar().is_some() || *ty == TypeDescriptor::Str
}

fn is_flat(kind: &str) -> Result<bool> {
    let schema = registry::record_schema(kind)?;
    Ok(schema
        .fields()
        .iter()
        .all(|f| is_columnar(&f.ty) || matches!(f.ty, TypeDescriptor::Array(_))))
}

fn mismatch(path: &str, expected: &TypeDescriptor, got: &Value) -> StoreError {
    StoreError::schema(path, format!("cannot store {} in a {} column", got.type_name(), expected))
}

/// Pack values of one columnar descriptor into a column
fn to_column(ty: &TypeDescriptor, values: &[Value], path: &str) -> Result<Column> {
    let column = match ty {
        TypeDescriptor::Str => Column::Text(
            values
                .iter()
                .map(|v| match v {
                    Value::Str(s) => Ok(s.clone()),
                    other => Err(mismatch(path, ty, other)),
                })
                .collect::<Result<_>>()?,
        ),
        TypeDescriptor::Bool => Column::Scalar(ArrayValue::Bool(
            values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Ok(*b),
                    other => Err(mismatch(path, ty, other)),
                })
                .collect::<Result<_>>()?,
        )),
        TypeDescriptor::Float => Column::Scalar(ArrayValue::F64(
            values
                .iter()
                .map(|v| match v {
                    Value::Float(f) => Ok(*f),
                    Value::Int(i) => Ok(*i as f64),
                    other => Err(mismatch(path, ty, other)),
                })
                .collect::<Result<_>>()?,
        )),
        TypeDescriptor::Int | TypeDescriptor::DateTime | TypeDescriptor::Duration => {
            Column::Scalar(ArrayValue::I64(
                values
                    .iter()
                    .map(|v| match (ty, v) {
                        (TypeDescriptor::Int, Value::Int(i)) => Ok(*i),
                        (TypeDescriptor::DateTime, Value::DateTime(t)) => Ok(t.timestamp_micros()),
                        (TypeDescriptor::Duration, Value::Duration(d)) => duration_to_micros(d)
                            .ok_or_else(|| StoreError::schema(path, "duration overflows i64 microseconds")),
                        (_, other) => Err(mismatch(path, ty, other)),
                    })
                    .collect::<Result<_>>()?,
            ))
        }
        other => {
            return Err(StoreError::schema(
                path,
                format!("'{}' has no column representation", other),
            ))
        }
    };
    Ok(column)
}

/// Invert [`to_column`]; a column of the wrong type is corruption
fn from_column(ty: &TypeDescriptor, column: Column, path: &str) -> Result<Vec<Value>> {
    let values = match (ty, column) {
        (TypeDescriptor::Str, Column::Text(v)) => v.into_iter().map(Value::Str).collect(),
        (TypeDescriptor::Bool, Column::Scalar(ArrayValue::Bool(v))) => {
            v.into_iter().map(Value::Bool).collect()
        }
        (TypeDescriptor::Float, Column::Scalar(ArrayValue::F64(v))) => {
            v.into_iter().map(Value::Float).collect()
        }
        (TypeDescriptor::Float, Column::Scalar(ArrayValue::F32(v))) => {
            v.into_iter().map(|f| Value::Float(f as f64)).collect()
        }
        (TypeDescriptor::Int, Column::Scalar(ArrayValue::I64(v))) => v.into_iter().map(Value::Int).collect(),
        (TypeDescriptor::Int, Column::Scalar(ArrayValue::I32(v))) => {
            v.into_iter().map(|i| Value::Int(i as i64)).collect()
        }
        (TypeDescriptor::DateTime, Column::Scalar(ArrayValue::I64(v))) => v
            .into_iter()
            .map(|micros| {
                micros_to_datetime(micros)
                    .map(Value::DateTime)
                    .ok_or_else(|| StoreError::corrupt(path, format!("timestamp {} out of range", micros)))
            })
            .collect::<Result<_>>()?,
        (TypeDescriptor::Duration, Column::Scalar(ArrayValue::I64(v))) => v
            .into_iter()
            .map(|micros| Value::Duration(micros_to_duration(micros)))
            .collect(),
        (ty, column) => {
            let stored = match &column {
                Column::Scalar(values) => values.scalar_type().name(),
                Column::Text(_) => "text",
            };
            return Err(StoreError::corrupt(
                path,
                format!("stored {} column cannot be read as {}", stored, ty),
            ));
        }
    };
    Ok(values)
}

/// Store one column as its own dataset
fn write_column(node: &Node, key: &str, column: &Column) -> Result<()> {
    match column {
        Column::Scalar(values) => columnar::write_array(node, key, values),
        Column::Text(values) => columnar::write_strings(node, key, values),
    }
}

fn read_column(node: &Node, key: &str) -> Result<Option<Column>> {
    let child = node.child(key)?;
    match child.dataset()? {
        Some(dataset) if dataset.dtype == DType::Text => {
            columnar::decode_strings(&dataset, child.path()).map(|v| Some(Column::Text(v)))
        }
        Some(dataset) => columnar::decode_array(&dataset, child.path()).map(|v| Some(Column::Scalar(v))),
        None => Ok(None),
    }
}

fn expect_list<'a>(value: &'a Value, descriptor: &TypeDescriptor, path: &str) -> Result<&'a [Value]> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(StoreError::schema(
            path,
            format!("cannot store {} as {}", other.type_name(), descriptor),
        )),
    }
}

fn expect_map<'a>(value: &'a Value, descriptor: &TypeDescriptor, path: &str) -> Result<&'a [(Value, Value)]> {
    match value {
        Value::Map(pairs) => Ok(pairs),
        other => Err(StoreError::schema(
            path,
            format!("cannot store {} as {}", other.type_name(), descriptor),
        )),
    }
}

fn key_to_string(key: &Value, ty: &TypeDescriptor, path: &str) -> Result<String> {
    match (ty, key) {
        (TypeDescriptor::Str, Value::Str(s)) => Ok(s.clone()),
        (TypeDescriptor::Int, Value::Int(i)) => Ok(i.to_string()),
        (ty, other) => Err(mismatch(path, ty, other)),
    }
}

fn key_from_string(raw: String, ty: &TypeDescriptor, path: &str) -> Result<Value> {
    match ty {
        TypeDescriptor::Int => raw
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| StoreError::corrupt(path, format!("map key {:?} is not an integer", raw))),
        _ => Ok(Value::Str(raw)),
    }
}

/// Flat records packed one row each, array fields in ragged groups
pub struct RowStoreHandler {
    descriptor: TypeDescriptor,
    schema: Arc<RecordSchema>,
    key: Option<TypeDescriptor>,
    /// Layout for values holding subkinds of the row kind
    nested: NestedGroupHandler,
}

impl RowStoreHandler {
    fn new(descriptor: TypeDescriptor, kind: &str, key: Option<TypeDescriptor>) -> Result<Self> {
        let schema = registry::record_schema(kind)?;
        if key.is_some() && schema.fields().iter().any(|f| f.storage_key == KEY_COLUMN) {
            return Err(StoreError::DuplicateType(format!(
                "record kind '{}' uses the reserved column '{}'",
                kind, KEY_COLUMN
            )));
        }
        let nested = NestedGroupHandler {
            descriptor: descriptor.clone(),
            key: key.clone(),
            inner: registry::resolve(&TypeDescriptor::record(kind))?,
        };
        Ok(Self {
            descriptor,
            schema,
            key,
            nested,
        })
    }

    /// Whether the group at `key` was written as nested groups
    fn is_nested(&self, node: &Node, key: &str) -> Result<bool> {
        let group = node.child(key)?;
        if !group.exists()? || group.has_child(ROWS)? {
            return Ok(false);
        }
        Ok(group.has_attr(LENGTH_ATTR)? || group.has_child(MAP_MANIFEST)?)
    }

    fn as_record<'a>(&self, value: &'a Value, path: &str) -> Result<&'a RecordValue> {
        match value {
            Value::Record(record) => Ok(record),
            other => Err(mismatch(path, &TypeDescriptor::record(&self.schema.kind), other)),
        }
    }

    fn cell(field: &FieldSpec, record: &RecordValue) -> Value {
        match record.get(&field.name) {
            Some(value) if !value.is_absent() => value.clone(),
            _ => match &field.default {
                FieldDefault::Value(value) if !value.is_absent() => value.clone(),
                _ => zero_value(&field.ty),
            },
        }
    }

    fn write_rows(&self, node: &Node, key: &str, keys: Option<Column>, records: &[&RecordValue]) -> Result<()> {
        let path = join_path(node.path(), key);
        let mut columns = Vec::new();
        if let Some(keys) = keys {
            columns.push((KEY_COLUMN.to_string(), keys));
        }
        let mut ragged = Vec::new();
        for field in self.schema.fields() {
            let cells: Vec<Value> = records.iter().map(|r| Self::cell(field, r)).collect();
            match &field.ty {
                TypeDescriptor::Array(elem) => {
                    let rows = cells
                        .into_iter()
                        .map(|cell| match cell {
                            Value::Array(values) if values.scalar_type() == *elem => Ok(values),
                            other => Err(mismatch(&path, &field.ty, &other)),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    ragged.push((field.storage_key.as_str(), *elem, rows));
                }
                ty => columns.push((field.storage_key.clone(), to_column(ty, &cells, &path)?)),
            }
        }

        node.delete(key)?;
        let group = node.require_group(key)?;
        group.set_attr(TYPE_ATTR, AttrValue::Str(self.schema.kind.clone()))?;
        columnar::write_columns(&group, ROWS, records.len(), &columns)?;
        if !ragged.is_empty() {
            let ragged_group = group.require_group(RAGGED)?;
            for (name, elem, rows) in ragged {
                columnar::write_ragged(&ragged_group, name, elem, &rows)?;
            }
        }
        Ok(())
    }

    fn default_column(&self, field: &FieldSpec, len: usize, path: &str) -> Result<Option<Column>> {
        let value = match &field.default {
            FieldDefault::Required => return Ok(None),
            FieldDefault::Value(value) if !value.is_absent() => value.clone(),
            _ => zero_value(&field.ty),
        };
        to_column(&field.ty, &vec![value; len], path).map(Some)
    }

    /// Rows in stored order, plus the key column when this is a map
    fn read_rows(&self, node: &Node, key: &str) -> Result<(Option<Column>, Vec<RecordValue>)> {
        let group = node.child(key)?;
        if !group.exists()? {
            return Ok((None, Vec::new()));
        }
        let path = group.path().to_string();
        let mut columns = columnar::read_columns_at(&group, ROWS)?
            .ok_or_else(|| StoreError::corrupt(&path, "row store lacks its rows dataset"))?;
        let len = columns.len();
        let keys = match self.key {
            Some(_) => Some(columns.require(KEY_COLUMN, None::<fn(usize) -> Column>)?),
            None => None,
        };

        let ragged_group = group.child(RAGGED)?;
        let mut records: Vec<RecordValue> = (0..len).map(|_| RecordValue::new(&self.schema.kind)).collect();
        for field in self.schema.fields() {
            let cells: Vec<Value> = match &field.ty {
                TypeDescriptor::Array(elem) => match columnar::read_ragged(&ragged_group, &field.storage_key)? {
                    Some(rows) => {
                        if rows.len() != len {
                            return Err(StoreError::corrupt(
                                &path,
                                format!("ragged column '{}' has {} rows, expected {}", field.name, rows.len(), len),
                            ));
                        }
                        if let Some(bad) = rows.iter().find(|r| r.scalar_type() != *elem) {
                            return Err(StoreError::corrupt(
                                &path,
                                format!("ragged column '{}' holds {} data", field.name, bad.scalar_type().name()),
                            ));
                        }
                        rows.into_iter().map(Value::Array).collect()
                    }
                    None => match &field.default {
                        FieldDefault::Required => return Err(StoreError::missing_field(&path, &field.name)),
                        FieldDefault::Value(value) if !value.is_absent() => vec![value.clone(); len],
                        _ => vec![zero_value(&field.ty); len],
                    },
                },
                ty => {
                    let fallback = if columns.get(&field.storage_key).is_none() {
                        self.default_column(field, len, &path)?
                    } else {
                        None
                    };
                    let column = columns.require(&field.storage_key, fallback.map(|c| move |_: usize| c))?;
                    from_column(ty, column, &path)?
                }
            };
            for (record, cell) in records.iter_mut().zip(cells) {
                record.fields.insert(field.name.clone(), cell);
            }
        }
        Ok((keys, records))
    }
}

impl Handler for RowStoreHandler {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Collection(CollectionKind::RowStore)
    }

    fn write(&self, node: &Node, key: &str, value: &Value) -> Result<()> {
        if value.is_absent() {
            return node.delete(key);
        }
        let path = join_path(node.path(), key);
        let (keys, records) = match &self.key {
            None => {
                let records = expect_list(value, &self.descriptor, &path)?
                    .iter()
                    .map(|item| self.as_record(item, &path))
                    .collect::<Result<Vec<_>>>()?;
                (None, records)
            }
            Some(key_ty) => {
                let pairs = expect_map(value, &self.descriptor, &path)?;
                let keys: Vec<Value> = pairs.iter().map(|(k, _)| k.clone()).collect();
                let records = pairs
                    .iter()
                    .map(|(_, v)| self.as_record(v, &path))
                    .collect::<Result<Vec<_>>>()?;
                (Some(to_column(key_ty, &keys, &path)?), records)
            }
        };

        if records.iter().all(|r| r.kind == self.schema.kind) {
            return self.write_rows(node, key, keys, &records);
        }
        if let Some(stranger) = records
            .iter()
            .find(|r| !registry::is_subkind(&r.kind, &self.schema.kind))
        {
            return Err(StoreError::schema(
                &path,
                format!(
                    "collection of '{}' cannot hold a '{}'",
                    self.schema.kind, stranger.kind
                ),
            ));
        }
        tracing::debug!(path = %path, kind = %self.schema.kind, "subkinds present, writing nested groups");
        self.nested.write(node, key, value)
    }

    fn read(&self, node: &Node, key: &str) -> Result<Value> {
        if self.is_nested(node, key)? {
            return self.nested.read(node, key);
        }
        let (keys, records) = self.read_rows(node, key)?;
        let records = records.into_iter().map(Value::Record);
        match (&self.key, keys) {
            (Some(key_ty), Some(keys)) => {
                let path = join_path(node.path(), key);
                let keys = from_column(key_ty, keys, &path)?;
                Ok(Value::Map(keys.into_iter().zip(records).collect()))
            }
            (Some(_), None) => Ok(Value::Map(Vec::new())),
            (None, _) => Ok(Value::List(records.collect())),
        }
    }

    fn exists(&self, node: &Node, key: &str) -> Result<bool> {
        node.has_child(key)
    }
}

/// `list[T]` of numbers, times or strings as one dataset
pub struct HomogeneousHandler {
    descriptor: TypeDescriptor,
    elem: TypeDescriptor,
}

impl Handler for HomogeneousHandler {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Collection(CollectionKind::Homogeneous)
    }

    fn write(&self, node: &Node, key: &str, value: &Value) -> Result<()> {
        if value.is_absent() {
            return node.delete(key);
        }
        let path = join_path(node.path(), key);
        let items = expect_list(value, &self.descriptor, &path)?;
        write_column(node, key, &to_column(&self.elem, items, &path)?)
    }

    fn read(&self, node: &Node, key: &str) -> Result<Value> {
        match read_column(node, key)? {
            Some(column) => {
                let path = join_path(node.path(), key);
                from_column(&self.elem, column, &path).map(Value::List)
            }
            None => Ok(Value::List(Vec::new())),
        }
    }

    fn exists(&self, node: &Node, key: &str) -> Result<bool> {
        node.has_child(key)
    }
}

/// `list[array]` in the ragged layout
pub struct RaggedListHandler {
    descriptor: TypeDescriptor,
    elem: ScalarType,
}

impl Handler for RaggedListHandler {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Collection(CollectionKind::Homogeneous)
    }

    fn write(&self, node: &Node, key: &str, value: &Value) -> Result<()> {
        if value.is_absent() {
            return node.delete(key);
        }
        let path = join_path(node.path(), key);
        let rows = expect_list(value, &self.descriptor, &path)?
            .iter()
            .map(|item| match item {
                Value::Array(values) if values.scalar_type() == self.elem => Ok(values.clone()),
                other => Err(mismatch(&path, &TypeDescriptor::Array(self.elem), other)),
            })
            .collect::<Result<Vec<_>>>()?;
        columnar::write_ragged(node, key, self.elem, &rows)
    }

    fn read(&self, node: &Node, key: &str) -> Result<Value> {
        let rows = columnar::read_ragged(node, key)?.unwrap_or_default();
        if let Some(bad) = rows.iter().find(|r| r.scalar_type() != self.elem) {
            return Err(StoreError::corrupt(
                join_path(node.path(), key),
                format!("ragged data is {}, expected {}", bad.scalar_type().name(), self.elem.name()),
            ));
        }
        Ok(Value::List(rows.into_iter().map(Value::Array).collect()))
    }

    fn exists(&self, node: &Node, key: &str) -> Result<bool> {
        node.has_child(key)
    }
}

/// `map[K, V]` with columnar values as parallel `keys` / `values` datasets
pub struct PrimitiveMapHandler {
    descriptor: TypeDescriptor,
    key: TypeDescriptor,
    value: TypeDescriptor,
}

impl Handler for PrimitiveMapHandler {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Collection(CollectionKind::Homogeneous)
    }

    fn write(&self, node: &Node, key: &str, value: &Value) -> Result<()> {
        if value.is_absent() {
            return node.delete(key);
        }
        let path = join_path(node.path(), key);
        let pairs = expect_map(value, &self.descriptor, &path)?;
        let (keys, values): (Vec<Value>, Vec<Value>) = pairs.iter().cloned().unzip();
        let keys = to_column(&self.key, &keys, &path)?;
        let values = to_column(&self.value, &values, &path)?;

        node.delete(key)?;
        let group = node.require_group(key)?;
        write_column(&group, KEYS, &keys)?;
        write_column(&group, VALUES, &values)
    }

    fn read(&self, node: &Node, key: &str) -> Result<Value> {
        let group = node.child(key)?;
        if !group.exists()? {
            return Ok(Value::Map(Vec::new()));
        }
        let path = group.path().to_string();
        let keys = read_column(&group, KEYS)?
            .ok_or_else(|| StoreError::corrupt(&path, "map lacks its keys dataset"))?;
        let values = read_column(&group, VALUES)?
            .ok_or_else(|| StoreError::corrupt(&path, "map lacks its values dataset"))?;
        let keys = from_column(&self.key, keys, &path)?;
        let values = from_column(&self.value, values, &path)?;
        if keys.len() != values.len() {
            return Err(StoreError::corrupt(
                &path,
                format!("{} keys but {} values", keys.len(), values.len()),
            ));
        }
        Ok(Value::Map(keys.into_iter().zip(values).collect()))
    }

    fn exists(&self, node: &Node, key: &str) -> Result<bool> {
        node.has_child(key)
    }
}

/// One slot per element below a group: positions `0..length` for lists, a
/// `_keys` manifest naming the slots for maps.
pub struct NestedGroupHandler {
    descriptor: TypeDescriptor,
    /// Key type for maps, `None` for lists
    key: Option<TypeDescriptor>,
    inner: Arc<dyn Handler>,
}

impl Handler for NestedGroupHandler {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Collection(CollectionKind::NestedGroup)
    }

    fn write(&self, node: &Node, key: &str, value: &Value) -> Result<()> {
        if value.is_absent() {
            return node.delete(key);
        }
        let path = join_path(node.path(), key);
        match &self.key {
            None => {
                let items = expect_list(value, &self.descriptor, &path)?;
                node.delete(key)?;
                let group = node.require_group(key)?;
                group.set_attr(LENGTH_ATTR, AttrValue::Int(items.len() as i64))?;
                for (idx, item) in items.iter().enumerate() {
                    self.inner.write(&group, &idx.to_string(), item)?;
                }
                Ok(())
            }
            Some(key_ty) => {
                let pairs = expect_map(value, &self.descriptor, &path)?;
                let names = pairs
                    .iter()
                    .map(|(k, _)| key_to_string(k, key_ty, &path))
                    .collect::<Result<Vec<_>>>()?;
                if names.iter().any(|n| n == MAP_MANIFEST) {
                    return Err(StoreError::schema(
                        &path,
                        format!("'{}' is reserved and cannot be a map key", MAP_MANIFEST),
                    ));
                }
                node.delete(key)?;
                let group = node.require_group(key)?;
                columnar::write_strings(&group, MAP_MANIFEST, &names)?;
                for (name, (_, item)) in names.iter().zip(pairs) {
                    self.inner.write(&group, name, item)?;
                }
                Ok(())
            }
        }
    }

    fn read(&self, node: &Node, key: &str) -> Result<Value> {
        let group = node.child(key)?;
        match &self.key {
            None => {
                if !group.exists()? {
                    return Ok(Value::List(Vec::new()));
                }
                let length = group
                    .int_attr(LENGTH_ATTR)?
                    .ok_or_else(|| StoreError::corrupt(group.path(), "list lacks its length"))?;
                (0..length.max(0))
                    .map(|idx| self.inner.read(&group, &idx.to_string()))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List)
            }
            Some(key_ty) => {
                if !group.exists()? {
                    return Ok(Value::Map(Vec::new()));
                }
                let names = columnar::read_strings(&group, MAP_MANIFEST)?
                    .ok_or_else(|| StoreError::corrupt(group.path(), "map lacks its key manifest"))?;
                let mut pairs = Vec::with_capacity(names.len());
                for name in names {
                    let item = self.inner.read(&group, &name)?;
                    pairs.push((key_from_string(name, key_ty, group.path())?, item));
                }
                Ok(Value::Map(pairs))
            }
        }
    }

    fn exists(&self, node: &Node, key: &str) -> Result<bool> {
        node.has_child(key)
    }
}
