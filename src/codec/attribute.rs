//! Scalar/attribute codec.
//!
//! Primitives live in the attribute slots of their parent node. Datetimes are
//! stored as integer microseconds since the Unix epoch (UTC) and durations as
//! integer microseconds; absent attributes read back as a default.

use crate::error::{Result, StoreError};
use crate::registry::Handler;
use crate::store::{AttrValue, Node};
use crate::types::{TypeDescriptor, TypeKind, Value};
use chrono::{DateTime, TimeDelta, Utc};

pub fn datetime_to_micros(value: &DateTime<Utc>) -> i64 {
    value.timestamp_micros()
}

pub fn micros_to_datetime(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

pub fn duration_to_micros(value: &TimeDelta) -> Option<i64> {
    value.num_microseconds()
}

pub fn micros_to_duration(micros: i64) -> TimeDelta {
    TimeDelta::microseconds(micros)
}

/// Zero value of a descriptor, used when an absent field has no declared default
pub fn zero_value(ty: &TypeDescriptor) -> Value {
    match ty {
        TypeDescriptor::Bool => Value::Bool(false),
        TypeDescriptor::Int => Value::Int(0),
        TypeDescriptor::Float => Value::Float(0.0),
        TypeDescriptor::Str => Value::Str(String::new()),
        TypeDescriptor::Bytes => Value::Bytes(Vec::new()),
        TypeDescriptor::DateTime => Value::DateTime(DateTime::<Utc>::UNIX_EPOCH),
        TypeDescriptor::Duration => Value::Duration(TimeDelta::zero()),
        TypeDescriptor::Array(t) => Value::Array(crate::types::ArrayValue::empty(*t)),
        TypeDescriptor::List(_) => Value::List(Vec::new()),
        TypeDescriptor::Map(_, _) => Value::Map(Vec::new()),
        TypeDescriptor::Optional(_) | TypeDescriptor::Record(_) => Value::Absent,
    }
}

/// Project a primitive value onto its attribute representation
pub fn to_attr(ty: &TypeDescriptor, value: &Value, path: &str) -> Result<AttrValue> {
    let attr = match (ty, value) {
        (TypeDescriptor::Bool, Value::Bool(v)) => AttrValue::Bool(*v),
        (TypeDescriptor::Int, Value::Int(v)) => AttrValue::Int(*v),
        (TypeDescriptor::Float, Value::Float(v)) => AttrValue::Float(*v),
        (TypeDescriptor::Float, Value::Int(v)) => AttrValue::Float(*v as f64),
        (TypeDescriptor::Str, Value::Str(v)) => AttrValue::Str(v.clone()),
        (TypeDescriptor::Bytes, Value::Bytes(v)) => AttrValue::Bytes(v.clone()),
        (TypeDescriptor::DateTime, Value::DateTime(v)) => AttrValue::Int(datetime_to_micros(v)),
        (TypeDescriptor::Duration, Value::Duration(v)) => {
            AttrValue::Int(duration_to_micros(v).ok_or_else(|| {
                StoreError::schema(path, "duration overflows i64 microseconds")
            })?)
        }
        (ty, value) => {
            return Err(StoreError::schema(
                path,
                format!("cannot store {} value as {}", value.type_name(), ty),
            ))
        }
    };
    Ok(attr)
}

/// Invert [`to_attr`]; a mismatched attribute type is field-level corruption
pub fn from_attr(ty: &TypeDescriptor, attr: AttrValue, path: &str) -> Result<Value> {
    let value = match (ty, attr) {
        (TypeDescriptor::Bool, AttrValue::Bool(v)) => Value::Bool(v),
        (TypeDescriptor::Int, AttrValue::Int(v)) => Value::Int(v),
        (TypeDescriptor::Float, AttrValue::Float(v)) => Value::Float(v),
        (TypeDescriptor::Float, AttrValue::Int(v)) => Value::Float(v as f64),
        (TypeDescriptor::Str, AttrValue::Str(v)) => Value::Str(v),
        (TypeDescriptor::Bytes, AttrValue::Bytes(v)) => Value::Bytes(v),
        (TypeDescriptor::DateTime, AttrValue::Int(v)) => {
            Value::DateTime(micros_to_datetime(v).ok_or_else(|| {
                StoreError::corrupt(path, format!("timestamp {} out of range", v))
            })?)
        }
        (TypeDescriptor::Duration, AttrValue::Int(v)) => Value::Duration(micros_to_duration(v)),
        (ty, attr) => {
            return Err(StoreError::corrupt(
                path,
                format!("stored {} cannot be read as {}", attr.type_name(), ty),
            ))
        }
    };
    Ok(value)
}

/// Handler storing one primitive in an attribute slot
pub struct AttributeHandler {
    descriptor: TypeDescriptor,
}

impl AttributeHandler {
    pub fn new(descriptor: TypeDescriptor) -> Self {
        Self { descriptor }
    }

    /// Read with an explicit fallback for an absent attribute
    pub fn read_or(&self, node: &Node, key: &str, default: Option<&Value>) -> Result<Value> {
        match node.attr(key)? {
            Some(attr) => from_attr(&self.descriptor, attr, node.path()),
            None => Ok(default
                .cloned()
                .unwrap_or_else(|| zero_value(&self.descriptor))),
        }
    }
}

impl Handler for AttributeHandler {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Primitive
    }

    fn write(&self, node: &Node, key: &str, value: &Value) -> Result<()> {
        if value.is_absent() {
            return node.del_attr(key);
        }
        let attr = to_attr(&self.descriptor, value, node.path())?;
        node.set_attr(key, attr)
    }

    fn read(&self, node: &Node, key: &str) -> Result<Value> {
        self.read_or(node, key, None)
    }

    fn exists(&self, node: &Node, key: &str) -> Result<bool> {
        node.has_attr(key)
    }
}
