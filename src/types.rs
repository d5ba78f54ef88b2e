//! Core value and type-descriptor types.
//!
//! A [`TypeDescriptor`] names the semantic type of a field; a [`Value`] is the
//! dynamic in-memory form every handler reads and writes. Typed records convert
//! to and from [`RecordValue`] through [`crate::registry::Record`].

use crate::error::{Result, StoreError};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fixed-width numeric element type of an array or column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Bool,
    U8,
    I32,
    I64,
    F32,
    F64,
}

impl ScalarType {
    /// Width in bytes of one element on disk
    pub fn width(self) -> usize {
        match self {
            ScalarType::Bool | ScalarType::U8 => 1,
            ScalarType::I32 | ScalarType::F32 => 4,
            ScalarType::I64 | ScalarType::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::U8 => "u8",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::F32 => "f32",
            ScalarType::F64 => "f64",
        }
    }
}

/// Homogeneous numeric array, kept at its native width
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayValue {
    Bool(Vec<bool>),
    U8(Vec<u8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ArrayValue {
    pub fn empty(ty: ScalarType) -> Self {
        match ty {
            ScalarType::Bool => ArrayValue::Bool(Vec::new()),
            ScalarType::U8 => ArrayValue::U8(Vec::new()),
            ScalarType::I32 => ArrayValue::I32(Vec::new()),
            ScalarType::I64 => ArrayValue::I64(Vec::new()),
            ScalarType::F32 => ArrayValue::F32(Vec::new()),
            ScalarType::F64 => ArrayValue::F64(Vec::new()),
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ArrayValue::Bool(_) => ScalarType::Bool,
            ArrayValue::U8(_) => ScalarType::U8,
            ArrayValue::I32(_) => ScalarType::I32,
            ArrayValue::I64(_) => ScalarType::I64,
            ArrayValue::F32(_) => ScalarType::F32,
            ArrayValue::F64(_) => ScalarType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayValue::Bool(v) => v.len(),
            ArrayValue::U8(v) => v.len(),
            ArrayValue::I32(v) => v.len(),
            ArrayValue::I64(v) => v.len(),
            ArrayValue::F32(v) => v.len(),
            ArrayValue::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements `start..stop` as a new array of the same type
    pub fn slice(&self, start: usize, stop: usize) -> ArrayValue {
        match self {
            ArrayValue::Bool(v) => ArrayValue::Bool(v[start..stop].to_vec()),
            ArrayValue::U8(v) => ArrayValue::U8(v[start..stop].to_vec()),
            ArrayValue::I32(v) => ArrayValue::I32(v[start..stop].to_vec()),
            ArrayValue::I64(v) => ArrayValue::I64(v[start..stop].to_vec()),
            ArrayValue::F32(v) => ArrayValue::F32(v[start..stop].to_vec()),
            ArrayValue::F64(v) => ArrayValue::F64(v[start..stop].to_vec()),
        }
    }

    /// Append `other` onto `self`; both must share an element type.
    pub fn extend_from(&mut self, other: &ArrayValue) -> Result<()> {
        match (self, other) {
            (ArrayValue::Bool(a), ArrayValue::Bool(b)) => a.extend_from_slice(b),
            (ArrayValue::U8(a), ArrayValue::U8(b)) => a.extend_from_slice(b),
            (ArrayValue::I32(a), ArrayValue::I32(b)) => a.extend_from_slice(b),
            (ArrayValue::I64(a), ArrayValue::I64(b)) => a.extend_from_slice(b),
            (ArrayValue::F32(a), ArrayValue::F32(b)) => a.extend_from_slice(b),
            (ArrayValue::F64(a), ArrayValue::F64(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(StoreError::schema(
                    "<array>",
                    format!(
                        "cannot concatenate {} onto {}",
                        b.scalar_type().name(),
                        a.scalar_type().name()
                    ),
                ))
            }
        }
        Ok(())
    }

    /// Element-wise equality where NaN equals NaN
    pub fn approx_eq(&self, other: &ArrayValue) -> bool {
        fn floats<T: Copy + Into<f64>>(a: &[T], b: &[T]) -> bool {
            a.len() == b.len()
                && a.iter().zip(b).all(|(x, y)| {
                    let (x, y): (f64, f64) = ((*x).into(), (*y).into());
                    (x.is_nan() && y.is_nan()) || x == y
                })
        }
        match (self, other) {
            (ArrayValue::F32(a), ArrayValue::F32(b)) => floats(a, b),
            (ArrayValue::F64(a), ArrayValue::F64(b)) => floats(a, b),
            (a, b) => a == b,
        }
    }
}

/// Semantic type of a field or collection element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    DateTime,
    Duration,
    /// Rank-1 numeric array
    Array(ScalarType),
    /// Registered record kind
    Record(String),
    List(Box<TypeDescriptor>),
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Optional(Box<TypeDescriptor>),
}

impl TypeDescriptor {
    pub fn record(kind: impl Into<String>) -> Self {
        TypeDescriptor::Record(kind.into())
    }

    pub fn list(inner: TypeDescriptor) -> Self {
        TypeDescriptor::List(Box::new(inner))
    }

    pub fn map(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Map(Box::new(key), Box::new(value))
    }

    pub fn optional(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Optional(Box::new(inner))
    }

    /// Scalars stored as node attributes
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Bool
                | TypeDescriptor::Int
                | TypeDescriptor::Float
                | TypeDescriptor::Str
                | TypeDescriptor::Bytes
                | TypeDescriptor::DateTime
                | TypeDescriptor::Duration
        )
    }

    /// Primitives with a fixed-width numeric column representation
    pub fn column_scalar(&self) -> Option<ScalarType> {
        match self {
            TypeDescriptor::Bool => Some(ScalarType::Bool),
            TypeDescriptor::Int | TypeDescriptor::DateTime | TypeDescriptor::Duration => {
                Some(ScalarType::I64)
            }
            TypeDescriptor::Float => Some(ScalarType::F64),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Bool => write!(f, "bool"),
            TypeDescriptor::Int => write!(f, "int"),
            TypeDescriptor::Float => write!(f, "float"),
            TypeDescriptor::Str => write!(f, "str"),
            TypeDescriptor::Bytes => write!(f, "bytes"),
            TypeDescriptor::DateTime => write!(f, "datetime"),
            TypeDescriptor::Duration => write!(f, "duration"),
            TypeDescriptor::Array(t) => write!(f, "array[{}]", t.name()),
            TypeDescriptor::Record(kind) => write!(f, "{}", kind),
            TypeDescriptor::List(t) => write!(f, "list[{}]", t),
            TypeDescriptor::Map(k, v) => write!(f, "map[{}, {}]", k, v),
            TypeDescriptor::Optional(t) => write!(f, "optional[{}]", t),
        }
    }
}

/// How a resolved handler lays its value out on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Primitive,
    Array,
    Record,
    Collection(CollectionKind),
}

/// On-disk representation chosen for a list or map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// One fixed-width row per flat record
    RowStore,
    /// A single typed array (or text dataset)
    Homogeneous,
    /// One child node per element
    NestedGroup,
}

/// A record's kind name plus its field values
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValue {
    pub kind: String,
    pub fields: BTreeMap<String, Value>,
}

impl RecordValue {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Remove a field and convert it; absent fields convert from [`Value::Absent`].
    pub fn take<T: FromValue>(&mut self, name: &str) -> Result<T> {
        let value = self.fields.remove(name).unwrap_or(Value::Absent);
        T::from_value(value).map_err(|reason| {
            StoreError::schema(format!("<{}>", self.kind), format!("field '{}': {}", name, reason))
        })
    }

    /// Deep equality with NaN-aware float comparison
    pub fn approx_eq(&self, other: &RecordValue) -> bool {
        self.kind == other.kind
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(k, v)| other.fields.get(k).map_or(false, |o| v.approx_eq(o)))
    }
}

/// Dynamic value flowing through every handler
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Field has no value; nothing is written for it
    Absent,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Duration(TimeDelta),
    Array(ArrayValue),
    Record(RecordValue),
    List(Vec<Value>),
    /// Ordered key/value pairs; keys are `Str` or `Int`
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Absent => "absent",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::DateTime(_) => "datetime",
            Value::Duration(_) => "duration",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Deep equality where float NaN equals NaN
    pub fn approx_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Value::Array(a), Value::Array(b)) => a.approx_eq(b),
            (Value::Record(a), Value::Record(b)) => a.approx_eq(b),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.approx_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.approx_eq(vb))
            }
            (a, b) => a == b,
        }
    }
}

/// Conversion out of a dynamic [`Value`]; the error is a short reason string.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> std::result::Result<Self, String>;
}

fn mismatch(expected: &str, got: &Value) -> String {
    format!("expected {}, found {}", expected, got.type_name())
}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident, $name:literal;)*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> std::result::Result<Self, String> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(mismatch($name, &other)),
                    }
                }
            }
        )*
    };
}

value_conversions! {
    bool => Bool, "bool";
    i64 => Int, "int";
    f64 => Float, "float";
    String => Str, "str";
    Vec<u8> => Bytes, "bytes";
    DateTime<Utc> => DateTime, "datetime";
    TimeDelta => Duration, "duration";
    ArrayValue => Array, "array";
    RecordValue => Record, "record";
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Array(ArrayValue::F64(v))
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::Array(ArrayValue::F32(v))
    }
}

impl FromValue for Vec<f64> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Array(ArrayValue::F64(v)) => Ok(v),
            other => Err(mismatch("array[f64]", &other)),
        }
    }
}

impl FromValue for Vec<f32> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Array(ArrayValue::F32(v)) => Ok(v),
            other => Err(mismatch("array[f32]", &other)),
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Absent, Into::into)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Absent => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_aware_equality() {
        let a = Value::Array(ArrayValue::F64(vec![1.0, f64::NAN]));
        let b = Value::Array(ArrayValue::F64(vec![1.0, f64::NAN]));
        assert_ne!(a, b);
        assert!(a.approx_eq(&b));
        assert!(Value::Float(f64::NAN).approx_eq(&Value::Float(f64::NAN)));
    }

    #[test]
    fn test_record_take_converts_and_reports_mismatch() {
        let mut record = RecordValue::new("Peak").with("mz", 301.5).with("label", "a");
        let mz: f64 = record.take("mz").unwrap();
        assert_eq!(mz, 301.5);
        let missing: Option<i64> = record.take("charge").unwrap();
        assert_eq!(missing, None);
        let err = record.take::<i64>("label").unwrap_err();
        assert!(matches!(err, StoreError::Schema { .. }));
    }

    #[test]
    fn test_descriptor_display() {
        let ty = TypeDescriptor::map(
            TypeDescriptor::Str,
            TypeDescriptor::list(TypeDescriptor::record("Peak")),
        );
        assert_eq!(ty.to_string(), "map[str, list[Peak]]");
    }
}
