//! Handlers translating [`Value`]s to container nodes.

pub mod attribute;
pub mod collection;
pub mod columnar;
pub mod record;

use crate::error::{Result, StoreError};
use crate::registry::Handler;
use crate::store::{join_path, Node};
use crate::types::{ScalarType, TypeDescriptor, TypeKind, Value};

/// Rank-1 numeric array stored as a homogeneous dataset
pub struct ArrayHandler {
    descriptor: TypeDescriptor,
    elem: ScalarType,
}

impl ArrayHandler {
    pub fn new(elem: ScalarType) -> Self {
        Self {
            descriptor: TypeDescriptor::Array(elem),
            elem,
        }
    }
}

impl Handler for ArrayHandler {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn kind(&self) -> TypeKind {
        TypeKind::Array
    }

    fn write(&self, node: &Node, key: &str, value: &Value) -> Result<()> {
        match value {
            Value::Absent => node.delete(key),
            Value::Array(values) if values.scalar_type() == self.elem => {
                columnar::write_array(node, key, values)
            }
            other => Err(StoreError::schema(
                node.path(),
                format!("cannot store {} as {}", other.type_name(), self.descriptor),
            )),
        }
    }

    fn read(&self, node: &Node, key: &str) -> Result<Value> {
        match columnar::read_array(node, key)? {
            Some(values) if values.scalar_type() == self.elem => Ok(Value::Array(values)),
            Some(values) => Err(StoreError::corrupt(
                join_path(node.path(), key),
                format!(
                    "stored {} array cannot be read as {}",
                    values.scalar_type().name(),
                    self.descriptor
                ),
            )),
            None => Ok(attribute::zero_value(&self.descriptor)),
        }
    }

    fn exists(&self, node: &Node, key: &str) -> Result<bool> {
        node.has_child(key)
    }
}
