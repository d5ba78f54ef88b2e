//! Hierarchical Container Store
//!
//! A tree of nodes addressed by absolute `/`-separated paths. Each node carries
//! a set of attributes, any number of children, and at most one dataset
//! payload (the HDF5 group/attribute/dataset model). Backends implement
//! [`Backend`]; everything above this module works through [`Node`] handles.

pub mod memory;
pub mod persistence;

use crate::config::{BackendKind, StorageConfig};
use crate::error::{Result, StoreError};
use crate::types::ScalarType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use memory::MemoryBackend;
pub use persistence::SledBackend;

/// Scalar value stored in a node attribute slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    IntList(Vec<i64>),
    FloatList(Vec<f64>),
    StrList(Vec<String>),
}

impl AttrValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Str(_) => "str",
            AttrValue::Bytes(_) => "bytes",
            AttrValue::IntList(_) => "int-list",
            AttrValue::FloatList(_) => "float-list",
            AttrValue::StrList(_) => "str-list",
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(v) => write!(f, "{}", v),
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Str(v) => write!(f, "{:?}", v),
            AttrValue::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
            AttrValue::IntList(v) => write!(f, "{:?}", v),
            AttrValue::FloatList(v) => write!(f, "{:?}", v),
            AttrValue::StrList(v) => write!(f, "{:?}", v),
        }
    }
}

/// Element type of one compound-row sub-field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Scalar(ScalarType),
    /// u32 byte length, then UTF-8, NUL-padded to a fixed cell width
    FixedStr(usize),
}

impl FieldType {
    pub fn width(self) -> usize {
        match self {
            FieldType::Scalar(t) => t.width(),
            FieldType::FixedStr(w) => w,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundField {
    pub name: String,
    pub ty: FieldType,
}

/// Layout of a dataset's binary payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DType {
    /// Flat array of one scalar type
    Scalar(ScalarType),
    /// Fixed-width rows, one sub-field per column, packed without padding
    Compound(Vec<CompoundField>),
    /// Variable-length UTF-8 strings, each prefixed by a u32 byte length
    Text,
}

impl DType {
    /// Bytes per row, or `None` for variable-width text
    pub fn row_width(&self) -> Option<usize> {
        match self {
            DType::Scalar(t) => Some(t.width()),
            DType::Compound(fields) => Some(fields.iter().map(|f| f.ty.width()).sum()),
            DType::Text => None,
        }
    }
}

/// Dataset payload attached to a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub dtype: DType,
    /// Number of rows (elements)
    pub len: usize,
    pub data: Vec<u8>,
}

impl Dataset {
    pub fn shape_label(&self) -> String {
        match &self.dtype {
            DType::Scalar(t) => format!("{}[{}]", t.name(), self.len),
            DType::Compound(fields) => format!("compound({})[{}]", fields.len(), self.len),
            DType::Text => format!("text[{}]", self.len),
        }
    }
}

/// Storage backend contract; paths are absolute and already validated.
pub trait Backend: Send + Sync {
    /// Create the node at `path` and any missing ancestors
    fn create_group(&self, path: &str) -> Result<()>;
    fn exists(&self, path: &str) -> Result<bool>;
    /// Names of direct children, sorted
    fn list_children(&self, path: &str) -> Result<Vec<String>>;
    /// Remove the node, its attributes, its dataset, and all descendants
    fn remove_subtree(&self, path: &str) -> Result<()>;
    fn set_attr(&self, path: &str, name: &str, value: &AttrValue) -> Result<()>;
    fn get_attr(&self, path: &str, name: &str) -> Result<Option<AttrValue>>;
    fn remove_attr(&self, path: &str, name: &str) -> Result<()>;
    /// All attributes sorted by name
    fn list_attrs(&self, path: &str) -> Result<Vec<(String, AttrValue)>>;
    fn put_dataset(&self, path: &str, dataset: &Dataset) -> Result<()>;
    fn get_dataset(&self, path: &str) -> Result<Option<Dataset>>;
    fn flush(&self) -> Result<()>;
    fn label(&self) -> &str;
}

pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

fn validate_name(parent: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(StoreError::schema(
            parent,
            format!("invalid node name {:?}", name),
        ));
    }
    Ok(())
}

/// Handle to one node of a container
#[derive(Clone)]
pub struct Node {
    backend: Arc<dyn Backend>,
    path: String,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}:{})", self.backend.label(), self.path)
    }
}

impl Node {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path component ("/" for the root)
    pub fn name(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) if self.path.len() > 1 => &self.path[idx + 1..],
            _ => "/",
        }
    }

    /// Handle to a child; the child may not exist yet
    pub fn child(&self, name: &str) -> Result<Node> {
        validate_name(&self.path, name)?;
        Ok(Node {
            backend: self.backend.clone(),
            path: join_path(&self.path, name),
        })
    }

    /// Resolve a relative `a/b/c` path below this node
    pub fn descend(&self, relative: &str) -> Result<Node> {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .try_fold(self.clone(), |node, part| node.child(part))
    }

    pub fn exists(&self) -> Result<bool> {
        self.backend.exists(&self.path)
    }

    /// Create this node and any missing ancestors
    pub fn ensure(&self) -> Result<()> {
        if !self.exists()? {
            self.backend.create_group(&self.path)?;
        }
        Ok(())
    }

    pub fn has_child(&self, name: &str) -> Result<bool> {
        self.child(name)?.exists()
    }

    /// Create the child group, failing if it already exists
    pub fn create_group(&self, name: &str) -> Result<Node> {
        let child = self.child(name)?;
        if child.exists()? {
            return Err(StoreError::schema(
                child.path(),
                "node already exists",
            ));
        }
        self.backend.create_group(&child.path)?;
        Ok(child)
    }

    /// Open the child group, creating it when missing
    pub fn require_group(&self, name: &str) -> Result<Node> {
        let child = self.child(name)?;
        if !child.exists()? {
            self.backend.create_group(&child.path)?;
        }
        Ok(child)
    }

    pub fn children(&self) -> Result<Vec<String>> {
        self.backend.list_children(&self.path)
    }

    /// Delete the named child subtree; missing children are ignored
    pub fn delete(&self, name: &str) -> Result<()> {
        let child = self.child(name)?;
        tracing::debug!(path = %child.path, "delete node");
        self.backend.remove_subtree(&child.path)
    }

    pub fn set_attr(&self, name: &str, value: AttrValue) -> Result<()> {
        self.backend.set_attr(&self.path, name, &value)
    }

    pub fn attr(&self, name: &str) -> Result<Option<AttrValue>> {
        self.backend.get_attr(&self.path, name)
    }

    pub fn has_attr(&self, name: &str) -> Result<bool> {
        Ok(self.attr(name)?.is_some())
    }

    pub fn del_attr(&self, name: &str) -> Result<()> {
        self.backend.remove_attr(&self.path, name)
    }

    pub fn attrs(&self) -> Result<Vec<(String, AttrValue)>> {
        self.backend.list_attrs(&self.path)
    }

    /// Read a string attribute; `Ok(None)` when absent
    pub fn str_attr(&self, name: &str) -> Result<Option<String>> {
        match self.attr(name)? {
            None => Ok(None),
            Some(AttrValue::Str(s)) => Ok(Some(s)),
            Some(other) => Err(StoreError::corrupt(
                &self.path,
                format!("attribute '{}' is {}, expected str", name, other.type_name()),
            )),
        }
    }

    /// Read an integer attribute; `Ok(None)` when absent
    pub fn int_attr(&self, name: &str) -> Result<Option<i64>> {
        match self.attr(name)? {
            None => Ok(None),
            Some(AttrValue::Int(v)) => Ok(Some(v)),
            Some(other) => Err(StoreError::corrupt(
                &self.path,
                format!("attribute '{}' is {}, expected int", name, other.type_name()),
            )),
        }
    }

    /// Replace the child `name` with a leaf node holding `dataset`
    pub fn write_dataset(&self, name: &str, dataset: Dataset) -> Result<Node> {
        let child = self.child(name)?;
        self.backend.remove_subtree(&child.path)?;
        self.backend.create_group(&child.path)?;
        self.backend.put_dataset(&child.path, &dataset)?;
        Ok(child)
    }

    /// Dataset payload of this node, if any
    pub fn dataset(&self) -> Result<Option<Dataset>> {
        self.backend.get_dataset(&self.path)
    }

    /// Dataset payload of the child `name`, if the child exists and has one
    pub fn read_dataset(&self, name: &str) -> Result<Option<Dataset>> {
        self.child(name)?.dataset()
    }

    /// Replace `dest` with a deep copy of this subtree; works across backends.
    pub fn copy_to(&self, dest: &Node) -> Result<()> {
        dest.backend.remove_subtree(&dest.path)?;
        self.copy_into(dest)
    }

    fn copy_into(&self, dest: &Node) -> Result<()> {
        dest.backend.create_group(&dest.path)?;
        for (name, value) in self.attrs()? {
            dest.set_attr(&name, value)?;
        }
        if let Some(dataset) = self.dataset()? {
            dest.backend.put_dataset(&dest.path, &dataset)?;
        }
        for name in self.children()? {
            self.child(&name)?.copy_into(&dest.child(&name)?)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }
}

/// An open container; cloning shares the backend
#[derive(Clone)]
pub struct Container {
    backend: Arc<dyn Backend>,
}

impl Container {
    pub fn from_backend(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Volatile container, used for scratch staging and tests
    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(MemoryBackend::new()))
    }

    /// Durable container backed by a sled database directory
    pub fn open_sled(path: &Path) -> Result<Self> {
        Ok(Self::from_backend(Arc::new(SledBackend::open(path)?)))
    }

    /// Open whichever backend the configuration names
    pub fn open(config: &StorageConfig) -> Result<Self> {
        match config.backend {
            BackendKind::Memory => Ok(Self::in_memory()),
            BackendKind::Sled => {
                let path = config.resolve_path()?;
                std::fs::create_dir_all(&path)?;
                Ok(Self::from_backend(Arc::new(SledBackend::open_with(
                    &path,
                    config.cache_capacity_bytes,
                    config.flush_every_ms,
                )?)))
            }
        }
    }

    pub fn root(&self) -> Node {
        Node {
            backend: self.backend.clone(),
            path: "/".to_string(),
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_names_and_paths() {
        let root = Container::in_memory().root();
        assert_eq!(root.name(), "/");
        let child = root.child("spectra").unwrap();
        assert_eq!(child.path(), "/spectra");
        let grandchild = child.child("0").unwrap();
        assert_eq!(grandchild.path(), "/spectra/0");
        assert_eq!(grandchild.name(), "0");
        assert!(root.child("a/b").is_err());
        assert!(root.child("").is_err());
        assert_eq!(root.descend("a/b").unwrap().path(), "/a/b");
    }

    #[test]
    fn test_copy_between_backends() {
        let source = Container::in_memory().root();
        let group = source.require_group("entry").unwrap();
        group.set_attr("type", AttrValue::Str("Peak".into())).unwrap();
        group
            .write_dataset(
                "values",
                Dataset {
                    dtype: DType::Scalar(ScalarType::U8),
                    len: 3,
                    data: vec![1, 2, 3],
                },
            )
            .unwrap();
        group.require_group("nested").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest_root = Container::open_sled(dir.path()).unwrap().root();
        dest_root.require_group("entry").unwrap().set_attr("stale", AttrValue::Int(1)).unwrap();
        group.copy_to(&dest_root.child("entry").unwrap()).unwrap();

        let copied = dest_root.child("entry").unwrap();
        assert_eq!(copied.str_attr("type").unwrap().as_deref(), Some("Peak"));
        assert_eq!(copied.attr("stale").unwrap(), None);
        assert_eq!(copied.children().unwrap(), vec!["nested", "values"]);
        assert_eq!(copied.read_dataset("values").unwrap().unwrap().data, vec![1, 2, 3]);
    }
}
