//! Collection Views
//!
//! Keyed ([`DiskDict`]) and sequential ([`DiskList`]) collections of records
//! backed by one container node:
//!
//! ```text
//! <field>/_keys     text dataset, live keys in order
//! <field>/<key>     one record per live key
//! @collection       "dict" or "list"
//! @max_index        lists only; highest index ever allocated, -1 initially
//! @dirty            proxied scratch only; set by any mutation since the last save
//! ```
//!
//! The manifest is rewritten on every mutation so it always matches the
//! visible entries. In proxied placement mutations land in the scratch node
//! and reads prefer scratch, falling back to the permanent node.

pub mod dict;
pub mod list;

pub use dict::DiskDict;
pub use list::DiskList;

use crate::codec::{columnar, record};
use crate::error::{Result, StoreError};
use crate::registry::Record;
use crate::store::{AttrValue, Node};
use std::fmt;

pub const MANIFEST: &str = "_keys";
pub const MAX_INDEX_ATTR: &str = "max_index";
pub const COLLECTION_ATTR: &str = "collection";
pub const DIRTY_ATTR: &str = "dirty";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionType {
    Dict,
    List,
}

impl CollectionType {
    pub fn name(self) -> &'static str {
        match self {
            CollectionType::Dict => "dict",
            CollectionType::List => "list",
        }
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a collection lives
#[derive(Debug, Clone)]
pub enum Placement {
    Direct(Node),
    Proxied { permanent: Node, scratch: Node },
}

/// Manifest of `node`; `Ok(None)` when the node was never created
pub(crate) fn read_manifest(node: &Node) -> Result<Option<Vec<String>>> {
    if !node.exists()? {
        return Ok(None);
    }
    columnar::read_strings(node, MANIFEST)?
        .map(Some)
        .ok_or_else(|| StoreError::schema(node.path(), "collection lacks its key manifest"))
}

fn check_type(node: &Node, kind: CollectionType) -> Result<()> {
    match node.str_attr(COLLECTION_ATTR)? {
        Some(stored) if stored != kind.name() => Err(StoreError::schema(
            node.path(),
            format!("stored collection is a {}, opened as a {}", stored, kind),
        )),
        Some(_) => Ok(()),
        None => node.set_attr(COLLECTION_ATTR, AttrValue::Str(kind.name().to_string())),
    }
}

/// Create the manifest (and index counter) of a fresh collection node
fn initialize(node: &Node, kind: CollectionType, keys: &[String], max_index: i64) -> Result<()> {
    node.ensure()?;
    check_type(node, kind)?;
    if node.read_dataset(MANIFEST)?.is_none() {
        if !node.children()?.is_empty() {
            return Err(StoreError::schema(
                node.path(),
                "collection has entries but no key manifest",
            ));
        }
        columnar::write_strings(node, MANIFEST, keys)?;
    }
    if kind == CollectionType::List && node.int_attr(MAX_INDEX_ATTR)?.is_none() {
        node.set_attr(MAX_INDEX_ATTR, AttrValue::Int(max_index))?;
    }
    Ok(())
}

/// Storage plumbing shared by both view types
#[derive(Debug, Clone)]
pub(crate) struct Backing {
    placement: Placement,
    kind: CollectionType,
}

impl Backing {
    pub(crate) fn open(placement: Placement, kind: CollectionType) -> Result<Self> {
        match &placement {
            Placement::Direct(node) => initialize(node, kind, &[], -1)?,
            Placement::Proxied { permanent, scratch } => {
                if permanent.exists()? {
                    if let Some(stored) = permanent.str_attr(COLLECTION_ATTR)? {
                        if stored != kind.name() {
                            return Err(StoreError::schema(
                                permanent.path(),
                                format!("stored collection is a {}, opened as a {}", stored, kind),
                            ));
                        }
                    }
                }
                if scratch.exists()? {
                    check_type(scratch, kind)?;
                }
            }
        }
        Ok(Self { placement, kind })
    }

    pub(crate) fn path(&self) -> &str {
        match &self.placement {
            Placement::Direct(node) => node.path(),
            Placement::Proxied { permanent, .. } => permanent.path(),
        }
    }

    fn scratch_ready(scratch: &Node) -> Result<bool> {
        scratch.has_child(MANIFEST)
    }

    /// Node that currently holds the authoritative manifest
    fn source(&self) -> Result<Option<&Node>> {
        match &self.placement {
            Placement::Direct(node) => Ok(Some(node)),
            Placement::Proxied { permanent, scratch } => {
                if Self::scratch_ready(scratch)? {
                    Ok(Some(scratch))
                } else if permanent.exists()? {
                    Ok(Some(permanent))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Node mutations go to; seeds scratch from permanent on first use
    fn target(&self) -> Result<&Node> {
        match &self.placement {
            Placement::Direct(node) => Ok(node),
            Placement::Proxied { permanent, scratch } => {
                if !Self::scratch_ready(scratch)? {
                    let keys = read_manifest(permanent)?.unwrap_or_default();
                    let max_index = if permanent.exists()? {
                        permanent.int_attr(MAX_INDEX_ATTR)?.unwrap_or(-1)
                    } else {
                        -1
                    };
                    initialize(scratch, self.kind, &keys, max_index)?;
                    tracing::debug!(path = %scratch.path(), keys = keys.len(), "seeded scratch collection");
                }
                Ok(scratch)
            }
        }
    }

    fn mark_dirty(&self, target: &Node) -> Result<()> {
        if let Placement::Proxied { .. } = self.placement {
            target.set_attr(DIRTY_ATTR, AttrValue::Bool(true))?;
        }
        Ok(())
    }

    pub(crate) fn keys(&self) -> Result<Vec<String>> {
        match self.source()? {
            Some(node) => Ok(read_manifest(node)?.unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn set_keys(&self, keys: &[String]) -> Result<()> {
        let target = self.target()?;
        columnar::write_strings(target, MANIFEST, keys)?;
        self.mark_dirty(target)
    }

    pub(crate) fn max_index(&self) -> Result<i64> {
        match self.source()? {
            Some(node) => Ok(node.int_attr(MAX_INDEX_ATTR)?.unwrap_or(-1)),
            None => Ok(-1),
        }
    }

    pub(crate) fn set_max_index(&self, index: i64) -> Result<()> {
        let target = self.target()?;
        target.set_attr(MAX_INDEX_ATTR, AttrValue::Int(index))?;
        self.mark_dirty(target)
    }

    /// Node whose child `key` holds the current value of that entry
    fn entry_parent(&self, key: &str) -> Result<&Node> {
        match &self.placement {
            Placement::Direct(node) => Ok(node),
            Placement::Proxied { permanent, scratch } => {
                if scratch.has_child(key)? {
                    Ok(scratch)
                } else {
                    Ok(permanent)
                }
            }
        }
    }

    pub(crate) fn read<T: Record>(&self, key: &str) -> Result<T> {
        record::read(self.entry_parent(key)?, key)
    }

    pub(crate) fn write<T: Record>(&self, key: &str, value: &T) -> Result<()> {
        if key == MANIFEST {
            return Err(StoreError::schema(
                self.path(),
                format!("'{}' is reserved and cannot be a key", MANIFEST),
            ));
        }
        let target = self.target()?;
        record::write(target, key, value)?;
        self.mark_dirty(target)
    }

    /// Drop the stored entry. In proxied placement only the scratch copy goes;
    /// the permanent one is removed when the collection is saved.
    pub(crate) fn remove(&self, key: &str) -> Result<()> {
        let target = self.target()?;
        target.delete(key)?;
        self.mark_dirty(target)
    }
}
