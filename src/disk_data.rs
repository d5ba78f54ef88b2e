//! Disk Data
//!
//! A set of named collection fields over a permanent root node, optionally
//! staged through a scratch root. In proxied placement nothing touches the
//! permanent container until [`DiskData::save_to_disk`] copies the staged
//! entries across; a crash in between leaves only scratch inconsistent, and
//! scratch can be thrown away with [`DiskData::discard_changes`].

use crate::codec::columnar;
use crate::error::{Result, StoreError};
use crate::registry::Record;
use crate::store::{AttrValue, Container, Node};
use crate::views::{
    self, Backing, CollectionType, DiskDict, DiskList, Placement, COLLECTION_ATTR, DIRTY_ATTR,
    MANIFEST, MAX_INDEX_ATTR,
};
use std::collections::HashSet;

/// A named collection field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub kind: CollectionType,
}

impl FieldDecl {
    pub fn dict(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: CollectionType::Dict,
        }
    }

    pub fn list(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: CollectionType::List,
        }
    }
}

#[derive(Debug, Clone)]
enum Roots {
    Direct(Node),
    Proxied { permanent: Node, scratch: Node },
}

pub struct DiskData {
    roots: Roots,
    fields: Vec<FieldDecl>,
}

impl DiskData {
    /// Every mutation goes straight to `root`
    pub fn direct(root: Node, fields: Vec<FieldDecl>) -> Result<Self> {
        let data = Self::build(Roots::Direct(root), fields)?;
        for field in &data.fields {
            Backing::open(data.placement(field)?, field.kind)?;
        }
        Ok(data)
    }

    /// Mutations are staged below `scratch` until saved into `root`
    pub fn proxied(root: Node, scratch: Node, fields: Vec<FieldDecl>) -> Result<Self> {
        Self::build(
            Roots::Proxied {
                permanent: root,
                scratch,
            },
            fields,
        )
    }

    /// Proxied over a fresh in-memory scratch container when `proxied` is set
    pub fn open(root: Node, proxied: bool, fields: Vec<FieldDecl>) -> Result<Self> {
        if proxied {
            Self::proxied(root, Container::in_memory().root(), fields)
        } else {
            Self::direct(root, fields)
        }
    }

    fn build(roots: Roots, fields: Vec<FieldDecl>) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(StoreError::DuplicateType(format!(
                    "field '{}' declared twice",
                    field.name
                )));
            }
        }
        Ok(Self { roots, fields })
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.roots, Roots::Direct(_))
    }

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    fn declared(&self, name: &str, kind: CollectionType) -> Result<&FieldDecl> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.kind == kind)
            .ok_or_else(|| StoreError::UndeclaredField(format!("{} '{}'", kind, name)))
    }

    fn placement(&self, field: &FieldDecl) -> Result<Placement> {
        Ok(match &self.roots {
            Roots::Direct(root) => Placement::Direct(root.child(&field.name)?),
            Roots::Proxied { permanent, scratch } => Placement::Proxied {
                permanent: permanent.child(&field.name)?,
                scratch: scratch.child(&field.name)?,
            },
        })
    }

    pub fn dict<T: Record>(&self, name: &str) -> Result<DiskDict<T>> {
        let field = self.declared(name, CollectionType::Dict)?;
        DiskDict::open(self.placement(field)?)
    }

    pub fn list<T: Record>(&self, name: &str) -> Result<DiskList<T>> {
        let field = self.declared(name, CollectionType::List)?;
        DiskList::open(self.placement(field)?)
    }

    /// Move staged changes into the permanent container. Returns whether
    /// anything was modified; a direct placement only flushes.
    pub fn save_to_disk(&self) -> Result<bool> {
        let (permanent_root, scratch_root) = match &self.roots {
            Roots::Direct(root) => {
                root.flush()?;
                return Ok(false);
            }
            Roots::Proxied { permanent, scratch } => (permanent, scratch),
        };

        let mut changed = false;
        for field in &self.fields {
            let scratch = scratch_root.child(&field.name)?;
            if !scratch.exists()? || !scratch.has_attr(DIRTY_ATTR)? {
                continue;
            }
            let permanent = permanent_root.child(&field.name)?;
            let logical = views::read_manifest(&scratch)?.unwrap_or_default();
            let live: HashSet<&str> = logical.iter().map(String::as_str).collect();

            let stale = views::read_manifest(&permanent)?.unwrap_or_default();
            let mut removed = 0;
            for key in stale.iter().filter(|k| !live.contains(k.as_str())) {
                permanent.delete(key)?;
                removed += 1;
            }

            permanent.ensure()?;
            permanent.set_attr(COLLECTION_ATTR, AttrValue::Str(field.kind.name().to_string()))?;
            let mut copied = 0;
            for key in scratch.children()? {
                if key == MANIFEST {
                    continue;
                }
                scratch.child(&key)?.copy_to(&permanent.child(&key)?)?;
                copied += 1;
            }
            columnar::write_strings(&permanent, MANIFEST, &logical)?;
            if let Some(max_index) = scratch.int_attr(MAX_INDEX_ATTR)? {
                permanent.set_attr(MAX_INDEX_ATTR, AttrValue::Int(max_index))?;
            }

            scratch_root.delete(&field.name)?;
            tracing::info!(
                field = %field.name,
                copied,
                removed,
                live = logical.len(),
                "saved staged collection"
            );
            changed = true;
        }

        if changed {
            permanent_root.flush()?;
        }
        Ok(changed)
    }

    /// Drop everything staged since the last save
    pub fn discard_changes(&self) -> Result<()> {
        if let Roots::Proxied { scratch, .. } = &self.roots {
            for field in &self.fields {
                scratch.delete(&field.name)?;
            }
            tracing::info!(path = %scratch.path(), "discarded staged changes");
        }
        Ok(())
    }
}
