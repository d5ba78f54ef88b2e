//! Sled-backed durable container.
//!
//! Three trees hold the node table, the attributes (`path \0 name`) and the
//! dataset payloads. Values are bincode-encoded.

use super::{AttrValue, Backend, Dataset};
use crate::error::Result;
use sled::{Batch, Db, Tree};
use std::path::Path;

const NODES_TREE: &str = "nodes";
const ATTRS_TREE: &str = "attrs";
const DATASETS_TREE: &str = "datasets";
const EMPTY: &[u8] = &[];

pub struct SledBackend {
    db: Db,
    nodes: Tree,
    attrs: Tree,
    datasets: Tree,
}

fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{}/", path)
    }
}

fn attr_key(path: &str, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(path.len() + name.len() + 1);
    key.extend_from_slice(path.as_bytes());
    key.push(0);
    key.extend_from_slice(name.as_bytes());
    key
}

fn attr_prefix(path: &str) -> Vec<u8> {
    let mut key = path.as_bytes().to_vec();
    key.push(0);
    key
}

impl SledBackend {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    pub fn open_with(path: &Path, cache_capacity: u64, flush_every_ms: Option<u64>) -> Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .cache_capacity(cache_capacity)
            .flush_every_ms(flush_every_ms)
            .open()?;
        Self::from_db(db)
    }

    /// Throwaway database removed when dropped
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    pub fn from_db(db: Db) -> Result<Self> {
        let backend = Self {
            nodes: db.open_tree(NODES_TREE)?,
            attrs: db.open_tree(ATTRS_TREE)?,
            datasets: db.open_tree(DATASETS_TREE)?,
            db,
        };
        backend.nodes.insert("/", EMPTY)?;
        Ok(backend)
    }

    fn remove_prefixed(tree: &Tree, prefix: &[u8], batch: &mut Batch) -> Result<()> {
        for item in tree.scan_prefix(prefix) {
            let (key, _) = item?;
            batch.remove(key);
        }
        Ok(())
    }
}

impl Backend for SledBackend {
    fn create_group(&self, path: &str) -> Result<()> {
        let mut batch = Batch::default();
        for (idx, _) in path.match_indices('/') {
            let ancestor = if idx == 0 { "/" } else { &path[..idx] };
            batch.insert(ancestor, EMPTY);
        }
        batch.insert(path, EMPTY);
        self.nodes.apply_batch(batch)?;
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.nodes.contains_key(path)?)
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>> {
        let prefix = child_prefix(path);
        let mut children = Vec::new();
        for item in self.nodes.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let key = String::from_utf8_lossy(&key);
            let rest = &key[prefix.len()..];
            if !rest.is_empty() && !rest.contains('/') {
                children.push(rest.to_string());
            }
        }
        Ok(children)
    }

    fn remove_subtree(&self, path: &str) -> Result<()> {
        let descendants = child_prefix(path);

        let mut nodes = Batch::default();
        Self::remove_prefixed(&self.nodes, descendants.as_bytes(), &mut nodes)?;
        let mut attrs = Batch::default();
        Self::remove_prefixed(&self.attrs, descendants.as_bytes(), &mut attrs)?;
        Self::remove_prefixed(&self.attrs, &attr_prefix(path), &mut attrs)?;
        let mut datasets = Batch::default();
        Self::remove_prefixed(&self.datasets, descendants.as_bytes(), &mut datasets)?;
        datasets.remove(path);
        if path == "/" {
            nodes.insert("/", EMPTY);
        } else {
            nodes.remove(path);
        }

        self.nodes.apply_batch(nodes)?;
        self.attrs.apply_batch(attrs)?;
        self.datasets.apply_batch(datasets)?;
        Ok(())
    }

    fn set_attr(&self, path: &str, name: &str, value: &AttrValue) -> Result<()> {
        self.attrs
            .insert(attr_key(path, name), bincode::serialize(value)?)?;
        Ok(())
    }

    fn get_attr(&self, path: &str, name: &str) -> Result<Option<AttrValue>> {
        match self.attrs.get(attr_key(path, name))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn remove_attr(&self, path: &str, name: &str) -> Result<()> {
        self.attrs.remove(attr_key(path, name))?;
        Ok(())
    }

    fn list_attrs(&self, path: &str) -> Result<Vec<(String, AttrValue)>> {
        let prefix = attr_prefix(path);
        let mut attrs = Vec::new();
        for item in self.attrs.scan_prefix(&prefix) {
            let (key, value) = item?;
            let name = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
            attrs.push((name, bincode::deserialize(&value)?));
        }
        Ok(attrs)
    }

    fn put_dataset(&self, path: &str, dataset: &Dataset) -> Result<()> {
        self.datasets.insert(path, bincode::serialize(dataset)?)?;
        Ok(())
    }

    fn get_dataset(&self, path: &str) -> Result<Option<Dataset>> {
        match self.datasets.get(path)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn flush(&self) -> Result<()> {
        let bytes = self.db.flush()?;
        tracing::debug!(bytes, "flushed sled container");
        Ok(())
    }

    fn label(&self) -> &str {
        "sled"
    }
}
