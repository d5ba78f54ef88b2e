//! In-memory backend used for scratch containers and tests.

use super::{AttrValue, Backend, Dataset};
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
struct NodeEntry {
    attrs: BTreeMap<String, AttrValue>,
    dataset: Option<Dataset>,
}

/// Node table keyed by absolute path
pub struct MemoryBackend {
    nodes: RwLock<BTreeMap<String, NodeEntry>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), NodeEntry::default());
        Self {
            nodes: RwLock::new(nodes),
        }
    }
}

fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{}/", path)
    }
}

fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(move |(idx, _)| if idx == 0 { "/" } else { &path[..idx] })
}

impl Backend for MemoryBackend {
    fn create_group(&self, path: &str) -> Result<()> {
        let mut nodes = self.nodes.write();
        for ancestor in ancestors(path) {
            nodes.entry(ancestor.to_string()).or_default();
        }
        nodes.entry(path.to_string()).or_default();
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.nodes.read().contains_key(path))
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>> {
        let prefix = child_prefix(path);
        let nodes = self.nodes.read();
        let children = nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        Ok(children)
    }

    fn remove_subtree(&self, path: &str) -> Result<()> {
        let prefix = child_prefix(path);
        let mut nodes = self.nodes.write();
        let doomed: Vec<String> = nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            nodes.remove(&key);
        }
        if path == "/" {
            nodes.insert("/".to_string(), NodeEntry::default());
        } else {
            nodes.remove(path);
        }
        Ok(())
    }

    fn set_attr(&self, path: &str, name: &str, value: &AttrValue) -> Result<()> {
        self.nodes
            .write()
            .entry(path.to_string())
            .or_default()
            .attrs
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    fn get_attr(&self, path: &str, name: &str) -> Result<Option<AttrValue>> {
        Ok(self
            .nodes
            .read()
            .get(path)
            .and_then(|entry| entry.attrs.get(name).cloned()))
    }

    fn remove_attr(&self, path: &str, name: &str) -> Result<()> {
        if let Some(entry) = self.nodes.write().get_mut(path) {
            entry.attrs.remove(name);
        }
        Ok(())
    }

    fn list_attrs(&self, path: &str) -> Result<Vec<(String, AttrValue)>> {
        Ok(self
            .nodes
            .read()
            .get(path)
            .map(|entry| {
                entry
                    .attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn put_dataset(&self, path: &str, dataset: &Dataset) -> Result<()> {
        self.nodes.write().entry(path.to_string()).or_default().dataset = Some(dataset.clone());
        Ok(())
    }

    fn get_dataset(&self, path: &str) -> Result<Option<Dataset>> {
        Ok(self
            .nodes
            .read()
            .get(path)
            .and_then(|entry| entry.dataset.clone()))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn label(&self) -> &str {
        "memory"
    }
}
