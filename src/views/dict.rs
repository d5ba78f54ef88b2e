//! Keyed collection of records.

use super::{Backing, CollectionType, Placement};
use crate::error::{Result, StoreError};
use crate::registry::Record;
use crate::store::join_path;
use std::marker::PhantomData;

/// String-keyed map of `T` records persisted under one node
#[derive(Debug, Clone)]
pub struct DiskDict<T: Record> {
    backing: Backing,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> DiskDict<T> {
    pub fn open(placement: Placement) -> Result<Self> {
        Ok(Self {
            backing: Backing::open(placement, CollectionType::Dict)?,
            _marker: PhantomData,
        })
    }

    fn not_found(&self, key: &str) -> StoreError {
        StoreError::KeyNotFound(join_path(self.backing.path(), key))
    }

    pub fn get(&self, key: &str) -> Result<T> {
        if !self.contains_key(key)? {
            return Err(self.not_found(key));
        }
        self.backing.read(key)
    }

    pub fn get_opt(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::KeyNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Insert or overwrite; new keys go to the end of the manifest
    pub fn set(&self, key: &str, value: &T) -> Result<()> {
        self.backing.write(key, value)?;
        let mut keys = self.backing.keys()?;
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
            self.backing.set_keys(&keys)?;
        }
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let mut keys = self.backing.keys()?;
        let position = keys
            .iter()
            .position(|k| k == key)
            .ok_or_else(|| self.not_found(key))?;
        self.backing.remove(key)?;
        keys.remove(position);
        self.backing.set_keys(&keys)?;
        tracing::debug!(path = %self.backing.path(), key, "deleted dict entry");
        Ok(())
    }

    pub fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.backing.keys()?.iter().any(|k| k == key))
    }

    /// Live keys in insertion order
    pub fn keys(&self) -> Result<Vec<String>> {
        self.backing.keys()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.backing.keys()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn values(&self) -> Result<Vec<T>> {
        self.backing
            .keys()?
            .iter()
            .map(|key| self.backing.read(key))
            .collect()
    }

    pub fn items(&self) -> Result<Vec<(String, T)>> {
        self.backing
            .keys()?
            .into_iter()
            .map(|key| {
                let value = self.backing.read(&key)?;
                Ok((key, value))
            })
            .collect()
    }

    pub fn clear(&self) -> Result<()> {
        for key in self.backing.keys()? {
            self.backing.remove(&key)?;
        }
        self.backing.set_keys(&[])
    }

    /// Replace the whole contents with `entries`, writing the manifest once
    pub fn replace_all<'a, I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a T)>,
        T: 'a,
    {
        for key in self.backing.keys()? {
            self.backing.remove(&key)?;
        }
        let mut keys: Vec<String> = Vec::new();
        for (key, value) in entries {
            self.backing.write(key, value)?;
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        self.backing.set_keys(&keys)
    }
}
