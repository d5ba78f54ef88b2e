//! Sequential collection of records.
//!
//! Entries are keyed by allocated indices rendered as decimal strings. The
//! manifest order is the list order; `max_index` only ever grows, so an index
//! is never handed out twice, not even after `clear`.

use super::{Backing, CollectionType, Placement};
use crate::error::{Result, StoreError};
use crate::registry::Record;
use std::marker::PhantomData;
use std::ops::{Bound, RangeBounds};

#[derive(Debug, Clone)]
pub struct DiskList<T: Record> {
    backing: Backing,
    _marker: PhantomData<fn() -> T>,
}

/// Clamp a range to `0..len` the way slicing a sequence does
fn resolve_range(range: impl RangeBounds<usize>, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let stop = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    let stop = stop.min(len);
    (start.min(stop), stop)
}

impl<T: Record> DiskList<T> {
    pub fn open(placement: Placement) -> Result<Self> {
        Ok(Self {
            backing: Backing::open(placement, CollectionType::List)?,
            _marker: PhantomData,
        })
    }

    fn key_at(keys: &[String], position: usize) -> Result<&str> {
        keys.get(position)
            .map(String::as_str)
            .ok_or(StoreError::IndexOutOfRange {
                index: position,
                len: keys.len(),
            })
    }

    /// Reserve the next index; persisted before any entry is written under it
    fn allocate(&self, count: usize) -> Result<Vec<i64>> {
        let first = self.backing.max_index()? + 1;
        let last = first + count as i64 - 1;
        if count > 0 {
            self.backing.set_max_index(last)?;
        }
        Ok((first..=last).collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.backing.keys()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Highest index ever allocated, -1 when none was
    pub fn max_index(&self) -> Result<i64> {
        self.backing.max_index()
    }

    /// Storage keys of the live entries, in list order
    pub fn indices(&self) -> Result<Vec<String>> {
        self.backing.keys()
    }

    pub fn get(&self, position: usize) -> Result<T> {
        let keys = self.backing.keys()?;
        self.backing.read(Self::key_at(&keys, position)?)
    }

    /// Overwrite the entry at `position`, keeping its index
    pub fn set(&self, position: usize, value: &T) -> Result<()> {
        let keys = self.backing.keys()?;
        self.backing.write(Self::key_at(&keys, position)?, value)
    }

    /// Append under a fresh index and return that index
    pub fn append(&self, value: &T) -> Result<i64> {
        self.insert(self.len()?, value)
    }

    /// Insert before `position` under a fresh index
    pub fn insert(&self, position: usize, value: &T) -> Result<i64> {
        let mut keys = self.backing.keys()?;
        if position > keys.len() {
            return Err(StoreError::IndexOutOfRange {
                index: position,
                len: keys.len(),
            });
        }
        let index = self.allocate(1)?[0];
        let key = index.to_string();
        self.backing.write(&key, value)?;
        keys.insert(position, key);
        self.backing.set_keys(&keys)?;
        Ok(index)
    }

    pub fn extend<'a, I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let values: Vec<&T> = values.into_iter().collect();
        let mut keys = self.backing.keys()?;
        for (index, value) in self.allocate(values.len())?.into_iter().zip(values) {
            let key = index.to_string();
            self.backing.write(&key, value)?;
            keys.push(key);
        }
        self.backing.set_keys(&keys)
    }

    pub fn delete(&self, position: usize) -> Result<()> {
        let mut keys = self.backing.keys()?;
        let key = Self::key_at(&keys, position)?.to_string();
        self.backing.remove(&key)?;
        keys.remove(position);
        self.backing.set_keys(&keys)?;
        tracing::debug!(path = %self.backing.path(), index = %key, "deleted list entry");
        Ok(())
    }

    /// Materialized values in `range`, clamped to the list bounds
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Result<Vec<T>> {
        let keys = self.backing.keys()?;
        let (start, stop) = resolve_range(range, keys.len());
        keys[start..stop]
            .iter()
            .map(|key| self.backing.read(key))
            .collect()
    }

    /// Delete every entry in `range`; the manifest is rewritten once
    pub fn delete_range(&self, range: impl RangeBounds<usize>) -> Result<usize> {
        let keys = self.backing.keys()?;
        let (start, stop) = resolve_range(range, keys.len());
        let mask: Vec<bool> = (0..keys.len()).map(|i| i >= start && i < stop).collect();
        for (key, _) in keys.iter().zip(&mask).filter(|(_, drop)| **drop) {
            self.backing.remove(key)?;
        }
        let kept: Vec<String> = keys
            .into_iter()
            .zip(&mask)
            .filter(|(_, drop)| !**drop)
            .map(|(key, _)| key)
            .collect();
        self.backing.set_keys(&kept)?;
        Ok(stop - start)
    }

    pub fn iter_values(&self) -> Result<Vec<T>> {
        self.slice(..)
    }

    /// Remove every entry; `max_index` is left as is
    pub fn clear(&self) -> Result<()> {
        self.delete_range(..).map(|_| ())
    }

    pub fn replace_all<'a, I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        self.clear()?;
        self.extend(values)
    }
}
