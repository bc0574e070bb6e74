use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{CasOutcome, LicenceStore, LookupKey, StoreError};
use crate::models::{Licence, Versioned};

#[derive(Default)]
struct Records {
    by_id: HashMap<String, Versioned<Licence>>,
    index: HashMap<LookupKey, String>,
}

impl Records {
    /// Move `licence` to its current lookup key. Fails without touching the
    /// index if another record already owns that key.
    fn reindex(&mut self, old: &LookupKey, licence: &Licence) -> Result<(), StoreError> {
        let new = LookupKey::new(licence.key_hash.clone(), licence.identifier.clone());
        if *old == new {
            return Ok(());
        }
        if let Some(owner) = self.index.get(&new) {
            if *owner != licence.id {
                return Err(StoreError::Duplicate(licence.id.clone()));
            }
        }
        self.index.remove(old);
        self.index.insert(new, licence.id.clone());
        Ok(())
    }
}

/// In-process licence store with the same versioning rules as the SQLite
/// store. Used by tests and by embedders that keep licences in memory.
#[derive(Default)]
pub struct MemoryLicenceStore {
    records: Mutex<Records>,
}

impl MemoryLicenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<MutexGuard<'_, Records>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    /// Insert a new licence at version 0.
    pub fn insert(&self, licence: Licence) -> Result<Versioned<Licence>, StoreError> {
        let mut records = self.records()?;
        let key = LookupKey::new(licence.key_hash.clone(), licence.identifier.clone());
        if records.index.contains_key(&key) || records.by_id.contains_key(&licence.id) {
            return Err(StoreError::Duplicate(licence.id));
        }
        let stored = Versioned::new(licence, 0);
        records.index.insert(key, stored.value.id.clone());
        records
            .by_id
            .insert(stored.value.id.clone(), stored.clone());
        Ok(stored)
    }

    pub fn get(&self, id: &str) -> Result<Option<Versioned<Licence>>, StoreError> {
        Ok(self.records()?.by_id.get(id).cloned())
    }

    /// Apply an out-of-band administrative change, bumping the version like
    /// any other write. Returns `None` if the licence doesn't exist.
    pub fn admin_update(
        &self,
        id: &str,
        change: impl FnOnce(&mut Licence),
    ) -> Result<Option<Versioned<Licence>>, StoreError> {
        let mut records = self.records()?;
        let Some(current) = records.by_id.get(id).cloned() else {
            return Ok(None);
        };
        let old_key = LookupKey::new(current.value.key_hash.clone(), current.value.identifier.clone());
        let mut next = current.value;
        change(&mut next);
        records.reindex(&old_key, &next)?;
        let stored = Versioned::new(next, current.version + 1);
        records.by_id.insert(id.to_string(), stored.clone());
        Ok(Some(stored))
    }

    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut records = self.records()?;
        match records.by_id.remove(id) {
            Some(removed) => {
                let key = LookupKey::new(removed.value.key_hash, removed.value.identifier);
                records.index.remove(&key);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl LicenceStore for MemoryLicenceStore {
    fn lookup(&self, key: &LookupKey) -> Result<Option<Versioned<Licence>>, StoreError> {
        let records = self.records()?;
        Ok(records
            .index
            .get(key)
            .and_then(|id| records.by_id.get(id))
            .cloned())
    }

    fn compare_and_swap(
        &self,
        prior_version: i64,
        licence: &Licence,
    ) -> Result<CasOutcome, StoreError> {
        let mut records = self.records()?;
        let Some(current) = records.by_id.get(&licence.id) else {
            return Ok(CasOutcome::Conflict);
        };
        if current.version != prior_version {
            return Ok(CasOutcome::Conflict);
        }
        let old_key = LookupKey::new(current.value.key_hash.clone(), current.value.identifier.clone());
        records.reindex(&old_key, licence)?;
        let stored = Versioned::new(licence.clone(), prior_version + 1);
        records.by_id.insert(licence.id.clone(), stored.clone());
        Ok(CasOutcome::Committed(stored))
    }
}
