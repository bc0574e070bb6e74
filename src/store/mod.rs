//! Licence store contract consumed by the enforcement engine.
//!
//! A store offers point lookup by `(key hash, identifier)` and a conditional
//! write keyed on the version that was read. Stores never expose a blind
//! overwrite to the engine.

mod memory;
mod sqlite;

pub use memory::MemoryLicenceStore;
pub use sqlite::SqliteLicenceStore;

use std::sync::Arc;

use thiserror::Error;

use crate::models::{Licence, Versioned};

/// Store-layer faults. These are distinct from optimistic-concurrency
/// conflicts, which are reported through [`CasOutcome::Conflict`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("corrupt licence record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("duplicate licence: {0}")]
    Duplicate(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Address of a licence record: both parts must match the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub key_hash: String,
    pub identifier: String,
}

impl LookupKey {
    pub fn new(key_hash: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            key_hash: key_hash.into(),
            identifier: identifier.into(),
        }
    }

    pub fn matches(&self, licence: &Licence) -> bool {
        licence.key_hash == self.key_hash && licence.identifier == self.identifier
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write landed; carries the record as stored, with its new version.
    Committed(Versioned<Licence>),
    /// The record changed (or vanished) since `prior_version` was read.
    Conflict,
}

pub trait LicenceStore: Send + Sync {
    /// Point lookup. `Ok(None)` when no record matches both parts of the key.
    fn lookup(&self, key: &LookupKey) -> Result<Option<Versioned<Licence>>, StoreError>;

    /// Replace the record with `licence.id` only if its version is still
    /// `prior_version`. A successful write bumps the version by one.
    fn compare_and_swap(
        &self,
        prior_version: i64,
        licence: &Licence,
    ) -> Result<CasOutcome, StoreError>;
}

impl<S: LicenceStore + ?Sized> LicenceStore for Arc<S> {
    fn lookup(&self, key: &LookupKey) -> Result<Option<Versioned<Licence>>, StoreError> {
        (**self).lookup(key)
    }

    fn compare_and_swap(
        &self,
        prior_version: i64,
        licence: &Licence,
    ) -> Result<CasOutcome, StoreError> {
        (**self).compare_and_swap(prior_version, licence)
    }
}
