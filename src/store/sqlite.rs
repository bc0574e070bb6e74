use rusqlite::{OptionalExtension, params};

use super::{CasOutcome, LicenceStore, LookupKey, StoreError};
use crate::db::{DbPool, FromRow, LICENCE_COLS};
use crate::models::{Licence, Versioned};

/// Licence store over the main SQLite database.
///
/// The conditional write is a single `UPDATE … WHERE id = ? AND version = ?`,
/// so it also detects administrative writes made through `db::queries` and
/// writers in other processes sharing the file.
#[derive(Clone)]
pub struct SqliteLicenceStore {
    pool: DbPool,
}

impl SqliteLicenceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl LicenceStore for SqliteLicenceStore {
    fn lookup(&self, key: &LookupKey) -> Result<Option<Versioned<Licence>>, StoreError> {
        let conn = self.pool.get()?;
        let found = conn
            .query_row(
                &format!(
                    "SELECT {} FROM licences WHERE key_hash = ?1 AND identifier = ?2",
                    LICENCE_COLS
                ),
                params![&key.key_hash, &key.identifier],
                Versioned::<Licence>::from_row,
            )
            .optional()?;
        Ok(found)
    }

    fn compare_and_swap(
        &self,
        prior_version: i64,
        licence: &Licence,
    ) -> Result<CasOutcome, StoreError> {
        let conn = self.pool.get()?;
        let ips = serde_json::to_string(&licence.ips)?;
        let hwid = serde_json::to_string(&licence.hwid)?;

        let saved = conn
            .query_row(
                &format!(
                    "UPDATE licences SET identifier = ?1, tier = ?2, request_limit = ?3, request_count = ?4, valid_until = ?5, ips = ?6, max_ips = ?7, hwid = ?8, last_used_ip = ?9, last_used_hwid = ?10, updated_at = ?11, version = version + 1
                     WHERE id = ?12 AND version = ?13
                     RETURNING {}",
                    LICENCE_COLS
                ),
                params![
                    &licence.identifier,
                    licence.tier.as_ref(),
                    licence.request_limit,
                    licence.request_count,
                    licence.valid_until,
                    ips,
                    licence.max_ips,
                    hwid,
                    &licence.last_used_ip,
                    &licence.last_used_hwid,
                    licence.updated_at,
                    &licence.id,
                    prior_version,
                ],
                Versioned::<Licence>::from_row,
            )
            .optional()?;

        Ok(match saved {
            Some(record) => CasOutcome::Committed(record),
            None => CasOutcome::Conflict,
        })
    }
}
