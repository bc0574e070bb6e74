//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! Models implement `FromRow` to define how they are built from database
//! rows; `query_one` / `query_all` cover the common query shapes.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};
use serde::de::DeserializeOwned;

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// Invalid enum values in the database (corruption, manual edits) surface as
/// errors instead of panics.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse a JSON text column.
fn parse_json<T: DeserializeOwned>(row: &Row, col: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(col)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    /// Construct an instance from a database row.
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const LICENCE_COLS: &str = "id, key_hash, identifier, tier, request_limit, request_count, valid_until, ips, max_ips, hwid, last_used_ip, last_used_hwid, version, created_at, updated_at";

pub const AUDIT_LOG_COLS: &str = "id, timestamp, actor_type, actor_id, action, resource_type, resource_id, details, ip_address, user_agent";

// ============ FromRow Implementations ============

impl FromRow for Versioned<Licence> {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let licence = Licence {
            id: row.get(0)?,
            key_hash: row.get(1)?,
            identifier: row.get(2)?,
            tier: parse_enum(row, 3, "tier")?,
            request_limit: row.get(4)?,
            request_count: row.get(5)?,
            valid_until: row.get(6)?,
            ips: parse_json(row, 7)?,
            max_ips: row.get(8)?,
            hwid: parse_json(row, 9)?,
            last_used_ip: row.get(10)?,
            last_used_hwid: row.get(11)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        };
        Ok(Versioned::new(licence, row.get(12)?))
    }
}

impl FromRow for AuditLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let details: Option<String> = row.get(7)?;
        Ok(AuditLog {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor_type: parse_enum(row, 2, "actor_type")?,
            actor_id: row.get(3)?,
            action: row.get(4)?,
            resource_type: row.get(5)?,
            resource_id: row.get(6)?,
            details: details.and_then(|d| serde_json::from_str(&d).ok()),
            ip_address: row.get(8)?,
            user_agent: row.get(9)?,
        })
    }
}
