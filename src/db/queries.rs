use chrono::Utc;
use rusqlite::{
    Connection, OptionalExtension, Transaction, TransactionBehavior, params, types::Value,
};
use uuid::Uuid;

use crate::crypto::KeyHasher;
use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{AUDIT_LOG_COLS, FromRow, LICENCE_COLS, query_all, query_one};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Turn a UNIQUE violation into a 409 with `msg`; pass other errors through.
fn map_unique_violation(err: rusqlite::Error, msg: &str) -> AppError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            AppError::Conflict(msg.to_string())
        }
        other => other.into(),
    }
}

/// Builder for dynamic UPDATE statements with optional fields.
///
/// Every update bumps `version` and `updated_at`, so a concurrent engine
/// commit that read the old version fails its compare-and-swap.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
        }
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Execute the update and return the updated entity using RETURNING clause.
    /// Returns None if no rows matched.
    fn execute_returning<T: FromRow>(
        mut self,
        conn: &Connection,
        returning_cols: &str,
    ) -> std::result::Result<Option<T>, rusqlite::Error> {
        self.fields.push(("updated_at", now().into()));
        let mut sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        sets.push("version = version + 1".to_string());
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ? RETURNING {}",
            self.table,
            sets.join(", "),
            returning_cols
        );
        conn.query_row(&sql, rusqlite::params_from_iter(values), T::from_row)
            .optional()
    }
}

// ============ Licences ============

/// Issue a licence with a caller-chosen key. Only the key's hash is stored.
pub fn create_licence(
    conn: &Connection,
    hasher: &KeyHasher,
    input: &CreateLicence,
    default_max_ips: i64,
) -> Result<Versioned<Licence>> {
    input.validate().map_err(AppError::BadRequest)?;

    let id = gen_id();
    let now = now();
    let key_hash = hasher.hash(&input.key);
    let max_ips = input.max_ips.unwrap_or(default_max_ips);

    let mut hwid: Vec<String> = Vec::with_capacity(input.hwid.len());
    for h in &input.hwid {
        if !h.is_empty() && !hwid.contains(h) {
            hwid.push(h.clone());
        }
    }

    conn.execute(
        "INSERT INTO licences (id, key_hash, identifier, tier, request_limit, request_count, valid_until, ips, max_ips, hwid, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, '[]', ?7, ?8, 0, ?9, ?9)",
        params![
            &id,
            &key_hash,
            &input.identifier,
            input.tier.as_ref(),
            input.request_limit,
            input.valid_until,
            max_ips,
            serde_json::to_string(&hwid)?,
            now
        ],
    )
    .map_err(|e| map_unique_violation(e, "A licence with this key and identifier already exists"))?;

    Ok(Versioned::new(
        Licence {
            id,
            key_hash,
            identifier: input.identifier.clone(),
            tier: input.tier,
            request_limit: input.request_limit,
            request_count: 0,
            valid_until: input.valid_until,
            ips: Vec::new(),
            max_ips,
            hwid,
            last_used_ip: None,
            last_used_hwid: None,
            created_at: now,
            updated_at: now,
        },
        0,
    ))
}

pub fn get_licence_by_id(conn: &Connection, id: &str) -> Result<Option<Versioned<Licence>>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licences WHERE id = ?1", LICENCE_COLS),
        &[&id],
    )
}

/// List licences newest first, optionally filtered by exact identifier.
pub fn list_licences_paginated(
    conn: &Connection,
    identifier: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Versioned<Licence>>, i64)> {
    match identifier {
        Some(identifier) => {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM licences WHERE identifier = ?1",
                params![identifier],
                |row| row.get(0),
            )?;
            let items = query_all(
                conn,
                &format!(
                    "SELECT {} FROM licences WHERE identifier = ?1 ORDER BY created_at DESC, id LIMIT ?2 OFFSET ?3",
                    LICENCE_COLS
                ),
                &[&identifier, &limit, &offset],
            )?;
            Ok((items, total))
        }
        None => {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM licences", [], |row| row.get(0))?;
            let items = query_all(
                conn,
                &format!(
                    "SELECT {} FROM licences ORDER BY created_at DESC, id LIMIT ?1 OFFSET ?2",
                    LICENCE_COLS
                ),
                &[&limit, &offset],
            )?;
            Ok((items, total))
        }
    }
}

/// Apply administrative changes. Returns None if the licence doesn't exist.
pub fn update_licence(
    conn: &Connection,
    id: &str,
    input: &UpdateLicence,
) -> Result<Option<Versioned<Licence>>> {
    input.validate().map_err(AppError::BadRequest)?;
    if input.is_empty() {
        return get_licence_by_id(conn, id);
    }

    let mut builder = UpdateBuilder::new("licences", id)
        .set_opt("identifier", input.identifier.clone())
        .set_opt("tier", input.tier.map(|t| t.as_ref().to_string()))
        .set_opt("request_limit", input.request_limit)
        .set_opt("valid_until", input.valid_until)
        .set_opt("max_ips", input.max_ips);
    if input.reset_request_count {
        builder = builder.set("request_count", 0i64);
    }

    builder
        .execute_returning(conn, LICENCE_COLS)
        .map_err(|e| map_unique_violation(e, "Another licence with this key already uses that identifier"))
}

/// Clear the IP registry so the licence can be used from new origins.
///
/// Returns the cleared IPs alongside the updated licence. The read and the
/// reset share one immediate transaction, so an engine commit can't land
/// between them.
pub fn reset_licence_ips(
    conn: &Connection,
    id: &str,
) -> Result<Option<(Versioned<Licence>, Vec<String>)>> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let Some(previous) = get_licence_by_id(&tx, id)? else {
        return Ok(None);
    };

    // last_used_ip points into the registry, so it goes with it
    let licence = UpdateBuilder::new("licences", id)
        .set("ips", "[]".to_string())
        .set("last_used_ip", Value::Null)
        .execute_returning(&tx, LICENCE_COLS)?;
    tx.commit()?;

    Ok(licence.map(|licence| (licence, previous.value.ips)))
}

pub fn delete_licence(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM licences WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

pub fn count_licences(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM licences", [], |row| row.get(0))
        .map_err(Into::into)
}

// ============ Audit Logs ============

#[allow(clippy::too_many_arguments)]
pub fn create_audit_log(
    conn: &Connection,
    enabled: bool,
    actor_type: ActorType,
    actor_id: Option<&str>,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    details: Option<&serde_json::Value>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<AuditLog> {
    let log = AuditLog {
        id: gen_id(),
        timestamp: now(),
        actor_type,
        actor_id: actor_id.map(String::from),
        action: action.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        details: details.cloned(),
        ip_address: ip_address.map(String::from),
        user_agent: user_agent.map(String::from),
    };

    // Skip database insert if audit logging is disabled
    if !enabled {
        return Ok(log);
    }

    conn.execute(
        "INSERT INTO audit_logs (id, timestamp, actor_type, actor_id, action, resource_type, resource_id, details, ip_address, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &log.id,
            log.timestamp,
            log.actor_type.as_ref(),
            &log.actor_id,
            &log.action,
            &log.resource_type,
            &log.resource_id,
            details.map(|d| d.to_string()),
            &log.ip_address,
            &log.user_agent,
        ],
    )?;

    Ok(log)
}

pub fn query_audit_logs(conn: &Connection, query: &AuditLogQuery) -> Result<(Vec<AuditLog>, i64)> {
    let mut conditions: Vec<&'static str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(ref actor_id) = query.actor_id {
        conditions.push("actor_id = ?");
        values.push(actor_id.clone().into());
    }
    if let Some(ref action) = query.action {
        conditions.push("action = ?");
        values.push(action.clone().into());
    }
    if let Some(ref resource_id) = query.resource_id {
        conditions.push("resource_id = ?");
        values.push(resource_id.clone().into());
    }
    if let Some(from) = query.from_timestamp {
        conditions.push("timestamp >= ?");
        values.push(from.into());
    }
    if let Some(to) = query.to_timestamp {
        conditions.push("timestamp <= ?");
        values.push(to.into());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM audit_logs{}", where_clause),
        rusqlite::params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    values.push(query.limit().into());
    values.push(query.offset().into());
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM audit_logs{} ORDER BY timestamp DESC, id LIMIT ? OFFSET ?",
        AUDIT_LOG_COLS, where_clause
    ))?;
    let logs = stmt
        .query_map(rusqlite::params_from_iter(values.iter()), AuditLog::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((logs, total))
}

/// Delete audit log entries older than `retention_days`.
pub fn purge_old_audit_logs(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - retention_days * 86400;
    let deleted = conn.execute(
        "DELETE FROM audit_logs WHERE timestamp < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
