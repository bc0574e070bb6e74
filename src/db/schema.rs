use rusqlite::Connection;

/// Initialize the main database schema (licences)
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Licences: usage-bound grants consumed by the enforcement engine.
        -- ips / hwid are JSON arrays (insertion ordered).
        -- version is bumped by every write and is the compare-and-swap token.
        CREATE TABLE IF NOT EXISTS licences (
            id TEXT PRIMARY KEY,
            key_hash TEXT NOT NULL,
            identifier TEXT NOT NULL,
            tier TEXT NOT NULL CHECK (tier IN ('basic', 'premium', 'enterprise')),
            request_limit INTEGER NOT NULL CHECK (request_limit > 0),
            request_count INTEGER NOT NULL DEFAULT 0 CHECK (request_count >= 0),
            valid_until INTEGER NOT NULL,
            ips TEXT NOT NULL DEFAULT '[]',
            max_ips INTEGER NOT NULL DEFAULT 5 CHECK (max_ips >= 0),
            hwid TEXT NOT NULL DEFAULT '[]',
            last_used_ip TEXT,
            last_used_hwid TEXT,
            version INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(key_hash, identifier)
        );
        CREATE INDEX IF NOT EXISTS idx_licences_identifier ON licences(identifier);
        CREATE INDEX IF NOT EXISTS idx_licences_created ON licences(created_at DESC);
        "#,
    )?;
    Ok(())
}

/// Initialize the audit log database schema (separate DB file)
pub fn init_audit_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_type TEXT NOT NULL CHECK (actor_type IN ('admin', 'system')),
            actor_id TEXT,                        -- admin token name (never the token)
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            details TEXT,
            ip_address TEXT,
            user_agent TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_actor ON audit_logs(actor_id);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_resource ON audit_logs(resource_type, resource_id);
        "#,
    )?;
    Ok(())
}
