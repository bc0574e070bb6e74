mod from_row;
pub mod queries;
mod schema;

pub use from_row::{FromRow, LICENCE_COLS, query_all, query_one};
pub use schema::{init_audit_db, init_db};

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::crypto::KeyHasher;
use crate::engine::LicenceEngine;
use crate::middleware::AdminTokens;
use crate::models::DEFAULT_MAX_IPS;
use crate::store::SqliteLicenceStore;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding database pools, the enforcement engine and configuration
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (licences)
    pub db: DbPool,
    /// Audit log database pool (separate file to isolate growth)
    pub audit: DbPool,
    /// Enforcement engine over the main database
    pub engine: Arc<LicenceEngine<SqliteLicenceStore>>,
    pub key_hasher: KeyHasher,
    pub audit_log_enabled: bool,
    /// IP registry size for licences issued without an explicit max_ips
    pub default_max_ips: i64,
    pub admin_tokens: Arc<AdminTokens>,
    /// Take the caller IP from x-forwarded-for instead of the socket peer
    pub trust_proxy_headers: bool,
}

impl AppState {
    pub fn new(db: DbPool, audit: DbPool, key_hasher: KeyHasher) -> Self {
        let engine = LicenceEngine::new(SqliteLicenceStore::new(db.clone()), key_hasher.clone());
        Self {
            db,
            audit,
            engine: Arc::new(engine),
            key_hasher,
            audit_log_enabled: true,
            default_max_ips: DEFAULT_MAX_IPS,
            admin_tokens: Arc::new(AdminTokens::default()),
            trust_proxy_headers: false,
        }
    }

    pub fn from_config(db: DbPool, audit: DbPool, config: &Config) -> Self {
        let engine = LicenceEngine::new(
            SqliteLicenceStore::new(db.clone()),
            config.key_hasher.clone(),
        )
        .with_max_attempts(config.engine_max_attempts);
        Self {
            db,
            audit,
            engine: Arc::new(engine),
            key_hasher: config.key_hasher.clone(),
            audit_log_enabled: config.audit_log_enabled,
            default_max_ips: config.default_max_ips,
            admin_tokens: Arc::new(config.admin_tokens.clone()),
            trust_proxy_headers: config.trust_proxy_headers,
        }
    }
}

/// Create a pool over a database file. WAL keeps readers off the writer's
/// back; the busy timeout absorbs short write-lock waits between connections.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
    });
    Pool::builder().max_size(10).build(manager)
}
