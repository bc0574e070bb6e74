use std::env;

use crate::crypto::KeyHasher;
use crate::engine::DEFAULT_MAX_ATTEMPTS;
use crate::middleware::AdminTokens;
use crate::models::DEFAULT_MAX_IPS;

/// HMAC key used for licence keys in dev mode when none is configured.
/// Never valid outside dev mode.
const DEV_KEY_HASH_SECRET: [u8; 32] = [0x42; 32];

/// Per-peer-IP request budgets for the public routes. `0` disables a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// POST /validate
    pub validate_rpm: u32,
    /// GET /health
    pub relaxed_rpm: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            validate_rpm: 600,
            relaxed_rpm: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn disabled() -> Self {
        Self {
            validate_rpm: 0,
            relaxed_rpm: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub audit_database_path: String,
    pub audit_log_enabled: bool,
    /// Days to keep audit entries; 0 keeps them forever
    pub audit_log_retention_days: i64,
    pub dev_mode: bool,
    pub key_hasher: KeyHasher,
    pub engine_max_attempts: u32,
    pub default_max_ips: i64,
    pub trust_proxy_headers: bool,
    pub admin_tokens: AdminTokens,
    pub rate_limit: RateLimitConfig,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} has an invalid value: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("TOLLGATE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env_parse("PORT", 3000)?;

        let key_hasher = match env::var("KEY_HASH_SECRET") {
            Ok(secret) => KeyHasher::from_hex(&secret)?,
            Err(_) if dev_mode => {
                tracing::warn!("KEY_HASH_SECRET not set, using the fixed development secret");
                KeyHasher::from_bytes(DEV_KEY_HASH_SECRET)
            }
            Err(_) => {
                return Err(
                    "KEY_HASH_SECRET is required (64 hex chars, e.g. `openssl rand -hex 32`)"
                        .to_string(),
                );
            }
        };

        let default_max_ips: i64 = env_parse("DEFAULT_MAX_IPS", DEFAULT_MAX_IPS)?;
        if default_max_ips < 0 {
            return Err("DEFAULT_MAX_IPS must not be negative".to_string());
        }

        let admin_tokens = AdminTokens::parse(&env::var("ADMIN_TOKENS").unwrap_or_default())?;
        if admin_tokens.is_empty() {
            tracing::warn!("ADMIN_TOKENS is empty, the admin API will reject every request");
        }

        Ok(Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "tollgate.db".to_string()),
            audit_database_path: env::var("AUDIT_DATABASE_PATH")
                .unwrap_or_else(|_| "tollgate_audit.db".to_string()),
            audit_log_enabled: env_flag("AUDIT_LOG_ENABLED", true),
            audit_log_retention_days: env_parse("AUDIT_LOG_RETENTION_DAYS", 0)?,
            dev_mode,
            key_hasher,
            engine_max_attempts: env_parse("ENGINE_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            default_max_ips,
            trust_proxy_headers: env_flag("TRUST_PROXY_HEADERS", false),
            admin_tokens,
            rate_limit: RateLimitConfig {
                validate_rpm: env_parse(
                    "RATE_LIMIT_VALIDATE_RPM",
                    RateLimitConfig::default().validate_rpm,
                )?,
                relaxed_rpm: env_parse(
                    "RATE_LIMIT_RELAXED_RPM",
                    RateLimitConfig::default().relaxed_rpm,
                )?,
            },
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
