use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Default size of a licence's IP registry when the issuer doesn't pick one.
pub const DEFAULT_MAX_IPS: i64 = 5;

/// Commercial tier of a licence. Reported, never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Tier {
    Basic,
    Premium,
    Enterprise,
}

/// A usage-bound licence record as persisted by a licence store.
///
/// The plaintext key is never held here, only its keyed hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Licence {
    pub id: String,
    pub key_hash: String,
    /// Public, human-searchable label. Must match alongside the key.
    pub identifier: String,
    pub tier: Tier,
    pub request_limit: i64,
    pub request_count: i64,
    /// Unix timestamp (seconds). The licence is dead from this instant on.
    pub valid_until: i64,
    /// Registered caller IPs in insertion order.
    pub ips: Vec<String>,
    pub max_ips: i64,
    /// Hardware identifiers seen on admitted calls (audit only).
    pub hwid: Vec<String>,
    pub last_used_ip: Option<String>,
    pub last_used_hwid: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Licence {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.valid_until
    }

    pub fn quota_exhausted(&self) -> bool {
        self.request_count >= self.request_limit
    }

    pub fn has_ip(&self, ip: &str) -> bool {
        self.ips.iter().any(|registered| registered == ip)
    }

    /// Remaining admitted calls before the quota is exhausted.
    pub fn remaining(&self) -> i64 {
        (self.request_limit - self.request_count).max(0)
    }
}

/// A value paired with the store version it was read at.
///
/// The version is the compare-and-swap token: every write bumps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: i64,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: i64) -> Self {
        Self { value, version }
    }
}

/// Externally visible projection of a licence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenceView {
    pub id: String,
    pub identifier: String,
    pub tier: Tier,
    pub request_limit: i64,
    pub request_count: i64,
    pub remaining: i64,
    pub valid_until: i64,
    pub ips: Vec<String>,
    pub max_ips: i64,
    pub hwid: Vec<String>,
    pub last_used_ip: Option<String>,
    pub last_used_hwid: Option<String>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Versioned<Licence>> for LicenceView {
    fn from(versioned: Versioned<Licence>) -> Self {
        let Versioned { value: l, version } = versioned;
        let remaining = l.remaining();
        Self {
            id: l.id,
            identifier: l.identifier,
            tier: l.tier,
            request_limit: l.request_limit,
            request_count: l.request_count,
            remaining,
            valid_until: l.valid_until,
            ips: l.ips,
            max_ips: l.max_ips,
            hwid: l.hwid,
            last_used_ip: l.last_used_ip,
            last_used_hwid: l.last_used_hwid,
            version,
            created_at: l.created_at,
            updated_at: l.updated_at,
        }
    }
}

/// Input for issuing a licence. The key is chosen by the issuer.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLicence {
    pub key: String,
    pub identifier: String,
    pub tier: Tier,
    pub request_limit: i64,
    pub valid_until: i64,
    /// Defaults to the configured registry size.
    #[serde(default)]
    pub max_ips: Option<i64>,
    #[serde(default)]
    pub hwid: Vec<String>,
}

impl CreateLicence {
    pub fn validate(&self) -> Result<(), String> {
        if self.key.is_empty() {
            return Err("key must not be empty".into());
        }
        if self.identifier.trim().is_empty() {
            return Err("identifier must not be empty".into());
        }
        if self.request_limit <= 0 {
            return Err("request_limit must be positive".into());
        }
        if let Some(max_ips) = self.max_ips
            && max_ips < 0
        {
            return Err("max_ips must not be negative".into());
        }
        Ok(())
    }
}

/// Administrative changes to a licence. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLicence {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub request_limit: Option<i64>,
    /// Set the consumed count back to zero.
    #[serde(default)]
    pub reset_request_count: bool,
    #[serde(default)]
    pub valid_until: Option<i64>,
    #[serde(default)]
    pub max_ips: Option<i64>,
}

impl UpdateLicence {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref identifier) = self.identifier
            && identifier.trim().is_empty()
        {
            return Err("identifier must not be empty".into());
        }
        if let Some(limit) = self.request_limit
            && limit <= 0
        {
            return Err("request_limit must be positive".into());
        }
        if let Some(max_ips) = self.max_ips
            && max_ips < 0
        {
            return Err("max_ips must not be negative".into());
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.identifier.is_none()
            && self.tier.is_none()
            && self.request_limit.is_none()
            && !self.reset_request_count
            && self.valid_until.is_none()
            && self.max_ips.is_none()
    }
}
