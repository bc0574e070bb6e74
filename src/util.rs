//! Shared request helpers and the audit log builder.

use std::net::SocketAddr;

use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::middleware::AdminContext;
use crate::models::{ActorType, AuditAction, AuditLog};

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`,
/// and extracts the `user-agent` header for audit logging.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Resolve the IP a licence call is charged to.
///
/// Behind a trusted proxy the left-most `x-forwarded-for` entry is the
/// client; otherwise the socket peer is used and forwarding headers are
/// ignored, since any client can set them.
pub fn caller_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }
    }
    peer.map(|addr| addr.ip().to_string())
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Builder for creating audit log entries.
///
/// # Example
/// ```ignore
/// AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
///     .admin(&ctx)
///     .action(AuditAction::CreateLicence)
///     .resource("licence", &licence.id)
///     .details(&serde_json::json!({ "identifier": licence.identifier }))
///     .save()?;
/// ```
pub struct AuditLogBuilder<'a> {
    conn: &'a Connection,
    enabled: bool,
    headers: Option<&'a HeaderMap>,
    actor_type: ActorType,
    actor_id: Option<&'a str>,
    action: AuditAction,
    resource_type: &'a str,
    resource_id: &'a str,
    details: Option<&'a serde_json::Value>,
}

impl<'a> AuditLogBuilder<'a> {
    pub fn new(conn: &'a Connection, enabled: bool, headers: &'a HeaderMap) -> Self {
        Self {
            headers: Some(headers),
            ..Self::system(conn, enabled)
        }
    }

    /// Builder for actions with no originating request (seeding, maintenance).
    pub fn system(conn: &'a Connection, enabled: bool) -> Self {
        Self {
            conn,
            enabled,
            headers: None,
            actor_type: ActorType::System,
            actor_id: None,
            action: AuditAction::SeedLicence,
            resource_type: "",
            resource_id: "",
            details: None,
        }
    }

    /// Attribute the entry to an authenticated admin.
    pub fn admin(mut self, ctx: &'a AdminContext) -> Self {
        self.actor_type = ActorType::Admin;
        self.actor_id = Some(ctx.name());
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = action;
        self
    }

    pub fn resource(mut self, resource_type: &'a str, resource_id: &'a str) -> Self {
        self.resource_type = resource_type;
        self.resource_id = resource_id;
        self
    }

    pub fn details(mut self, details: &'a serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn save(self) -> Result<AuditLog> {
        let (ip, ua) = self
            .headers
            .map(extract_request_info)
            .unwrap_or((None, None));
        queries::create_audit_log(
            self.conn,
            self.enabled,
            self.actor_type,
            self.actor_id,
            self.action.as_ref(),
            self.resource_type,
            self.resource_id,
            self.details,
            ip.as_deref(),
            ua.as_deref(),
        )
    }
}
