use std::collections::HashMap;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::db::AppState;
use crate::policy::Role;
use crate::util::extract_bearer_token;

/// Who an admin token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    pub name: String,
    pub role: Role,
}

/// Configured admin bearer tokens. Only token digests are kept in memory.
#[derive(Debug, Clone, Default)]
pub struct AdminTokens {
    by_hash: HashMap<String, AdminIdentity>,
}

fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"tollgate-admin-v1:");
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

impl AdminTokens {
    pub fn insert(&mut self, name: impl Into<String>, role: Role, token: &str) {
        self.by_hash.insert(
            token_digest(token),
            AdminIdentity {
                name: name.into(),
                role,
            },
        );
    }

    pub fn with_token(mut self, name: impl Into<String>, role: Role, token: &str) -> Self {
        self.insert(name, role, token);
        self
    }

    /// Parse `name:role:token` entries separated by commas.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut tokens = Self::default();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.splitn(3, ':');
            let (Some(name), Some(role), Some(token)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(format!("admin token entry {:?} is not name:role:token", name_of(entry)));
            };
            let role: Role = role
                .parse()
                .map_err(|_| format!("unknown admin role {:?} for {}", role, name))?;
            if name.is_empty() || token.is_empty() {
                return Err("admin token name and token must not be empty".into());
            }
            tokens.insert(name, role, token);
        }
        Ok(tokens)
    }

    pub fn resolve(&self, token: &str) -> Option<&AdminIdentity> {
        self.by_hash.get(&token_digest(token))
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

/// Only the part before the first colon, so parse errors never echo a token.
fn name_of(entry: &str) -> &str {
    entry.split(':').next().unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct AdminContext {
    pub identity: AdminIdentity,
}

impl AdminContext {
    pub fn role(&self) -> Role {
        self.identity.role
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }
}

/// Authenticate an admin bearer token and attach an [`AdminContext`].
/// Authorization per operation happens in the handlers via `policy::authorize`.
pub async fn admin_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer_token(request.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    let identity = state
        .admin_tokens
        .resolve(token)
        .cloned()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    request
        .extensions_mut()
        .insert(AdminContext { identity });
    Ok(next.run(request).await)
}
