use axum::{extract::State, http::HeaderMap};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::engine::{Decision, ErrorKind, EvaluateRequest};
use crate::error::{AppError, Result};
use crate::extractors::{Json, PeerAddr};
use crate::models::LicenceView;
use crate::util::caller_ip;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub key: String,
    pub identifier: String,
    /// Hardware identifier of the calling machine, recorded on admission
    #[serde(default)]
    pub hwid: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub admitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licence: Option<LicenceView>,
}

impl From<Decision> for ValidateResponse {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Admitted(view) => Self {
                admitted: true,
                reason: None,
                licence: Some(view),
            },
            Decision::Denied(reason) => Self {
                admitted: false,
                reason: Some(reason),
                licence: None,
            },
        }
    }
}

/// Charge one call against a licence.
///
/// Every modelled decision, admit or deny, is a 200. Only malformed input
/// (400) and storage faults (503) are errors.
pub async fn validate_licence(
    State(state): State<AppState>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>> {
    let ip = caller_ip(&headers, peer, state.trust_proxy_headers)
        .ok_or_else(|| AppError::BadRequest("Could not determine caller IP".into()))?;

    // The engine blocks on per-licence locks and SQLite, keep it off the runtime
    let engine = state.engine.clone();
    let decision = tokio::task::spawn_blocking(move || {
        let request = EvaluateRequest::new(&req.key, &req.identifier, &ip)
            .with_hwid(req.hwid.as_deref());
        engine.evaluate(&request, Utc::now().timestamp())
    })
    .await
    .map_err(|e| AppError::Internal(format!("Validation task failed: {}", e)))??;

    Ok(Json(decision.into()))
}
