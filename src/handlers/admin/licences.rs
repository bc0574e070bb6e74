use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::AdminContext;
use crate::models::{AuditAction, CreateLicence, LicenceView, UpdateLicence};
use crate::pagination::Paginated;
use crate::policy::{Operation, authorize};
use crate::util::AuditLogBuilder;

#[derive(Debug, Default, Deserialize)]
pub struct ListLicencesQuery {
    /// Exact identifier to filter on
    pub identifier: Option<String>,
    /// Max results to return (default 50, max 100)
    pub limit: Option<i64>,
    /// Offset for pagination (default 0)
    pub offset: Option<i64>,
}

impl ListLicencesQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 100)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// GET /admin/licences
pub async fn list_licences(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Query(query): Query<ListLicencesQuery>,
) -> Result<Json<Paginated<LicenceView>>> {
    authorize(ctx.role(), Operation::ListLicences)?;

    let conn = state.db.get()?;
    let limit = query.limit();
    let offset = query.offset();
    let (licences, total) =
        queries::list_licences_paginated(&conn, query.identifier.as_deref(), limit, offset)?;

    Ok(Json(
        Paginated::new(licences, total, limit, offset).map(LicenceView::from),
    ))
}

/// GET /admin/licences/{id}
pub async fn get_licence(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<String>,
) -> Result<Json<LicenceView>> {
    authorize(ctx.role(), Operation::GetLicence)?;

    let conn = state.db.get()?;
    let licence = queries::get_licence_by_id(&conn, &id)?.or_not_found(msg::LICENCE_NOT_FOUND)?;
    Ok(Json(licence.into()))
}

/// POST /admin/licences
/// Issue a licence under a key chosen by the caller. The key is never echoed back.
pub async fn create_licence(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    headers: HeaderMap,
    Json(input): Json<CreateLicence>,
) -> Result<Json<LicenceView>> {
    authorize(ctx.role(), Operation::CreateLicence)?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let licence =
        queries::create_licence(&conn, &state.key_hasher, &input, state.default_max_ips)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .admin(&ctx)
        .action(AuditAction::CreateLicence)
        .resource("licence", &licence.value.id)
        .details(&serde_json::json!({
            "identifier": licence.value.identifier,
            "tier": licence.value.tier,
            "request_limit": licence.value.request_limit,
            "valid_until": licence.value.valid_until,
            "max_ips": licence.value.max_ips,
        }))
        .save()?;

    tracing::info!(
        licence_id = %licence.value.id,
        identifier = %licence.value.identifier,
        admin = %ctx.name(),
        "Licence issued"
    );

    Ok(Json(licence.into()))
}

/// PATCH /admin/licences/{id}
///
/// Bumps the licence version, so an evaluation that read the old state
/// retries against the new one.
pub async fn update_licence(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateLicence>,
) -> Result<Json<LicenceView>> {
    authorize(ctx.role(), Operation::UpdateLicence)?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let licence = queries::update_licence(&conn, &id, &input)?.or_not_found(msg::LICENCE_NOT_FOUND)?;

    if !input.is_empty() {
        AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
            .admin(&ctx)
            .action(AuditAction::UpdateLicence)
            .resource("licence", &id)
            .details(&serde_json::json!({
                "identifier": input.identifier,
                "tier": input.tier,
                "request_limit": input.request_limit,
                "reset_request_count": input.reset_request_count,
                "valid_until": input.valid_until,
                "max_ips": input.max_ips,
            }))
            .save()?;
    }

    Ok(Json(licence.into()))
}

/// POST /admin/licences/{id}/reset-ips
pub async fn reset_licence_ips(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<LicenceView>> {
    authorize(ctx.role(), Operation::ResetIps)?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let (licence, cleared_ips) =
        queries::reset_licence_ips(&conn, &id)?.or_not_found(msg::LICENCE_NOT_FOUND)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .admin(&ctx)
        .action(AuditAction::ResetLicenceIps)
        .resource("licence", &id)
        .details(&serde_json::json!({ "cleared_ips": cleared_ips }))
        .save()?;

    Ok(Json(licence.into()))
}

/// DELETE /admin/licences/{id}
pub async fn delete_licence(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    authorize(ctx.role(), Operation::DeleteLicence)?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let licence = queries::get_licence_by_id(&conn, &id)?.or_not_found(msg::LICENCE_NOT_FOUND)?;
    if !queries::delete_licence(&conn, &id)? {
        return Err(AppError::NotFound(msg::LICENCE_NOT_FOUND.into()));
    }

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .admin(&ctx)
        .action(AuditAction::DeleteLicence)
        .resource("licence", &id)
        .details(&serde_json::json!({
            "identifier": licence.value.identifier,
            "request_count": licence.value.request_count,
        }))
        .save()?;

    tracing::info!(licence_id = %id, admin = %ctx.name(), "Licence deleted");

    Ok(Json(serde_json::json!({ "success": true })))
}
