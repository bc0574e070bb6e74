use axum::extract::{Extension, State};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::middleware::AdminContext;
use crate::models::{AuditLog, AuditLogQuery};
use crate::pagination::Paginated;
use crate::policy::{Operation, authorize};

/// GET /admin/audit-logs
pub async fn query_audit_logs(
    State(state): State<AppState>,
    Extension(ctx): Extension<AdminContext>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Paginated<AuditLog>>> {
    authorize(ctx.role(), Operation::ReadAuditLog)?;

    let conn = state.audit.get()?;
    let (logs, total) = queries::query_audit_logs(&conn, &query)?;
    Ok(Json(Paginated::new(logs, total, query.limit(), query.offset())))
}
