mod audit_logs;
mod licences;

pub use audit_logs::*;
pub use licences::*;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::db::AppState;
use crate::middleware::admin_auth;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/licences", get(list_licences).post(create_licence))
        .route(
            "/admin/licences/{id}",
            get(get_licence).patch(update_licence).delete(delete_licence),
        )
        .route("/admin/licences/{id}/reset-ips", post(reset_licence_ips))
        .route("/admin/audit-logs", get(query_audit_logs))
        .route_layer(middleware::from_fn_with_state(state, admin_auth))
}
