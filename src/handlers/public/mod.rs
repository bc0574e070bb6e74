mod validate;

pub use validate::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(rate_limit: RateLimitConfig) -> Router<AppState> {
    let mut health_routes = Router::new().route("/health", get(health));
    if let Some(layer) = rate_limit::relaxed_layer(rate_limit.relaxed_rpm) {
        health_routes = health_routes.layer(layer);
    }

    let mut validate_routes = Router::new().route("/validate", post(validate_licence));
    if let Some(layer) = rate_limit::validate_layer(rate_limit.validate_rpm) {
        validate_routes = validate_routes.layer(layer);
    }

    health_routes.merge(validate_routes)
}
