//! Per-peer-IP rate limiting for the public routes.
//!
//! Tiers:
//! - Validate: POST /validate (RATE_LIMIT_VALIDATE_RPM, default 600)
//! - Relaxed: GET /health (RATE_LIMIT_RELAXED_RPM, default 60)
//!
//! A budget of 0 disables the tier. The key extractor needs the socket
//! peer, so the server must be started with `into_make_service_with_connect_info`.

use std::sync::Arc;
use std::time::Duration;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

/// Rate limiter layer type alias using governor types directly
pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Token-bucket replenish interval for a per-minute budget.
fn replenish_interval(requests_per_minute: u32) -> Duration {
    Duration::from_millis((60_000 / u64::from(requests_per_minute.max(1))).max(1))
}

/// Allow bursts up to the full minute budget, refilling evenly.
fn create_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    if requests_per_minute == 0 {
        return None;
    }

    let config = GovernorConfigBuilder::default()
        .period(replenish_interval(requests_per_minute))
        .burst_size(requests_per_minute)
        .finish()
        .expect("period and burst size are non-zero");

    Some(GovernorLayer::new(Arc::new(config)))
}

pub fn validate_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    create_layer(requests_per_minute)
}

pub fn relaxed_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    create_layer(requests_per_minute)
}
