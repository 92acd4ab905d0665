//! Per-IP rate limiting for the public endpoints.
//!
//! One base rate (`RATE_LIMIT_RPM`) is scaled per route group:
//! /verify gets a quarter of it, the key routes get it as is, and /health
//! gets double.

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

/// Replenishes one request every `60 / requests_per_minute` seconds with a
/// burst of `requests_per_minute`. Zero is treated as one.
fn create_layer(requests_per_minute: u32) -> RateLimitLayer {
    let requests_per_minute = requests_per_minute.max(1);
    let period_secs = 60 / requests_per_minute as u64;

    let config = GovernorConfigBuilder::default()
        .period(Duration::from_secs(period_secs.max(1)))
        .burst_size(requests_per_minute)
        .finish()
        .expect("period and burst size are non-zero");

    GovernorLayer::new(Arc::new(config))
}

/// A quarter of the base rate: every /verify request calls the payment provider.
pub fn strict_layer(base_rpm: u32) -> RateLimitLayer {
    create_layer(base_rpm / 4)
}

pub fn standard_layer(base_rpm: u32) -> RateLimitLayer {
    create_layer(base_rpm)
}

/// Twice the base rate, for health probes.
pub fn relaxed_layer(base_rpm: u32) -> RateLimitLayer {
    create_layer(base_rpm.saturating_mul(2))
}
