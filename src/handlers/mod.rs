pub mod admin;
pub mod keys;
pub mod maintenance;
pub mod verify;
pub mod webhooks;

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use chrono::{DateTime, SecondsFormat};
use serde::Serialize;

use crate::db::AppState;
use crate::middleware::require_admin_token;
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

/// Unix seconds as an RFC 3339 UTC string.
pub(crate) fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| secs.to_string())
}

/// Activation, validation and key issuance, under both current and legacy paths.
pub fn key_router() -> Router<AppState> {
    Router::new()
        .route("/activate", post(keys::activate))
        .route("/deactivate", post(keys::deactivate))
        .route("/validate", post(keys::validate))
        .route("/keys/generate", post(keys::generate))
        .route("/api/keys/activate", post(keys::activate))
        .route("/api/keys/deactivate", post(keys::deactivate))
        .route("/api/keys/validate", post(keys::validate))
        .route("/api/keys/generate", post(keys::generate))
}

pub fn verify_router() -> Router<AppState> {
    Router::new()
        .route("/verify", post(verify::verify_license))
        .route("/api/gumroad/validate", post(verify::verify_license))
}

/// Maintenance and license administration. Every route requires the admin token.
pub fn admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/maintenance/cleanup",
            get(maintenance::cleanup).post(maintenance::cleanup),
        )
        .route("/api/cleanup", get(maintenance::cleanup).post(maintenance::cleanup))
        .route("/admin/licenses/disable", post(admin::disable_license))
        .route("/admin/licenses/enable", post(admin::enable_license))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// The full application router. Rate limits are applied per client IP when
/// `rate_limit_rpm` is set, which requires serving with connect info.
pub fn router(state: AppState, rate_limit_rpm: Option<u32>) -> Router<AppState> {
    let health = Router::new().route("/health", get(health));
    let keys = key_router();
    let verify = verify_router();

    let (health, keys, verify) = match rate_limit_rpm {
        Some(rpm) => (
            health.layer(rate_limit::relaxed_layer(rpm)),
            keys.layer(rate_limit::standard_layer(rpm)),
            verify.layer(rate_limit::strict_layer(rpm)),
        ),
        None => (health, keys, verify),
    };

    Router::new()
        .merge(health)
        .merge(keys)
        .merge(verify)
        .merge(webhooks::router())
        .merge(admin_router(state))
}
