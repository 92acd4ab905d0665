pub mod gumroad;

pub use gumroad::handle_gumroad_webhook;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/gumroad", post(handle_gumroad_webhook))
        .route("/api/gumroad/webhook", post(handle_gumroad_webhook))
}
