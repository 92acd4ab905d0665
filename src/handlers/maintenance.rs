use axum::extract::State;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Json;
use crate::licensing::{MaintenanceReport, run_maintenance};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(flatten)]
    pub report: MaintenanceReport,
    pub timestamp: String,
}

/// POST /maintenance/cleanup
pub async fn cleanup(State(state): State<AppState>) -> Result<Json<CleanupResponse>> {
    let conn = state.db.get()?;
    let report = run_maintenance(&conn, queries::now(), state.stale_activation_days)?;

    Ok(Json(CleanupResponse {
        success: true,
        message: "Database cleanup completed successfully",
        report,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}
