use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::licensing::resolve_license_including_disabled;
use crate::models::License;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseKeyRequest {
    #[serde(alias = "key", alias = "gumroadLicenseKey")]
    pub license_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseStatusResponse {
    pub success: bool,
    pub license_id: String,
    pub active: bool,
}

/// Flip the active flag of the license `key` resolves to.
pub fn set_license_enabled(conn: &rusqlite::Connection, key: &str, active: bool) -> Result<License> {
    let (license, _) = resolve_license_including_disabled(conn, key)?
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;

    if license.active != active {
        queries::set_license_active(conn, &license.id, active)?;
        tracing::info!(license_id = %license.id, active, "Changed license active flag");
    }

    Ok(License { active, ..license })
}

fn set_enabled(state: &AppState, key: &str, active: bool) -> Result<Json<LicenseStatusResponse>> {
    let conn = state.db.get()?;
    let license = set_license_enabled(&conn, key, active)?;

    Ok(Json(LicenseStatusResponse {
        success: true,
        license_id: license.id,
        active: license.active,
    }))
}

/// POST /admin/licenses/disable
pub async fn disable_license(
    State(state): State<AppState>,
    Json(request): Json<LicenseKeyRequest>,
) -> Result<Json<LicenseStatusResponse>> {
    set_enabled(&state, &request.license_key, false)
}

/// POST /admin/licenses/enable
pub async fn enable_license(
    State(state): State<AppState>,
    Json(request): Json<LicenseKeyRequest>,
) -> Result<Json<LicenseStatusResponse>> {
    set_enabled(&state, &request.license_key, true)
}
