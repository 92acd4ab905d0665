use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::verify::PurchaseDetails;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(alias = "gumroadLicenseKey")]
    pub license_key: Option<String>,
    pub product_permalink: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub valid: bool,
    pub message: String,
    pub purchase: Option<PurchaseDetails>,
}

/// POST /verify - ask the payment provider whether a key is genuine.
pub async fn verify_license(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let (Some(license_key), Some(permalink)) = (
        request.license_key.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        request.product_permalink.as_deref().map(str::trim).filter(|s| !s.is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "License key and product permalink are required".into(),
        ));
    };

    let verified = state.verifier.verify(license_key, permalink).await?;
    let valid = verified.is_valid();
    let message = verified.message.clone().unwrap_or_else(|| {
        if verified.success {
            "License key is valid".to_string()
        } else {
            "Invalid license key".to_string()
        }
    });

    tracing::info!(success = verified.success, valid, "Verified license key with provider");

    Ok(Json(VerifyResponse {
        success: verified.success,
        valid,
        message,
        purchase: verified.purchase,
    }))
}
