use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::licensing::{
    self, ActivateOutcome, Denial, ValidationStatus, hours_remaining, resolve_or_synthesize,
};
use crate::models::DeviceIdentity;

use super::format_timestamp;

/// Body shared by activate, deactivate and validate.
///
/// Older clients send the key as `gumroadLicenseKey` or `key`, and the
/// verification flag as `gumroadValidated`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRequest {
    pub license_key: Option<String>,
    pub gumroad_license_key: Option<String>,
    pub key: Option<String>,
    pub device_id: Option<String>,
    pub machine_id: Option<String>,
    #[serde(default, alias = "gumroadValidated")]
    pub verified: bool,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl KeyRequest {
    pub fn license_key(&self) -> Result<&str> {
        non_blank(&self.license_key)
            .or_else(|| non_blank(&self.gumroad_license_key))
            .or_else(|| non_blank(&self.key))
            .ok_or(AppError::MissingField("licenseKey"))
    }

    pub fn device(&self) -> Result<DeviceIdentity> {
        let device_id = non_blank(&self.device_id).ok_or(AppError::MissingField("deviceId"))?;
        let machine_id = non_blank(&self.machine_id).ok_or(AppError::MissingField("machineId"))?;
        Ok(DeviceIdentity::new(device_id, machine_id))
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_ends: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_remaining: Option<i64>,
}

impl From<Denial> for ActivateResponse {
    fn from(denial: Denial) -> Self {
        let mut response = ActivateResponse {
            success: false,
            message: denial.to_string(),
            ..Default::default()
        };
        if let Denial::InCooldown {
            hours_remaining,
            ends_at,
        } = denial
        {
            response.cooldown = Some(true);
            response.cooldown_ends = Some(format_timestamp(ends_at));
            response.hours_remaining = Some(hours_remaining);
        }
        response
    }
}

/// POST /activate
pub async fn activate(
    State(state): State<AppState>,
    Json(request): Json<KeyRequest>,
) -> Result<Json<ActivateResponse>> {
    let key = request.license_key()?;
    let device = request.device()?;
    let mut conn = state.db.get()?;

    let Some(license) = resolve_or_synthesize(&conn, key, request.verified, &state.policy)? else {
        return Ok(Json(Denial::NotFound.into()));
    };

    let response = match licensing::activate(&mut conn, &license, &device, queries::now())? {
        Ok(outcome) => {
            if matches!(outcome, ActivateOutcome::AlreadyActive(_)) {
                tracing::debug!(
                    license_id = %license.id,
                    activation_id = %outcome.activation().id,
                    "Repeated activation for same device"
                );
            }
            ActivateResponse {
                success: true,
                message: outcome.message().to_string(),
                ..Default::default()
            }
        }
        Err(denial) => denial.into(),
    };

    Ok(Json(response))
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_ends: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_remaining: Option<i64>,
}

/// POST /deactivate
pub async fn deactivate(
    State(state): State<AppState>,
    Json(request): Json<KeyRequest>,
) -> Result<Json<DeactivateResponse>> {
    let key = request.license_key()?;
    let device = request.device()?;
    let mut conn = state.db.get()?;

    let Some((license, _)) = licensing::resolve_license(&conn, key)? else {
        return Ok(Json(DeactivateResponse {
            success: false,
            message: Denial::NotFound.to_string(),
            ..Default::default()
        }));
    };

    let now = queries::now();
    let response = match licensing::deactivate(&mut conn, &license, &device, &state.policy, now)? {
        Ok(deactivation) => DeactivateResponse {
            success: true,
            message: "License key deactivated successfully".into(),
            cooldown_ends: Some(format_timestamp(deactivation.cooldown.ends_at)),
            hours_remaining: Some(hours_remaining(deactivation.cooldown.ends_at, now)),
        },
        Err(denial) => DeactivateResponse {
            success: false,
            message: denial.to_string(),
            ..Default::default()
        },
    };

    Ok(Json(response))
}

/// `valid` says whether the key is usable at all; `activated` whether it is
/// bound to the calling device.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    pub activated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_ends: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<ValidationStatus> for ValidateResponse {
    fn from(status: ValidationStatus) -> Self {
        match status {
            ValidationStatus::ActivatedHere { .. } => ValidateResponse {
                valid: true,
                activated: true,
                ..Default::default()
            },
            ValidationStatus::ActivatedElsewhere => ValidateResponse {
                valid: true,
                message: Some(Denial::AlreadyActivatedElsewhere.to_string()),
                ..Default::default()
            },
            ValidationStatus::InCooldown {
                hours_remaining,
                ends_at,
            } => ValidateResponse {
                valid: true,
                cooldown: Some(true),
                cooldown_ends: Some(format_timestamp(ends_at)),
                hours_remaining: Some(hours_remaining),
                message: Some(
                    Denial::InCooldown {
                        hours_remaining,
                        ends_at,
                    }
                    .to_string(),
                ),
                ..Default::default()
            },
            ValidationStatus::Available => ValidateResponse {
                valid: true,
                ..Default::default()
            },
        }
    }
}

/// POST /validate
pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<KeyRequest>,
) -> Result<Json<ValidateResponse>> {
    let key = request.license_key()?;
    let device = request.device()?;
    let mut conn = state.db.get()?;

    let Some(license) = resolve_or_synthesize(&conn, key, request.verified, &state.policy)? else {
        return Ok(Json(ValidateResponse {
            message: Some(Denial::NotFound.to_string()),
            ..Default::default()
        }));
    };

    let verdict = licensing::validate(&mut conn, &license, &device, &state.policy, queries::now())?;
    if let Ok(ValidationStatus::ActivatedHere { adopted: true }) = &verdict {
        tracing::info!(
            license_id = %license.id,
            device_id = %device.device_id,
            "Validation moved binding to the caller's device id"
        );
    }

    let response = match verdict {
        Ok(status) => status.into(),
        Err(denial) => ValidateResponse {
            message: Some(denial.to_string()),
            ..Default::default()
        },
    };

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeyRequest {
    pub email: Option<String>,
    #[serde(alias = "gumroadLicenseKey")]
    pub license_key: Option<String>,
    #[serde(alias = "gumroadPurchaseId")]
    pub purchase_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateKeyResponse {
    pub key: String,
}

/// POST /keys/generate
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateKeyRequest>,
) -> Result<Json<GenerateKeyResponse>> {
    let email = non_blank(&request.email).ok_or(AppError::MissingField("email"))?;
    let external_key =
        non_blank(&request.license_key).ok_or(AppError::MissingField("licenseKey"))?;
    let purchase_id =
        non_blank(&request.purchase_id).ok_or(AppError::MissingField("purchaseId"))?;

    let mut conn = state.db.get()?;
    let key = licensing::issue_local_key(&mut conn, email, external_key, purchase_id)?;

    Ok(Json(GenerateKeyResponse { key }))
}
