//! Gumroad "ping" purchase notifications.
//!
//! Gumroad posts form-encoded bodies, but relays and test tools send JSON or
//! URL-encoded text under arbitrary content types, so the body is decoded by
//! trying each encoding in turn.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
};
use serde::Serialize;
use serde_json::Value;
use url::form_urlencoded;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::licensing::{IntakeOutcome, PurchaseNotification, record_purchase};

const PURCHASE_ID_FIELDS: &[&str] = &["sale_id", "purchase_id", "saleId", "purchaseId"];
const EMAIL_FIELDS: &[&str] = &["email"];
const LICENSE_KEY_FIELDS: &[&str] = &["license_key", "licenseKey"];
const PRODUCT_ID_FIELDS: &[&str] = &["product_id", "productId"];

/// Flat key/value view of a decoded notification body.
#[derive(Debug)]
struct Fields(Vec<(String, String)>);

impl Fields {
    fn from_urlencoded(body: &[u8]) -> Self {
        Fields(
            form_urlencoded::parse(body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        )
    }

    /// Top-level string and number members of a JSON object.
    fn from_json(body: &[u8]) -> Option<Self> {
        let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
            return None;
        };

        let pairs = map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                Value::Number(n) => Some((k, n.to_string())),
                _ => None,
            })
            .collect();
        Some(Fields(pairs))
    }

    /// First non-blank value among `names`, in the order given.
    fn get(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| {
            self.0
                .iter()
                .find(|(k, v)| k == name && !v.trim().is_empty())
                .map(|(_, v)| v.trim().to_string())
        })
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn decode(headers: &HeaderMap, body: &[u8]) -> Fields {
    if is_form(headers) {
        tracing::debug!("Decoding Gumroad notification as form data");
        return Fields::from_urlencoded(body);
    }

    if let Some(fields) = Fields::from_json(body) {
        tracing::debug!("Decoded Gumroad notification as JSON");
        return fields;
    }

    tracing::debug!("Decoding Gumroad notification as URL-encoded text");
    Fields::from_urlencoded(body)
}

/// Extract a purchase from a notification body.
///
/// Required fields are checked in order: purchase id, email, license key.
pub fn parse_notification(headers: &HeaderMap, body: &[u8]) -> Result<PurchaseNotification> {
    let fields = decode(headers, body);

    let purchase_id = fields
        .get(PURCHASE_ID_FIELDS)
        .ok_or(AppError::MissingField("purchase ID"))?;
    let email = fields.get(EMAIL_FIELDS).ok_or(AppError::MissingField("email"))?;
    let license_key = fields
        .get(LICENSE_KEY_FIELDS)
        .ok_or(AppError::MissingField("license key"))?;

    Ok(PurchaseNotification {
        purchase_id,
        email,
        license_key,
        product_id: fields.get(PRODUCT_ID_FIELDS),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,
    pub message: &'static str,
    pub license_key: String,
}

/// POST /webhook/gumroad
pub async fn handle_gumroad_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    let purchase = match parse_notification(&headers, &body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Rejected Gumroad notification: {}", e);
            return Err(e);
        }
    };

    tracing::info!(
        purchase_id = %purchase.purchase_id,
        product_id = purchase.product_id.as_deref().unwrap_or("-"),
        "Received Gumroad purchase"
    );

    let mut conn = state.db.get()?;
    let outcome = record_purchase(&mut conn, &purchase)?;
    if let IntakeOutcome::Unchanged(license) = &outcome {
        tracing::debug!(license_id = %license.id, "Duplicate Gumroad notification");
    }

    Ok(Json(WebhookResponse {
        success: true,
        message: "License key processed successfully",
        license_key: purchase.license_key,
    }))
}
