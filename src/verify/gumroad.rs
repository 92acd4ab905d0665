use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::{LicenseVerifier, PurchaseDetails, VerifiedPurchase};

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    product_permalink: &'a str,
    license_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    purchase: Option<GumroadPurchase>,
}

#[derive(Debug, Deserialize)]
struct GumroadPurchase {
    email: Option<String>,
    full_name: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    refunded: bool,
    #[serde(default)]
    chargebacked: bool,
}

#[derive(Debug, Clone)]
pub struct GumroadClient {
    client: Client,
    verify_url: String,
}

impl GumroadClient {
    pub fn new(verify_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            verify_url: verify_url.into(),
        })
    }
}

#[async_trait]
impl LicenseVerifier for GumroadClient {
    async fn verify(&self, license_key: &str, product_permalink: &str) -> Result<VerifiedPurchase> {
        let response = self
            .client
            .post(&self.verify_url)
            .json(&VerifyRequest {
                product_permalink,
                license_key,
            })
            .send()
            .await?;

        // Gumroad answers unknown keys with a 404 and a JSON body, so the body is
        // parsed regardless of status. Only server errors are treated as failures.
        let status = response.status();
        if status.is_server_error() {
            return Err(AppError::Upstream(format!("Gumroad returned {}", status)));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Gumroad response: {}", e)))?;

        tracing::debug!(success = body.success, status = %status, "Gumroad verification answered");

        Ok(VerifiedPurchase {
            success: body.success,
            message: body.message,
            purchase: body.purchase.filter(|_| body.success).map(|p| PurchaseDetails {
                email: p.email,
                full_name: p.full_name,
                created_at: p.created_at,
                refunded: p.refunded,
                chargebacked: p.chargebacked,
            }),
        })
    }
}
