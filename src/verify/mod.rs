//! Confirmation of license keys with the payment provider.

mod gumroad;

pub use gumroad::*;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Buyer details the provider returns for a known key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseDetails {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub created_at: Option<String>,
    pub refunded: bool,
    pub chargebacked: bool,
}

/// The provider's answer for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPurchase {
    /// Provider recognized the key for this product
    pub success: bool,
    pub message: Option<String>,
    pub purchase: Option<PurchaseDetails>,
}

impl VerifiedPurchase {
    /// A key is usable when the provider knows it and the sale was not charged back.
    pub fn is_valid(&self) -> bool {
        self.success && self.purchase.as_ref().is_some_and(|p| !p.chargebacked)
    }
}

#[async_trait]
pub trait LicenseVerifier: Send + Sync {
    /// Ask the provider about `license_key` for `product_permalink`.
    ///
    /// An unknown key is `Ok` with `success: false`. Transport and decoding
    /// failures are `AppError::Upstream`.
    async fn verify(&self, license_key: &str, product_permalink: &str) -> Result<VerifiedPurchase>;
}
