use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{CreateLicense, License};

/// Purchase details extracted from a provider notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseNotification {
    pub purchase_id: String,
    pub email: String,
    pub license_key: String,
    pub product_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum IntakeOutcome {
    Created(License),
    /// The purchase was known and its provider key changed
    KeyUpdated(License),
    Unchanged(License),
}

impl IntakeOutcome {
    pub fn license(&self) -> &License {
        match self {
            IntakeOutcome::Created(l) | IntakeOutcome::KeyUpdated(l) | IntakeOutcome::Unchanged(l) => l,
        }
    }
}

pub(super) fn key_owned_elsewhere() -> AppError {
    AppError::BadRequest("License key is already registered to another purchase".into())
}

/// Upsert the license for a purchase. Idempotent per purchase id.
pub fn record_purchase(conn: &mut Connection, purchase: &PurchaseNotification) -> Result<IntakeOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let by_purchase = queries::get_license_by_purchase_id(&tx, &purchase.purchase_id)?;

    // The key may belong to another purchase, or to a synthesized license while
    // this purchase already has its own row; either way it cannot move here.
    if let Some(owner) = queries::get_license_by_external_key(&tx, &purchase.license_key)?
        && owner.purchase_id.as_deref() != Some(purchase.purchase_id.as_str())
        && (owner.purchase_id.is_some() || by_purchase.is_some())
    {
        return Err(key_owned_elsewhere());
    }

    let outcome = match by_purchase {
        Some(license) if license.external_key == purchase.license_key => {
            IntakeOutcome::Unchanged(license)
        }
        Some(license) => {
            queries::update_license_external_key(&tx, &license.id, &purchase.license_key)?;
            tracing::info!(license_id = %license.id, "Updated provider license key");
            IntakeOutcome::KeyUpdated(License {
                external_key: purchase.license_key.clone(),
                ..license
            })
        }
        None => match queries::get_license_by_external_key(&tx, &purchase.license_key)? {
            // A license synthesized from a verified key before the webhook arrived:
            // attach the purchase to it instead of inserting a duplicate key.
            Some(license) => {
                queries::attach_purchase(&tx, &license.id, &purchase.purchase_id, &purchase.email)?;
                tracing::info!(license_id = %license.id, "Attached purchase to existing license");
                IntakeOutcome::KeyUpdated(License {
                    email: license.email.clone().or_else(|| Some(purchase.email.clone())),
                    purchase_id: Some(purchase.purchase_id.clone()),
                    ..license
                })
            }
            None => {
                let license = queries::create_license(
                    &tx,
                    &CreateLicense {
                        external_key: purchase.license_key.clone(),
                        local_key: None,
                        email: Some(purchase.email.clone()),
                        purchase_id: Some(purchase.purchase_id.clone()),
                    },
                )?;
                tracing::info!(license_id = %license.id, "Stored license for new purchase");
                IntakeOutcome::Created(license)
            }
        },
    };

    tx.commit()?;
    Ok(outcome)
}
