use rand::Rng;
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::Result;
use crate::models::CreateLicense;

use super::intake::key_owned_elsewhere;

const KEY_GROUPS: usize = 5;
const GROUP_LEN: usize = 5;
const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Generate a local key: five groups of five uppercase hex characters,
/// e.g. `3F09A-C1B2D-...`.
pub fn generate_local_key() -> String {
    let mut rng = rand::thread_rng();
    let mut group = || -> String {
        (0..GROUP_LEN)
            .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
            .collect()
    };

    (0..KEY_GROUPS).map(|_| group()).collect::<Vec<_>>().join("-")
}

/// Return the local key for a purchase, issuing one if needed.
///
/// Repeated calls for the same purchase return the same key. A provider key that
/// belongs to another purchase is rejected. One held by a license synthesized
/// from a verified key is claimed for this purchase.
pub fn issue_local_key(
    conn: &mut Connection,
    email: &str,
    external_key: &str,
    purchase_id: &str,
) -> Result<String> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let license = match queries::get_license_by_purchase_id(&tx, purchase_id)? {
        Some(license) => license,
        None => match queries::get_license_by_external_key(&tx, external_key)? {
            Some(owner) if owner.purchase_id.is_some() => return Err(key_owned_elsewhere()),
            Some(owner) => {
                queries::attach_purchase(&tx, &owner.id, purchase_id, email)?;
                tracing::info!(license_id = %owner.id, "Attached purchase to existing license");
                owner
            }
            None => {
                let key = generate_local_key();
                let license = queries::create_license(
                    &tx,
                    &CreateLicense {
                        external_key: external_key.to_string(),
                        local_key: Some(key.clone()),
                        email: Some(email.to_string()),
                        purchase_id: Some(purchase_id.to_string()),
                    },
                )?;
                tx.commit()?;
                tracing::info!(license_id = %license.id, "Created license with local key");
                return Ok(key);
            }
        },
    };

    let key = match license.local_key {
        Some(key) => key,
        None => {
            let key = generate_local_key();
            queries::set_license_local_key(&tx, &license.id, &key)?;
            tracing::info!(license_id = %license.id, "Issued local key for existing license");
            key
        }
    };

    tx.commit()?;
    Ok(key)
}
