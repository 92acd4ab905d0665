//! Resolve a caller-supplied key to a license.
//!
//! Clients send either the provider-issued key or a locally generated one, in
//! whatever casing and hyphenation they stored it with. Every endpoint goes
//! through [`resolve_license`] so the conventions are handled in one place.

use rusqlite::Connection;
use strum::AsRefStr;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{CreateLicense, License};

use super::ActivationPolicy;

/// Characters dropped by normalization. Must match `queries::normalized_sql`.
const KEY_SEPARATORS: [char; 5] = [' ', '\t', '\n', '\r', '-'];

/// Strip whitespace and hyphens and uppercase (ASCII only, as SQLite's `UPPER`).
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !KEY_SEPARATORS.contains(c))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// One step of the lookup chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum KeyLookup {
    /// Exact match on the provider-issued key
    ExternalKey,
    /// Exact match on the locally generated key
    LocalKey,
    /// Normalized match on either key, active licenses only
    Normalized,
    /// Normalized match on a disabled license. Not part of the chain; see
    /// [`resolve_license_including_disabled`].
    DisabledNormalized,
}

/// Lookup order; the first strategy that finds a license wins.
pub const LOOKUP_CHAIN: [KeyLookup; 3] = [
    KeyLookup::ExternalKey,
    KeyLookup::LocalKey,
    KeyLookup::Normalized,
];

impl KeyLookup {
    fn find(self, conn: &Connection, trimmed: &str, normalized: &str) -> Result<Option<License>> {
        match self {
            KeyLookup::ExternalKey => queries::get_license_by_external_key(conn, trimmed),
            KeyLookup::LocalKey => queries::get_license_by_local_key(conn, trimmed),
            KeyLookup::Normalized => queries::find_active_license_by_normalized_key(conn, normalized),
            KeyLookup::DisabledNormalized => {
                queries::find_disabled_license_by_normalized_key(conn, normalized)
            }
        }
    }
}

/// Resolve `raw_key` through [`LOOKUP_CHAIN`].
///
/// Returns the license and the strategy that matched, or `None`. A key that is
/// empty after normalization is rejected before touching the store.
pub fn resolve_license(conn: &Connection, raw_key: &str) -> Result<Option<(License, KeyLookup)>> {
    let trimmed = raw_key.trim();
    let normalized = normalize_key(trimmed);
    if normalized.is_empty() {
        return Err(AppError::BadRequest("License key is required".into()));
    }

    for lookup in LOOKUP_CHAIN {
        if let Some(license) = lookup.find(conn, trimmed, &normalized)? {
            tracing::debug!(license_id = %license.id, via = lookup.as_ref(), "Resolved license key");
            return Ok(Some((license, lookup)));
        }
    }

    Ok(None)
}

/// [`resolve_license`], then a normalized match against disabled licenses.
///
/// Used where a disabled license must still be found under any spelling of its
/// key: administration, and the check that keeps synthesis from minting a fresh
/// license for a key an administrator turned off.
pub fn resolve_license_including_disabled(
    conn: &Connection,
    raw_key: &str,
) -> Result<Option<(License, KeyLookup)>> {
    if let Some(found) = resolve_license(conn, raw_key)? {
        return Ok(Some(found));
    }

    let lookup = KeyLookup::DisabledNormalized;
    let found = lookup.find(conn, raw_key.trim(), &normalize_key(raw_key))?;
    if let Some(license) = &found {
        tracing::debug!(license_id = %license.id, via = lookup.as_ref(), "Resolved disabled license key");
    }
    Ok(found.map(|license| (license, lookup)))
}

/// Resolve a key, creating a license for it when nothing matches, the caller says
/// the provider already verified it, and the policy allows synthesis.
pub fn resolve_or_synthesize(
    conn: &Connection,
    raw_key: &str,
    verified: bool,
    policy: &ActivationPolicy,
) -> Result<Option<License>> {
    if !verified || !policy.synthesize_verified_licenses {
        return Ok(resolve_license(conn, raw_key)?.map(|(license, _)| license));
    }

    // A disabled license is returned as is so the caller reports it deactivated.
    if let Some((license, _)) = resolve_license_including_disabled(conn, raw_key)? {
        return Ok(Some(license));
    }

    let input = CreateLicense {
        external_key: raw_key.trim().to_string(),
        local_key: None,
        email: None,
        purchase_id: None,
    };

    match queries::create_license(conn, &input) {
        Ok(license) => {
            tracing::info!(license_id = %license.id, "Created license for verified key");
            Ok(Some(license))
        }
        // Another request inserted the same key first; use theirs.
        Err(AppError::Database(ref e)) if queries::is_unique_violation(e) => {
            Ok(resolve_license(conn, raw_key)?.map(|(license, _)| license))
        }
        Err(e) => Err(e),
    }
}
