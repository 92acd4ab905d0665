use chrono::Utc;
use rusqlite::{Connection, ErrorCode, params};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{ACTIVATION_COLS, COOLDOWN_COLS, LICENSE_COLS, query_all, query_one};

pub fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// SQL expression equivalent of `licensing::normalize_key` for a column.
fn normalized_sql(column: &str) -> String {
    format!(
        "UPPER(REPLACE(REPLACE(REPLACE(REPLACE(REPLACE({}, '-', ''), ' ', ''), char(9), ''), char(10), ''), char(13), ''))",
        column
    )
}

/// True if the error is the one-active-activation-per-license constraint firing.
///
/// The partial unique index reports only `activations.license_id`; the device tuple
/// constraint lists all three columns.
pub fn is_one_active_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == ErrorCode::ConstraintViolation
                && msg.trim_end().ends_with("activations.license_id")
        }
        _ => false,
    }
}

/// True if the error is any UNIQUE/PRIMARY KEY constraint failure.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// ============ Licenses ============

pub fn create_license(conn: &Connection, input: &CreateLicense) -> Result<License> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO licenses (id, external_key, local_key, email, purchased_at, active, purchase_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)",
        params![
            &id,
            &input.external_key,
            &input.local_key,
            &input.email,
            now,
            &input.purchase_id,
            now
        ],
    )?;

    Ok(License {
        id,
        external_key: input.external_key.clone(),
        local_key: input.local_key.clone(),
        email: input.email.clone(),
        purchased_at: now,
        active: true,
        purchase_id: input.purchase_id.clone(),
        created_at: now,
    })
}

pub fn get_license_by_id(conn: &Connection, id: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE id = ?1", LICENSE_COLS),
        &[&id],
    )
}

pub fn get_license_by_external_key(conn: &Connection, key: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE external_key = ?1", LICENSE_COLS),
        &[&key],
    )
}

pub fn get_license_by_local_key(conn: &Connection, key: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE local_key = ?1", LICENSE_COLS),
        &[&key],
    )
}

/// Look up a license whose external or local key matches once both sides are
/// normalized. External key matches win over local key matches.
fn find_license_by_normalized_key(
    conn: &Connection,
    normalized: &str,
    active: bool,
) -> Result<Option<License>> {
    let external = normalized_sql("external_key");
    let local = normalized_sql("local_key");
    query_one(
        conn,
        &format!(
            "SELECT {cols} FROM licenses
             WHERE active = ?2 AND ({external} = ?1 OR (local_key IS NOT NULL AND {local} = ?1))
             ORDER BY CASE WHEN {external} = ?1 THEN 0 ELSE 1 END, created_at ASC
             LIMIT 1",
            cols = LICENSE_COLS,
        ),
        &[&normalized, &(active as i32)],
    )
}

pub fn find_active_license_by_normalized_key(
    conn: &Connection,
    normalized: &str,
) -> Result<Option<License>> {
    find_license_by_normalized_key(conn, normalized, true)
}

/// Normalized match restricted to licenses an administrator disabled.
pub fn find_disabled_license_by_normalized_key(
    conn: &Connection,
    normalized: &str,
) -> Result<Option<License>> {
    find_license_by_normalized_key(conn, normalized, false)
}

pub fn get_license_by_purchase_id(conn: &Connection, purchase_id: &str) -> Result<Option<License>> {
    query_one(
        conn,
        &format!("SELECT {} FROM licenses WHERE purchase_id = ?1", LICENSE_COLS),
        &[&purchase_id],
    )
}

pub fn update_license_external_key(conn: &Connection, id: &str, external_key: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET external_key = ?1 WHERE id = ?2",
        params![external_key, id],
    )?;
    Ok(affected > 0)
}

/// Attach a purchase to a license created without one. Keeps an existing email.
pub fn attach_purchase(conn: &Connection, id: &str, purchase_id: &str, email: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET purchase_id = ?1, email = COALESCE(email, ?2)
         WHERE id = ?3 AND purchase_id IS NULL",
        params![purchase_id, email, id],
    )?;
    Ok(affected > 0)
}

pub fn set_license_local_key(conn: &Connection, id: &str, local_key: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET local_key = ?1 WHERE id = ?2",
        params![local_key, id],
    )?;
    Ok(affected > 0)
}

/// Enable or disable a license (administrative action only).
pub fn set_license_active(conn: &Connection, id: &str, active: bool) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE licenses SET active = ?1 WHERE id = ?2",
        params![active as i32, id],
    )?;
    Ok(affected > 0)
}

pub fn count_licenses(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM licenses", [], |row| row.get(0))
        .map_err(Into::into)
}

// ============ Activations ============

/// Look up the binding for an exact (license, device, machine) tuple, active or not.
pub fn get_activation_for_device(
    conn: &Connection,
    license_id: &str,
    device: &DeviceIdentity,
) -> Result<Option<Activation>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM activations WHERE license_id = ?1 AND device_id = ?2 AND machine_id = ?3",
            ACTIVATION_COLS
        ),
        &[&license_id, &device.device_id, &device.machine_id],
    )
}

pub fn get_active_activation(conn: &Connection, license_id: &str) -> Result<Option<Activation>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM activations WHERE license_id = ?1 AND active = 1",
            ACTIVATION_COLS
        ),
        &[&license_id],
    )
}

pub fn list_activations_for_license(conn: &Connection, license_id: &str) -> Result<Vec<Activation>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM activations WHERE license_id = ?1 ORDER BY activated_at DESC",
            ACTIVATION_COLS
        ),
        &[&license_id],
    )
}

pub fn count_active_activations(conn: &Connection, license_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM activations WHERE license_id = ?1 AND active = 1",
        params![license_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// Insert a new active binding. Fails with a constraint violation if another
/// binding for the license is already active.
pub fn create_activation(
    conn: &Connection,
    license_id: &str,
    device: &DeviceIdentity,
    now: i64,
) -> Result<Activation> {
    let id = gen_id();

    conn.execute(
        "INSERT INTO activations (id, license_id, device_id, machine_id, activated_at, deactivated_at, active)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, 1)",
        params![&id, license_id, &device.device_id, &device.machine_id, now],
    )?;

    Ok(Activation {
        id,
        license_id: license_id.to_string(),
        device_id: device.device_id.clone(),
        machine_id: device.machine_id.clone(),
        activated_at: now,
        deactivated_at: None,
        active: true,
    })
}

/// Flip an inactive binding back on. Returns false if it was already active or missing.
pub fn reactivate_activation(conn: &Connection, id: &str, now: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE activations SET active = 1, deactivated_at = NULL, activated_at = ?1
         WHERE id = ?2 AND active = 0",
        params![now, id],
    )?;
    Ok(affected > 0)
}

/// Flip an active binding off. Returns false if it was not active.
pub fn deactivate_activation(conn: &Connection, id: &str, now: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE activations SET active = 0, deactivated_at = ?1 WHERE id = ?2 AND active = 1",
        params![now, id],
    )?;
    Ok(affected > 0)
}

pub fn update_activation_device_id(conn: &Connection, id: &str, device_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE activations SET device_id = ?1 WHERE id = ?2",
        params![device_id, id],
    )?;
    Ok(affected > 0)
}

/// Delete inactive bindings deactivated before `cutoff`.
pub fn purge_stale_activations(conn: &Connection, cutoff: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM activations WHERE active = 0 AND deactivated_at IS NOT NULL AND deactivated_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Cooldown Periods ============

pub fn create_cooldown(
    conn: &Connection,
    license_id: &str,
    started_at: i64,
    ends_at: i64,
) -> Result<CooldownPeriod> {
    let id = gen_id();

    conn.execute(
        "INSERT INTO cooldown_periods (id, license_id, started_at, ends_at, active)
         VALUES (?1, ?2, ?3, ?4, 1)",
        params![&id, license_id, started_at, ends_at],
    )?;

    Ok(CooldownPeriod {
        id,
        license_id: license_id.to_string(),
        started_at,
        ends_at,
        active: true,
    })
}

/// The live cooldown ending last, if any.
pub fn get_live_cooldown(
    conn: &Connection,
    license_id: &str,
    now: i64,
) -> Result<Option<CooldownPeriod>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM cooldown_periods
             WHERE license_id = ?1 AND active = 1 AND ends_at > ?2
             ORDER BY ends_at DESC LIMIT 1",
            COOLDOWN_COLS
        ),
        &[&license_id, &now],
    )
}

pub fn list_cooldowns_for_license(conn: &Connection, license_id: &str) -> Result<Vec<CooldownPeriod>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM cooldown_periods WHERE license_id = ?1 ORDER BY started_at DESC",
            COOLDOWN_COLS
        ),
        &[&license_id],
    )
}

/// Mark every live cooldown of a license inactive. Returns how many were cleared.
pub fn clear_live_cooldowns(conn: &Connection, license_id: &str, now: i64) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE cooldown_periods SET active = 0 WHERE license_id = ?1 AND active = 1 AND ends_at > ?2",
        params![license_id, now],
    )?;
    Ok(affected)
}

/// Delete cooldown rows that no longer constrain anything.
pub fn cleanup_expired_cooldowns(conn: &Connection, now: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM cooldown_periods WHERE ends_at < ?1 OR active = 0",
        params![now],
    )?;
    Ok(deleted)
}
