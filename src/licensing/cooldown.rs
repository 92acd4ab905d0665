use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::error::Result;

const SECONDS_PER_HOUR: i64 = 3600;
const SECONDS_PER_DAY: i64 = 86400;

/// Whole hours left until `ends_at`, rounded up. Zero once the cooldown has ended.
pub fn hours_remaining(ends_at: i64, now: i64) -> i64 {
    let remaining = ends_at - now;
    if remaining <= 0 {
        return 0;
    }
    (remaining + SECONDS_PER_HOUR - 1) / SECONDS_PER_HOUR
}

/// Delete cooldown rows that have ended or were cleared. Safe to call at any time.
pub fn cleanup_expired_cooldowns(conn: &Connection, now: i64) -> Result<usize> {
    let removed = queries::cleanup_expired_cooldowns(conn, now)?;
    if removed > 0 {
        tracing::debug!("Removed {} expired cooldown periods", removed);
    }
    Ok(removed)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub cooldown_periods_removed: usize,
    pub activations_removed: usize,
}

/// Full maintenance pass: dead cooldowns plus inactive activations older than
/// `stale_activation_days`.
pub fn run_maintenance(
    conn: &Connection,
    now: i64,
    stale_activation_days: i64,
) -> Result<MaintenanceReport> {
    let cooldown_periods_removed = cleanup_expired_cooldowns(conn, now)?;
    let cutoff = now - stale_activation_days * SECONDS_PER_DAY;
    let activations_removed = queries::purge_stale_activations(conn, cutoff)?;

    tracing::info!(
        cooldown_periods_removed,
        activations_removed,
        "Maintenance pass complete"
    );

    Ok(MaintenanceReport {
        cooldown_periods_removed,
        activations_removed,
    })
}
