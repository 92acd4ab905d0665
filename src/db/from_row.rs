//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const LICENSE_COLS: &str =
    "id, external_key, local_key, email, purchased_at, active, purchase_id, created_at";

pub const ACTIVATION_COLS: &str =
    "id, license_id, device_id, machine_id, activated_at, deactivated_at, active";

pub const COOLDOWN_COLS: &str = "id, license_id, started_at, ends_at, active";

// ============ FromRow Implementations ============

impl FromRow for License {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(License {
            id: row.get(0)?,
            external_key: row.get(1)?,
            local_key: row.get(2)?,
            email: row.get(3)?,
            purchased_at: row.get(4)?,
            active: row.get::<_, i32>(5)? != 0,
            purchase_id: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

impl FromRow for Activation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Activation {
            id: row.get(0)?,
            license_id: row.get(1)?,
            device_id: row.get(2)?,
            machine_id: row.get(3)?,
            activated_at: row.get(4)?,
            deactivated_at: row.get(5)?,
            active: row.get::<_, i32>(6)? != 0,
        })
    }
}

impl FromRow for CooldownPeriod {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CooldownPeriod {
            id: row.get(0)?,
            license_id: row.get(1)?,
            started_at: row.get(2)?,
            ends_at: row.get(3)?,
            active: row.get::<_, i32>(4)? != 0,
        })
    }
}
