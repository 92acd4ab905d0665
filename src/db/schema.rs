use rusqlite::Connection;

/// Initialize the database schema (idempotent).
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        -- Licenses (one per provider purchase)
        -- external_key: key issued by the payment provider, always present
        -- local_key: key generated by this service, optional
        CREATE TABLE IF NOT EXISTS licenses (
            id TEXT PRIMARY KEY,
            external_key TEXT NOT NULL UNIQUE,
            local_key TEXT UNIQUE,
            email TEXT,
            purchased_at INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            purchase_id TEXT UNIQUE,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_licenses_active ON licenses(id) WHERE active = 1;

        -- Activations (device bindings)
        CREATE TABLE IF NOT EXISTS activations (
            id TEXT PRIMARY KEY,
            license_id TEXT NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
            device_id TEXT NOT NULL,
            machine_id TEXT NOT NULL,
            activated_at INTEGER NOT NULL,
            deactivated_at INTEGER,
            active INTEGER NOT NULL DEFAULT 1,
            UNIQUE(license_id, device_id, machine_id)
        );
        -- At most one active binding per license. A concurrent second activation
        -- fails this constraint instead of silently double-binding.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_activations_one_active
            ON activations(license_id) WHERE active = 1;
        CREATE INDEX IF NOT EXISTS idx_activations_stale
            ON activations(deactivated_at) WHERE active = 0;

        -- Cooldown periods (lockout after a deactivation)
        CREATE TABLE IF NOT EXISTS cooldown_periods (
            id TEXT PRIMARY KEY,
            license_id TEXT NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
            started_at INTEGER NOT NULL,
            ends_at INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_cooldowns_license ON cooldown_periods(license_id, ends_at DESC);
        CREATE INDEX IF NOT EXISTS idx_cooldowns_expires ON cooldown_periods(ends_at);
        "#,
    )?;
    Ok(())
}
