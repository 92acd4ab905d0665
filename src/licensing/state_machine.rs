use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{Activation, CooldownPeriod, DeviceIdentity, License};

use super::{ActivationPolicy, Denial, Verdict, cleanup_expired_cooldowns, hours_remaining};

/// Successful result of [`activate`].
#[derive(Debug, Clone)]
pub enum ActivateOutcome {
    /// The device was already bound; nothing changed
    AlreadyActive(Activation),
    /// A previous binding of this exact device was switched back on
    Reactivated(Activation),
    /// A new binding was created
    Activated(Activation),
}

impl ActivateOutcome {
    pub fn activation(&self) -> &Activation {
        match self {
            ActivateOutcome::AlreadyActive(a)
            | ActivateOutcome::Reactivated(a)
            | ActivateOutcome::Activated(a) => a,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ActivateOutcome::AlreadyActive(_) => "License key is already activated on this device",
            ActivateOutcome::Reactivated(_) => "License key reactivated successfully",
            ActivateOutcome::Activated(_) => "License key activated successfully",
        }
    }
}

/// Successful result of [`deactivate`].
#[derive(Debug, Clone)]
pub struct Deactivation {
    pub activation: Activation,
    pub cooldown: CooldownPeriod,
}

/// Read-only classification produced by [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStatus {
    /// Active on the caller's device. `adopted` is set when the binding's device id
    /// was just rewritten to the caller's (same machine id).
    ActivatedHere { adopted: bool },
    ActivatedElsewhere,
    InCooldown { hours_remaining: i64, ends_at: i64 },
    Available,
}

fn cooldown_denial(cooldown: &CooldownPeriod, now: i64) -> Denial {
    Denial::InCooldown {
        hours_remaining: hours_remaining(cooldown.ends_at, now),
        ends_at: cooldown.ends_at,
    }
}

/// Bind `license` to `device`.
///
/// Checks run in this order inside one IMMEDIATE transaction:
/// 1. this exact device is already active: no-op
/// 2. this exact device has an inactive binding: reactivate it and clear the
///    license's cooldown, unless another device currently holds the license
/// 3. another device holds the license: denied
/// 4. a live cooldown exists: denied
/// 5. otherwise insert a new binding
pub fn activate(
    conn: &mut Connection,
    license: &License,
    device: &DeviceIdentity,
    now: i64,
) -> Result<Verdict<ActivateOutcome>> {
    if !license.active {
        return Ok(Err(Denial::LicenseDeactivated));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing = queries::get_activation_for_device(&tx, &license.id, device)?;
    if let Some(activation) = &existing
        && activation.active
    {
        tracing::debug!(license_id = %license.id, "Device already activated");
        return Ok(Ok(ActivateOutcome::AlreadyActive(activation.clone())));
    }

    if let Some(other) = queries::get_active_activation(&tx, &license.id)? {
        tracing::info!(
            license_id = %license.id,
            active_device = %other.device_id,
            "Activation refused: license bound to another device"
        );
        return Ok(Err(Denial::AlreadyActivatedElsewhere));
    }

    if let Some(activation) = existing {
        queries::reactivate_activation(&tx, &activation.id, now)?;
        let cleared = queries::clear_live_cooldowns(&tx, &license.id, now)?;
        tx.commit()?;

        tracing::info!(
            license_id = %license.id,
            device_id = %device.device_id,
            cooldowns_cleared = cleared,
            "Reactivated existing device binding"
        );
        return Ok(Ok(ActivateOutcome::Reactivated(Activation {
            active: true,
            activated_at: now,
            deactivated_at: None,
            ..activation
        })));
    }

    if let Some(cooldown) = queries::get_live_cooldown(&tx, &license.id, now)? {
        let denial = cooldown_denial(&cooldown, now);
        tracing::info!(license_id = %license.id, ends_at = cooldown.ends_at, "Activation refused: cooldown");
        return Ok(Err(denial));
    }

    let activation = match queries::create_activation(&tx, &license.id, device, now) {
        Ok(a) => a,
        Err(AppError::Database(ref e)) if queries::is_one_active_violation(e) => {
            tracing::warn!(license_id = %license.id, "Concurrent activation lost the race");
            return Ok(Err(Denial::AlreadyActivatedElsewhere));
        }
        Err(e) => return Err(e),
    };
    tx.commit()?;

    tracing::info!(
        license_id = %license.id,
        device_id = %device.device_id,
        machine_id = %device.machine_id,
        "License activated"
    );
    Ok(Ok(ActivateOutcome::Activated(activation)))
}

/// Release the binding of `license` to `device` and start a cooldown.
pub fn deactivate(
    conn: &mut Connection,
    license: &License,
    device: &DeviceIdentity,
    policy: &ActivationPolicy,
    now: i64,
) -> Result<Verdict<Deactivation>> {
    if !license.active {
        return Ok(Err(Denial::LicenseDeactivated));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let activation = match queries::get_activation_for_device(&tx, &license.id, device)? {
        Some(a) if a.active => a,
        _ => return Ok(Err(Denial::NotActivatedOnDevice)),
    };

    queries::deactivate_activation(&tx, &activation.id, now)?;
    let cooldown = queries::create_cooldown(&tx, &license.id, now, now + policy.cooldown_secs())?;
    tx.commit()?;

    tracing::info!(
        license_id = %license.id,
        device_id = %device.device_id,
        cooldown_ends_at = cooldown.ends_at,
        "License deactivated"
    );

    if let Err(e) = cleanup_expired_cooldowns(conn, now) {
        tracing::warn!("Failed to cleanup cooldowns after deactivation: {}", e);
    }

    Ok(Ok(Deactivation {
        activation: Activation {
            active: false,
            deactivated_at: Some(now),
            ..activation
        },
        cooldown,
    }))
}

/// Classify the license for `device` without changing it.
///
/// The single tolerated write is machine-id adoption (see
/// [`ActivationPolicy::adopt_machine_device_change`]).
pub fn validate(
    conn: &mut Connection,
    license: &License,
    device: &DeviceIdentity,
    policy: &ActivationPolicy,
    now: i64,
) -> Result<Verdict<ValidationStatus>> {
    if !license.active {
        return Ok(Err(Denial::LicenseDeactivated));
    }

    if let Some(active) = queries::get_active_activation(conn, &license.id)? {
        if active.is_for(device) {
            return Ok(Ok(ValidationStatus::ActivatedHere { adopted: false }));
        }

        if policy.adopt_machine_device_change
            && active.machine_id == device.machine_id
            && adopt_device_id(conn, license, &active, device)?
        {
            return Ok(Ok(ValidationStatus::ActivatedHere { adopted: true }));
        }

        return Ok(Ok(ValidationStatus::ActivatedElsewhere));
    }

    if let Some(cooldown) = queries::get_live_cooldown(conn, &license.id, now)? {
        return Ok(Ok(ValidationStatus::InCooldown {
            hours_remaining: hours_remaining(cooldown.ends_at, now),
            ends_at: cooldown.ends_at,
        }));
    }

    Ok(Ok(ValidationStatus::Available))
}

/// Move an active binding to the caller's device id. Returns false if the binding
/// changed underneath us or the caller's tuple already has its own row.
fn adopt_device_id(
    conn: &mut Connection,
    license: &License,
    active: &Activation,
    device: &DeviceIdentity,
) -> Result<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let still_active = queries::get_active_activation(&tx, &license.id)?
        .is_some_and(|a| a.id == active.id && a.machine_id == device.machine_id);
    if !still_active || queries::get_activation_for_device(&tx, &license.id, device)?.is_some() {
        return Ok(false);
    }

    queries::update_activation_device_id(&tx, &active.id, &device.device_id)?;
    tx.commit()?;

    tracing::info!(
        license_id = %license.id,
        old_device_id = %active.device_id,
        new_device_id = %device.device_id,
        "Adopted new device id for known machine"
    );
    Ok(true)
}
