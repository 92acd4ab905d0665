//! License activation rules.
//!
//! A license is in one of three states:
//! - unactivated: no active binding and no live cooldown
//! - activated on exactly one (device, machine) pair
//! - cooling down after a deactivation, which blocks binding a *different* device
//!
//! All transitions run against a pooled SQLite connection. Writes happen inside
//! IMMEDIATE transactions, and the schema's partial unique index on active
//! activations rejects a second concurrent binding.

mod cooldown;
mod intake;
mod keygen;
mod resolve;
mod state_machine;

pub use cooldown::*;
pub use intake::*;
pub use keygen::*;
pub use resolve::*;
pub use state_machine::*;

use std::time::Duration;

use thiserror::Error;

/// Lockout after a deactivation, used unless `COOLDOWN_WINDOW_HOURS` overrides it.
pub const DEFAULT_COOLDOWN_WINDOW: Duration = Duration::from_secs(2 * 60 * 60);

/// Inactive activations older than this many days are purged by maintenance.
pub const DEFAULT_STALE_ACTIVATION_DAYS: i64 = 90;

/// Tunable rules for the state machine.
#[derive(Debug, Clone, Copy)]
pub struct ActivationPolicy {
    pub cooldown_window: Duration,
    /// When validating, treat a matching machine id as authoritative and move the
    /// active binding to the caller's new device id instead of reporting a conflict.
    /// Covers stable hardware whose software-derived device id changed.
    pub adopt_machine_device_change: bool,
    /// Let resolution create a license for a key the caller says the provider
    /// already verified.
    pub synthesize_verified_licenses: bool,
}

impl ActivationPolicy {
    pub fn cooldown_secs(&self) -> i64 {
        self.cooldown_window.as_secs() as i64
    }
}

impl Default for ActivationPolicy {
    fn default() -> Self {
        Self {
            cooldown_window: DEFAULT_COOLDOWN_WINDOW,
            adopt_machine_device_change: true,
            synthesize_verified_licenses: true,
        }
    }
}

/// An expected refusal. Reported to clients as a negative verdict, not a fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    #[error("Invalid license key")]
    NotFound,

    #[error("This license key has been deactivated")]
    LicenseDeactivated,

    #[error("This license key is already activated on another device")]
    AlreadyActivatedElsewhere,

    #[error("This license key is in a cooldown period. Please try again in {hours_remaining} hours.")]
    InCooldown { hours_remaining: i64, ends_at: i64 },

    #[error("This device is not activated with this license key")]
    NotActivatedOnDevice,
}

/// Outcome of a state machine call: `Ok` on success, `Err(Denial)` on refusal.
pub type Verdict<T> = std::result::Result<T, Denial>;
