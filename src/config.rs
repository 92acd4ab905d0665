use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::licensing::{ActivationPolicy, DEFAULT_COOLDOWN_WINDOW, DEFAULT_STALE_ACTIVATION_DAYS};

pub const DEFAULT_GUMROAD_VERIFY_URL: &str = "https://api.gumroad.com/v2/licenses/verify";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Lockout applied after a deactivation before another device may bind.
    pub cooldown_window: Duration,
    /// Inactive activations older than this are purged by maintenance.
    pub stale_activation_days: i64,
    pub cleanup_interval: Duration,
    /// Trust machine id over device id when validating (see `ActivationPolicy`).
    pub adopt_machine_device_change: bool,
    /// Create a license on the fly when the caller asserts upstream verification.
    pub synthesize_verified_licenses: bool,
    /// Bearer token for maintenance/admin routes. Those routes reject everything when unset.
    pub admin_token: Option<String>,
    pub gumroad_verify_url: String,
    pub upstream_timeout: Duration,
    pub rate_limit_rpm: u32,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env_or("PORT", 3000);

        let cooldown_hours: u64 = env_or(
            "COOLDOWN_WINDOW_HOURS",
            DEFAULT_COOLDOWN_WINDOW.as_secs() / 3600,
        );

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "keyhold.db".to_string()),
            cooldown_window: Duration::from_secs(cooldown_hours * 3600),
            stale_activation_days: env_or(
                "STALE_ACTIVATION_RETENTION_DAYS",
                DEFAULT_STALE_ACTIVATION_DAYS,
            ),
            cleanup_interval: Duration::from_secs(env_or("CLEANUP_INTERVAL_SECS", 15 * 60)),
            adopt_machine_device_change: env_flag("ADOPT_MACHINE_DEVICE_CHANGE", true),
            synthesize_verified_licenses: env_flag("SYNTHESIZE_VERIFIED_LICENSES", true),
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            gumroad_verify_url: env::var("GUMROAD_VERIFY_URL")
                .unwrap_or_else(|_| DEFAULT_GUMROAD_VERIFY_URL.to_string()),
            upstream_timeout: Duration::from_secs(env_or("UPSTREAM_TIMEOUT_SECS", 10)),
            rate_limit_rpm: env_or::<u32>("RATE_LIMIT_RPM", 60).max(1),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn activation_policy(&self) -> ActivationPolicy {
        ActivationPolicy {
            cooldown_window: self.cooldown_window,
            adopt_machine_device_change: self.adopt_machine_device_change,
            synthesize_verified_licenses: self.synthesize_verified_licenses,
        }
    }
}
