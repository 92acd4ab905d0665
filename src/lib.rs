//! Keyhold - single-device license activation server
//!
//! Binds each license key to one device at a time, with a cooldown after
//! deactivation, and records purchases from Gumroad.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod licensing;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod verify;
