mod from_row;
mod schema;
pub mod queries;

pub use from_row::{FromRow, query_all, query_one};
pub use schema::init_db;

use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::licensing::ActivationPolicy;
use crate::verify::LicenseVerifier;

pub type DbPool = Pool<SqliteConnectionManager>;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub policy: ActivationPolicy,
    /// External provider used by /verify
    pub verifier: Arc<dyn LicenseVerifier>,
    /// Bearer token guarding maintenance and admin routes
    pub admin_token: Option<String>,
    pub stale_activation_days: i64,
}

fn configure_connection(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(configure_connection);
    Pool::builder()
        .max_size(10)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)
}

/// Single-connection pool over a private in-memory database.
///
/// Every in-memory SQLite connection is its own database, so the pool is capped at one.
pub fn create_memory_pool() -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::memory().with_init(configure_connection);
    Pool::builder()
        .max_size(1)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)
}
