//! SQLite persistence for the fleetbridge master.
//!
//! One embedded database file holds the whole control-plane state: slaves,
//! inbounds, client traffics, accounts, outbound counters, certificates, and
//! settings. Query modules are grouped per entity family and take
//! `impl SqliteExecutor` so callers can pass either the pool or an open
//! transaction.

mod db;
mod error;

pub mod accounts;
pub mod certs;
pub mod inbounds;
pub mod settings;
pub mod slaves;
pub mod test_support;
pub mod traffic;

pub use db::{DbHandle, checkpoint, display_db_path, display_path, migrate, open_db, validate_db};
pub use error::{DbError, DbResult};

/// Current unix time in seconds, the resolution used for liveness fields
/// (`last_seen`, `last_online`, `last_updated`).
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current unix time in milliseconds, the resolution used for expiry and
/// audit-style fields (`expiry_time`, `created_at`, `updated_at`).
pub fn now_unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
