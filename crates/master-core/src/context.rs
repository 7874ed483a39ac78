//! Runtime dependencies for master-core operations.
//!
//! One value wired at startup and passed by reference to every component, so
//! tests control DB and registry wiring explicitly and nothing reaches for
//! globals.

use sqlx::SqlitePool;

use crate::{broadcast::EventBus, fanout::PushLocks, registry::Registry};

#[derive(Clone)]
pub struct MasterContext {
    pool: SqlitePool,
    pub registry: Registry,
    pub push_locks: PushLocks,
    pub events: EventBus,
}

impl MasterContext {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            registry: Registry::new(),
            push_locks: PushLocks::default(),
            events: EventBus::new(64),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
