//! Master control-plane core.
//!
//! This module intentionally keeps the public surface small: `run_master`
//! wires the database, the live-link registry, the admin router, and the
//! periodic status job; the heavy lifting lives in the submodules.

pub mod api;
pub mod assembler;
pub mod broadcast;
pub mod context;
pub mod error;
pub mod fanout;
pub mod ingest;
pub mod lifecycle;
pub mod link;
pub mod policy;
pub mod registry;
pub mod template_rules;

use std::time::Duration;

use anyhow::Result;
use tracing::info;

pub use context::MasterContext;
pub use error::{MasterError, MasterResult};

#[derive(Clone)]
pub struct MasterConfig {
    pub bind: String,
    pub port: u16,
    /// Shared admin bearer token; `None` leaves the panel open.
    pub admin_token: Option<String>,
    /// Externally reachable base URL, embedded in install commands.
    pub public_url: Option<String>,
    /// Cadence of the stateless UI status broadcast.
    pub status_interval: Duration,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            admin_token: None,
            public_url: None,
            status_interval: Duration::from_secs(10),
        }
    }
}

/// Launch the master: open and migrate the store, then serve the admin API
/// and the agent link endpoint until the process is stopped.
pub async fn run_master(config: MasterConfig) -> Result<()> {
    let db = state_store::open_db().await?;
    state_store::migrate(&db).await?;

    let ctx = MasterContext::new(db.pool);
    broadcast::spawn_status_job(ctx.clone(), config.status_interval);

    let state = api::ApiState {
        ctx,
        admin_token: config.admin_token,
        public_url: config.public_url,
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind((config.bind.as_str(), config.port)).await?;
    info!("master listening on {}:{}", config.bind, config.port);
    axum::serve(listener, app).await?;
    Ok(())
}
