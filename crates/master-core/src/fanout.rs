//! Config fan-out: assemble and transmit `update_config_full` frames.
//!
//! Pushes to one slave are serialized by a per-slave mutex held from
//! assembly start through frame write, so the last mutation committed is the
//! last config observed on the wire. Pushes to different slaves interleave
//! freely.

use std::{collections::HashMap, sync::Arc};

use fb_types::MasterFrame;
use tokio::sync::Mutex;
use tracing::warn;

use crate::{assembler, context::MasterContext, error::MasterResult};

/// `slave_id -> mutex` table backing the per-slave push ordering guarantee.
#[derive(Clone, Default)]
pub struct PushLocks {
    locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl PushLocks {
    async fn lock_for(&self, slave_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(slave_id).or_default().clone()
    }
}

/// Assemble the slave's current config and write it to the live link.
/// Failures (no template, slave offline, write error) are returned to the
/// caller; there is no retry queue — the next mutation or reconnect pushes
/// current truth.
pub async fn push(ctx: &MasterContext, slave_id: i64) -> MasterResult<()> {
    let lock = ctx.push_locks.lock_for(slave_id).await;
    let _guard = lock.lock().await;

    let config = assembler::assemble_config(ctx.pool(), slave_id).await?;
    ctx.registry
        .send(slave_id, MasterFrame::UpdateConfigFull { config })
        .await
}

/// Ask the slave to restart its engine process.
pub async fn restart(ctx: &MasterContext, slave_id: i64) -> MasterResult<()> {
    ctx.registry.send(slave_id, MasterFrame::RestartXray).await
}

/// Fire-and-forget push scheduled after a state mutation committed. Admin
/// responses never wait on delivery; failures are logged and the next
/// mutation or reconnect converges the slave.
pub fn after_commit(ctx: &MasterContext, slave_id: i64) {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        if let Err(err) = push(&ctx, slave_id).await {
            warn!(slave_id, "config push failed: {err}");
        }
    });
}

/// Schedule pushes for every slave in an affected set.
pub fn after_commit_all<I: IntoIterator<Item = i64>>(ctx: &MasterContext, slave_ids: I) {
    for slave_id in slave_ids {
        after_commit(ctx, slave_id);
    }
}
