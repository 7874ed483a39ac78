//! UI broadcast channel and the periodic status job.
//!
//! The channel is an opaque sink from the core's point of view: ingest and
//! the status job publish, whoever renders the panel subscribes, and a full
//! or absent subscriber never blocks the sender.

use std::collections::HashMap;

use fb_types::{Inbound, OutboundTraffic};
use tokio::sync::broadcast;
use tracing::debug;

use crate::context::MasterContext;

#[derive(Debug, Clone)]
pub enum UiEvent {
    Inbounds(Vec<Inbound>),
    Outbounds(Vec<OutboundTraffic>),
    Traffic {
        online: Vec<String>,
        last_online: HashMap<String, i64>,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UiEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire-and-forget publish; a send with no subscribers is not an error.
    pub fn publish(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }
}

/// Publish the current inbound/outbound rows and online status from the
/// store. Stateless: safe to call from anywhere, any number of times.
pub async fn broadcast_current_status(ctx: &MasterContext) {
    match state_store::inbounds::list_inbounds(ctx.pool()).await {
        Ok(inbounds) if !inbounds.is_empty() => ctx.events.publish(UiEvent::Inbounds(inbounds)),
        Ok(_) => {}
        Err(err) => debug!("status broadcast: failed to load inbounds: {err}"),
    }

    match state_store::traffic::list_outbound_traffics(ctx.pool()).await {
        Ok(outbounds) if !outbounds.is_empty() => ctx.events.publish(UiEvent::Outbounds(outbounds)),
        Ok(_) => {}
        Err(err) => debug!("status broadcast: failed to load outbounds: {err}"),
    }

    let mut online: Vec<String> = ctx.registry.online_users().await.into_iter().collect();
    online.sort();
    let last_online = match state_store::traffic::last_online_map(ctx.pool()).await {
        Ok(map) => map,
        Err(err) => {
            debug!("status broadcast: failed to load last-online map: {err}");
            HashMap::new()
        }
    };
    ctx.events.publish(UiEvent::Traffic { online, last_online });
}

/// Spawn the periodic status job so the panel converges even while slaves
/// are quiet.
pub fn spawn_status_job(ctx: MasterContext, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            broadcast_current_status(&ctx).await;
        }
    })
}
