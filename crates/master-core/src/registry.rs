//! Live-link registry: which slaves are reachable right now.
//!
//! One value owned by the application and passed by reference; it replaces
//! the old pair of package-global maps. The registry is the source of truth
//! for reachability — the persisted `slaves.status` column is a delayed
//! projection updated on attach/detach and heartbeats.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use fb_types::MasterFrame;
use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::info;

use crate::error::{MasterError, MasterResult};

/// Sender half of one attached slave link. Frames written here are drained by
/// the link's writer task; the close signal tears the whole link down.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    conn_id: u64,
    frame_tx: mpsc::Sender<MasterFrame>,
    close_tx: broadcast::Sender<()>,
}

impl LinkHandle {
    pub fn new(frame_tx: mpsc::Sender<MasterFrame>, close_tx: broadcast::Sender<()>) -> Self {
        Self {
            conn_id: 0,
            frame_tx,
            close_tx,
        }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Write one frame. A closed writer task means the transport is gone.
    pub async fn send(&self, frame: MasterFrame) -> MasterResult<()> {
        self.frame_tx
            .send(frame)
            .await
            .map_err(|_| MasterError::Transport("link writer closed".to_string()))
    }

    pub fn close(&self) {
        let _ = self.close_tx.send(());
    }
}

#[derive(Default)]
struct Inner {
    next_conn_id: u64,
    links: HashMap<i64, LinkHandle>,
    online: HashMap<i64, HashSet<String>>,
}

#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<Inner>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a link for the slave, closing any link it replaces. Returns
    /// the connection id the caller must present on detach so that a stale
    /// read loop can never tear down its replacement.
    pub async fn attach(&self, slave_id: i64, mut link: LinkHandle) -> u64 {
        let mut inner = self.inner.write().await;
        inner.next_conn_id += 1;
        link.conn_id = inner.next_conn_id;
        let conn_id = link.conn_id;
        if let Some(old) = inner.links.insert(slave_id, link) {
            old.close();
            info!(slave_id, "replaced existing slave link");
        } else {
            info!(slave_id, "slave connected");
        }
        conn_id
    }

    /// Close and remove the slave's link and clear its online set. With
    /// `conn_id` present the removal only happens while that connection is
    /// still the registered one. Returns whether a link was removed.
    pub async fn detach(&self, slave_id: i64, conn_id: Option<u64>) -> bool {
        let mut inner = self.inner.write().await;
        let matches = match (inner.links.get(&slave_id), conn_id) {
            (Some(link), Some(conn_id)) => link.conn_id == conn_id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !matches {
            return false;
        }
        if let Some(link) = inner.links.remove(&slave_id) {
            link.close();
        }
        inner.online.remove(&slave_id);
        info!(slave_id, "slave disconnected");
        true
    }

    /// Write one frame to the slave's link. `NotConnected` when no link is
    /// registered; a transport failure detaches asynchronously and is
    /// returned to the caller.
    pub async fn send(&self, slave_id: i64, frame: MasterFrame) -> MasterResult<()> {
        let link = {
            let inner = self.inner.read().await;
            inner
                .links
                .get(&slave_id)
                .cloned()
                .ok_or(MasterError::NotConnected(slave_id))?
        };
        match link.send(frame).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let registry = self.clone();
                let conn_id = link.conn_id;
                tokio::spawn(async move {
                    registry.detach(slave_id, Some(conn_id)).await;
                });
                Err(err)
            }
        }
    }

    pub async fn is_connected(&self, slave_id: i64) -> bool {
        self.inner.read().await.links.contains_key(&slave_id)
    }

    pub async fn connected_slaves(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.inner.read().await.links.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Replace the slave's online set with the agent's latest full report.
    pub async fn set_online(&self, slave_id: i64, emails: HashSet<String>) {
        self.inner.write().await.online.insert(slave_id, emails);
    }

    pub async fn online_for(&self, slave_id: i64) -> HashSet<String> {
        self.inner
            .read()
            .await
            .online
            .get(&slave_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Deduplicated union of every slave's online set.
    pub async fn online_users(&self) -> HashSet<String> {
        let inner = self.inner.read().await;
        inner.online.values().flatten().cloned().collect()
    }
}

#[cfg(test)]
#[path = "registry.test.rs"]
mod tests;
