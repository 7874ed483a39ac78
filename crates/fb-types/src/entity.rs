//! Persisted entities. Column names are snake_case in SQLite; the JSON shape
//! keeps the camelCase field names the panel UI and agents already speak.

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// Whether a live link is currently registered for a slave. The persisted
/// value is a delayed projection of the registry and may lag by one missed
/// heartbeat interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SlaveStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slave {
    pub id: i64,
    pub name: String,
    /// Slave IP or domain, reported by the agent or set by the admin.
    pub address: String,
    pub port: i64,
    /// 32-char opaque bearer token presented on the agent handshake.
    pub secret: String,
    pub status: SlaveStatus,
    /// Unix seconds of the last recognized inbound message.
    pub last_seen: i64,
    pub version: String,
    /// Raw system-stats JSON as last reported (CPU/mem).
    pub system_stats: String,
}

/// Per-slave key/value setting, unique on `(slave_id, setting_key)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaveSetting {
    pub id: i64,
    pub slave_id: i64,
    pub setting_key: String,
    pub setting_value: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Inbound {
    pub id: i64,
    pub slave_id: i64,
    pub up: i64,
    pub down: i64,
    /// Traffic quota in bytes, 0 = unlimited.
    pub total: i64,
    pub all_time: i64,
    pub remark: String,
    pub enable: bool,
    /// Unix milliseconds, 0 = never.
    pub expiry_time: i64,
    pub traffic_reset: String,
    pub last_traffic_reset_time: i64,
    pub listen: String,
    pub port: i64,
    pub protocol: String,
    /// Protocol settings JSON, carrying the embedded `clients` array.
    pub settings: String,
    pub stream_settings: String,
    /// Engine-side correlation key; globally unique and stable for the
    /// inbound's lifetime.
    pub tag: String,
    pub sniffing: String,
}

impl Default for Inbound {
    fn default() -> Self {
        Self {
            id: 0,
            slave_id: 0,
            up: 0,
            down: 0,
            total: 0,
            all_time: 0,
            remark: String::new(),
            enable: true,
            expiry_time: 0,
            traffic_reset: "never".to_string(),
            last_traffic_reset_time: 0,
            listen: String::new(),
            port: 0,
            protocol: String::new(),
            settings: String::new(),
            stream_settings: String::new(),
            tag: String::new(),
            sniffing: String::new(),
        }
    }
}

/// Client entry embedded in `Inbound.settings.clients[]`. `email` is the
/// engine-side user tag; entries without one are keyed by other means and
/// pass through the assembler untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default)]
    pub total_gb: i64,
    #[serde(default)]
    pub expiry_time: i64,
    #[serde(default)]
    pub sub_id: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientTraffic {
    pub id: i64,
    pub inbound_id: i64,
    /// Owning account, 0 = none. When non-zero the account's enable flag is
    /// authoritative over this row's.
    pub account_id: i64,
    pub email: String,
    pub enable: bool,
    pub up: i64,
    pub down: i64,
    pub total: i64,
    pub all_time: i64,
    pub expiry_time: i64,
    /// Unix seconds of the last traffic report naming this client.
    pub last_online: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub sub_id: String,
    pub enable: bool,
    /// Traffic quota in GiB, 0 = unlimited.
    pub total_gb: i64,
    /// Unix milliseconds, 0 = never.
    pub expiry_time: i64,
    /// Cached sums over associated client traffics, refreshed during ingest.
    pub up: i64,
    pub down: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            id: 0,
            username: String::new(),
            sub_id: String::new(),
            enable: true,
            total_gb: 0,
            expiry_time: 0,
            up: 0,
            down: 0,
            created_at: 0,
            updated_at: 0,
        }
    }
}

impl Account {
    /// Quota in bytes, or `None` when unlimited.
    pub fn quota_bytes(&self) -> Option<i64> {
        (self.total_gb > 0).then(|| self.total_gb * (1 << 30))
    }
}

/// Association of one client email with one account; `client_email` is unique
/// across all accounts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountClient {
    pub id: i64,
    pub account_id: i64,
    pub inbound_id: i64,
    pub client_email: String,
    pub created_at: i64,
}

/// Accumulated engine-outbound counters, unique on `(slave_id, tag)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundTraffic {
    pub id: i64,
    pub slave_id: i64,
    pub tag: String,
    pub up: i64,
    pub down: i64,
    pub total: i64,
}

/// Certificate inventory entry reported by a slave, unique on
/// `(slave_id, domain)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaveCert {
    pub id: i64,
    pub slave_id: i64,
    pub domain: String,
    pub cert_path: String,
    pub key_path: String,
    /// As reported by the agent; display-only today.
    pub expiry_time: i64,
    pub last_updated: i64,
}
