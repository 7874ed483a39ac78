//! Agent-link wire frames. One JSON object per text frame in each direction.
//!
//! Master→agent frames always carry a `type` discriminator. Agent→master
//! frames do for `traffic_stats` and `cert_report`; legacy agents send the
//! system-stats heartbeat as a bare `{cpu, mem, address?}` object with no
//! `type` at all, so parsing falls back to a heartbeat for anything else.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames the master writes to an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MasterFrame {
    /// Full engine config, pre-serialized: the agent hands the string to the
    /// engine without interpreting it.
    UpdateConfigFull { config: String },
    /// Ask the agent to restart its engine process.
    RestartXray,
}

/// Frames the master reads from an agent.
#[derive(Debug, Clone, PartialEq)]
pub enum SlaveFrame {
    SystemStats(SystemStats),
    TrafficStats(TrafficReport),
    CertReport(CertReport),
}

impl SlaveFrame {
    /// Parse one inbound frame, preserving the legacy fallback: any JSON
    /// object without a recognized `type` is treated as a system-stats
    /// heartbeat and kept verbatim for storage.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        match value.get("type").and_then(Value::as_str) {
            Some("traffic_stats") => Ok(Self::TrafficStats(serde_json::from_value(value)?)),
            Some("cert_report") => Ok(Self::CertReport(serde_json::from_value(value)?)),
            _ => {
                let mut stats: SystemStats = serde_json::from_value(value)?;
                stats.raw = text.to_string();
                Ok(Self::SystemStats(stats))
            }
        }
    }
}

/// Heartbeat payload. `raw` carries the original frame text, persisted as-is
/// for the UI.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SystemStats {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub mem: f64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(skip)]
    pub raw: String,
}

/// Byte-counter delta pair. Deltas since the agent's previous report; the
/// master accumulates them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counter {
    #[serde(default)]
    pub uplink: i64,
    #[serde(default)]
    pub downlink: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserTraffic {
    pub email: String,
    #[serde(default)]
    pub uplink: i64,
    #[serde(default)]
    pub downlink: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrafficReport {
    #[serde(default)]
    pub inbounds: HashMap<String, Counter>,
    #[serde(default)]
    pub outbounds: HashMap<String, Counter>,
    #[serde(default)]
    pub users: Vec<UserTraffic>,
    /// Full current online set; the master replaces its per-slave set.
    #[serde(default)]
    pub online_clients: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertEntry {
    pub domain: String,
    #[serde(default)]
    pub cert_path: String,
    #[serde(default)]
    pub key_path: String,
    #[serde(default)]
    pub expiry_time: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CertReport {
    #[serde(default)]
    pub certs: Vec<CertEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_frames_carry_wire_names() {
        let push = serde_json::to_value(MasterFrame::UpdateConfigFull {
            config: "{}".to_string(),
        })
        .unwrap();
        assert_eq!(push["type"], "update_config_full");
        assert_eq!(push["config"], "{}");

        let restart = serde_json::to_value(MasterFrame::RestartXray).unwrap();
        assert_eq!(restart["type"], "restart_xray");
    }

    #[test]
    fn traffic_stats_frame_parses() {
        let text = r#"{
            "type": "traffic_stats",
            "inbounds": {"i10": {"uplink": 5, "downlink": 7}},
            "outbounds": {"direct": {"uplink": 1, "downlink": 0}},
            "users": [{"email": "u@x", "uplink": 5, "downlink": 0}],
            "online_clients": ["u@x"]
        }"#;
        let SlaveFrame::TrafficStats(report) = SlaveFrame::parse(text).unwrap() else {
            panic!("expected traffic_stats");
        };
        assert_eq!(report.inbounds["i10"].downlink, 7);
        assert_eq!(report.users[0].email, "u@x");
        assert_eq!(report.online_clients, vec!["u@x".to_string()]);
    }

    #[test]
    fn cert_report_frame_parses() {
        let text = r#"{"type":"cert_report","certs":[{"domain":"a.example","certPath":"/c","keyPath":"/k","expiryTime":0}]}"#;
        let SlaveFrame::CertReport(report) = SlaveFrame::parse(text).unwrap() else {
            panic!("expected cert_report");
        };
        assert_eq!(report.certs[0].domain, "a.example");
        assert_eq!(report.certs[0].expiry_time, 0);
    }

    #[test]
    fn typeless_frame_is_a_heartbeat() {
        let text = r#"{"cpu": 12.5, "mem": 40.0, "address": "203.0.113.9"}"#;
        let SlaveFrame::SystemStats(stats) = SlaveFrame::parse(text).unwrap() else {
            panic!("expected heartbeat");
        };
        assert_eq!(stats.cpu, 12.5);
        assert_eq!(stats.address.as_deref(), Some("203.0.113.9"));
        assert_eq!(stats.raw, text);
    }

    #[test]
    fn unknown_type_falls_back_to_heartbeat() {
        let text = r#"{"type":"future_thing","cpu":1.0}"#;
        assert!(matches!(
            SlaveFrame::parse(text).unwrap(),
            SlaveFrame::SystemStats(_)
        ));
    }
}
