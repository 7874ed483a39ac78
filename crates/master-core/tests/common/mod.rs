//! Shared setup for master-core integration tests: a migrated throwaway
//! database, a wired context, and seed helpers for the common fixtures.

use std::time::Duration;

use fb_types::{Inbound, MasterFrame};
use master_core::{MasterContext, registry::LinkHandle};
use serde_json::json;
use state_store::test_support::TestDbFactory;
use tokio::sync::{broadcast, mpsc};

pub const TEMPLATE: &str = r#"{
    "log": {"loglevel": "warning"},
    "api": {"tag": "api", "services": ["StatsService"]},
    "inbounds": [{"tag": "api", "port": 62789, "listen": "127.0.0.1", "protocol": "dokodemo-door"}],
    "outbounds": [{"tag": "direct", "protocol": "freedom"}],
    "routing": {"rules": []}
}"#;

pub async fn test_context() -> (MasterContext, TestDbFactory) {
    let factory = TestDbFactory::new();
    let handle = factory.master_db().await.expect("test db");
    (MasterContext::new(handle.pool), factory)
}

/// Insert a slave with its engine template and return its id.
pub async fn seed_slave(ctx: &MasterContext, name: &str) -> i64 {
    let secret = format!("secret-{name}-0123456789abcdef");
    let id = state_store::slaves::insert_slave(ctx.pool(), name, &secret, 0)
        .await
        .expect("insert slave");
    state_store::settings::set_engine_template_for_slave(ctx.pool(), id, TEMPLATE)
        .await
        .expect("seed template");
    id
}

/// Insert an enabled inbound carrying one embedded client per email, plus
/// the matching traffic rows.
pub async fn seed_inbound(ctx: &MasterContext, slave_id: i64, tag: &str, port: i64, emails: &[&str]) -> i64 {
    let clients: Vec<_> = emails
        .iter()
        .map(|email| json!({"id": format!("uuid-{email}"), "email": email, "enable": true}))
        .collect();
    let inbound = Inbound {
        slave_id,
        port,
        protocol: "vless".to_string(),
        settings: json!({"clients": clients, "decryption": "none"}).to_string(),
        stream_settings: json!({"network": "tcp"}).to_string(),
        tag: tag.to_string(),
        ..Inbound::default()
    };
    let id = state_store::inbounds::insert_inbound(ctx.pool(), &inbound)
        .await
        .expect("insert inbound");
    for email in emails {
        state_store::traffic::insert_client_traffic(ctx.pool(), id, 0, email, true, 0, 0)
            .await
            .expect("insert client traffic");
    }
    id
}

/// Register a fake link for the slave and return the receiver its pushed
/// frames land on.
pub async fn attach_test_link(ctx: &MasterContext, slave_id: i64) -> mpsc::Receiver<MasterFrame> {
    let (frame_tx, frame_rx) = mpsc::channel(8);
    let (close_tx, _) = broadcast::channel(1);
    ctx.registry.attach(slave_id, LinkHandle::new(frame_tx, close_tx)).await;
    frame_rx
}

/// Wait for the next pushed config and return it parsed.
pub async fn expect_pushed_config(frame_rx: &mut mpsc::Receiver<MasterFrame>) -> serde_json::Value {
    let frame = tokio::time::timeout(Duration::from_secs(1), frame_rx.recv())
        .await
        .expect("push within one second")
        .expect("link still attached");
    match frame {
        MasterFrame::UpdateConfigFull { config } => serde_json::from_str(&config).expect("valid config json"),
        other => panic!("expected update_config_full, got {other:?}"),
    }
}

/// Emails rendered for one inbound tag in an assembled config document.
pub fn rendered_emails(config: &serde_json::Value, tag: &str) -> Vec<String> {
    let inbound = config["inbounds"]
        .as_array()
        .expect("inbounds array")
        .iter()
        .find(|i| i["tag"] == tag)
        .unwrap_or_else(|| panic!("inbound {tag} missing from config"));
    inbound["settings"]["clients"]
        .as_array()
        .map(|clients| {
            clients
                .iter()
                .filter_map(|c| c["email"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
