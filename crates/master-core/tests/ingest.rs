//! Ingest accumulation semantics: monotone counters, per-(slave, tag)
//! outbound rows, heartbeats, and authoritative certificate reports.

mod common;

use std::collections::HashMap;

use common::*;
use fb_types::{CertEntry, CertReport, Counter, SlaveFrame, SlaveStatus, SystemStats, TrafficReport, UserTraffic};
use master_core::ingest;

fn traffic_frame(
    inbounds: &[(&str, i64, i64)],
    outbounds: &[(&str, i64, i64)],
    users: &[(&str, i64, i64)],
    online: &[&str],
) -> SlaveFrame {
    SlaveFrame::TrafficStats(TrafficReport {
        inbounds: inbounds
            .iter()
            .map(|(tag, up, down)| (tag.to_string(), Counter { uplink: *up, downlink: *down }))
            .collect::<HashMap<_, _>>(),
        outbounds: outbounds
            .iter()
            .map(|(tag, up, down)| (tag.to_string(), Counter { uplink: *up, downlink: *down }))
            .collect::<HashMap<_, _>>(),
        users: users
            .iter()
            .map(|(email, up, down)| UserTraffic {
                email: email.to_string(),
                uplink: *up,
                downlink: *down,
            })
            .collect(),
        online_clients: online.iter().map(|e| e.to_string()).collect(),
    })
}

#[tokio::test]
async fn counters_accumulate_monotonically_across_reports() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    seed_inbound(&ctx, slave_id, "i10", 443, &["u@x"]).await;

    for _ in 0..3 {
        ingest::handle_frame(
            &ctx,
            slave_id,
            traffic_frame(&[("i10", 100, 50)], &[], &[("u@x", 10, 5)], &["u@x"]),
        )
        .await;
    }

    let inbound = state_store::inbounds::list_inbounds_for_slave(ctx.pool(), slave_id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!((inbound.up, inbound.down, inbound.all_time), (300, 150, 450));

    let traffic = state_store::traffic::fetch_traffic_by_email(ctx.pool(), "u@x")
        .await
        .unwrap()
        .unwrap();
    assert_eq!((traffic.up, traffic.down, traffic.all_time), (30, 15, 45));
    assert!(traffic.last_online > 0);
}

#[tokio::test]
async fn unknown_tags_and_emails_are_silently_dropped() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    seed_inbound(&ctx, slave_id, "i10", 443, &["u@x"]).await;

    ingest::handle_frame(
        &ctx,
        slave_id,
        traffic_frame(&[("stale-tag", 99, 99)], &[], &[("ghost@x", 99, 99)], &[]),
    )
    .await;

    let inbound = state_store::inbounds::list_inbounds_for_slave(ctx.pool(), slave_id)
        .await
        .unwrap()
        .remove(0);
    assert_eq!((inbound.up, inbound.down), (0, 0));
    assert!(
        state_store::traffic::fetch_traffic_by_email(ctx.pool(), "ghost@x")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn same_outbound_tag_on_two_slaves_keeps_distinct_rows() {
    let (ctx, _factory) = test_context().await;
    let s1 = seed_slave(&ctx, "s1").await;
    let s2 = seed_slave(&ctx, "s2").await;

    ingest::handle_frame(&ctx, s1, traffic_frame(&[], &[("direct", 100, 0)], &[], &[])).await;
    ingest::handle_frame(&ctx, s2, traffic_frame(&[], &[("direct", 100, 0)], &[], &[])).await;

    let rows = state_store::traffic::list_outbound_traffics(ctx.pool()).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.tag == "direct" && r.up == 100));
    assert_ne!(rows[0].slave_id, rows[1].slave_id);
}

#[tokio::test]
async fn zero_outbound_deltas_create_no_rows() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;

    ingest::handle_frame(&ctx, slave_id, traffic_frame(&[], &[("idle", 0, 0)], &[], &[])).await;

    assert!(state_store::traffic::list_outbound_traffics(ctx.pool()).await.unwrap().is_empty());
}

#[tokio::test]
async fn online_set_is_replaced_not_merged() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    seed_inbound(&ctx, slave_id, "i10", 443, &["a@x", "b@x"]).await;

    ingest::handle_frame(&ctx, slave_id, traffic_frame(&[], &[], &[], &["a@x", "b@x"])).await;
    ingest::handle_frame(&ctx, slave_id, traffic_frame(&[], &[], &[], &["b@x"])).await;

    let online = ctx.registry.online_for(slave_id).await;
    assert_eq!(online.len(), 1);
    assert!(online.contains("b@x"));
}

#[tokio::test]
async fn heartbeat_marks_online_and_records_address() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;

    let raw = r#"{"cpu": 12.5, "mem": 40.0, "address": "203.0.113.9"}"#;
    let SlaveFrame::SystemStats(stats) = SlaveFrame::parse(raw).unwrap() else {
        panic!("expected heartbeat");
    };
    ingest::handle_frame(&ctx, slave_id, SlaveFrame::SystemStats(stats)).await;

    let slave = state_store::slaves::fetch_slave_by_id(ctx.pool(), slave_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(slave.status, SlaveStatus::Online);
    assert_eq!(slave.address, "203.0.113.9");
    assert_eq!(slave.system_stats, raw);
}

#[tokio::test]
async fn heartbeat_without_address_keeps_the_stored_one() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    state_store::slaves::update_slave_address(ctx.pool(), slave_id, "198.51.100.1")
        .await
        .unwrap();

    ingest::handle_frame(
        &ctx,
        slave_id,
        SlaveFrame::SystemStats(SystemStats {
            cpu: 1.0,
            mem: 2.0,
            raw: r#"{"cpu":1.0,"mem":2.0}"#.to_string(),
            ..SystemStats::default()
        }),
    )
    .await;

    let slave = state_store::slaves::fetch_slave_by_id(ctx.pool(), slave_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(slave.address, "198.51.100.1");
}

#[tokio::test]
async fn cert_report_is_authoritative_per_slave() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;

    let report = |domains: &[&str]| {
        SlaveFrame::CertReport(CertReport {
            certs: domains
                .iter()
                .map(|d| CertEntry {
                    domain: d.to_string(),
                    cert_path: format!("/root/cert/{d}/fullchain.pem"),
                    key_path: format!("/root/cert/{d}/privkey.pem"),
                    expiry_time: 0,
                })
                .collect(),
        })
    };

    ingest::handle_frame(&ctx, slave_id, report(&["a.example", "b.example"])).await;
    ingest::handle_frame(&ctx, slave_id, report(&["b.example", "c.example"])).await;

    let domains: Vec<String> = state_store::certs::list_certs_for_slave(ctx.pool(), slave_id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.domain)
        .collect();
    assert_eq!(domains, vec!["b.example".to_string(), "c.example".to_string()]);
}

#[tokio::test]
async fn account_cache_refreshes_from_observed_users() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    let inbound_id = seed_inbound(&ctx, slave_id, "i10", 443, &["u@x"]).await;
    let account = master_core::lifecycle::add_account(&ctx, fb_types::Account {
        username: "acct".to_string(),
        ..fb_types::Account::default()
    })
    .await
    .unwrap();
    master_core::lifecycle::add_client_to_account(&ctx, account.id, inbound_id, "u@x")
        .await
        .unwrap();

    ingest::handle_frame(&ctx, slave_id, traffic_frame(&[], &[], &[("u@x", 70, 30)], &[])).await;

    let account = state_store::accounts::fetch_account(ctx.pool(), account.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((account.up, account.down), (70, 30));
}
