//! Ingest pipeline for agent reports.
//!
//! Counter deltas are commutative additive increments, so no ordering is
//! required across messages; a storage error in one sub-step is logged and
//! the rest of the pass still runs, keeping throughput over strictness.

use std::collections::BTreeSet;

use fb_types::{CertReport, SlaveFrame, SlaveStatus, SystemStats, TrafficReport};
use tracing::{debug, warn};

use crate::{broadcast, context::MasterContext, fanout, policy};

/// Entry point from the link read loop: one parsed frame from one slave.
pub async fn handle_frame(ctx: &MasterContext, slave_id: i64, frame: SlaveFrame) {
    match frame {
        SlaveFrame::SystemStats(stats) => handle_system_stats(ctx, slave_id, stats).await,
        SlaveFrame::TrafficStats(report) => handle_traffic_stats(ctx, slave_id, report).await,
        SlaveFrame::CertReport(report) => handle_cert_report(ctx, slave_id, report).await,
    }
}

/// Heartbeat: refresh the persisted online projection and the raw stats
/// payload, plus the self-reported address when present.
async fn handle_system_stats(ctx: &MasterContext, slave_id: i64, stats: SystemStats) {
    let now = state_store::now_unix();
    if let Err(err) = state_store::slaves::update_slave_status(
        ctx.pool(),
        slave_id,
        SlaveStatus::Online,
        Some(&stats.raw),
        now,
    )
    .await
    {
        warn!(slave_id, "failed to record heartbeat: {err}");
    }
    if let Some(address) = stats.address.as_deref().filter(|a| !a.is_empty())
        && let Err(err) = state_store::slaves::update_slave_address(ctx.pool(), slave_id, address).await
    {
        warn!(slave_id, "failed to record slave address: {err}");
    }
    if let Some(version) = stats.version.as_deref().filter(|v| !v.is_empty())
        && let Err(err) = state_store::slaves::update_slave_version(ctx.pool(), slave_id, version).await
    {
        warn!(slave_id, "failed to record slave version: {err}");
    }
}

/// Traffic pass: online set, counters, account aggregation, policy, and the
/// UI delta broadcast.
async fn handle_traffic_stats(ctx: &MasterContext, slave_id: i64, report: TrafficReport) {
    let now = state_store::now_unix();

    // The agent sends its full current online set every interval; replace,
    // don't merge.
    ctx.registry
        .set_online(slave_id, report.online_clients.iter().cloned().collect())
        .await;

    for (tag, counter) in &report.inbounds {
        match state_store::inbounds::add_inbound_traffic(
            ctx.pool(),
            slave_id,
            tag,
            counter.uplink,
            counter.downlink,
        )
        .await
        {
            Ok(0) => debug!(slave_id, %tag, "dropped counters for unknown inbound tag"),
            Ok(_) => {}
            Err(err) => warn!(slave_id, %tag, "failed to accumulate inbound traffic: {err}"),
        }
    }

    let mut seen_accounts = BTreeSet::new();
    for user in &report.users {
        if user.email.is_empty() || (user.uplink == 0 && user.downlink == 0) {
            continue;
        }
        match state_store::traffic::add_client_traffic(
            ctx.pool(),
            &user.email,
            user.uplink,
            user.downlink,
            now,
        )
        .await
        {
            Ok(Some(traffic)) if traffic.account_id > 0 => {
                seen_accounts.insert(traffic.account_id);
            }
            Ok(Some(_)) => {}
            Ok(None) => debug!(slave_id, email = %user.email, "dropped counters for unknown client"),
            Err(err) => warn!(slave_id, email = %user.email, "failed to accumulate client traffic: {err}"),
        }
    }

    // Refresh the derived per-account caches for every account we touched.
    let now_ms = state_store::now_unix_millis();
    for account_id in seen_accounts {
        if let Err(err) = refresh_account_traffic(ctx, account_id, now_ms).await {
            warn!(account_id, "failed to refresh account traffic: {err}");
        }
    }

    for (tag, counter) in &report.outbounds {
        if counter.uplink == 0 && counter.downlink == 0 {
            continue;
        }
        if let Err(err) = state_store::traffic::add_outbound_traffic(
            ctx.pool(),
            slave_id,
            tag,
            counter.uplink,
            counter.downlink,
        )
        .await
        {
            warn!(slave_id, %tag, "failed to accumulate outbound traffic: {err}");
        }
    }

    match policy::evaluate(ctx.pool(), slave_id).await {
        Ok(affected) => fanout::after_commit_all(ctx, affected),
        Err(err) => warn!(slave_id, "policy pass failed: {err}"),
    }

    broadcast::broadcast_current_status(ctx).await;
}

async fn refresh_account_traffic(
    ctx: &MasterContext,
    account_id: i64,
    now_ms: i64,
) -> crate::error::MasterResult<()> {
    let (up, down) = state_store::accounts::account_traffic_sums(ctx.pool(), account_id).await?;
    state_store::accounts::write_account_traffic(ctx.pool(), account_id, up, down, now_ms).await?;
    Ok(())
}

/// Certificate inventory: the reported set is authoritative for the slave,
/// so unreported domains are dropped alongside the upserts.
async fn handle_cert_report(ctx: &MasterContext, slave_id: i64, report: CertReport) {
    let now = state_store::now_unix();
    let result: crate::error::MasterResult<()> = async {
        let mut tx = ctx.pool().begin().await?;
        let domains: Vec<String> = report.certs.iter().map(|c| c.domain.clone()).collect();
        state_store::certs::delete_certs_not_in(&mut *tx, slave_id, &domains).await?;
        for cert in &report.certs {
            state_store::certs::upsert_cert(
                &mut *tx,
                slave_id,
                &cert.domain,
                &cert.cert_path,
                &cert.key_path,
                cert.expiry_time,
                now,
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
    .await;
    if let Err(err) = result {
        warn!(slave_id, "failed to record certificate report: {err}");
    }
}
