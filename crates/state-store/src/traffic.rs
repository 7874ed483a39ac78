//! Per-client and per-outbound byte counters.
//!
//! Counter columns are monotone non-decreasing except at an explicit reset;
//! every mutation here is an additive increment, a policy disable, or a
//! reset.

use std::collections::HashMap;

use fb_types::{ClientTraffic, OutboundTraffic};
use sqlx::{SqliteExecutor, SqlitePool};

use crate::DbResult;

pub async fn fetch_traffic_by_email(
    executor: impl SqliteExecutor<'_>,
    email: &str,
) -> DbResult<Option<ClientTraffic>> {
    let traffic = sqlx::query_as::<_, ClientTraffic>("SELECT * FROM client_traffics WHERE email = ?")
        .bind(email)
        .fetch_optional(executor)
        .await?;
    Ok(traffic)
}

pub async fn list_traffics_for_inbound(
    executor: impl SqliteExecutor<'_>,
    inbound_id: i64,
) -> DbResult<Vec<ClientTraffic>> {
    let traffics =
        sqlx::query_as::<_, ClientTraffic>("SELECT * FROM client_traffics WHERE inbound_id = ? ORDER BY id")
            .bind(inbound_id)
            .fetch_all(executor)
            .await?;
    Ok(traffics)
}

/// Effective-enable inputs for one slave's assembly pass: every traffic row
/// whose inbound belongs to the slave, joined with the owning account's
/// enable flag when associated.
pub async fn list_traffics_for_slave(pool: &SqlitePool, slave_id: i64) -> DbResult<Vec<ClientTraffic>> {
    let traffics = sqlx::query_as::<_, ClientTraffic>(
        r#"
        SELECT t.* FROM client_traffics t
        JOIN inbounds i ON i.id = t.inbound_id
        WHERE i.slave_id = ?
        "#,
    )
    .bind(slave_id)
    .fetch_all(pool)
    .await?;
    Ok(traffics)
}

pub async fn insert_client_traffic(
    executor: impl SqliteExecutor<'_>,
    inbound_id: i64,
    account_id: i64,
    email: &str,
    enable: bool,
    total: i64,
    expiry_time: i64,
) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO client_traffics (inbound_id, account_id, email, enable, total, expiry_time)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(inbound_id)
    .bind(account_id)
    .bind(email)
    .bind(enable)
    .bind(total)
    .bind(expiry_time)
    .execute(executor)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Accumulate one user delta and stamp `last_online`. Returns the updated row
/// so ingest can observe the owning account; `None` means no such email is
/// known and the delta is dropped.
pub async fn add_client_traffic(
    pool: &SqlitePool,
    email: &str,
    up: i64,
    down: i64,
    now: i64,
) -> DbResult<Option<ClientTraffic>> {
    let result = sqlx::query(
        r#"
        UPDATE client_traffics
        SET up = up + ?, down = down + ?, all_time = all_time + ?, last_online = ?
        WHERE email = ?
        "#,
    )
    .bind(up)
    .bind(down)
    .bind(up + down)
    .bind(now)
    .bind(email)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    fetch_traffic_by_email(pool, email).await
}

/// Policy check over one slave's clients: disable every enabled client that
/// has exhausted its direct quota or passed its expiry instant. Returns the
/// number of rows disabled.
pub async fn disable_exhausted_clients_for_slave(
    executor: impl SqliteExecutor<'_>,
    slave_id: i64,
    now_ms: i64,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE client_traffics
        SET enable = 0
        WHERE enable = 1
          AND inbound_id IN (SELECT id FROM inbounds WHERE slave_id = ?)
          AND ((total > 0 AND up + down >= total) OR (expiry_time > 0 AND expiry_time <= ?))
        "#,
    )
    .bind(slave_id)
    .bind(now_ms)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Cascade an account's enable flag onto all of its clients.
pub async fn set_enable_by_account(
    executor: impl SqliteExecutor<'_>,
    account_id: i64,
    enable: bool,
) -> DbResult<()> {
    sqlx::query("UPDATE client_traffics SET enable = ? WHERE account_id = ?")
        .bind(enable)
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Zero the counters and re-enable all of an account's clients in one step.
pub async fn reset_by_account(executor: impl SqliteExecutor<'_>, account_id: i64) -> DbResult<()> {
    sqlx::query("UPDATE client_traffics SET up = 0, down = 0, enable = 1 WHERE account_id = ?")
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn set_traffic_account(executor: impl SqliteExecutor<'_>, email: &str, account_id: i64) -> DbResult<()> {
    sqlx::query("UPDATE client_traffics SET account_id = ? WHERE email = ?")
        .bind(account_id)
        .bind(email)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn clear_account_links(executor: impl SqliteExecutor<'_>, account_id: i64) -> DbResult<()> {
    sqlx::query("UPDATE client_traffics SET account_id = 0 WHERE account_id = ?")
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete_traffic_by_email(executor: impl SqliteExecutor<'_>, email: &str) -> DbResult<()> {
    sqlx::query("DELETE FROM client_traffics WHERE email = ?")
        .bind(email)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete_traffics_for_inbound(executor: impl SqliteExecutor<'_>, inbound_id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM client_traffics WHERE inbound_id = ?")
        .bind(inbound_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Effective-enable map for one slave's clients: the account flag dominates
/// whenever the traffic row is associated with an account that still exists,
/// otherwise the row's own flag holds.
pub async fn effective_enable_map_for_slave(
    pool: &SqlitePool,
    slave_id: i64,
) -> DbResult<HashMap<String, bool>> {
    let rows = sqlx::query_as::<_, (String, bool)>(
        r#"
        SELECT t.email,
               CASE WHEN t.account_id > 0 THEN COALESCE(a.enable, t.enable) ELSE t.enable END
        FROM client_traffics t
        JOIN inbounds i ON i.id = t.inbound_id
        LEFT JOIN accounts a ON a.id = t.account_id
        WHERE i.slave_id = ?
        "#,
    )
    .bind(slave_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().collect())
}

/// `email -> last_online` over every known client, for the UI broadcast.
pub async fn last_online_map(pool: &SqlitePool) -> DbResult<HashMap<String, i64>> {
    let rows = sqlx::query_as::<_, (String, i64)>("SELECT email, last_online FROM client_traffics")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}

// --- outbound counters ---

/// Accumulate one outbound delta, creating the `(slave_id, tag)` row on first
/// sight. Tags are only unique per slave; two slaves reporting the same tag
/// keep distinct rows.
pub async fn add_outbound_traffic(
    executor: impl SqliteExecutor<'_>,
    slave_id: i64,
    tag: &str,
    up: i64,
    down: i64,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO outbound_traffics (slave_id, tag, up, down, total)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (slave_id, tag) DO UPDATE SET
            up = up + excluded.up,
            down = down + excluded.down,
            total = total + excluded.total
        "#,
    )
    .bind(slave_id)
    .bind(tag)
    .bind(up)
    .bind(down)
    .bind(up + down)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list_outbound_traffics(executor: impl SqliteExecutor<'_>) -> DbResult<Vec<OutboundTraffic>> {
    let rows = sqlx::query_as::<_, OutboundTraffic>("SELECT * FROM outbound_traffics ORDER BY slave_id, tag")
        .fetch_all(executor)
        .await?;
    Ok(rows)
}

pub async fn list_outbound_traffics_for_slave(
    executor: impl SqliteExecutor<'_>,
    slave_id: i64,
) -> DbResult<Vec<OutboundTraffic>> {
    let rows = sqlx::query_as::<_, OutboundTraffic>(
        "SELECT * FROM outbound_traffics WHERE slave_id = ? ORDER BY tag",
    )
    .bind(slave_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Zero outbound counters for one slave; `None` resets every tag.
pub async fn reset_outbound_traffic(
    executor: impl SqliteExecutor<'_>,
    slave_id: i64,
    tag: Option<&str>,
) -> DbResult<()> {
    match tag {
        Some(tag) => {
            sqlx::query("UPDATE outbound_traffics SET up = 0, down = 0, total = 0 WHERE slave_id = ? AND tag = ?")
                .bind(slave_id)
                .bind(tag)
                .execute(executor)
                .await?;
        }
        None => {
            sqlx::query("UPDATE outbound_traffics SET up = 0, down = 0, total = 0 WHERE slave_id = ?")
                .bind(slave_id)
                .execute(executor)
                .await?;
        }
    }
    Ok(())
}

pub async fn delete_outbound_traffics_for_slave(executor: impl SqliteExecutor<'_>, slave_id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM outbound_traffics WHERE slave_id = ?")
        .bind(slave_id)
        .execute(executor)
        .await?;
    Ok(())
}
