//! Slave fleet rows.

use fb_types::{Slave, SlaveStatus};
use serde::Serialize;
use sqlx::{SqliteExecutor, SqlitePool, prelude::FromRow};

use crate::DbResult;

pub async fn insert_slave(executor: impl SqliteExecutor<'_>, name: &str, secret: &str, now: i64) -> DbResult<i64> {
    let result = sqlx::query("INSERT INTO slaves (name, secret, status, last_seen) VALUES (?, ?, 'offline', ?)")
        .bind(name)
        .bind(secret)
        .bind(now)
        .execute(executor)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn fetch_slave_by_id(executor: impl SqliteExecutor<'_>, id: i64) -> DbResult<Option<Slave>> {
    let slave = sqlx::query_as::<_, Slave>("SELECT * FROM slaves WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(slave)
}

pub async fn fetch_slave_by_secret(executor: impl SqliteExecutor<'_>, secret: &str) -> DbResult<Option<Slave>> {
    let slave = sqlx::query_as::<_, Slave>("SELECT * FROM slaves WHERE secret = ?")
        .bind(secret)
        .fetch_optional(executor)
        .await?;
    Ok(slave)
}

pub async fn secret_in_use(executor: impl SqliteExecutor<'_>, secret: &str) -> DbResult<bool> {
    let row = sqlx::query_scalar::<_, i64>("SELECT 1 FROM slaves WHERE secret = ? LIMIT 1")
        .bind(secret)
        .fetch_optional(executor)
        .await?;
    Ok(row.is_some())
}

pub async fn list_slaves(executor: impl SqliteExecutor<'_>) -> DbResult<Vec<Slave>> {
    let slaves = sqlx::query_as::<_, Slave>("SELECT * FROM slaves ORDER BY id")
        .fetch_all(executor)
        .await?;
    Ok(slaves)
}

/// Slave row plus its accumulated inbound traffic sums, for the fleet list.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaveWithTraffic {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub slave: Slave,
    pub total_uplink: i64,
    pub total_downlink: i64,
}

pub async fn list_slaves_with_traffic(pool: &SqlitePool) -> DbResult<Vec<SlaveWithTraffic>> {
    let rows = sqlx::query_as::<_, SlaveWithTraffic>(
        r#"
        SELECT s.*,
               COALESCE((SELECT SUM(up) FROM inbounds i WHERE i.slave_id = s.id), 0) AS total_uplink,
               COALESCE((SELECT SUM(down) FROM inbounds i WHERE i.slave_id = s.id), 0) AS total_downlink
        FROM slaves s
        ORDER BY s.id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Record a status transition together with the heartbeat payload. An empty
/// `stats` clears nothing; the previous payload is kept.
pub async fn update_slave_status(
    executor: impl SqliteExecutor<'_>,
    id: i64,
    status: SlaveStatus,
    stats: Option<&str>,
    now: i64,
) -> DbResult<()> {
    match stats {
        Some(stats) => {
            sqlx::query("UPDATE slaves SET status = ?, system_stats = ?, last_seen = ? WHERE id = ?")
                .bind(status)
                .bind(stats)
                .bind(now)
                .bind(id)
                .execute(executor)
                .await?;
        }
        None => {
            sqlx::query("UPDATE slaves SET status = ?, last_seen = ? WHERE id = ?")
                .bind(status)
                .bind(now)
                .bind(id)
                .execute(executor)
                .await?;
        }
    }
    Ok(())
}

pub async fn update_slave_address(executor: impl SqliteExecutor<'_>, id: i64, address: &str) -> DbResult<()> {
    sqlx::query("UPDATE slaves SET address = ? WHERE id = ?")
        .bind(address)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn update_slave_version(executor: impl SqliteExecutor<'_>, id: i64, version: &str) -> DbResult<()> {
    sqlx::query("UPDATE slaves SET version = ? WHERE id = ?")
        .bind(version)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Refresh `last_seen` on any recognized inbound message.
pub async fn touch_slave(executor: impl SqliteExecutor<'_>, id: i64, now: i64) -> DbResult<()> {
    sqlx::query("UPDATE slaves SET last_seen = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete_slave_row(executor: impl SqliteExecutor<'_>, id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM slaves WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}
