//! Inbound endpoint rows and their engine-side counters.

use fb_types::Inbound;
use sqlx::SqliteExecutor;

use crate::DbResult;

pub async fn insert_inbound(executor: impl SqliteExecutor<'_>, inbound: &Inbound) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO inbounds (
            slave_id, up, down, total, all_time, remark, enable, expiry_time,
            traffic_reset, last_traffic_reset_time, listen, port, protocol,
            settings, stream_settings, tag, sniffing
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(inbound.slave_id)
    .bind(inbound.up)
    .bind(inbound.down)
    .bind(inbound.total)
    .bind(inbound.all_time)
    .bind(&inbound.remark)
    .bind(inbound.enable)
    .bind(inbound.expiry_time)
    .bind(&inbound.traffic_reset)
    .bind(inbound.last_traffic_reset_time)
    .bind(&inbound.listen)
    .bind(inbound.port)
    .bind(&inbound.protocol)
    .bind(&inbound.settings)
    .bind(&inbound.stream_settings)
    .bind(&inbound.tag)
    .bind(&inbound.sniffing)
    .execute(executor)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Update the admin-editable columns. Counters are owned by ingest and left
/// untouched here.
pub async fn update_inbound(executor: impl SqliteExecutor<'_>, inbound: &Inbound) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE inbounds SET
            slave_id = ?, total = ?, remark = ?, enable = ?, expiry_time = ?,
            traffic_reset = ?, listen = ?, port = ?, protocol = ?, settings = ?,
            stream_settings = ?, tag = ?, sniffing = ?
        WHERE id = ?
        "#,
    )
    .bind(inbound.slave_id)
    .bind(inbound.total)
    .bind(&inbound.remark)
    .bind(inbound.enable)
    .bind(inbound.expiry_time)
    .bind(&inbound.traffic_reset)
    .bind(&inbound.listen)
    .bind(inbound.port)
    .bind(&inbound.protocol)
    .bind(&inbound.settings)
    .bind(&inbound.stream_settings)
    .bind(&inbound.tag)
    .bind(&inbound.sniffing)
    .bind(inbound.id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn fetch_inbound(executor: impl SqliteExecutor<'_>, id: i64) -> DbResult<Option<Inbound>> {
    let inbound = sqlx::query_as::<_, Inbound>("SELECT * FROM inbounds WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(inbound)
}

pub async fn list_inbounds(executor: impl SqliteExecutor<'_>) -> DbResult<Vec<Inbound>> {
    let inbounds = sqlx::query_as::<_, Inbound>("SELECT * FROM inbounds ORDER BY id")
        .fetch_all(executor)
        .await?;
    Ok(inbounds)
}

pub async fn list_inbounds_for_slave(executor: impl SqliteExecutor<'_>, slave_id: i64) -> DbResult<Vec<Inbound>> {
    let inbounds = sqlx::query_as::<_, Inbound>("SELECT * FROM inbounds WHERE slave_id = ? ORDER BY id")
        .bind(slave_id)
        .fetch_all(executor)
        .await?;
    Ok(inbounds)
}

/// The rows the assembler renders: enabled inbounds of one slave.
pub async fn list_enabled_inbounds_for_slave(
    executor: impl SqliteExecutor<'_>,
    slave_id: i64,
) -> DbResult<Vec<Inbound>> {
    let inbounds =
        sqlx::query_as::<_, Inbound>("SELECT * FROM inbounds WHERE slave_id = ? AND enable = 1 ORDER BY id")
            .bind(slave_id)
            .fetch_all(executor)
            .await?;
    Ok(inbounds)
}

pub async fn list_inbound_ids_for_slave(executor: impl SqliteExecutor<'_>, slave_id: i64) -> DbResult<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM inbounds WHERE slave_id = ?")
        .bind(slave_id)
        .fetch_all(executor)
        .await?;
    Ok(ids)
}

/// Tag uniqueness probe; `exclude_id` skips the row being updated.
pub async fn tag_in_use(executor: impl SqliteExecutor<'_>, tag: &str, exclude_id: i64) -> DbResult<bool> {
    let row = sqlx::query_scalar::<_, i64>("SELECT 1 FROM inbounds WHERE tag = ? AND id != ? LIMIT 1")
        .bind(tag)
        .bind(exclude_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.is_some())
}

/// Accumulate one engine counter delta onto the owning row. Returns the
/// number of rows touched; zero means the tag is stale on the engine side
/// and the delta is dropped.
pub async fn add_inbound_traffic(
    executor: impl SqliteExecutor<'_>,
    slave_id: i64,
    tag: &str,
    up: i64,
    down: i64,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE inbounds
        SET up = up + ?, down = down + ?, all_time = all_time + ?
        WHERE tag = ? AND slave_id = ?
        "#,
    )
    .bind(up)
    .bind(down)
    .bind(up + down)
    .bind(tag)
    .bind(slave_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_inbound_row(executor: impl SqliteExecutor<'_>, id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM inbounds WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete_inbounds_for_slave(executor: impl SqliteExecutor<'_>, slave_id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM inbounds WHERE slave_id = ?")
        .bind(slave_id)
        .execute(executor)
        .await?;
    Ok(())
}
