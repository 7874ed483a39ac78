//! Tenant-wide settings and per-slave setting overrides.

use sqlx::SqliteExecutor;

use crate::DbResult;
use fb_types::ENGINE_TEMPLATE_KEY;

pub async fn get_setting(executor: impl SqliteExecutor<'_>, key: &str) -> DbResult<Option<String>> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(executor)
        .await?;
    Ok(value)
}

pub async fn set_setting(executor: impl SqliteExecutor<'_>, key: &str, value: &str) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT (key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_slave_setting(
    executor: impl SqliteExecutor<'_>,
    slave_id: i64,
    key: &str,
) -> DbResult<Option<String>> {
    let value = sqlx::query_scalar::<_, String>(
        "SELECT setting_value FROM slave_settings WHERE slave_id = ? AND setting_key = ?",
    )
    .bind(slave_id)
    .bind(key)
    .fetch_optional(executor)
    .await?;
    Ok(value)
}

pub async fn set_slave_setting(
    executor: impl SqliteExecutor<'_>,
    slave_id: i64,
    key: &str,
    value: &str,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO slave_settings (slave_id, setting_key, setting_value)
        VALUES (?, ?, ?)
        ON CONFLICT (slave_id, setting_key) DO UPDATE SET setting_value = excluded.setting_value
        "#,
    )
    .bind(slave_id)
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn delete_slave_settings(executor: impl SqliteExecutor<'_>, slave_id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM slave_settings WHERE slave_id = ?")
        .bind(slave_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// The engine template used to assemble a slave's config: the slave's own
/// copy when present, otherwise the tenant-wide default.
pub async fn engine_template_for_slave(
    pool: &sqlx::SqlitePool,
    slave_id: i64,
) -> DbResult<Option<String>> {
    if let Some(template) = get_slave_setting(pool, slave_id, ENGINE_TEMPLATE_KEY).await?
        && !template.is_empty()
    {
        return Ok(Some(template));
    }
    get_setting(pool, ENGINE_TEMPLATE_KEY).await
}

pub async fn set_engine_template_for_slave(
    executor: impl SqliteExecutor<'_>,
    slave_id: i64,
    template: &str,
) -> DbResult<()> {
    set_slave_setting(executor, slave_id, ENGINE_TEMPLATE_KEY, template).await
}
