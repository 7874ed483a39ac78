//! Per-slave certificate inventory, as reported by agents.

use fb_types::SlaveCert;
use sqlx::SqliteExecutor;

use crate::DbResult;

pub async fn upsert_cert(
    executor: impl SqliteExecutor<'_>,
    slave_id: i64,
    domain: &str,
    cert_path: &str,
    key_path: &str,
    expiry_time: i64,
    now: i64,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO slave_certs (slave_id, domain, cert_path, key_path, expiry_time, last_updated)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (slave_id, domain) DO UPDATE SET
            cert_path = excluded.cert_path,
            key_path = excluded.key_path,
            expiry_time = excluded.expiry_time,
            last_updated = excluded.last_updated
        "#,
    )
    .bind(slave_id)
    .bind(domain)
    .bind(cert_path)
    .bind(key_path)
    .bind(expiry_time)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list_certs_for_slave(executor: impl SqliteExecutor<'_>, slave_id: i64) -> DbResult<Vec<SlaveCert>> {
    let certs = sqlx::query_as::<_, SlaveCert>("SELECT * FROM slave_certs WHERE slave_id = ? ORDER BY domain")
        .bind(slave_id)
        .fetch_all(executor)
        .await?;
    Ok(certs)
}

pub async fn list_all_certs(executor: impl SqliteExecutor<'_>) -> DbResult<Vec<SlaveCert>> {
    let certs = sqlx::query_as::<_, SlaveCert>("SELECT * FROM slave_certs ORDER BY slave_id, domain")
        .fetch_all(executor)
        .await?;
    Ok(certs)
}

/// Drop rows for domains the slave no longer reports; the reported set is
/// authoritative for that slave.
pub async fn delete_certs_not_in(
    executor: impl SqliteExecutor<'_>,
    slave_id: i64,
    domains: &[String],
) -> DbResult<()> {
    // SQLite lacks array binds; build the placeholder list by hand.
    let placeholders = vec!["?"; domains.len()].join(", ");
    let sql = if domains.is_empty() {
        "DELETE FROM slave_certs WHERE slave_id = ?".to_string()
    } else {
        format!("DELETE FROM slave_certs WHERE slave_id = ? AND domain NOT IN ({placeholders})")
    };
    let mut query = sqlx::query(&sql).bind(slave_id);
    for domain in domains {
        query = query.bind(domain);
    }
    query.execute(executor).await?;
    Ok(())
}

pub async fn delete_certs_for_slave(executor: impl SqliteExecutor<'_>, slave_id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM slave_certs WHERE slave_id = ?")
        .bind(slave_id)
        .execute(executor)
        .await?;
    Ok(())
}
