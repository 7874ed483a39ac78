//! Accounts and their client associations.

use fb_types::{Account, AccountClient};
use sqlx::SqliteExecutor;

use crate::DbResult;

pub async fn insert_account(executor: impl SqliteExecutor<'_>, account: &Account) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO accounts (username, sub_id, enable, total_gb, expiry_time, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&account.username)
    .bind(&account.sub_id)
    .bind(account.enable)
    .bind(account.total_gb)
    .bind(account.expiry_time)
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(executor)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn update_account_row(executor: impl SqliteExecutor<'_>, account: &Account) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE accounts
        SET username = ?, sub_id = ?, enable = ?, total_gb = ?, expiry_time = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&account.username)
    .bind(&account.sub_id)
    .bind(account.enable)
    .bind(account.total_gb)
    .bind(account.expiry_time)
    .bind(account.updated_at)
    .bind(account.id)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn fetch_account(executor: impl SqliteExecutor<'_>, id: i64) -> DbResult<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(account)
}

pub async fn fetch_account_by_username(
    executor: impl SqliteExecutor<'_>,
    username: &str,
) -> DbResult<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE username = ?")
        .bind(username)
        .fetch_optional(executor)
        .await?;
    Ok(account)
}

pub async fn list_accounts(executor: impl SqliteExecutor<'_>) -> DbResult<Vec<Account>> {
    let accounts = sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY id")
        .fetch_all(executor)
        .await?;
    Ok(accounts)
}

pub async fn delete_account_row(executor: impl SqliteExecutor<'_>, id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM accounts WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Live `(up, down)` sums over the account's associated client traffics.
pub async fn account_traffic_sums(executor: impl SqliteExecutor<'_>, account_id: i64) -> DbResult<(i64, i64)> {
    let sums = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COALESCE(SUM(up), 0), COALESCE(SUM(down), 0) FROM client_traffics WHERE account_id = ?",
    )
    .bind(account_id)
    .fetch_one(executor)
    .await?;
    Ok(sums)
}

/// Write back the derived traffic cache.
pub async fn write_account_traffic(
    executor: impl SqliteExecutor<'_>,
    account_id: i64,
    up: i64,
    down: i64,
    updated_at: i64,
) -> DbResult<()> {
    sqlx::query("UPDATE accounts SET up = ?, down = ?, updated_at = ? WHERE id = ?")
        .bind(up)
        .bind(down)
        .bind(updated_at)
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn set_account_enable(executor: impl SqliteExecutor<'_>, account_id: i64, enable: bool) -> DbResult<()> {
    sqlx::query("UPDATE accounts SET enable = ? WHERE id = ?")
        .bind(enable)
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Zero the cached traffic and re-enable; the matching client reset lives in
/// [`crate::traffic::reset_by_account`].
pub async fn reset_account_row(executor: impl SqliteExecutor<'_>, account_id: i64) -> DbResult<()> {
    sqlx::query("UPDATE accounts SET up = 0, down = 0, enable = 1 WHERE id = ?")
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Accounts eligible for the quota policy check.
pub async fn list_enabled_limited_accounts(executor: impl SqliteExecutor<'_>) -> DbResult<Vec<Account>> {
    let accounts = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE enable = 1 AND total_gb > 0")
        .fetch_all(executor)
        .await?;
    Ok(accounts)
}

/// Accounts eligible for the expiry policy check.
pub async fn list_expired_accounts(executor: impl SqliteExecutor<'_>, now_ms: i64) -> DbResult<Vec<Account>> {
    let accounts = sqlx::query_as::<_, Account>(
        "SELECT * FROM accounts WHERE enable = 1 AND expiry_time > 0 AND expiry_time <= ?",
    )
    .bind(now_ms)
    .fetch_all(executor)
    .await?;
    Ok(accounts)
}

// --- account_clients ---

pub async fn insert_account_client(
    executor: impl SqliteExecutor<'_>,
    account_id: i64,
    inbound_id: i64,
    client_email: &str,
    now_ms: i64,
) -> DbResult<i64> {
    let result = sqlx::query(
        "INSERT INTO account_clients (account_id, inbound_id, client_email, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(account_id)
    .bind(inbound_id)
    .bind(client_email)
    .bind(now_ms)
    .execute(executor)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn fetch_account_client_by_email(
    executor: impl SqliteExecutor<'_>,
    client_email: &str,
) -> DbResult<Option<AccountClient>> {
    let assoc = sqlx::query_as::<_, AccountClient>("SELECT * FROM account_clients WHERE client_email = ?")
        .bind(client_email)
        .fetch_optional(executor)
        .await?;
    Ok(assoc)
}

pub async fn list_account_clients(
    executor: impl SqliteExecutor<'_>,
    account_id: i64,
) -> DbResult<Vec<AccountClient>> {
    let assocs = sqlx::query_as::<_, AccountClient>(
        "SELECT * FROM account_clients WHERE account_id = ? ORDER BY id",
    )
    .bind(account_id)
    .fetch_all(executor)
    .await?;
    Ok(assocs)
}

pub async fn delete_account_clients(executor: impl SqliteExecutor<'_>, account_id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM account_clients WHERE account_id = ?")
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete_account_client(
    executor: impl SqliteExecutor<'_>,
    account_id: i64,
    client_email: &str,
) -> DbResult<()> {
    sqlx::query("DELETE FROM account_clients WHERE account_id = ? AND client_email = ?")
        .bind(account_id)
        .bind(client_email)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete_account_client_by_email(executor: impl SqliteExecutor<'_>, client_email: &str) -> DbResult<()> {
    sqlx::query("DELETE FROM account_clients WHERE client_email = ?")
        .bind(client_email)
        .execute(executor)
        .await?;
    Ok(())
}

/// Distinct slaves hosting any of the account's clients; the push set for
/// account-scoped mutations.
pub async fn affected_slave_ids_for_account(
    executor: impl SqliteExecutor<'_>,
    account_id: i64,
) -> DbResult<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT DISTINCT i.slave_id
        FROM account_clients ac
        JOIN inbounds i ON i.id = ac.inbound_id
        WHERE ac.account_id = ? AND i.slave_id > 0
        ORDER BY i.slave_id
        "#,
    )
    .bind(account_id)
    .fetch_all(executor)
    .await?;
    Ok(ids)
}
