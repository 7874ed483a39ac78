//! Usage-policy evaluation: quota and expiry enforcement.
//!
//! Runs at the end of every ingest pass. The pass itself is pure over the
//! store — it flips enable flags and reports which slaves now need a config
//! push; the caller owns the push side-effects. Per-account failures are
//! logged and skipped so one broken row never stalls enforcement for the
//! rest of the fleet.

use std::collections::BTreeSet;

use fb_types::Account;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::MasterResult;

/// Evaluate all three checks for a slave that just reported traffic:
/// direct per-client quota/expiry on that slave, account traffic limits, and
/// account expiry fleet-wide. Returns every slave id whose config must be
/// re-pushed.
pub async fn evaluate(pool: &SqlitePool, slave_id: i64) -> MasterResult<BTreeSet<i64>> {
    let mut affected = BTreeSet::new();
    let now_ms = state_store::now_unix_millis();

    let disabled =
        state_store::traffic::disable_exhausted_clients_for_slave(pool, slave_id, now_ms).await?;
    if disabled > 0 {
        info!(slave_id, disabled, "disabled clients over direct quota or expiry");
        affected.insert(slave_id);
    }

    for account in state_store::accounts::list_enabled_limited_accounts(pool).await? {
        match account_over_quota(pool, &account).await {
            Ok(true) => {
                if let Err(err) = disable_account_cascade(pool, &account, &mut affected).await {
                    warn!(account = %account.username, "failed to disable account over quota: {err}");
                }
            }
            Ok(false) => {}
            Err(err) => warn!(account = %account.username, "quota check failed: {err}"),
        }
    }

    for account in state_store::accounts::list_expired_accounts(pool, now_ms).await? {
        if let Err(err) = disable_account_cascade(pool, &account, &mut affected).await {
            warn!(account = %account.username, "failed to disable expired account: {err}");
        }
    }

    Ok(affected)
}

async fn account_over_quota(pool: &SqlitePool, account: &Account) -> MasterResult<bool> {
    let Some(quota) = account.quota_bytes() else {
        return Ok(false);
    };
    let (up, down) = state_store::accounts::account_traffic_sums(pool, account.id).await?;
    Ok(up + down >= quota)
}

/// Disable the account and every associated client in one transaction, and
/// record the slaves hosting those clients.
async fn disable_account_cascade(
    pool: &SqlitePool,
    account: &Account,
    affected: &mut BTreeSet<i64>,
) -> MasterResult<()> {
    let mut tx = pool.begin().await?;
    state_store::accounts::set_account_enable(&mut *tx, account.id, false).await?;
    state_store::traffic::set_enable_by_account(&mut *tx, account.id, false).await?;
    tx.commit().await?;

    affected.extend(state_store::accounts::affected_slave_ids_for_account(pool, account.id).await?);
    info!(account = %account.username, "disabled account and associated clients");
    Ok(())
}
