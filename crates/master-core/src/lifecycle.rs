//! Lifecycle operations driven by the admin surface: slave, inbound, and
//! account mutations, their cascades, and the affected-slave sets that gate
//! config pushes.
//!
//! Every mutating operation commits first, then schedules fire-and-forget
//! pushes for the slaves it touched and returns that set to the caller.
//! Admin responses never block on delivery.

use std::collections::{HashMap, HashSet};

use fb_types::{Account, AccountClient, Client, Inbound, Slave};
use rand::distr::{Alphanumeric, SampleString};
use serde::Serialize;
use serde_json::Value;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::{
    context::MasterContext,
    error::{MasterError, MasterResult},
    fanout,
};

const SECRET_LEN: usize = 32;
const SUB_ID_LEN: usize = 16;

// --- slaves ---

/// Create a slave: random unique secret, offline until its first handshake,
/// template seeded from the tenant-wide default when one exists.
pub async fn add_slave(ctx: &MasterContext, name: &str) -> MasterResult<Slave> {
    if name.is_empty() {
        return Err(MasterError::invalid("slave name must not be empty"));
    }
    let pool = ctx.pool();
    let secret = fresh_secret(pool).await?;
    let id = state_store::slaves::insert_slave(pool, name, &secret, state_store::now_unix()).await?;

    if let Some(template) = state_store::settings::get_setting(pool, fb_types::ENGINE_TEMPLATE_KEY).await?
        && !template.is_empty()
    {
        state_store::settings::set_engine_template_for_slave(pool, id, &template).await?;
    }

    info!(slave_id = id, name, "slave added");
    state_store::slaves::fetch_slave_by_id(pool, id)
        .await?
        .ok_or_else(|| MasterError::not_found("slave", id))
}

async fn fresh_secret(pool: &SqlitePool) -> MasterResult<String> {
    loop {
        let secret = Alphanumeric.sample_string(&mut rand::rng(), SECRET_LEN);
        if !state_store::slaves::secret_in_use(pool, &secret).await? {
            return Ok(secret);
        }
    }
}

/// Delete a slave and every dependent row in one transaction, then drop its
/// live link. The order matters: dependents first, the slave row last.
pub async fn delete_slave(ctx: &MasterContext, slave_id: i64) -> MasterResult<()> {
    let pool = ctx.pool();
    state_store::slaves::fetch_slave_by_id(pool, slave_id)
        .await?
        .ok_or_else(|| MasterError::not_found("slave", slave_id))?;

    let mut tx = pool.begin().await?;
    let inbound_ids = state_store::inbounds::list_inbound_ids_for_slave(&mut *tx, slave_id).await?;
    for inbound_id in inbound_ids {
        for traffic in state_store::traffic::list_traffics_for_inbound(&mut *tx, inbound_id).await? {
            state_store::accounts::delete_account_client_by_email(&mut *tx, &traffic.email).await?;
            delete_client_ips(&mut tx, &traffic.email).await?;
        }
        state_store::traffic::delete_traffics_for_inbound(&mut *tx, inbound_id).await?;
    }
    state_store::inbounds::delete_inbounds_for_slave(&mut *tx, slave_id).await?;
    state_store::certs::delete_certs_for_slave(&mut *tx, slave_id).await?;
    state_store::traffic::delete_outbound_traffics_for_slave(&mut *tx, slave_id).await?;
    state_store::settings::delete_slave_settings(&mut *tx, slave_id).await?;
    state_store::slaves::delete_slave_row(&mut *tx, slave_id).await?;
    tx.commit().await?;

    ctx.registry.detach(slave_id, None).await;
    info!(slave_id, "slave deleted");
    Ok(())
}

async fn delete_client_ips(tx: &mut Transaction<'_, Sqlite>, email: &str) -> MasterResult<()> {
    sqlx::query("DELETE FROM inbound_client_ips WHERE client_email = ?")
        .bind(email)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Shell one-liner an operator pastes on a fresh host to enroll it.
pub async fn install_command(ctx: &MasterContext, slave_id: i64, master_url: &str) -> MasterResult<String> {
    let slave = state_store::slaves::fetch_slave_by_id(ctx.pool(), slave_id)
        .await?
        .ok_or_else(|| MasterError::not_found("slave", slave_id))?;
    Ok(format!(
        "bash <(curl -Ls https://raw.githubusercontent.com/fleetbridge/fleetbridge/master/install.sh) slave {} {}",
        master_url.trim_end_matches('/'),
        slave.secret
    ))
}

// --- inbounds ---

/// Create an inbound on a slave. The tag defaults to the listen/port-derived
/// form the engine expects, and the embedded clients get traffic rows.
pub async fn add_inbound(ctx: &MasterContext, mut inbound: Inbound) -> MasterResult<(Inbound, Vec<i64>)> {
    require_slave(ctx.pool(), inbound.slave_id).await?;
    if inbound.tag.is_empty() {
        inbound.tag = derive_tag(&inbound.listen, inbound.port);
    }
    if state_store::inbounds::tag_in_use(ctx.pool(), &inbound.tag, 0).await? {
        return Err(MasterError::conflict(format!("inbound tag already exists: {}", inbound.tag)));
    }

    let mut tx = ctx.pool().begin().await?;
    let id = state_store::inbounds::insert_inbound(&mut *tx, &inbound).await?;
    inbound.id = id;
    sync_inbound_clients(&mut tx, &inbound).await?;
    tx.commit().await?;

    let affected = vec![inbound.slave_id];
    fanout::after_commit_all(ctx, affected.iter().copied());
    info!(inbound_id = id, slave_id = inbound.slave_id, tag = %inbound.tag, "inbound added");
    Ok((inbound, affected))
}

/// Update an inbound. A `slave_id` change pushes both the old and the new
/// owner so the inbound moves rather than duplicates.
pub async fn update_inbound(ctx: &MasterContext, mut inbound: Inbound) -> MasterResult<(Inbound, Vec<i64>)> {
    let old = state_store::inbounds::fetch_inbound(ctx.pool(), inbound.id)
        .await?
        .ok_or_else(|| MasterError::not_found("inbound", inbound.id))?;
    require_slave(ctx.pool(), inbound.slave_id).await?;
    if inbound.tag.is_empty() {
        inbound.tag = old.tag.clone();
    }
    if state_store::inbounds::tag_in_use(ctx.pool(), &inbound.tag, inbound.id).await? {
        return Err(MasterError::conflict(format!("inbound tag already exists: {}", inbound.tag)));
    }

    let mut tx = ctx.pool().begin().await?;
    state_store::inbounds::update_inbound(&mut *tx, &inbound).await?;
    sync_inbound_clients(&mut tx, &inbound).await?;
    tx.commit().await?;

    let mut affected = vec![inbound.slave_id];
    if old.slave_id != inbound.slave_id {
        affected.push(old.slave_id);
    }
    fanout::after_commit_all(ctx, affected.iter().copied());
    Ok((inbound, affected))
}

pub async fn delete_inbound(ctx: &MasterContext, inbound_id: i64) -> MasterResult<Vec<i64>> {
    let inbound = state_store::inbounds::fetch_inbound(ctx.pool(), inbound_id)
        .await?
        .ok_or_else(|| MasterError::not_found("inbound", inbound_id))?;

    let mut tx = ctx.pool().begin().await?;
    for traffic in state_store::traffic::list_traffics_for_inbound(&mut *tx, inbound_id).await? {
        state_store::accounts::delete_account_client_by_email(&mut *tx, &traffic.email).await?;
        delete_client_ips(&mut tx, &traffic.email).await?;
    }
    state_store::traffic::delete_traffics_for_inbound(&mut *tx, inbound_id).await?;
    state_store::inbounds::delete_inbound_row(&mut *tx, inbound_id).await?;
    tx.commit().await?;

    let affected = vec![inbound.slave_id];
    fanout::after_commit_all(ctx, affected.iter().copied());
    info!(inbound_id, tag = %inbound.tag, "inbound deleted");
    Ok(affected)
}

async fn require_slave(pool: &SqlitePool, slave_id: i64) -> MasterResult<()> {
    if slave_id < 1 {
        return Err(MasterError::invalid("a valid slave id is required"));
    }
    state_store::slaves::fetch_slave_by_id(pool, slave_id)
        .await?
        .ok_or_else(|| MasterError::not_found("slave", slave_id))?;
    Ok(())
}

fn derive_tag(listen: &str, port: i64) -> String {
    match listen {
        "" | "0.0.0.0" | "::" | "::0" => format!("inbound-{port}"),
        listen => format!("inbound-{listen}:{port}"),
    }
}

/// Clients embedded in the inbound's settings JSON.
pub fn parse_clients(settings: &str) -> Vec<Client> {
    let Ok(value) = serde_json::from_str::<Value>(settings) else {
        return Vec::new();
    };
    value
        .get("clients")
        .and_then(Value::as_array)
        .map(|clients| {
            clients
                .iter()
                .filter_map(|c| serde_json::from_value(c.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Reconcile `client_traffics` with the inbound's embedded clients: rows are
/// created for new emails and dropped (with their account links and IP
/// records) for emails no longer present. Existing rows keep their counters.
async fn sync_inbound_clients(tx: &mut Transaction<'_, Sqlite>, inbound: &Inbound) -> MasterResult<()> {
    let clients = parse_clients(&inbound.settings);
    let wanted: HashSet<&str> = clients
        .iter()
        .map(|c| c.email.as_str())
        .filter(|e| !e.is_empty())
        .collect();

    for traffic in state_store::traffic::list_traffics_for_inbound(&mut **tx, inbound.id).await? {
        if !wanted.contains(traffic.email.as_str()) {
            state_store::accounts::delete_account_client_by_email(&mut **tx, &traffic.email).await?;
            delete_client_ips(tx, &traffic.email).await?;
            state_store::traffic::delete_traffic_by_email(&mut **tx, &traffic.email).await?;
        }
    }

    for client in &clients {
        if client.email.is_empty() {
            continue;
        }
        if let Some(existing) = state_store::traffic::fetch_traffic_by_email(&mut **tx, &client.email).await? {
            if existing.inbound_id != inbound.id {
                return Err(MasterError::conflict(format!(
                    "client email already exists: {}",
                    client.email
                )));
            }
        } else {
            state_store::traffic::insert_client_traffic(
                &mut **tx,
                inbound.id,
                0,
                &client.email,
                client.enable,
                client.total_gb * (1 << 30),
                client.expiry_time,
            )
            .await?;
        }
    }
    Ok(())
}

// --- accounts ---

/// Create an account. Username must be unique; a subscription id is minted
/// when the caller left it empty.
pub async fn add_account(ctx: &MasterContext, mut account: Account) -> MasterResult<Account> {
    if account.username.is_empty() {
        return Err(MasterError::invalid("account username must not be empty"));
    }
    if state_store::accounts::fetch_account_by_username(ctx.pool(), &account.username)
        .await?
        .is_some()
    {
        return Err(MasterError::conflict(format!("username already exists: {}", account.username)));
    }
    if account.sub_id.is_empty() {
        account.sub_id = Alphanumeric.sample_string(&mut rand::rng(), SUB_ID_LEN);
    }
    let now_ms = state_store::now_unix_millis();
    account.created_at = now_ms;
    account.updated_at = now_ms;
    account.id = state_store::accounts::insert_account(ctx.pool(), &account).await?;
    info!(account_id = account.id, username = %account.username, "account added");
    Ok(account)
}

/// Update an account. Re-enabling is refused while the quota is exhausted
/// (reset is the recovery path), and an enable change cascades to every
/// associated client within the same transaction.
pub async fn update_account(ctx: &MasterContext, mut account: Account) -> MasterResult<(Account, Vec<i64>)> {
    let pool = ctx.pool();
    let old = state_store::accounts::fetch_account(pool, account.id)
        .await?
        .ok_or_else(|| MasterError::not_found("account", account.id))?;

    if account.username != old.username
        && let Some(other) = state_store::accounts::fetch_account_by_username(pool, &account.username).await?
        && other.id != account.id
    {
        return Err(MasterError::conflict(format!("username already exists: {}", account.username)));
    }

    if account.enable && !old.enable && account.total_gb > 0 {
        let (up, down) = state_store::accounts::account_traffic_sums(pool, account.id).await?;
        if up + down >= account.total_gb * (1 << 30) {
            return Err(MasterError::conflict(
                "cannot enable account: traffic limit exceeded, reset traffic first",
            ));
        }
    }

    account.created_at = old.created_at;
    account.updated_at = state_store::now_unix_millis();

    let mut tx = pool.begin().await?;
    state_store::accounts::update_account_row(&mut *tx, &account).await?;
    if account.enable != old.enable {
        state_store::traffic::set_enable_by_account(&mut *tx, account.id, account.enable).await?;
        info!(
            account_id = account.id,
            enable = account.enable,
            "cascaded account enable change to associated clients"
        );
    }
    tx.commit().await?;

    let affected = state_store::accounts::affected_slave_ids_for_account(pool, account.id).await?;
    fanout::after_commit_all(ctx, affected.iter().copied());
    Ok((account, affected))
}

/// Delete an account: associations go, clients revert to standalone
/// (account_id = 0), counters stay.
pub async fn delete_account(ctx: &MasterContext, account_id: i64) -> MasterResult<Vec<i64>> {
    let pool = ctx.pool();
    state_store::accounts::fetch_account(pool, account_id)
        .await?
        .ok_or_else(|| MasterError::not_found("account", account_id))?;

    let affected = state_store::accounts::affected_slave_ids_for_account(pool, account_id).await?;

    let mut tx = pool.begin().await?;
    state_store::accounts::delete_account_clients(&mut *tx, account_id).await?;
    state_store::traffic::clear_account_links(&mut *tx, account_id).await?;
    state_store::accounts::delete_account_row(&mut *tx, account_id).await?;
    tx.commit().await?;

    fanout::after_commit_all(ctx, affected.iter().copied());
    info!(account_id, "account deleted");
    Ok(affected)
}

/// Zero the account's counters and re-enable it and all of its clients in
/// one step, undoing a quota disable.
pub async fn reset_account(ctx: &MasterContext, account_id: i64) -> MasterResult<Vec<i64>> {
    let pool = ctx.pool();
    state_store::accounts::fetch_account(pool, account_id)
        .await?
        .ok_or_else(|| MasterError::not_found("account", account_id))?;

    let mut tx = pool.begin().await?;
    state_store::accounts::reset_account_row(&mut *tx, account_id).await?;
    state_store::traffic::reset_by_account(&mut *tx, account_id).await?;
    tx.commit().await?;

    let affected = state_store::accounts::affected_slave_ids_for_account(pool, account_id).await?;
    fanout::after_commit_all(ctx, affected.iter().copied());
    info!(account_id, "account traffic reset and re-enabled");
    Ok(affected)
}

/// Associate an existing inbound client with an account. Each email belongs
/// to at most one account.
pub async fn add_client_to_account(
    ctx: &MasterContext,
    account_id: i64,
    inbound_id: i64,
    email: &str,
) -> MasterResult<Vec<i64>> {
    let pool = ctx.pool();
    state_store::accounts::fetch_account(pool, account_id)
        .await?
        .ok_or_else(|| MasterError::not_found("account", account_id))?;
    let inbound = state_store::inbounds::fetch_inbound(pool, inbound_id)
        .await?
        .ok_or_else(|| MasterError::not_found("inbound", inbound_id))?;

    if state_store::accounts::fetch_account_client_by_email(pool, email).await?.is_some() {
        return Err(MasterError::conflict(format!(
            "client email already associated with an account: {email}"
        )));
    }

    let client_exists = parse_clients(&inbound.settings).iter().any(|c| c.email == email);
    let now_ms = state_store::now_unix_millis();

    let mut tx = pool.begin().await?;
    state_store::accounts::insert_account_client(&mut *tx, account_id, inbound_id, email, now_ms).await?;
    match state_store::traffic::fetch_traffic_by_email(&mut *tx, email).await? {
        Some(_) => {
            state_store::traffic::set_traffic_account(&mut *tx, email, account_id).await?;
        }
        None if client_exists => {
            state_store::traffic::insert_client_traffic(&mut *tx, inbound_id, account_id, email, true, 0, 0)
                .await?;
        }
        None => {
            return Err(MasterError::invalid(format!(
                "client does not exist in inbound {inbound_id}: {email}"
            )));
        }
    }
    tx.commit().await?;

    let affected = vec![inbound.slave_id];
    fanout::after_commit_all(ctx, affected.iter().copied());
    Ok(affected)
}

/// Drop the association; the client reverts to its own enable flag.
pub async fn remove_client_from_account(
    ctx: &MasterContext,
    account_id: i64,
    email: &str,
) -> MasterResult<Vec<i64>> {
    let pool = ctx.pool();
    let assoc = state_store::accounts::fetch_account_client_by_email(pool, email)
        .await?
        .filter(|assoc| assoc.account_id == account_id)
        .ok_or_else(|| MasterError::not_found("account client", email))?;

    let mut tx = pool.begin().await?;
    state_store::accounts::delete_account_client(&mut *tx, account_id, email).await?;
    state_store::traffic::set_traffic_account(&mut *tx, email, 0).await?;
    tx.commit().await?;

    let affected = match state_store::inbounds::fetch_inbound(pool, assoc.inbound_id).await? {
        Some(inbound) => vec![inbound.slave_id],
        None => Vec::new(),
    };
    fanout::after_commit_all(ctx, affected.iter().copied());
    Ok(affected)
}

/// Live aggregated `(up, down)` for the admin traffic view.
pub async fn account_traffic(ctx: &MasterContext, account_id: i64) -> MasterResult<(i64, i64)> {
    state_store::accounts::fetch_account(ctx.pool(), account_id)
        .await?
        .ok_or_else(|| MasterError::not_found("account", account_id))?;
    Ok(state_store::accounts::account_traffic_sums(ctx.pool(), account_id).await?)
}

/// One row of the account's client listing, joined with its inbound.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountClientInfo {
    pub account_id: i64,
    pub inbound_id: i64,
    pub inbound_tag: String,
    pub inbound_remark: String,
    pub client_email: String,
    pub enable: bool,
    pub created_at: i64,
}

pub async fn list_account_clients(ctx: &MasterContext, account_id: i64) -> MasterResult<Vec<AccountClientInfo>> {
    let pool = ctx.pool();
    let assocs: Vec<AccountClient> = state_store::accounts::list_account_clients(pool, account_id).await?;
    let mut inbound_cache: HashMap<i64, Inbound> = HashMap::new();
    let mut result = Vec::with_capacity(assocs.len());
    for assoc in assocs {
        let inbound = match inbound_cache.get(&assoc.inbound_id) {
            Some(inbound) => inbound.clone(),
            None => match state_store::inbounds::fetch_inbound(pool, assoc.inbound_id).await? {
                Some(inbound) => {
                    inbound_cache.insert(assoc.inbound_id, inbound.clone());
                    inbound
                }
                None => continue,
            },
        };
        let enable = state_store::traffic::fetch_traffic_by_email(pool, &assoc.client_email)
            .await?
            .map(|t| t.enable)
            .unwrap_or(true);
        result.push(AccountClientInfo {
            account_id: assoc.account_id,
            inbound_id: assoc.inbound_id,
            inbound_tag: inbound.tag.clone(),
            inbound_remark: inbound.remark.clone(),
            client_email: assoc.client_email,
            enable,
            created_at: assoc.created_at,
        });
    }
    Ok(result)
}

// --- domain verification ---

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainVerification {
    pub success: bool,
    pub msg: String,
    pub resolved_ip: String,
    pub slave_ip: String,
}

/// Resolve the domain and compare against the slave's recorded address, so
/// an operator can confirm DNS before pointing clients at it.
pub async fn verify_domain(ctx: &MasterContext, domain: &str, slave_id: i64) -> MasterResult<DomainVerification> {
    let slave = state_store::slaves::fetch_slave_by_id(ctx.pool(), slave_id)
        .await?
        .ok_or_else(|| MasterError::not_found("slave", slave_id))?;
    if slave.address.is_empty() {
        return Ok(DomainVerification {
            success: false,
            msg: "slave has no recorded address".to_string(),
            resolved_ip: String::new(),
            slave_ip: String::new(),
        });
    }

    let resolved = match tokio::net::lookup_host((domain, 0)).await {
        Ok(addrs) => addrs.map(|a| a.ip().to_string()).collect::<Vec<_>>(),
        Err(err) => {
            return Ok(DomainVerification {
                success: false,
                msg: format!("DNS lookup failed: {err}"),
                resolved_ip: String::new(),
                slave_ip: slave.address,
            });
        }
    };

    let matched = resolved.iter().find(|ip| **ip == slave.address);
    match matched {
        Some(ip) => Ok(DomainVerification {
            success: true,
            msg: "domain verified successfully".to_string(),
            resolved_ip: ip.clone(),
            slave_ip: slave.address,
        }),
        None => Ok(DomainVerification {
            success: false,
            msg: "domain does not resolve to the slave address".to_string(),
            resolved_ip: resolved.first().cloned().unwrap_or_default(),
            slave_ip: slave.address,
        }),
    }
}

// --- online status ---

pub async fn online_clients(ctx: &MasterContext) -> Vec<String> {
    let mut online: Vec<String> = ctx.registry.online_users().await.into_iter().collect();
    online.sort();
    online
}

pub async fn last_online(ctx: &MasterContext) -> MasterResult<HashMap<String, i64>> {
    Ok(state_store::traffic::last_online_map(ctx.pool()).await?)
}
