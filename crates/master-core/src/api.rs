//! Thin admin surface over the lifecycle operations.
//!
//! Handlers recover every error into the `{success, msg, obj?}` envelope the
//! panel expects; nothing below this layer knows about HTTP. Session
//! management is delegated — a single shared bearer token guards the panel
//! routes, while the agent connect route authenticates by slave secret
//! alone.

use axum::{
    Json, Router,
    extract::{FromRef, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{
    context::MasterContext,
    error::{MasterError, MasterResult},
    lifecycle, link,
    template_rules::{self, RuleKind},
};
use fb_types::{Account, ApiResponse, Inbound};

#[derive(Clone)]
pub struct ApiState {
    pub ctx: MasterContext,
    /// Shared admin bearer token; `None` leaves the panel open (tests, or a
    /// fronting proxy doing its own auth).
    pub admin_token: Option<String>,
    /// Base URL embedded in install commands when the Host header is not
    /// usable.
    pub public_url: Option<String>,
}

impl FromRef<ApiState> for MasterContext {
    fn from_ref(state: &ApiState) -> MasterContext {
        state.ctx.clone()
    }
}

pub fn router(state: ApiState) -> Router {
    let admin = Router::new()
        .route("/slaves/list", get(list_slaves))
        .route("/slaves/add", post(add_slave))
        .route("/slaves/del/{id}", post(delete_slave))
        .route("/slaves/install/{id}", get(install_command))
        .route("/certs/list", get(list_all_certs))
        .route("/certs/list/{slave_id}", get(list_slave_certs))
        .route("/inbounds/list", get(list_inbounds))
        .route("/inbounds/get/{id}", get(get_inbound))
        .route("/inbounds/add", post(add_inbound))
        .route("/inbounds/update/{id}", post(update_inbound))
        .route("/inbounds/del/{id}", post(delete_inbound))
        .route("/inbounds/onlines", post(online_clients))
        .route("/inbounds/lastOnline", post(last_online))
        .route("/outbounds/list/{slave_id}", get(list_outbounds))
        .route("/outbounds/add/{slave_id}", post(add_outbound))
        .route("/outbounds/update/{slave_id}/{index}", post(update_outbound))
        .route("/outbounds/del/{slave_id}/{index}", post(delete_outbound))
        .route("/outbounds/traffic", get(outbound_traffic))
        .route("/outbounds/traffic/{slave_id}", get(slave_outbound_traffic))
        .route("/outbounds/resetTraffic/{slave_id}", post(reset_outbound_traffic))
        .route("/routing/list/{slave_id}", get(list_routing_rules))
        .route("/routing/add/{slave_id}", post(add_routing_rule))
        .route("/routing/update/{slave_id}/{index}", post(update_routing_rule))
        .route("/routing/del/{slave_id}/{index}", post(delete_routing_rule))
        .route("/accounts/list", get(list_accounts))
        .route("/accounts/add", post(add_account))
        .route("/accounts/update/{id}", post(update_account))
        .route("/accounts/del/{id}", post(delete_account))
        .route("/accounts/{id}/clients", get(account_clients))
        .route("/accounts/{id}/addClient", post(add_account_client))
        .route("/accounts/{id}/delClient/{email}", post(remove_account_client))
        .route("/accounts/{id}/resetTraffic", post(reset_account))
        .route("/accounts/{id}/traffic", get(account_traffic))
        .route("/domain/verify", post(verify_domain))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    // The agent handshake authenticates by slave secret, not the admin token,
    // so it sits outside the guarded router.
    let api = Router::new()
        .route("/slave/connect", get(link::slave_connect_ws))
        .merge(admin);

    Router::new().nest("/panel/api", api).with_state(state)
}

async fn require_admin(
    State(state): State<ApiState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return next.run(request).await;
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("unauthorized")),
        )
            .into_response()
    }
}

/// Recover a result into the envelope. Errors land in `msg`; storage errors
/// additionally get logged since their text is rarely actionable for the
/// operator.
fn envelope<T: serde::Serialize>(result: MasterResult<T>) -> Json<ApiResponse> {
    match result {
        Ok(obj) => Json(ApiResponse::ok(obj)),
        Err(err) => {
            if matches!(err, MasterError::Storage(_)) {
                warn!("admin request failed: {err}");
            }
            Json(ApiResponse::error(err.to_string()))
        }
    }
}

// --- slaves ---

async fn list_slaves(State(state): State<ApiState>) -> Json<ApiResponse> {
    envelope(
        state_store::slaves::list_slaves_with_traffic(state.ctx.pool())
            .await
            .map_err(MasterError::from),
    )
}

#[derive(Deserialize)]
struct AddSlavePayload {
    #[serde(default)]
    name: String,
}

async fn add_slave(State(state): State<ApiState>, Json(payload): Json<AddSlavePayload>) -> Json<ApiResponse> {
    envelope(lifecycle::add_slave(&state.ctx, &payload.name).await)
}

async fn delete_slave(State(state): State<ApiState>, Path(id): Path<i64>) -> Json<ApiResponse> {
    envelope(lifecycle::delete_slave(&state.ctx, id).await.map(|()| id))
}

async fn install_command(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Json<ApiResponse> {
    let base = state.public_url.clone().or_else(|| {
        headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(|host| format!("http://{host}"))
    });
    let Some(base) = base else {
        return Json(ApiResponse::error("master URL unknown; set --public-url"));
    };
    envelope(lifecycle::install_command(&state.ctx, id, &base).await)
}

// --- certificates ---

async fn list_all_certs(State(state): State<ApiState>) -> Json<ApiResponse> {
    envelope(
        state_store::certs::list_all_certs(state.ctx.pool())
            .await
            .map_err(MasterError::from),
    )
}

async fn list_slave_certs(State(state): State<ApiState>, Path(slave_id): Path<i64>) -> Json<ApiResponse> {
    envelope(
        state_store::certs::list_certs_for_slave(state.ctx.pool(), slave_id)
            .await
            .map_err(MasterError::from),
    )
}

// --- inbounds ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundListQuery {
    #[serde(default)]
    slave_id: Option<i64>,
}

async fn list_inbounds(
    State(state): State<ApiState>,
    Query(query): Query<InboundListQuery>,
) -> Json<ApiResponse> {
    let result = match query.slave_id {
        Some(slave_id) => state_store::inbounds::list_inbounds_for_slave(state.ctx.pool(), slave_id).await,
        None => state_store::inbounds::list_inbounds(state.ctx.pool()).await,
    };
    envelope(result.map_err(MasterError::from))
}

async fn get_inbound(State(state): State<ApiState>, Path(id): Path<i64>) -> Json<ApiResponse> {
    let result = state_store::inbounds::fetch_inbound(state.ctx.pool(), id)
        .await
        .map_err(MasterError::from)
        .and_then(|inbound| inbound.ok_or_else(|| MasterError::not_found("inbound", id)));
    envelope(result)
}

/// Mutations advertise the slaves they touched so the panel can gate its
/// feedback on the push attempts.
fn with_affected<T: serde::Serialize>(obj: T, affected: Vec<i64>) -> Value {
    serde_json::json!({"obj": obj, "affectedSlaves": affected})
}

async fn add_inbound(State(state): State<ApiState>, Json(inbound): Json<Inbound>) -> Json<ApiResponse> {
    envelope(
        lifecycle::add_inbound(&state.ctx, inbound)
            .await
            .map(|(inbound, affected)| with_affected(inbound, affected)),
    )
}

async fn update_inbound(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(mut inbound): Json<Inbound>,
) -> Json<ApiResponse> {
    inbound.id = id;
    envelope(
        lifecycle::update_inbound(&state.ctx, inbound)
            .await
            .map(|(inbound, affected)| with_affected(inbound, affected)),
    )
}

async fn delete_inbound(State(state): State<ApiState>, Path(id): Path<i64>) -> Json<ApiResponse> {
    envelope(
        lifecycle::delete_inbound(&state.ctx, id)
            .await
            .map(|affected| with_affected(id, affected)),
    )
}

async fn online_clients(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::ok(lifecycle::online_clients(&state.ctx).await))
}

async fn last_online(State(state): State<ApiState>) -> Json<ApiResponse> {
    envelope(lifecycle::last_online(&state.ctx).await)
}

// --- template outbounds / routing rules ---

async fn list_outbounds(State(state): State<ApiState>, Path(slave_id): Path<i64>) -> Json<ApiResponse> {
    envelope(template_rules::list_rules(&state.ctx, slave_id, RuleKind::Outbound).await)
}

async fn add_outbound(
    State(state): State<ApiState>,
    Path(slave_id): Path<i64>,
    Json(rule): Json<Value>,
) -> Json<ApiResponse> {
    envelope(template_rules::add_rule(&state.ctx, slave_id, RuleKind::Outbound, rule).await)
}

async fn update_outbound(
    State(state): State<ApiState>,
    Path((slave_id, index)): Path<(i64, usize)>,
    Json(rule): Json<Value>,
) -> Json<ApiResponse> {
    envelope(template_rules::update_rule(&state.ctx, slave_id, RuleKind::Outbound, index, rule).await)
}

async fn delete_outbound(
    State(state): State<ApiState>,
    Path((slave_id, index)): Path<(i64, usize)>,
) -> Json<ApiResponse> {
    envelope(template_rules::delete_rule(&state.ctx, slave_id, RuleKind::Outbound, index).await)
}

async fn list_routing_rules(State(state): State<ApiState>, Path(slave_id): Path<i64>) -> Json<ApiResponse> {
    envelope(template_rules::list_rules(&state.ctx, slave_id, RuleKind::RoutingRule).await)
}

async fn add_routing_rule(
    State(state): State<ApiState>,
    Path(slave_id): Path<i64>,
    Json(rule): Json<Value>,
) -> Json<ApiResponse> {
    envelope(template_rules::add_rule(&state.ctx, slave_id, RuleKind::RoutingRule, rule).await)
}

async fn update_routing_rule(
    State(state): State<ApiState>,
    Path((slave_id, index)): Path<(i64, usize)>,
    Json(rule): Json<Value>,
) -> Json<ApiResponse> {
    envelope(template_rules::update_rule(&state.ctx, slave_id, RuleKind::RoutingRule, index, rule).await)
}

async fn delete_routing_rule(
    State(state): State<ApiState>,
    Path((slave_id, index)): Path<(i64, usize)>,
) -> Json<ApiResponse> {
    envelope(template_rules::delete_rule(&state.ctx, slave_id, RuleKind::RoutingRule, index).await)
}

async fn outbound_traffic(State(state): State<ApiState>) -> Json<ApiResponse> {
    envelope(
        state_store::traffic::list_outbound_traffics(state.ctx.pool())
            .await
            .map_err(MasterError::from),
    )
}

async fn slave_outbound_traffic(State(state): State<ApiState>, Path(slave_id): Path<i64>) -> Json<ApiResponse> {
    envelope(
        state_store::traffic::list_outbound_traffics_for_slave(state.ctx.pool(), slave_id)
            .await
            .map_err(MasterError::from),
    )
}

#[derive(Deserialize)]
struct ResetTrafficQuery {
    #[serde(default)]
    tag: Option<String>,
}

async fn reset_outbound_traffic(
    State(state): State<ApiState>,
    Path(slave_id): Path<i64>,
    Query(query): Query<ResetTrafficQuery>,
) -> Json<ApiResponse> {
    envelope(
        state_store::traffic::reset_outbound_traffic(state.ctx.pool(), slave_id, query.tag.as_deref())
            .await
            .map_err(MasterError::from),
    )
}

// --- accounts ---

async fn list_accounts(State(state): State<ApiState>) -> Json<ApiResponse> {
    let result: MasterResult<Vec<Account>> = async {
        let mut accounts = state_store::accounts::list_accounts(state.ctx.pool()).await?;
        // The stored sums are a cache; the list view shows live aggregates.
        for account in &mut accounts {
            let (up, down) =
                state_store::accounts::account_traffic_sums(state.ctx.pool(), account.id).await?;
            account.up = up;
            account.down = down;
        }
        Ok(accounts)
    }
    .await;
    envelope(result)
}

async fn add_account(State(state): State<ApiState>, Json(account): Json<Account>) -> Json<ApiResponse> {
    envelope(lifecycle::add_account(&state.ctx, account).await)
}

async fn update_account(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(mut account): Json<Account>,
) -> Json<ApiResponse> {
    account.id = id;
    envelope(
        lifecycle::update_account(&state.ctx, account)
            .await
            .map(|(account, affected)| with_affected(account, affected)),
    )
}

async fn delete_account(State(state): State<ApiState>, Path(id): Path<i64>) -> Json<ApiResponse> {
    envelope(lifecycle::delete_account(&state.ctx, id).await)
}

async fn account_clients(State(state): State<ApiState>, Path(id): Path<i64>) -> Json<ApiResponse> {
    envelope(lifecycle::list_account_clients(&state.ctx, id).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddAccountClientPayload {
    inbound_id: i64,
    email: String,
}

async fn add_account_client(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(payload): Json<AddAccountClientPayload>,
) -> Json<ApiResponse> {
    envelope(lifecycle::add_client_to_account(&state.ctx, id, payload.inbound_id, &payload.email).await)
}

async fn remove_account_client(
    State(state): State<ApiState>,
    Path((id, email)): Path<(i64, String)>,
) -> Json<ApiResponse> {
    envelope(lifecycle::remove_client_from_account(&state.ctx, id, &email).await)
}

async fn reset_account(State(state): State<ApiState>, Path(id): Path<i64>) -> Json<ApiResponse> {
    envelope(lifecycle::reset_account(&state.ctx, id).await)
}

async fn account_traffic(State(state): State<ApiState>, Path(id): Path<i64>) -> Json<ApiResponse> {
    envelope(
        lifecycle::account_traffic(&state.ctx, id)
            .await
            .map(|(up, down)| serde_json::json!({"up": up, "down": down})),
    )
}

// --- domain verification ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyDomainPayload {
    domain: String,
    slave_id: i64,
}

async fn verify_domain(
    State(state): State<ApiState>,
    Json(payload): Json<VerifyDomainPayload>,
) -> Json<ApiResponse> {
    envelope(lifecycle::verify_domain(&state.ctx, &payload.domain, payload.slave_id).await)
}
