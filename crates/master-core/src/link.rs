//! One authenticated duplex link per connected slave.
//!
//! The agent dials `GET /panel/api/slave/connect?secret=<S>` and upgrades to
//! a WebSocket carrying one JSON object per text frame in each direction. On
//! accept the master registers the link, marks the slave online, and
//! immediately pushes the full assembled config; afterwards a writer task
//! drains outbound frames while the read loop dispatches agent reports into
//! ingest. Link I/O errors are non-fatal to the master: the link detaches
//! and the agent's reconnect converges it.

use std::time::Duration;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fb_types::{ApiResponse, Slave, SlaveFrame, SlaveStatus};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::{
    context::MasterContext,
    fanout, ingest,
    registry::LinkHandle,
};

/// Agents report system stats every interval; a link silent for three of
/// them is considered dead.
const STATS_INTERVAL: Duration = Duration::from_secs(15);
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(3 * STATS_INTERVAL.as_secs());

const FRAME_BUFFER: usize = 32;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(default)]
    secret: String,
}

/// Handshake endpoint: the shared secret is the whole authentication.
pub async fn slave_connect_ws(
    State(ctx): State<MasterContext>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let slave = match state_store::slaves::fetch_slave_by_secret(ctx.pool(), &query.secret).await {
        Ok(Some(slave)) => slave,
        Ok(None) => {
            warn!("slave handshake rejected: unknown secret");
            return (
                StatusCode::UNAUTHORIZED,
                axum::Json(ApiResponse::error("invalid secret")),
            )
                .into_response();
        }
        Err(err) => {
            warn!("slave handshake failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(ApiResponse::error("internal error")),
            )
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(ctx, slave, socket))
}

async fn handle_socket(ctx: MasterContext, slave: Slave, socket: WebSocket) {
    let slave_id = slave.id;
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (frame_tx, mut frame_rx) = mpsc::channel(FRAME_BUFFER);
    let (close_tx, mut close_rx) = broadcast::channel(1);
    let conn_id = ctx
        .registry
        .attach(slave_id, LinkHandle::new(frame_tx, close_tx))
        .await;

    if let Err(err) = state_store::slaves::update_slave_status(
        ctx.pool(),
        slave_id,
        SlaveStatus::Online,
        None,
        state_store::now_unix(),
    )
    .await
    {
        warn!(slave_id, "failed to persist online status: {err}");
    }

    // Writer task owns the sink; dropping the handle or firing the close
    // signal ends it.
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else { break };
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(err) => {
                            warn!(slave_id, "failed to encode outbound frame: {err}");
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = close_rx.recv() => break,
            }
        }
        let _ = ws_sender.close().await;
    });

    // A reconnecting agent keeps no config; send the full current truth
    // before anything else.
    if let Err(err) = fanout::push(&ctx, slave_id).await {
        warn!(slave_id, "initial config push failed: {err}");
    }

    loop {
        let next = tokio::time::timeout(LIVENESS_TIMEOUT, ws_receiver.next()).await;
        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(err))) => {
                debug!(slave_id, "link read error: {err}");
                break;
            }
            Ok(None) => {
                debug!(slave_id, "link closed by agent");
                break;
            }
            Err(_) => {
                warn!(slave_id, "no message within liveness window, dropping link");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            // Pings are answered by axum; other frame kinds carry nothing.
            _ => continue,
        };

        match SlaveFrame::parse(text.as_str()) {
            Ok(frame) => {
                if let Err(err) =
                    state_store::slaves::touch_slave(ctx.pool(), slave_id, state_store::now_unix()).await
                {
                    warn!(slave_id, "failed to refresh last_seen: {err}");
                }
                ingest::handle_frame(&ctx, slave_id, frame).await;
            }
            Err(err) => debug!(slave_id, "ignoring unparseable frame: {err}"),
        }
    }

    writer.abort();
    if ctx.registry.detach(slave_id, Some(conn_id)).await {
        if let Err(err) = state_store::slaves::update_slave_status(
            ctx.pool(),
            slave_id,
            SlaveStatus::Offline,
            None,
            state_store::now_unix(),
        )
        .await
        {
            warn!(slave_id, "failed to persist offline status: {err}");
        }
        info!(slave_id, "slave link detached");
    }
}
