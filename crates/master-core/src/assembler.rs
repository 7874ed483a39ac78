//! Per-slave engine-config assembly.
//!
//! The master is the authoritative composer: the agent receives exactly one
//! JSON document and applies it without policy logic of its own. Assembly
//! starts from the slave's stored template (tenant default as fallback),
//! appends the slave's enabled inbounds with disabled clients stripped, and
//! serializes the result.

use std::collections::HashMap;

use fb_types::{Inbound, TemplateDoc};
use serde_json::{Value, json};
use sqlx::SqlitePool;

use crate::error::{MasterError, MasterResult};

/// Build the engine config document for one slave, returned as the string
/// that goes out in `update_config_full`.
pub async fn assemble_config(pool: &SqlitePool, slave_id: i64) -> MasterResult<String> {
    let template = state_store::settings::engine_template_for_slave(pool, slave_id)
        .await?
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            MasterError::invalid(format!("no engine template configured for slave {slave_id}"))
        })?;
    let mut doc = TemplateDoc::parse(&template)
        .map_err(|err| MasterError::invalid(format!("engine template for slave {slave_id}: {err}")))?;

    let inbounds = state_store::inbounds::list_enabled_inbounds_for_slave(pool, slave_id).await?;
    let effective = state_store::traffic::effective_enable_map_for_slave(pool, slave_id).await?;

    for inbound in &inbounds {
        doc.inbounds().push(render_inbound(inbound, &effective)?);
    }

    Ok(doc.serialize())
}

/// Render one engine-side inbound block from its stored row, dropping the
/// clients the effective-enable map disables.
fn render_inbound(inbound: &Inbound, effective: &HashMap<String, bool>) -> MasterResult<Value> {
    let mut settings = parse_json_column(&inbound.settings).map_err(|err| {
        MasterError::invalid(format!("inbound '{}' settings: {err}", inbound.tag))
    })?;
    if let Some(clients) = settings.get_mut("clients").and_then(Value::as_array_mut) {
        filter_disabled_clients(clients, effective);
    }

    // Empty listen means all interfaces; the engine wants that explicit.
    let listen = if inbound.listen.is_empty() {
        "0.0.0.0"
    } else {
        inbound.listen.as_str()
    };

    let mut block = json!({
        "listen": listen,
        "port": inbound.port,
        "protocol": inbound.protocol,
        "settings": settings,
        "tag": inbound.tag,
    });
    if !inbound.stream_settings.is_empty() {
        block["streamSettings"] = parse_json_column(&inbound.stream_settings).map_err(|err| {
            MasterError::invalid(format!("inbound '{}' streamSettings: {err}", inbound.tag))
        })?;
    }
    if !inbound.sniffing.is_empty() {
        block["sniffing"] = parse_json_column(&inbound.sniffing).map_err(|err| {
            MasterError::invalid(format!("inbound '{}' sniffing: {err}", inbound.tag))
        })?;
    }
    Ok(block)
}

/// Drop clients whose effective enable flag is false. Clients without an
/// `email`, and clients no traffic row knows about, pass through unchanged.
fn filter_disabled_clients(clients: &mut Vec<Value>, effective: &HashMap<String, bool>) {
    clients.retain(|client| {
        match client.get("email").and_then(Value::as_str).filter(|e| !e.is_empty()) {
            Some(email) => effective.get(email).copied().unwrap_or(true),
            None => true,
        }
    });
}

fn parse_json_column(text: &str) -> Result<Value, serde_json::Error> {
    if text.is_empty() {
        Ok(json!({}))
    } else {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
#[path = "assembler.test.rs"]
mod tests;
