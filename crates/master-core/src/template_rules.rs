//! Admin edits to a slave's engine template: the `outbounds` array and
//! `routing.rules` are index-addressed lists the panel edits in place; the
//! rest of the template is opaque and passes through untouched.

use serde_json::Value;
use tracing::info;

use crate::{
    context::MasterContext,
    error::{MasterError, MasterResult},
    fanout,
};
use fb_types::TemplateDoc;

/// Which of the two template arrays an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Outbound,
    RoutingRule,
}

impl RuleKind {
    fn name(self) -> &'static str {
        match self {
            RuleKind::Outbound => "outbound",
            RuleKind::RoutingRule => "routing rule",
        }
    }
}

async fn load_template(ctx: &MasterContext, slave_id: i64) -> MasterResult<TemplateDoc> {
    let template = state_store::settings::engine_template_for_slave(ctx.pool(), slave_id)
        .await?
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            MasterError::invalid(format!("no engine template configured for slave {slave_id}"))
        })?;
    TemplateDoc::parse(&template)
        .map_err(|err| MasterError::invalid(format!("engine template for slave {slave_id}: {err}")))
}

async fn save_template(ctx: &MasterContext, slave_id: i64, doc: &TemplateDoc) -> MasterResult<()> {
    state_store::settings::set_engine_template_for_slave(ctx.pool(), slave_id, &doc.serialize_pretty())
        .await?;
    fanout::after_commit(ctx, slave_id);
    Ok(())
}

fn rules_of<'a>(doc: &'a mut TemplateDoc, kind: RuleKind) -> &'a mut Vec<Value> {
    match kind {
        RuleKind::Outbound => doc.outbounds(),
        RuleKind::RoutingRule => doc.routing_rules(),
    }
}

/// List the array, tagging each entry with its index as the panel's pseudo
/// id.
pub async fn list_rules(ctx: &MasterContext, slave_id: i64, kind: RuleKind) -> MasterResult<Vec<Value>> {
    let mut doc = load_template(ctx, slave_id).await?;
    let mut rules = rules_of(&mut doc, kind).clone();
    for (index, rule) in rules.iter_mut().enumerate() {
        if let Some(obj) = rule.as_object_mut() {
            obj.insert("id".to_string(), Value::from(index as i64));
        }
    }
    Ok(rules)
}

pub async fn add_rule(ctx: &MasterContext, slave_id: i64, kind: RuleKind, mut rule: Value) -> MasterResult<()> {
    strip_pseudo_id(&mut rule);
    let mut doc = load_template(ctx, slave_id).await?;
    rules_of(&mut doc, kind).push(rule);
    save_template(ctx, slave_id, &doc).await?;
    info!(slave_id, kind = kind.name(), "template rule added");
    Ok(())
}

pub async fn update_rule(
    ctx: &MasterContext,
    slave_id: i64,
    kind: RuleKind,
    index: usize,
    mut rule: Value,
) -> MasterResult<()> {
    strip_pseudo_id(&mut rule);
    let mut doc = load_template(ctx, slave_id).await?;
    let rules = rules_of(&mut doc, kind);
    let slot = rules
        .get_mut(index)
        .ok_or_else(|| index_error(kind, index))?;
    *slot = rule;
    save_template(ctx, slave_id, &doc).await?;
    info!(slave_id, kind = kind.name(), index, "template rule updated");
    Ok(())
}

pub async fn delete_rule(ctx: &MasterContext, slave_id: i64, kind: RuleKind, index: usize) -> MasterResult<()> {
    let mut doc = load_template(ctx, slave_id).await?;
    let rules = rules_of(&mut doc, kind);
    if index >= rules.len() {
        return Err(index_error(kind, index));
    }
    rules.remove(index);
    save_template(ctx, slave_id, &doc).await?;
    info!(slave_id, kind = kind.name(), index, "template rule deleted");
    Ok(())
}

fn index_error(kind: RuleKind, index: usize) -> MasterError {
    MasterError::invalid(format!("{} index {index} out of range", kind.name()))
}

/// The panel round-trips the pseudo id it was shown; it is not part of the
/// stored rule.
fn strip_pseudo_id(rule: &mut Value) {
    if let Some(obj) = rule.as_object_mut() {
        obj.remove("id");
    }
}
