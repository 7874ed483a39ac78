//! Index-addressed edits to the template's outbound and routing arrays.

mod common;

use common::*;
use master_core::{
    MasterError,
    template_rules::{self, RuleKind},
};
use serde_json::json;

#[tokio::test]
async fn outbound_rules_round_trip_through_the_template() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;

    template_rules::add_rule(
        &ctx,
        slave_id,
        RuleKind::Outbound,
        json!({"tag": "blocked", "protocol": "blackhole", "id": 42}),
    )
    .await
    .unwrap();

    let rules = template_rules::list_rules(&ctx, slave_id, RuleKind::Outbound).await.unwrap();
    assert_eq!(rules.len(), 2);
    // Entries are tagged with their index, not whatever id the panel sent.
    assert_eq!(rules[1]["id"], 1);
    assert_eq!(rules[1]["tag"], "blocked");

    template_rules::update_rule(
        &ctx,
        slave_id,
        RuleKind::Outbound,
        1,
        json!({"tag": "blocked", "protocol": "blackhole", "settings": {}}),
    )
    .await
    .unwrap();
    template_rules::delete_rule(&ctx, slave_id, RuleKind::Outbound, 0).await.unwrap();

    let rules = template_rules::list_rules(&ctx, slave_id, RuleKind::Outbound).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0]["tag"], "blocked");
}

#[tokio::test]
async fn out_of_range_index_is_invalid() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;

    let err = template_rules::delete_rule(&ctx, slave_id, RuleKind::RoutingRule, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, MasterError::Invalid(_)));
}

#[tokio::test]
async fn rule_edits_push_the_new_template_to_the_slave() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    let mut frame_rx = attach_test_link(&ctx, slave_id).await;

    template_rules::add_rule(
        &ctx,
        slave_id,
        RuleKind::RoutingRule,
        json!({"type": "field", "ip": ["geoip:private"], "outboundTag": "blocked"}),
    )
    .await
    .unwrap();

    let config = expect_pushed_config(&mut frame_rx).await;
    assert_eq!(config["routing"]["rules"][0]["outboundTag"], "blocked");
}
