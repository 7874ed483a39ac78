//! Uniqueness enforcement on inbound mutations: tags, client emails, and
//! slave secrets each reject duplicates instead of clobbering.

mod common;

use common::*;
use fb_types::Inbound;
use master_core::{MasterError, lifecycle};
use serde_json::json;

fn inbound_with_tag(slave_id: i64, tag: &str, port: i64) -> Inbound {
    Inbound {
        slave_id,
        port,
        protocol: "vless".to_string(),
        settings: json!({"clients": []}).to_string(),
        tag: tag.to_string(),
        ..Inbound::default()
    }
}

#[tokio::test]
async fn duplicate_inbound_tag_is_a_conflict() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;

    lifecycle::add_inbound(&ctx, inbound_with_tag(slave_id, "dup-tag", 443))
        .await
        .unwrap();

    let err = lifecycle::add_inbound(&ctx, inbound_with_tag(slave_id, "dup-tag", 444))
        .await
        .unwrap_err();
    assert!(matches!(err, MasterError::Conflict(_)));
}

#[tokio::test]
async fn duplicate_tag_across_slaves_is_still_a_conflict() {
    let (ctx, _factory) = test_context().await;
    let s1 = seed_slave(&ctx, "s1").await;
    let s2 = seed_slave(&ctx, "s2").await;

    lifecycle::add_inbound(&ctx, inbound_with_tag(s1, "shared", 443))
        .await
        .unwrap();

    // Tags are globally unique, not per slave.
    let err = lifecycle::add_inbound(&ctx, inbound_with_tag(s2, "shared", 443))
        .await
        .unwrap_err();
    assert!(matches!(err, MasterError::Conflict(_)));
}

#[tokio::test]
async fn update_cannot_steal_another_inbounds_tag() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;

    lifecycle::add_inbound(&ctx, inbound_with_tag(slave_id, "first", 443))
        .await
        .unwrap();
    let (second, _) = lifecycle::add_inbound(&ctx, inbound_with_tag(slave_id, "second", 444))
        .await
        .unwrap();

    let mut renamed = second.clone();
    renamed.tag = "first".to_string();
    let err = lifecycle::update_inbound(&ctx, renamed).await.unwrap_err();
    assert!(matches!(err, MasterError::Conflict(_)));

    // Updating a row while keeping its own tag is not a collision.
    lifecycle::update_inbound(&ctx, second).await.unwrap();
}

#[tokio::test]
async fn client_email_cannot_appear_on_two_inbounds() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    seed_inbound(&ctx, slave_id, "owner", 443, &["taken@x"]).await;

    let mut inbound = inbound_with_tag(slave_id, "thief", 444);
    inbound.settings =
        json!({"clients": [{"id": "uuid-taken", "email": "taken@x", "enable": true}]}).to_string();

    let err = lifecycle::add_inbound(&ctx, inbound).await.unwrap_err();
    assert!(matches!(err, MasterError::Conflict(_)));
}

#[tokio::test]
async fn duplicate_slave_secret_is_rejected_by_the_store() {
    let (ctx, _factory) = test_context().await;
    let secret = "fixed-secret-0123456789abcdef0123";
    state_store::slaves::insert_slave(ctx.pool(), "one", secret, 0)
        .await
        .unwrap();

    assert!(state_store::slaves::secret_in_use(ctx.pool(), secret).await.unwrap());
    assert!(
        state_store::slaves::insert_slave(ctx.pool(), "two", secret, 0)
            .await
            .is_err()
    );
}
