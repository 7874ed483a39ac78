//! Assembly semantics: template handling and effective-enable authority.

mod common;

use common::*;
use fb_types::ENGINE_TEMPLATE_KEY;
use master_core::{MasterError, assembler, lifecycle};

#[tokio::test]
async fn disabled_account_dominates_enabled_client() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    let inbound_id = seed_inbound(&ctx, slave_id, "i20", 443, &["u@x", "v@x"]).await;

    let account = lifecycle::add_account(&ctx, fb_types::Account {
        username: "acct7".to_string(),
        ..fb_types::Account::default()
    })
    .await
    .unwrap();
    lifecycle::add_client_to_account(&ctx, account.id, inbound_id, "u@x").await.unwrap();
    sqlx::query("UPDATE accounts SET enable = 0 WHERE id = ?")
        .bind(account.id)
        .execute(ctx.pool())
        .await
        .unwrap();

    // The client's own flag still says enabled; the account flag wins.
    let config: serde_json::Value =
        serde_json::from_str(&assembler::assemble_config(ctx.pool(), slave_id).await.unwrap()).unwrap();
    assert_eq!(rendered_emails(&config, "i20"), vec!["v@x".to_string()]);
}

#[tokio::test]
async fn template_sections_and_inbounds_survive_assembly() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    seed_inbound(&ctx, slave_id, "i21", 443, &["u@x"]).await;

    let config: serde_json::Value =
        serde_json::from_str(&assembler::assemble_config(ctx.pool(), slave_id).await.unwrap()).unwrap();

    // Template carries its own stats-API inbound; ours is appended after it.
    let tags: Vec<&str> = config["inbounds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["tag"].as_str().unwrap())
        .collect();
    assert_eq!(tags, vec!["api", "i21"]);
    assert_eq!(config["log"]["loglevel"], "warning");
    assert_eq!(config["outbounds"][0]["tag"], "direct");
}

#[tokio::test]
async fn disabled_inbounds_are_not_rendered() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    let inbound_id = seed_inbound(&ctx, slave_id, "i22", 443, &["u@x"]).await;
    sqlx::query("UPDATE inbounds SET enable = 0 WHERE id = ?")
        .bind(inbound_id)
        .execute(ctx.pool())
        .await
        .unwrap();

    let config: serde_json::Value =
        serde_json::from_str(&assembler::assemble_config(ctx.pool(), slave_id).await.unwrap()).unwrap();
    assert!(!config["inbounds"].as_array().unwrap().iter().any(|i| i["tag"] == "i22"));
}

#[tokio::test]
async fn tenant_default_template_backs_slaves_without_their_own() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    state_store::settings::delete_slave_settings(ctx.pool(), slave_id).await.unwrap();
    state_store::settings::set_setting(ctx.pool(), ENGINE_TEMPLATE_KEY, TEMPLATE).await.unwrap();

    assert!(assembler::assemble_config(ctx.pool(), slave_id).await.is_ok());
}

#[tokio::test]
async fn missing_template_everywhere_fails_assembly() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    state_store::settings::delete_slave_settings(ctx.pool(), slave_id).await.unwrap();

    let err = assembler::assemble_config(ctx.pool(), slave_id).await.unwrap_err();
    assert!(matches!(err, MasterError::Invalid(_)));
}

#[tokio::test]
async fn new_inbound_reaches_the_attached_slave_and_the_next_assembly() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s3").await;
    let mut frame_rx = attach_test_link(&ctx, slave_id).await;

    let (_, affected) = lifecycle::add_inbound(&ctx, fb_types::Inbound {
        slave_id,
        port: 8443,
        protocol: "trojan".to_string(),
        settings: serde_json::json!({"clients": []}).to_string(),
        tag: "new".to_string(),
        ..fb_types::Inbound::default()
    })
    .await
    .unwrap();
    assert_eq!(affected, vec![slave_id]);

    // The fire-and-forget push carries the new inbound...
    let config = expect_pushed_config(&mut frame_rx).await;
    assert!(config["inbounds"].as_array().unwrap().iter().any(|i| i["tag"] == "new"));

    // ...and so would the frame a reconnecting agent receives: assembly
    // always reads current truth.
    let reassembled: serde_json::Value =
        serde_json::from_str(&assembler::assemble_config(ctx.pool(), slave_id).await.unwrap()).unwrap();
    assert!(reassembled["inbounds"].as_array().unwrap().iter().any(|i| i["tag"] == "new"));
}
