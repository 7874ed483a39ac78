//! Account lifecycle: enable cascades, the re-enable guard, and reset.

mod common;

use common::*;
use fb_types::Account;
use master_core::{MasterError, lifecycle};

async fn seed_account_with_client(ctx: &master_core::MasterContext, slave_id: i64, email: &str) -> Account {
    let inbound_id = seed_inbound(ctx, slave_id, &format!("in-{email}"), 443, &[email]).await;
    let account = lifecycle::add_account(ctx, Account {
        username: format!("acct-{email}"),
        ..Account::default()
    })
    .await
    .unwrap();
    lifecycle::add_client_to_account(ctx, account.id, inbound_id, email).await.unwrap();
    account
}

#[tokio::test]
async fn duplicate_username_is_a_conflict() {
    let (ctx, _factory) = test_context().await;
    lifecycle::add_account(&ctx, Account {
        username: "dup".to_string(),
        ..Account::default()
    })
    .await
    .unwrap();

    let err = lifecycle::add_account(&ctx, Account {
        username: "dup".to_string(),
        ..Account::default()
    })
    .await
    .unwrap_err();
    assert!(matches!(err, MasterError::Conflict(_)));
}

#[tokio::test]
async fn enable_change_cascades_to_clients() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    let mut account = seed_account_with_client(&ctx, slave_id, "u@x").await;

    account.enable = false;
    let (_, affected) = lifecycle::update_account(&ctx, account.clone()).await.unwrap();
    assert_eq!(affected, vec![slave_id]);

    let traffic = state_store::traffic::fetch_traffic_by_email(ctx.pool(), "u@x")
        .await
        .unwrap()
        .unwrap();
    assert!(!traffic.enable);
}

#[tokio::test]
async fn reenabling_over_quota_account_is_refused() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    let mut account = seed_account_with_client(&ctx, slave_id, "u@x").await;

    // 1 GiB quota, 1 GiB already spent, account disabled by policy.
    account.total_gb = 1;
    let (mut account, _) = lifecycle::update_account(&ctx, account).await.unwrap();
    sqlx::query("UPDATE client_traffics SET up = 1073741824 WHERE email = 'u@x'")
        .execute(ctx.pool())
        .await
        .unwrap();
    account.enable = false;
    let (mut account, _) = lifecycle::update_account(&ctx, account).await.unwrap();

    account.enable = true;
    let err = lifecycle::update_account(&ctx, account).await.unwrap_err();
    assert!(matches!(err, MasterError::Conflict(_)));
}

#[tokio::test]
async fn reset_reenables_account_and_clients() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    let account = seed_account_with_client(&ctx, slave_id, "u@x").await;

    sqlx::query("UPDATE client_traffics SET up = 605, down = 399, enable = 0 WHERE email = 'u@x'")
        .execute(ctx.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE accounts SET enable = 0 WHERE id = ?")
        .bind(account.id)
        .execute(ctx.pool())
        .await
        .unwrap();

    let affected = lifecycle::reset_account(&ctx, account.id).await.unwrap();
    assert!(affected.contains(&slave_id));

    let traffic = state_store::traffic::fetch_traffic_by_email(ctx.pool(), "u@x")
        .await
        .unwrap()
        .unwrap();
    assert!(traffic.enable);
    assert_eq!((traffic.up, traffic.down), (0, 0));

    let account = state_store::accounts::fetch_account(ctx.pool(), account.id)
        .await
        .unwrap()
        .unwrap();
    assert!(account.enable);
    assert_eq!((account.up, account.down), (0, 0));

    // The next assembly for the slave includes the client again.
    let config: serde_json::Value = serde_json::from_str(
        &master_core::assembler::assemble_config(ctx.pool(), slave_id).await.unwrap(),
    )
    .unwrap();
    assert_eq!(rendered_emails(&config, "in-u@x"), vec!["u@x".to_string()]);
}

#[tokio::test]
async fn one_email_belongs_to_at_most_one_account() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    let account = seed_account_with_client(&ctx, slave_id, "u@x").await;

    let other = lifecycle::add_account(&ctx, Account {
        username: "other".to_string(),
        ..Account::default()
    })
    .await
    .unwrap();
    let inbound_id = state_store::accounts::list_account_clients(ctx.pool(), account.id)
        .await
        .unwrap()[0]
        .inbound_id;

    let err = lifecycle::add_client_to_account(&ctx, other.id, inbound_id, "u@x")
        .await
        .unwrap_err();
    assert!(matches!(err, MasterError::Conflict(_)));
}

#[tokio::test]
async fn deleting_an_account_detaches_its_clients() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    let account = seed_account_with_client(&ctx, slave_id, "u@x").await;

    let affected = lifecycle::delete_account(&ctx, account.id).await.unwrap();
    assert_eq!(affected, vec![slave_id]);

    assert!(state_store::accounts::fetch_account(ctx.pool(), account.id).await.unwrap().is_none());
    assert!(
        state_store::accounts::fetch_account_client_by_email(ctx.pool(), "u@x")
            .await
            .unwrap()
            .is_none()
    );
    // The traffic row survives, back under its own authority.
    let traffic = state_store::traffic::fetch_traffic_by_email(ctx.pool(), "u@x")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(traffic.account_id, 0);
}

#[tokio::test]
async fn removing_a_client_restores_its_own_flag_authority() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s1").await;
    let account = seed_account_with_client(&ctx, slave_id, "u@x").await;

    let affected = lifecycle::remove_client_from_account(&ctx, account.id, "u@x").await.unwrap();
    assert_eq!(affected, vec![slave_id]);

    let traffic = state_store::traffic::fetch_traffic_by_email(ctx.pool(), "u@x")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(traffic.account_id, 0);
}
