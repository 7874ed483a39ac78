//! Slave deletion removes every dependent row in one transaction.

mod common;

use common::*;
use fb_types::Account;
use master_core::lifecycle;

async fn count(pool: &sqlx::SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

#[tokio::test]
async fn delete_slave_cascades_to_all_dependents() {
    let (ctx, _factory) = test_context().await;
    let slave_id = seed_slave(&ctx, "s2").await;
    let inbound_id = seed_inbound(&ctx, slave_id, "i20", 443, &["v@y"]).await;

    let account = lifecycle::add_account(&ctx, Account {
        username: "acct3".to_string(),
        ..Account::default()
    })
    .await
    .unwrap();
    lifecycle::add_client_to_account(&ctx, account.id, inbound_id, "v@y").await.unwrap();

    state_store::traffic::add_outbound_traffic(ctx.pool(), slave_id, "direct", 10, 5)
        .await
        .unwrap();
    state_store::certs::upsert_cert(ctx.pool(), slave_id, "a.example", "/c", "/k", 0, 0)
        .await
        .unwrap();

    lifecycle::delete_slave(&ctx, slave_id).await.unwrap();

    let pool = ctx.pool();
    assert_eq!(count(pool, "SELECT COUNT(*) FROM slaves").await, 0);
    assert_eq!(count(pool, "SELECT COUNT(*) FROM inbounds").await, 0);
    assert_eq!(count(pool, "SELECT COUNT(*) FROM client_traffics").await, 0);
    assert_eq!(count(pool, "SELECT COUNT(*) FROM account_clients").await, 0);
    assert_eq!(count(pool, "SELECT COUNT(*) FROM outbound_traffics").await, 0);
    assert_eq!(count(pool, "SELECT COUNT(*) FROM slave_certs").await, 0);
    assert_eq!(count(pool, "SELECT COUNT(*) FROM slave_settings").await, 0);

    // The account itself survives; only the association is gone.
    assert!(state_store::accounts::fetch_account(pool, account.id).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_slave_leaves_other_slaves_untouched() {
    let (ctx, _factory) = test_context().await;
    let doomed = seed_slave(&ctx, "doomed").await;
    let survivor = seed_slave(&ctx, "survivor").await;
    seed_inbound(&ctx, doomed, "d1", 443, &["d@x"]).await;
    seed_inbound(&ctx, survivor, "s1", 444, &["s@x"]).await;

    lifecycle::delete_slave(&ctx, doomed).await.unwrap();

    let remaining = state_store::inbounds::list_inbounds_for_slave(ctx.pool(), survivor)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(
        state_store::traffic::fetch_traffic_by_email(ctx.pool(), "s@x")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        state_store::traffic::fetch_traffic_by_email(ctx.pool(), "d@x")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn delete_missing_slave_is_not_found() {
    let (ctx, _factory) = test_context().await;
    let err = lifecycle::delete_slave(&ctx, 99).await.unwrap_err();
    assert!(matches!(err, master_core::MasterError::NotFound { .. }));
}
