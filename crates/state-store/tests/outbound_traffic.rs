//! Outbound counter accumulation and the two reset scopes.

use state_store::{test_support::TestDbFactory, traffic};

#[tokio::test]
async fn reset_single_tag_leaves_the_rest_untouched() {
    let factory = TestDbFactory::new();
    let handle = factory.master_db().await.unwrap();
    let pool = &handle.pool;

    traffic::add_outbound_traffic(pool, 1, "direct", 100, 50).await.unwrap();
    traffic::add_outbound_traffic(pool, 1, "blocked", 30, 0).await.unwrap();

    traffic::reset_outbound_traffic(pool, 1, Some("direct")).await.unwrap();

    let rows = traffic::list_outbound_traffics_for_slave(pool, 1).await.unwrap();
    let direct = rows.iter().find(|r| r.tag == "direct").unwrap();
    let blocked = rows.iter().find(|r| r.tag == "blocked").unwrap();
    assert_eq!((direct.up, direct.down, direct.total), (0, 0, 0));
    assert_eq!((blocked.up, blocked.down, blocked.total), (30, 0, 30));
}

#[tokio::test]
async fn reset_all_tags_is_scoped_to_one_slave() {
    let factory = TestDbFactory::new();
    let handle = factory.master_db().await.unwrap();
    let pool = &handle.pool;

    traffic::add_outbound_traffic(pool, 1, "direct", 100, 50).await.unwrap();
    traffic::add_outbound_traffic(pool, 1, "blocked", 30, 0).await.unwrap();
    traffic::add_outbound_traffic(pool, 2, "direct", 70, 70).await.unwrap();

    traffic::reset_outbound_traffic(pool, 1, None).await.unwrap();

    for row in traffic::list_outbound_traffics_for_slave(pool, 1).await.unwrap() {
        assert_eq!((row.up, row.down, row.total), (0, 0, 0));
    }
    // The other slave's row with the same tag keeps its counters.
    let other = traffic::list_outbound_traffics_for_slave(pool, 2).await.unwrap();
    assert_eq!((other[0].up, other[0].down, other[0].total), (70, 70, 140));
}

#[tokio::test]
async fn accumulation_survives_a_reset_boundary() {
    let factory = TestDbFactory::new();
    let handle = factory.master_db().await.unwrap();
    let pool = &handle.pool;

    traffic::add_outbound_traffic(pool, 1, "direct", 10, 10).await.unwrap();
    traffic::reset_outbound_traffic(pool, 1, Some("direct")).await.unwrap();
    traffic::add_outbound_traffic(pool, 1, "direct", 5, 5).await.unwrap();

    let rows = traffic::list_outbound_traffics_for_slave(pool, 1).await.unwrap();
    assert_eq!((rows[0].up, rows[0].down, rows[0].total), (5, 5, 10));
}
