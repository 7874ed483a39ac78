use std::collections::HashSet;

use fb_types::MasterFrame;
use tokio::sync::{broadcast, mpsc};

use super::*;

fn test_link() -> (LinkHandle, mpsc::Receiver<MasterFrame>, broadcast::Receiver<()>) {
    let (frame_tx, frame_rx) = mpsc::channel(8);
    let (close_tx, close_rx) = broadcast::channel(1);
    (LinkHandle::new(frame_tx, close_tx), frame_rx, close_rx)
}

#[tokio::test]
async fn send_reaches_the_attached_link() {
    let registry = Registry::new();
    let (link, mut frame_rx, _close) = test_link();
    registry.attach(7, link).await;

    registry.send(7, MasterFrame::RestartXray).await.unwrap();
    assert_eq!(frame_rx.recv().await, Some(MasterFrame::RestartXray));
}

#[tokio::test]
async fn send_to_unknown_slave_is_not_connected() {
    let registry = Registry::new();
    let err = registry.send(1, MasterFrame::RestartXray).await.unwrap_err();
    assert!(matches!(err, MasterError::NotConnected(1)));
}

#[tokio::test]
async fn attach_closes_the_replaced_link() {
    let registry = Registry::new();
    let (old, _old_rx, mut old_close) = test_link();
    let (new, mut new_rx, _new_close) = test_link();

    registry.attach(3, old).await;
    registry.attach(3, new).await;

    // Replaced link got the close signal; the new one carries traffic.
    old_close.recv().await.unwrap();
    registry.send(3, MasterFrame::RestartXray).await.unwrap();
    assert_eq!(new_rx.recv().await, Some(MasterFrame::RestartXray));
}

#[tokio::test]
async fn stale_conn_id_cannot_detach_the_replacement() {
    let registry = Registry::new();
    let (old, _old_rx, _c1) = test_link();
    let (new, _new_rx, _c2) = test_link();

    let old_conn = registry.attach(3, old).await;
    registry.attach(3, new).await;

    assert!(!registry.detach(3, Some(old_conn)).await);
    assert!(registry.is_connected(3).await);

    assert!(registry.detach(3, None).await);
    assert!(!registry.is_connected(3).await);
}

#[tokio::test]
async fn detach_clears_the_online_set() {
    let registry = Registry::new();
    let (link, _rx, _close) = test_link();
    registry.attach(5, link).await;
    registry
        .set_online(5, HashSet::from(["a@x".to_string(), "b@x".to_string()]))
        .await;

    registry.detach(5, None).await;
    assert!(registry.online_for(5).await.is_empty());
    assert!(registry.online_users().await.is_empty());
}

#[tokio::test]
async fn online_users_unions_across_slaves() {
    let registry = Registry::new();
    registry
        .set_online(1, HashSet::from(["a@x".to_string(), "shared@x".to_string()]))
        .await;
    registry
        .set_online(2, HashSet::from(["b@x".to_string(), "shared@x".to_string()]))
        .await;

    let online = registry.online_users().await;
    assert_eq!(online.len(), 3);
    assert!(online.contains("shared@x"));
}

#[tokio::test]
async fn send_after_writer_drop_is_a_transport_error() {
    let registry = Registry::new();
    let (link, frame_rx, _close) = test_link();
    registry.attach(9, link).await;
    drop(frame_rx);

    let err = registry.send(9, MasterFrame::RestartXray).await.unwrap_err();
    assert!(matches!(err, MasterError::Transport(_)));
}
