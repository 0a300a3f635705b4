//! WELCOME / AUTH / SUBSCRIBE exchanges

use webstone_remote::{ClientMessage, SessionError, SessionState, PUBLIC_BLOCK_LIST};

use crate::common::{Harness, MockServer, PRIVATE_LIST, PRIVATE_LIST_PASSPHRASE, SERVER_PASSPHRASE};

#[tokio::test]
async fn test_welcome_triggers_auth_with_cached_passphrase() {
    let mut server = MockServer::start().await;
    let mut harness = Harness::for_server(&server);

    harness.authenticate().await;

    assert_eq!(
        server.next_received().await,
        ClientMessage::AuthReq {
            passphrase: SERVER_PASSPHRASE.to_string()
        }
    );
    assert_eq!(harness.session.settings().passphrase, None);
    assert!(harness.errors.is_empty());
}

#[tokio::test]
async fn test_block_lists_arrive_after_auth() {
    let server = MockServer::start().await;
    let mut harness = Harness::for_server(&server);

    harness.authenticate().await;
    harness
        .pump_until(|session| session.store().block_lists.is_some())
        .await;

    let lists = harness.session.store().block_lists.clone().unwrap();
    assert_eq!(lists.get(PUBLIC_BLOCK_LIST).map(String::as_str), Some("Public"));
    assert_eq!(lists.get(PRIVATE_LIST).map(String::as_str), Some("Base"));
    // No subscription yet, so no block data either
    assert_eq!(harness.session.store().blocks, None);
}

#[tokio::test]
async fn test_wrong_passphrase_is_reported() {
    let server = MockServer::start().await;
    let mut harness = Harness::for_server(&server);
    harness.session.settings_mut().passphrase = Some("wrong".to_string());

    harness.session.connect();
    harness.pump_until(|session| session.error().is_some()).await;

    assert_eq!(harness.session.state(), SessionState::AwaitingAuth);
    assert_eq!(
        harness.errors,
        vec![SessionError::AuthRejected {
            message: "Wrong passphrase".to_string()
        }]
    );
    assert_eq!(
        harness.session.error(),
        Some("Authentication failed: Wrong passphrase")
    );
}

#[tokio::test]
async fn test_subscribe_public_list_receives_snapshots() {
    let mut server = MockServer::start().await;
    let mut harness = Harness::for_server(&server);

    harness.subscribe_public().await;

    server.next_received().await;
    assert_eq!(
        server.next_received().await,
        ClientMessage::Subscribe {
            registry_id: PUBLIC_BLOCK_LIST.to_string(),
            passphrase: String::new()
        }
    );

    let store = harness.session.store();
    assert_eq!(store.blocks.as_ref().map(Vec::len), Some(3));
    assert_eq!(store.group("hall").map(|g| g.block_ids.len()), Some(2));
    assert_eq!(harness.session.subscribed_list(), Some(PUBLIC_BLOCK_LIST));
}

#[tokio::test]
async fn test_private_list_with_passphrase() {
    let server = MockServer::start().await;
    let mut harness = Harness::for_server(&server);
    harness.authenticate().await;

    harness
        .session
        .subscribe_to(PRIVATE_LIST, Some(PRIVATE_LIST_PASSPHRASE.to_string()))
        .unwrap();
    harness.pump_until_state(SessionState::Subscribed).await;

    assert_eq!(harness.session.subscribed_list(), Some(PRIVATE_LIST));
    assert_eq!(harness.session.settings().block_list_passphrase, None);
}

#[tokio::test]
async fn test_wrong_list_passphrase_keeps_authenticated() {
    let server = MockServer::start().await;
    let mut harness = Harness::for_server(&server);
    harness.authenticate().await;

    harness
        .session
        .subscribe_to(PRIVATE_LIST, Some("guess".to_string()))
        .unwrap();
    harness.pump_until(|session| session.error().is_some()).await;

    assert_eq!(
        harness.session.state(),
        SessionState::AuthenticatedUnsubscribed
    );
    assert!(matches!(
        harness.errors.as_slice(),
        [SessionError::SubscriptionRejected { .. }]
    ));

    // A second attempt with the right passphrase still works
    harness
        .session
        .subscribe_to(PRIVATE_LIST, Some(PRIVATE_LIST_PASSPHRASE.to_string()))
        .unwrap();
    harness.pump_until_state(SessionState::Subscribed).await;
}

#[tokio::test]
async fn test_unsubscribe_clears_blocks_but_keeps_lists() {
    let server = MockServer::start().await;
    let mut harness = Harness::for_server(&server);
    harness.subscribe_public().await;

    harness.session.unsubscribe().unwrap();
    harness
        .pump_until_state(SessionState::AuthenticatedUnsubscribed)
        .await;

    let store = harness.session.store();
    assert_eq!(store.blocks, None);
    assert_eq!(store.groups, None);
    assert!(store.block_lists.is_some());
    assert_eq!(harness.session.subscribed_list(), None);
}
