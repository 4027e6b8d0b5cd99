//! End-to-end tests for a full notification context
//!
//! Each context wires REST, push channel, store and alerts for one signed-in
//! user, the way the CLI does.

mod common;

use common::{
    eventually, new_notification, TestServer, EVENT_TIMEOUT_MS, USER_1_ID, USER_1_TOKEN,
    USER_2_ID, USER_2_TOKEN,
};
use servicedesk_notifications::alerts::AlertLevel;
use servicedesk_notifications::notifications::NotificationCategory;
use servicedesk_notifications::{
    ConnectionState, EventKind, NotificationContext, NotificationQuery, RealtimeError, Session,
};
use std::time::Duration;
use tokio::time::timeout;

fn context_for(server: &TestServer, token: Option<&str>, user_id: u64) -> NotificationContext {
    let config = server.app_config(token, user_id);
    let session = Session {
        credential: config.credential.clone(),
        user_id,
    };
    NotificationContext::create(&config, session).expect("Failed to create context")
}

#[tokio::test]
async fn test_push_after_fetch_bumps_unread_and_toasts() {
    let server = TestServer::spawn().await;
    server.seed(USER_1_ID, 2);
    let context = context_for(&server, Some(USER_1_TOKEN), USER_1_ID);
    let mut toasts = context.alerts().subscribe();

    context.start().await.unwrap();
    context
        .service()
        .fetch(&NotificationQuery::default())
        .await
        .unwrap();
    assert_eq!(context.store().unread_count(), 2);
    server.wait_for_channel(USER_1_ID, 1).await;

    server
        .state
        .push_notification(
            USER_1_ID,
            new_notification("Incident escalated", NotificationCategory::IncidentUpdated),
        )
        .await;

    let toast = timeout(Duration::from_millis(EVENT_TIMEOUT_MS), toasts.recv())
        .await
        .expect("Timed out waiting for toast")
        .unwrap();
    assert_eq!(toast.message, "Incident escalated");
    assert_eq!(toast.level, AlertLevel::Info);
    assert_eq!(context.store().unread_count(), 3);
    assert_eq!(context.store().notifications()[0].title, "Incident escalated");

    context.dispose().await;
}

#[tokio::test]
async fn test_start_without_token_fails_cleanly() {
    let server = TestServer::spawn().await;
    let context = context_for(&server, None, USER_1_ID);

    let result = context.start().await;

    assert!(matches!(result, Err(RealtimeError::MissingCredential)));
    assert_eq!(server.state.controls.handshake_count(), 0);
    assert_eq!(context.connection().state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_start_twice_keeps_one_toast_handler() {
    let server = TestServer::spawn().await;
    let context = context_for(&server, Some(USER_1_TOKEN), USER_1_ID);

    context.start().await.unwrap();
    context.start().await.unwrap();

    assert_eq!(context.registry().subscriber_count(EventKind::Notification), 1);
    assert_eq!(server.state.controls.handshake_count(), 1);

    context.dispose().await;
}

#[tokio::test]
async fn test_dispose_resets_and_start_again_works() {
    let server = TestServer::spawn().await;
    server.seed(USER_1_ID, 3);
    let context = context_for(&server, Some(USER_1_TOKEN), USER_1_ID);

    context.start().await.unwrap();
    context
        .service()
        .fetch(&NotificationQuery::default())
        .await
        .unwrap();
    server.wait_for_channel(USER_1_ID, 1).await;

    context.dispose().await;

    assert!(context.store().notifications().is_empty());
    assert_eq!(context.store().unread_count(), 0);
    assert_eq!(context.registry().subscriber_count(EventKind::Notification), 0);
    assert_eq!(context.connection().state(), ConnectionState::Disconnected);
    let hub = server.state.hub.clone();
    common::wait_until(|| {
        let hub = hub.clone();
        async move { hub.connection_count().await == 0 }
    })
    .await;

    context.start().await.unwrap();
    server.wait_for_channel(USER_1_ID, 1).await;
    server
        .state
        .push_notification(USER_1_ID, new_notification("Back again", NotificationCategory::Info))
        .await;

    eventually(|| context.store().unread_count() == 1).await;
    assert_eq!(context.registry().subscriber_count(EventKind::Notification), 1);

    context.dispose().await;
}

#[tokio::test]
async fn test_contexts_for_different_users_are_isolated() {
    let server = TestServer::spawn().await;
    let alice = context_for(&server, Some(USER_1_TOKEN), USER_1_ID);
    let bob = context_for(&server, Some(USER_2_TOKEN), USER_2_ID);

    alice.start().await.unwrap();
    bob.start().await.unwrap();
    server.wait_for_channel(USER_1_ID, 1).await;
    server.wait_for_channel(USER_2_ID, 1).await;

    server
        .state
        .push_notification(USER_2_ID, new_notification("For Bob", NotificationCategory::Info))
        .await;

    eventually(|| bob.store().unread_count() == 1).await;
    // Give a stray delivery time to show up
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(alice.store().unread_count(), 0);

    alice.dispose().await;
    bob.dispose().await;
}

#[tokio::test]
async fn test_read_on_one_device_is_sent_to_server() {
    let server = TestServer::spawn().await;
    let context = context_for(&server, Some(USER_1_TOKEN), USER_1_ID);
    context.start().await.unwrap();
    server.wait_for_channel(USER_1_ID, 1).await;

    let pushed = server
        .state
        .push_notification(USER_1_ID, new_notification("Check me", NotificationCategory::Info))
        .await;
    eventually(|| context.store().unread_count() == 1).await;

    context.service().mark_as_read(&pushed.id).await.unwrap();

    assert_eq!(context.store().unread_count(), 0);
    assert_eq!(
        server
            .state
            .book
            .list(USER_1_ID, &Default::default())
            .unread_count,
        0
    );

    context.dispose().await;
}

#[tokio::test]
async fn test_start_while_server_refuses_keeps_retrying_in_background() {
    let server = TestServer::spawn().await;
    server.state.controls.set_accepting(false);
    let context = context_for(&server, Some(USER_1_TOKEN), USER_1_ID);
    let mut toasts = context.alerts().subscribe();

    assert!(context.start().await.is_err());
    let toast = timeout(Duration::from_millis(EVENT_TIMEOUT_MS), toasts.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(toast.level, AlertLevel::Warning);

    server.state.controls.set_accepting(true);
    eventually(|| context.connection().is_connected()).await;
    server.wait_for_channel(USER_1_ID, 1).await;

    context.dispose().await;
}
