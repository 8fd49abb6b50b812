// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the duplex channel against an in-process
//! WebSocket server.

use std::sync::Arc;
use std::time::Duration;

use carelink_channel::{ClientFrame, DuplexClient, ServerFrame};
use carelink_config::model::ChannelConfig;
use carelink_core::{PartyRole, ThreadId};
use carelink_test_utils::{PushServer, RecordingPushHandler, make_message};

const WAIT: Duration = Duration::from_secs(5);

fn test_config(url: String) -> ChannelConfig {
    ChannelConfig {
        url,
        backoff_base_ms: 100,
        backoff_max_ms: 1_000,
    }
}

#[tokio::test]
async fn pushed_new_message_reaches_handler() {
    let server = PushServer::start().await;
    let handler = Arc::new(RecordingPushHandler::new());
    let (handle, _subs) = DuplexClient::spawn(test_config(server.url()), None, handler.clone());

    handle.wait_ready().await.unwrap();

    let message = make_message("t1", "m1", PartyRole::Doctor, "Your labs are in", 0);
    server.push_frame(&ServerFrame::NewMessage {
        payload: message.clone(),
    });

    handler.wait_for_messages(1, WAIT).await;
    let received = handler.messages().await;
    assert_eq!(received[0].id, message.id);
    assert_eq!(received[0].content.as_deref(), Some("Your labs are in"));

    handle.close();
}

#[tokio::test]
async fn malformed_frame_is_dropped_without_killing_the_connection() {
    let server = PushServer::start().await;
    let handler = Arc::new(RecordingPushHandler::new());
    let (handle, _subs) = DuplexClient::spawn(test_config(server.url()), None, handler.clone());

    handle.wait_ready().await.unwrap();

    server.push_raw(r#"{"type": "presence_update", "payload": {}}"#);
    server.push_frame(&ServerFrame::NewMessage {
        payload: make_message("t1", "m2", PartyRole::Doctor, "still alive", 1),
    });

    handler.wait_for_messages(1, WAIT).await;
    assert_eq!(server.connection_count(), 1, "no reconnect should occur");

    handle.close();
}

#[tokio::test]
async fn subscribing_to_second_thread_unsubscribes_first() {
    let server = PushServer::start().await;
    let handler = Arc::new(RecordingPushHandler::new());
    let (handle, subs) = DuplexClient::spawn(test_config(server.url()), None, handler);

    handle.wait_ready().await.unwrap();

    let a = ThreadId("t-a".into());
    let b = ThreadId("t-b".into());
    subs.subscribe_to_thread(a.clone()).await.unwrap();
    subs.subscribe_to_thread(b.clone()).await.unwrap();

    assert_eq!(
        server.next_client_frame(WAIT).await,
        ClientFrame::Subscribe { thread_id: a.clone() }
    );
    assert_eq!(
        server.next_client_frame(WAIT).await,
        ClientFrame::Unsubscribe { thread_id: a }
    );
    assert_eq!(
        server.next_client_frame(WAIT).await,
        ClientFrame::Subscribe { thread_id: b.clone() }
    );
    assert_eq!(subs.current().await, Some(b));

    handle.close();
}

#[tokio::test]
async fn reconnect_reissues_subscription_for_open_thread() {
    let server = PushServer::start().await;
    let handler = Arc::new(RecordingPushHandler::new());
    let (handle, subs) = DuplexClient::spawn(test_config(server.url()), None, handler.clone());

    handle.wait_ready().await.unwrap();

    let t7 = ThreadId("t7".into());
    subs.subscribe_to_thread(t7.clone()).await.unwrap();
    assert_eq!(
        server.next_client_frame(WAIT).await,
        ClientFrame::Subscribe { thread_id: t7.clone() }
    );

    // Simulate a network drop; the client must reconnect and re-subscribe
    // without any further call into the subscription manager.
    server.drop_connections();
    server.wait_for_connections(2, WAIT).await;

    assert_eq!(
        server.next_client_frame(WAIT).await,
        ClientFrame::Subscribe { thread_id: t7.clone() }
    );

    // The channel is usable again: a pushed message still arrives.
    handle.wait_ready().await.unwrap();
    server.push_frame(&ServerFrame::NewMessage {
        payload: make_message("t7", "m-after", PartyRole::Doctor, "after reconnect", 2),
    });
    handler.wait_for_messages(1, WAIT).await;

    handle.close();
}

#[tokio::test]
async fn thread_closed_before_reconnect_is_not_resurrected() {
    let server = PushServer::start().await;
    let handler = Arc::new(RecordingPushHandler::new());
    let (handle, subs) = DuplexClient::spawn(test_config(server.url()), None, handler);

    handle.wait_ready().await.unwrap();

    let t1 = ThreadId("t1".into());
    subs.subscribe_to_thread(t1.clone()).await.unwrap();
    let _ = server.next_client_frame(WAIT).await;

    // Close the thread, then drop the connection.
    subs.unsubscribe_from_thread(&t1).await.unwrap();
    let _ = server.next_client_frame(WAIT).await;

    server.drop_connections();
    server.wait_for_connections(2, WAIT).await;
    handle.wait_ready().await.unwrap();

    // Prove no subscribe was re-issued: the next frame observed must be the
    // sentinel we send now, not a resurrected subscribe for t1.
    let sentinel = ThreadId("sentinel".into());
    subs.subscribe_to_thread(sentinel.clone()).await.unwrap();
    assert_eq!(
        server.next_client_frame(WAIT).await,
        ClientFrame::Subscribe { thread_id: sentinel }
    );

    handle.close();
}

#[tokio::test]
async fn read_receipt_frames_are_dispatched() {
    let server = PushServer::start().await;
    let handler = Arc::new(RecordingPushHandler::new());
    let (handle, _subs) = DuplexClient::spawn(test_config(server.url()), None, handler.clone());

    handle.wait_ready().await.unwrap();

    server.push_frame(&ServerFrame::MessageRead {
        payload: carelink_channel::ReadReceipt {
            thread_id: ThreadId("t1".into()),
            reader_type: PartyRole::Doctor,
        },
    });

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if !handler.receipts().await.is_empty() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for read receipt"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let receipts = handler.receipts().await;
    assert_eq!(receipts[0].thread_id, ThreadId("t1".into()));
    assert_eq!(receipts[0].reader_type, PartyRole::Doctor);

    handle.close();
}
