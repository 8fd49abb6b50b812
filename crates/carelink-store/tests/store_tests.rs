// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the thread store against a mocked REST surface
//! and, for the end-to-end cases, a live in-process push channel.

use std::sync::Arc;
use std::time::Duration;

use carelink_channel::{ClientFrame, DuplexClient, ServerFrame};
use carelink_config::model::ChannelConfig;
use carelink_core::{
    BearerToken, CarelinkError, LatchingSessionGuard, MessageId, MessageKind, PartyRole, ThreadId,
};
use carelink_rest::RestClient;
use carelink_store::{Delivery, ThreadStore};
use carelink_test_utils::{PushServer, make_message};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(5);

fn rest_client(server: &MockServer) -> Arc<RestClient> {
    Arc::new(
        RestClient::new(
            server.uri(),
            &BearerToken::new("test-token"),
            Arc::new(LatchingSessionGuard::new()),
            Duration::from_secs(5),
        )
        .unwrap(),
    )
}

fn store_for(server: &MockServer) -> Arc<ThreadStore> {
    Arc::new(ThreadStore::new(
        rest_client(server),
        PartyRole::Patient,
        "patient-1",
    ))
}

fn thread_json(id: &str, unread: u32) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "counterpart_id": format!("doc-{id}"),
        "counterpart_name": "Dr. Ferreira",
        "counterpart_role": "doctor",
        "can_send_message": true,
        "last_message_preview": "prior message",
        "last_message_at": "2026-02-01T09:30:00Z",
        "unread_count": unread,
        "created_at": "2026-01-15T08:30:00Z"
    })
}

fn message_json(id: &str, thread_id: &str, sender_role: &str, minute: u32) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "thread_id": thread_id,
        "sender_id": if sender_role == "patient" { "patient-1".to_string() } else { format!("doc-{thread_id}") },
        "sender_role": sender_role,
        "content": format!("msg {id}"),
        "type": "TEXT",
        "created_at": format!("2026-02-01T09:{minute:02}:00Z")
    })
}

/// Matches history requests that carry no `before` cursor.
fn no_before_cursor(req: &Request) -> bool {
    !req.url.query_pairs().any(|(k, _)| k == "before")
}

async fn mount_history(server: &MockServer, thread_id: &str, messages: Vec<serde_json::Value>) {
    let body = serde_json::json!({
        "thread": thread_json(thread_id, 0),
        "messages": messages,
        "has_more": false
    });
    Mock::given(method("GET"))
        .and(path(format!("/v1/threads/{thread_id}/messages")))
        .and(no_before_cursor)
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn load_threads_replace_then_append_unions_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "threads": [thread_json("t1", 2), thread_json("t2", 0)],
            "has_more": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/threads"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "threads": [thread_json("t2", 1), thread_json("t3", 4)],
            "has_more": false
        })))
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.load_threads(None, false).await.unwrap();
    store.load_threads(None, true).await.unwrap();

    let threads = store.threads().await;
    let ids: Vec<_> = threads.iter().map(|t| t.id.0.as_str()).collect();
    assert_eq!(ids, ["t1", "t2", "t3"], "known ids keep their position");
    assert_eq!(threads[1].unread_count, 1);
    assert_eq!(store.total_unread().await, 2 + 1 + 4);
}

#[tokio::test]
async fn pagination_overlap_yields_29_distinct_messages() {
    let server = MockServer::start().await;

    // Older page, keyed by the oldest loaded message id.
    let older: Vec<_> = (1..=9)
        .map(|i| message_json(&format!("m-{i}"), "t1", "doctor", i))
        .chain(std::iter::once(message_json("m-10", "t1", "doctor", 10)))
        .collect();
    Mock::given(method("GET"))
        .and(path("/v1/threads/t1/messages"))
        .and(query_param("before", "m-10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "thread": thread_json("t1", 0),
            "messages": older,
            "has_more": false
        })))
        .mount(&server)
        .await;

    // Newest page: 20 messages.
    let newest: Vec<_> = (10..30)
        .map(|i| message_json(&format!("m-{i}"), "t1", "doctor", i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/v1/threads/t1/messages"))
        .and(no_before_cursor)
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "thread": thread_json("t1", 0),
            "messages": newest,
            "has_more": true
        })))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let t1 = ThreadId("t1".into());
    store.open_thread(&t1).await.unwrap();
    assert_eq!(store.open_log().await.len(), 20);

    store.load_older(&t1).await.unwrap();

    let log = store.open_log().await;
    assert_eq!(log.len(), 29, "one overlapping id must be deduplicated");
    let times: Vec<_> = log.iter().map(|e| e.message.created_at).collect();
    let mut sorted = times.clone();
    sorted.sort();
    assert_eq!(times, sorted, "log must stay chronological");
}

#[tokio::test]
async fn optimistic_send_and_push_deliver_exactly_one_copy() {
    let server = MockServer::start().await;
    mount_history(&server, "t1", vec![]).await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/t1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(message_json("m-9", "t1", "patient", 40)),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let t1 = ThreadId("t1".into());
    store.open_thread(&t1).await.unwrap();

    let id = store
        .send_message(&t1, Some("Hello".into()), MessageKind::Text, vec![])
        .await
        .unwrap();
    assert_eq!(id, MessageId("m-9".into()));

    // The push copy of the same message arrives after the REST response.
    store
        .handle_new_message(make_message("t1", "m-9", PartyRole::Patient, "Hello", 40))
        .await;

    let log = store.open_log().await;
    let copies = log.iter().filter(|e| e.message.id.0 == "m-9").count();
    assert_eq!(copies, 1, "message must appear exactly once");
    assert_eq!(log[0].delivery, Delivery::Confirmed);
}

#[tokio::test]
async fn failed_send_is_kept_for_manual_retry() {
    let server = MockServer::start().await;
    mount_history(&server, "t1", vec![]).await;

    // First send attempt fails, the manual retry succeeds.
    Mock::given(method("POST"))
        .and(path("/v1/threads/t1/messages"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/t1/messages"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(message_json("m-42", "t1", "patient", 41)),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let t1 = ThreadId("t1".into());
    store.open_thread(&t1).await.unwrap();

    let err = store
        .send_message(&t1, Some("retry me".into()), MessageKind::Text, vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, CarelinkError::Transport { .. }));

    // The entry is retained, flagged failed, and untouched until the user
    // explicitly retries.
    let log = store.open_log().await;
    assert_eq!(log.len(), 1);
    let correlation = match &log[0].delivery {
        Delivery::Failed { correlation_id, .. } => *correlation_id,
        other => panic!("expected Failed, got {other:?}"),
    };

    let id = store.retry_message(correlation).await.unwrap();
    assert_eq!(id, MessageId("m-42".into()));
    let log = store.open_log().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].delivery, Delivery::Confirmed);
}

#[tokio::test]
async fn read_receipt_sent_once_per_visibility_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "threads": [thread_json("t1", 3)],
            "has_more": false
        })))
        .mount(&server)
        .await;
    mount_history(
        &server,
        "t1",
        vec![message_json("m-1", "t1", "doctor", 10)],
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/t1/read"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.load_threads(None, false).await.unwrap();
    let t1 = ThreadId("t1".into());
    store.open_thread(&t1).await.unwrap();

    store.mark_open_thread_visible().await.unwrap();
    // A second render of the same visibility session must not re-send.
    store.mark_open_thread_visible().await.unwrap();

    let threads = store.threads().await;
    assert_eq!(threads[0].unread_count, 0);
    let log = store.open_log().await;
    assert!(log[0].message.is_read);
    assert!(log[0].message.read_at.is_some());
}

#[tokio::test]
async fn failed_read_receipt_leaves_unread_counter_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "threads": [thread_json("t1", 3)],
            "has_more": false
        })))
        .mount(&server)
        .await;
    mount_history(&server, "t1", vec![]).await;
    Mock::given(method("POST"))
        .and(path("/v1/threads/t1/read"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.load_threads(None, false).await.unwrap();
    store.open_thread(&ThreadId("t1".into())).await.unwrap();

    let result = store.mark_open_thread_visible().await;
    assert!(result.is_err());
    // Never optimistically zeroed.
    assert_eq!(store.threads().await[0].unread_count, 3);
}

#[tokio::test]
async fn own_read_receipt_echo_does_not_change_counters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "threads": [thread_json("t1", 2)],
            "has_more": false
        })))
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.load_threads(None, false).await.unwrap();

    store
        .handle_message_read(ThreadId("t1".into()), PartyRole::Patient)
        .await;

    assert_eq!(store.threads().await[0].unread_count, 2);
}

#[tokio::test]
async fn clear_current_thread_is_idempotent() {
    let server = MockServer::start().await;
    mount_history(&server, "t1", vec![]).await;

    let store = store_for(&server);
    store.open_thread(&ThreadId("t1".into())).await.unwrap();
    assert!(store.open_thread_id().await.is_some());

    store.clear_current_thread().await.unwrap();
    store.clear_current_thread().await.unwrap();
    assert!(store.open_thread_id().await.is_none());
    assert!(store.open_log().await.is_empty());
}

#[tokio::test]
async fn end_to_end_push_channel_updates_store() {
    let rest = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "threads": [thread_json("t1", 0), thread_json("t2", 0)],
            "has_more": false
        })))
        .mount(&rest)
        .await;
    mount_history(&rest, "t1", vec![]).await;

    let push = PushServer::start().await;
    let store = store_for(&rest);

    let (handle, subs) = DuplexClient::spawn(
        ChannelConfig {
            url: push.url(),
            backoff_base_ms: 100,
            backoff_max_ms: 1_000,
        },
        None,
        store.clone(),
    );
    store.attach_subscriptions(subs);
    handle.wait_ready().await.unwrap();

    store.load_threads(None, false).await.unwrap();
    let t1 = ThreadId("t1".into());
    store.open_thread(&t1).await.unwrap();

    // Opening the thread subscribed to it over the live channel.
    assert_eq!(
        push.next_client_frame(WAIT).await,
        ClientFrame::Subscribe { thread_id: t1.clone() }
    );

    // A pushed message for the open thread lands in the log, not the
    // unread counter.
    push.push_frame(&ServerFrame::NewMessage {
        payload: make_message("t1", "m-live", PartyRole::Doctor, "hello", 50),
    });
    let deadline = tokio::time::Instant::now() + WAIT;
    while store.open_log().await.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "push never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(store.threads().await[0].unread_count, 0);

    // A pushed message for a closed thread bumps its unread counter.
    push.push_frame(&ServerFrame::NewMessage {
        payload: make_message("t2", "m-other", PartyRole::Doctor, "ping", 51),
    });
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let threads = store.threads().await;
        let t2 = threads.iter().find(|t| t.id.0 == "t2").unwrap();
        if t2.unread_count == 1 {
            assert_eq!(t2.last_message_preview.as_deref(), Some("ping"));
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "unread never bumped");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // A network drop re-issues the subscription for the open thread.
    push.drop_connections();
    push.wait_for_connections(2, WAIT).await;
    assert_eq!(
        push.next_client_frame(WAIT).await,
        ClientFrame::Subscribe { thread_id: t1 }
    );

    handle.close();
}
