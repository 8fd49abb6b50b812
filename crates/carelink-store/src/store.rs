// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The thread store: the single authoritative in-memory projection of the
//! current user's message threads.
//!
//! All mutable state lives behind one mutex and every mutation funnels
//! through the reducer while that mutex is held, so there is never a case
//! of two writers touching the thread or message collections at the same
//! instant. The subscription manager is driven from inside the same
//! critical sections; store and subscriptions act as one serialized unit.
//!
//! Network fetches happen outside the lock. Responses are reconciled under
//! the lock with explicit thread-id and generation checks, so a stale
//! response for a previously open thread is dropped rather than applied.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use carelink_channel::{PushHandler, ReadReceipt, SubscriptionManager};
use carelink_core::{
    AttachmentId, CarelinkError, MessageId, MessageKind, PartyRole, Thread, ThreadId,
    ThreadMessage,
};
use carelink_rest::{RestClient, SendMessageRequest};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entry::{Delivery, MessageEntry};
use crate::read_state::{DEFAULT_DEBOUNCE, ReceiptDebouncer};
use crate::reducer::{OpenThread, StoreEvent, StoreState, apply};

/// Page size for thread summary listings.
const THREAD_PAGE_SIZE: u32 = 20;

/// Page size for history fetches.
const HISTORY_PAGE_SIZE: u32 = 20;

/// Everything guarded by the store's single writer lock.
#[derive(Debug, Default)]
struct Inner {
    state: StoreState,
    debouncer: ReceiptDebouncer,
}

/// The in-memory cache of thread summaries and the open thread's log.
///
/// One instance exists per authenticated session. Clone-free sharing goes
/// through `Arc<ThreadStore>`; the store is also the [`PushHandler`] wired
/// into the duplex channel.
pub struct ThreadStore {
    rest: Arc<RestClient>,
    own_role: PartyRole,
    own_user_id: String,
    inner: Mutex<Inner>,
    subscriptions: OnceLock<SubscriptionManager>,
    debounce_window: Duration,
}

impl ThreadStore {
    pub fn new(rest: Arc<RestClient>, own_role: PartyRole, own_user_id: impl Into<String>) -> Self {
        Self {
            rest,
            own_role,
            own_user_id: own_user_id.into(),
            inner: Mutex::new(Inner::default()),
            subscriptions: OnceLock::new(),
            debounce_window: DEFAULT_DEBOUNCE,
        }
    }

    /// Overrides the read-receipt debounce window (tests).
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Wires the duplex channel's subscription manager in. Without one the
    /// store still works; thread opens simply do not subscribe.
    pub fn attach_subscriptions(&self, manager: SubscriptionManager) {
        if self.subscriptions.set(manager).is_err() {
            warn!("subscription manager already attached");
        }
    }

    /// Loads a page of thread summaries.
    ///
    /// `append = false` replaces the cached list (merging unread counters
    /// monotonically); `append = true` fetches the next page and unions it
    /// by id, preserving existing order for known ids.
    pub async fn load_threads(
        &self,
        search: Option<&str>,
        append: bool,
    ) -> Result<(), CarelinkError> {
        let page = if append {
            self.inner.lock().await.state.thread_page + 1
        } else {
            1
        };

        let fetched = self.rest.list_threads(search, page, THREAD_PAGE_SIZE).await?;

        let mut inner = self.inner.lock().await;
        apply(
            &mut inner.state,
            StoreEvent::ThreadsLoaded {
                threads: fetched.threads,
                append,
                has_more: fetched.has_more,
            },
            self.own_role,
        );
        Ok(())
    }

    /// Opens a thread: resets the log, subscribes to its push events, and
    /// loads the newest history page.
    pub async fn open_thread(&self, id: &ThreadId) -> Result<(), CarelinkError> {
        let generation = {
            let mut inner = self.inner.lock().await;
            inner.state.generation += 1;
            let generation = inner.state.generation;
            inner.state.open = Some(OpenThread {
                thread_id: id.clone(),
                entries: Vec::new(),
                has_more: false,
                generation,
                receipt_sent: false,
            });

            if let Some(subs) = self.subscriptions.get() {
                subs.subscribe_to_thread(id.clone()).await?;
            } else {
                debug!(thread_id = %id, "no subscription manager attached");
            }
            generation
        };

        let history = self.rest.get_thread(id, None, HISTORY_PAGE_SIZE).await?;

        let mut inner = self.inner.lock().await;
        apply(
            &mut inner.state,
            StoreEvent::ThreadUpserted {
                thread: history.thread,
            },
            self.own_role,
        );
        apply(
            &mut inner.state,
            StoreEvent::HistoryLoaded {
                thread_id: id.clone(),
                generation,
                messages: history.messages,
                has_more: history.has_more,
                prepend: false,
            },
            self.own_role,
        );
        Ok(())
    }

    /// Loads an older page of the open thread's history, prepending without
    /// disturbing already-loaded messages and de-duplicating by id.
    ///
    /// A no-op when `id` is not the open thread; a stale response arriving
    /// after the open thread switched is dropped by the reducer's id and
    /// generation check.
    pub async fn load_older(&self, id: &ThreadId) -> Result<(), CarelinkError> {
        let (generation, before) = {
            let inner = self.inner.lock().await;
            let Some(open) = inner.state.open.as_ref() else {
                return Ok(());
            };
            if open.thread_id != *id {
                debug!(thread_id = %id, "load_older for non-open thread ignored");
                return Ok(());
            }
            let before = open
                .entries
                .iter()
                .find(|e| e.delivery == Delivery::Confirmed)
                .map(|e| e.message.id.clone());
            (open.generation, before)
        };

        let history = self
            .rest
            .get_thread(id, before.as_ref(), HISTORY_PAGE_SIZE)
            .await?;

        let mut inner = self.inner.lock().await;
        apply(
            &mut inner.state,
            StoreEvent::HistoryLoaded {
                thread_id: id.clone(),
                generation,
                messages: history.messages,
                has_more: history.has_more,
                prepend: true,
            },
            self.own_role,
        );
        Ok(())
    }

    /// Sends a message with optimistic local echo.
    ///
    /// The optimistic entry is tagged with a correlation id and replaced by
    /// the server-confirmed copy on success (matched by that id, never by
    /// content). On failure the entry is flagged failed and kept for
    /// [`retry_message`](Self::retry_message); it is never retried
    /// silently.
    pub async fn send_message(
        &self,
        thread_id: &ThreadId,
        content: Option<String>,
        kind: MessageKind,
        attachment_ids: Vec<AttachmentId>,
    ) -> Result<MessageId, CarelinkError> {
        let correlation_id = Uuid::new_v4();

        {
            let mut inner = self.inner.lock().await;
            if let Some(thread) = inner.state.threads.iter().find(|t| t.id == *thread_id)
                && !thread.can_send_message
            {
                return Err(CarelinkError::Internal(
                    "thread is read-only until the care relationship is approved".to_string(),
                ));
            }

            let optimistic = ThreadMessage {
                id: MessageId(format!("local-{correlation_id}")),
                thread_id: thread_id.clone(),
                sender_id: self.own_user_id.clone(),
                sender_role: self.own_role,
                content: content.clone(),
                kind,
                attachments: Vec::new(),
                is_read: false,
                read_at: None,
                created_at: Utc::now(),
            };
            apply(
                &mut inner.state,
                StoreEvent::SendQueued {
                    message: optimistic,
                    correlation_id,
                },
                self.own_role,
            );
        }

        let request = SendMessageRequest {
            content,
            kind,
            attachment_ids,
        };
        self.dispatch_send(thread_id, correlation_id, &request).await
    }

    /// Retries a failed optimistic send. Explicit user action only.
    pub async fn retry_message(&self, correlation_id: Uuid) -> Result<MessageId, CarelinkError> {
        let (thread_id, request) = {
            let mut inner = self.inner.lock().await;
            let Some(open) = inner.state.open.as_ref() else {
                return Err(CarelinkError::Internal("no open thread".to_string()));
            };
            let Some(entry) = open.entries.iter().find(
                |e| matches!(e.delivery, Delivery::Failed { correlation_id: c, .. } if c == correlation_id),
            ) else {
                return Err(CarelinkError::Internal(format!(
                    "no failed message with correlation id {correlation_id}"
                )));
            };

            let request = SendMessageRequest {
                content: entry.message.content.clone(),
                kind: entry.message.kind,
                attachment_ids: entry
                    .message
                    .attachments
                    .iter()
                    .map(|a| a.id.clone())
                    .collect(),
            };
            let thread_id = entry.message.thread_id.clone();

            apply(
                &mut inner.state,
                StoreEvent::SendRetried { correlation_id },
                self.own_role,
            );
            (thread_id, request)
        };

        self.dispatch_send(&thread_id, correlation_id, &request).await
    }

    async fn dispatch_send(
        &self,
        thread_id: &ThreadId,
        correlation_id: Uuid,
        request: &SendMessageRequest,
    ) -> Result<MessageId, CarelinkError> {
        match self.rest.send_message(thread_id, request).await {
            Ok(message) => {
                let id = message.id.clone();
                let mut inner = self.inner.lock().await;
                apply(
                    &mut inner.state,
                    StoreEvent::SendConfirmed {
                        correlation_id,
                        message,
                    },
                    self.own_role,
                );
                Ok(id)
            }
            Err(e) => {
                let mut inner = self.inner.lock().await;
                apply(
                    &mut inner.state,
                    StoreEvent::SendFailed {
                        correlation_id,
                        error: e.to_string(),
                    },
                    self.own_role,
                );
                Err(e)
            }
        }
    }

    /// Reconciles a pushed message. Appends to the open log (deduplicated
    /// by id, covering the REST-vs-push race) or bumps the thread's unread
    /// counter and preview.
    pub async fn handle_new_message(&self, message: ThreadMessage) {
        let mut inner = self.inner.lock().await;
        apply(&mut inner.state, StoreEvent::PushMessage { message }, self.own_role);
    }

    /// Reconciles a pushed read receipt. An echo of the current user's own
    /// role is a no-op; a peer receipt stamps the sender's copies as read
    /// and never touches the current user's unread counter.
    pub async fn handle_message_read(&self, thread_id: ThreadId, reader_type: PartyRole) {
        let mut inner = self.inner.lock().await;
        apply(
            &mut inner.state,
            StoreEvent::PushRead {
                thread_id,
                reader_type,
                at: Utc::now(),
            },
            self.own_role,
        );
    }

    /// Releases the open thread's log and its subscription. Idempotent.
    pub async fn clear_current_thread(&self) -> Result<(), CarelinkError> {
        let mut inner = self.inner.lock().await;
        let Some(open) = inner.state.open.take() else {
            return Ok(());
        };
        if let Some(subs) = self.subscriptions.get() {
            subs.unsubscribe_from_thread(&open.thread_id).await?;
        }
        Ok(())
    }

    /// Fires the read-state synchronizer for the open thread.
    ///
    /// Sends at most one receipt per visibility session, debounced across
    /// rapid open/close/open cycles. On success the unread counter zeroes
    /// and loaded messages are stamped; on failure the counter is left
    /// unchanged and the next visibility transition may retry.
    pub async fn mark_open_thread_visible(&self) -> Result<(), CarelinkError> {
        let thread_id = {
            let inner = self.inner.lock().await;
            let Some(open) = inner.state.open.as_ref() else {
                return Ok(());
            };
            if !inner.debouncer.should_send(
                &open.thread_id,
                open.receipt_sent,
                self.debounce_window,
            ) {
                debug!(thread_id = %open.thread_id, "read receipt debounced");
                return Ok(());
            }
            open.thread_id.clone()
        };

        // A failure here leaves the unread counter untouched.
        self.rest.mark_thread_read(&thread_id).await?;

        let mut inner = self.inner.lock().await;
        apply(
            &mut inner.state,
            StoreEvent::ReadConfirmed {
                thread_id: thread_id.clone(),
                at: Utc::now(),
            },
            self.own_role,
        );
        inner.debouncer.record_sent(thread_id);
        Ok(())
    }

    /// Starts a thread with a counterpart (doctor-initiated) and caches its
    /// summary.
    pub async fn start_thread(&self, counterpart_id: &str) -> Result<ThreadId, CarelinkError> {
        let thread = self.rest.start_thread(counterpart_id).await?;
        let id = thread.id.clone();
        let mut inner = self.inner.lock().await;
        apply(&mut inner.state, StoreEvent::ThreadUpserted { thread }, self.own_role);
        Ok(id)
    }

    // --- snapshots for the UI layer ---

    pub async fn threads(&self) -> Vec<Thread> {
        self.inner.lock().await.state.threads.clone()
    }

    pub async fn open_thread_id(&self) -> Option<ThreadId> {
        self.inner
            .lock()
            .await
            .state
            .open
            .as_ref()
            .map(|o| o.thread_id.clone())
    }

    pub async fn open_log(&self) -> Vec<MessageEntry> {
        self.inner
            .lock()
            .await
            .state
            .open
            .as_ref()
            .map(|o| o.entries.clone())
            .unwrap_or_default()
    }

    pub async fn total_unread(&self) -> u32 {
        self.inner.lock().await.state.total_unread()
    }
}

#[async_trait]
impl PushHandler for ThreadStore {
    async fn on_new_message(&self, message: ThreadMessage) {
        self.handle_new_message(message).await;
    }

    async fn on_message_read(&self, receipt: ReadReceipt) {
        self.handle_message_read(receipt.thread_id, receipt.reader_type)
            .await;
    }
}
