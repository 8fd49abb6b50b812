// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording push handler for deterministic testing.
//!
//! `RecordingPushHandler` implements `PushHandler` by capturing every
//! dispatched frame for later assertion, with a `Notify` so tests can wait
//! for delivery instead of sleeping.

use std::sync::Arc;

use async_trait::async_trait;
use carelink_channel::{PushHandler, ReadReceipt};
use carelink_core::ThreadMessage;
use tokio::sync::{Mutex, Notify};

/// A push handler that records everything it receives.
#[derive(Default)]
pub struct RecordingPushHandler {
    messages: Mutex<Vec<ThreadMessage>>,
    receipts: Mutex<Vec<ReadReceipt>>,
    notify: Arc<Notify>,
}

impl RecordingPushHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `new_message` payloads received so far.
    pub async fn messages(&self) -> Vec<ThreadMessage> {
        self.messages.lock().await.clone()
    }

    /// All `message_read` payloads received so far.
    pub async fn receipts(&self) -> Vec<ReadReceipt> {
        self.receipts.lock().await.clone()
    }

    /// Waits until at least `count` messages have been recorded.
    ///
    /// Panics after `timeout` to keep failing tests from hanging.
    pub async fn wait_for_messages(&self, count: usize, timeout: std::time::Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.messages.lock().await.len() >= count {
                return;
            }
            let notified = self.notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                panic!("timed out waiting for {count} pushed messages");
            }
        }
    }
}

#[async_trait]
impl PushHandler for RecordingPushHandler {
    async fn on_new_message(&self, message: ThreadMessage) {
        self.messages.lock().await.push(message);
        self.notify.notify_waiters();
    }

    async fn on_message_read(&self, receipt: ReadReceipt) {
        self.receipts.lock().await.push(receipt);
        self.notify.notify_waiters();
    }
}
