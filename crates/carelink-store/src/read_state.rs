// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-receipt debouncing.
//!
//! A thread transitioning to "open and visible" should produce at most one
//! read receipt per distinct visibility session, and rapid open/close/open
//! of the same thread must not emit one receipt per render. The per-session
//! `receipt_sent` flag lives in the open-thread state; this module adds the
//! short time window that absorbs rapid reopen cycles.

use std::collections::HashMap;

use carelink_core::ThreadId;
use tokio::time::Instant;

/// Default window within which a reopened thread does not re-send a receipt.
pub const DEFAULT_DEBOUNCE: std::time::Duration = std::time::Duration::from_secs(2);

/// Tracks when each thread last had a read receipt confirmed.
#[derive(Debug, Default)]
pub struct ReceiptDebouncer {
    last_sent: HashMap<ThreadId, Instant>,
}

impl ReceiptDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a receipt should be sent now for `thread_id`.
    ///
    /// `receipt_sent` is the current visibility session's flag; inside the
    /// debounce window a fresh session is still suppressed.
    pub fn should_send(
        &self,
        thread_id: &ThreadId,
        receipt_sent: bool,
        window: std::time::Duration,
    ) -> bool {
        if receipt_sent {
            return false;
        }
        match self.last_sent.get(thread_id) {
            Some(at) => at.elapsed() >= window,
            None => true,
        }
    }

    /// Records a confirmed receipt for `thread_id`.
    pub fn record_sent(&mut self, thread_id: ThreadId) {
        self.last_sent.insert(thread_id, Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_visibility_sends() {
        let debouncer = ReceiptDebouncer::new();
        let id = ThreadId("t1".into());
        assert!(debouncer.should_send(&id, false, DEFAULT_DEBOUNCE));
    }

    #[test]
    fn sent_session_does_not_resend() {
        let debouncer = ReceiptDebouncer::new();
        let id = ThreadId("t1".into());
        assert!(!debouncer.should_send(&id, true, DEFAULT_DEBOUNCE));
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_reopen_is_suppressed_within_window() {
        let mut debouncer = ReceiptDebouncer::new();
        let id = ThreadId("t1".into());

        debouncer.record_sent(id.clone());
        // A fresh visibility session (receipt_sent = false) right after.
        assert!(!debouncer.should_send(&id, false, DEFAULT_DEBOUNCE));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(debouncer.should_send(&id, false, DEFAULT_DEBOUNCE));
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_per_thread() {
        let mut debouncer = ReceiptDebouncer::new();
        debouncer.record_sent(ThreadId("t1".into()));

        assert!(debouncer.should_send(&ThreadId("t2".into()), false, DEFAULT_DEBOUNCE));
    }
}
