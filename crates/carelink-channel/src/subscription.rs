// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-thread subscription tracking.
//!
//! At most one subscription may exist per client connection at a time: the
//! thread that is currently open in the UI. The manager defensively
//! unsubscribes any stale subscription before adding a new one, and the
//! connection task reads the same shared slot to rehydrate the subscription
//! after a reconnect.

use std::sync::Arc;

use carelink_core::{CarelinkError, ThreadId};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::frame::ClientFrame;

/// The currently subscribed thread, shared between the manager and the
/// connection task's rehydration step. Reads and writes go through one
/// mutex so subscription state cannot diverge from the frames sent.
#[derive(Clone, Default)]
pub struct SubscriptionState {
    current: Arc<Mutex<Option<ThreadId>>>,
}

impl SubscriptionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The thread to re-subscribe to after a reconnect, if any.
    pub async fn current(&self) -> Option<ThreadId> {
        self.current.lock().await.clone()
    }
}

/// Issues subscribe/unsubscribe frames while maintaining the at-most-one
/// invariant.
#[derive(Clone)]
pub struct SubscriptionManager {
    state: SubscriptionState,
    outbound: mpsc::Sender<ClientFrame>,
}

impl SubscriptionManager {
    pub(crate) fn new(state: SubscriptionState, outbound: mpsc::Sender<ClientFrame>) -> Self {
        Self { state, outbound }
    }

    /// Subscribes to `id`, first unsubscribing from any different thread
    /// that is still subscribed. Subscribing to the already-current thread
    /// is a no-op.
    pub async fn subscribe_to_thread(&self, id: ThreadId) -> Result<(), CarelinkError> {
        let mut current = self.state.current.lock().await;

        if current.as_ref() == Some(&id) {
            debug!(thread_id = %id, "already subscribed");
            return Ok(());
        }

        if let Some(stale) = current.take() {
            debug!(stale = %stale, new = %id, "unsubscribing stale thread before subscribe");
            self.send(ClientFrame::Unsubscribe { thread_id: stale }).await?;
        }

        self.send(ClientFrame::Subscribe {
            thread_id: id.clone(),
        })
        .await?;
        *current = Some(id);
        Ok(())
    }

    /// Unsubscribes from `id`. A no-op when `id` is not the current
    /// subscription.
    pub async fn unsubscribe_from_thread(&self, id: &ThreadId) -> Result<(), CarelinkError> {
        let mut current = self.state.current.lock().await;

        if current.as_ref() != Some(id) {
            debug!(thread_id = %id, "unsubscribe for non-current thread ignored");
            return Ok(());
        }

        *current = None;
        self.send(ClientFrame::Unsubscribe {
            thread_id: id.clone(),
        })
        .await
    }

    /// The currently subscribed thread, if any.
    pub async fn current(&self) -> Option<ThreadId> {
        self.state.current().await
    }

    async fn send(&self, frame: ClientFrame) -> Result<(), CarelinkError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| CarelinkError::channel_msg("duplex channel task has shut down"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_capacity(cap: usize) -> (SubscriptionManager, mpsc::Receiver<ClientFrame>) {
        let (tx, rx) = mpsc::channel(cap);
        (SubscriptionManager::new(SubscriptionState::new(), tx), rx)
    }

    #[tokio::test]
    async fn subscribe_then_switch_keeps_exactly_one_active() {
        let (manager, mut rx) = manager_with_capacity(8);
        let a = ThreadId("t-a".into());
        let b = ThreadId("t-b".into());

        manager.subscribe_to_thread(a.clone()).await.unwrap();
        manager.subscribe_to_thread(b.clone()).await.unwrap();

        assert_eq!(manager.current().await, Some(b.clone()));

        // Frames sent: subscribe(a), unsubscribe(a), subscribe(b).
        assert_eq!(
            rx.recv().await.unwrap(),
            ClientFrame::Subscribe { thread_id: a.clone() }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ClientFrame::Unsubscribe { thread_id: a }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ClientFrame::Subscribe { thread_id: b }
        );
    }

    #[tokio::test]
    async fn resubscribe_to_current_thread_is_noop() {
        let (manager, mut rx) = manager_with_capacity(8);
        let a = ThreadId("t-a".into());

        manager.subscribe_to_thread(a.clone()).await.unwrap();
        manager.subscribe_to_thread(a.clone()).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            ClientFrame::Subscribe { thread_id: a }
        );
        assert!(rx.try_recv().is_err(), "no second frame should be sent");
    }

    #[tokio::test]
    async fn unsubscribe_non_current_is_noop() {
        let (manager, mut rx) = manager_with_capacity(8);
        let a = ThreadId("t-a".into());
        let other = ThreadId("t-other".into());

        manager.subscribe_to_thread(a.clone()).await.unwrap();
        manager.unsubscribe_from_thread(&other).await.unwrap();

        assert_eq!(manager.current().await, Some(a.clone()));
        assert_eq!(
            rx.recv().await.unwrap(),
            ClientFrame::Subscribe { thread_id: a }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_current_clears_state() {
        let (manager, mut rx) = manager_with_capacity(8);
        let a = ThreadId("t-a".into());

        manager.subscribe_to_thread(a.clone()).await.unwrap();
        manager.unsubscribe_from_thread(&a).await.unwrap();

        assert_eq!(manager.current().await, None);
        let _ = rx.recv().await;
        assert_eq!(
            rx.recv().await.unwrap(),
            ClientFrame::Unsubscribe { thread_id: a }
        );
    }
}
