// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplex channel client with automatic reconnect.
//!
//! Maintains a persistent WebSocket connection to the platform's push
//! endpoint, dispatches inbound frames to the registered [`PushHandler`],
//! and reconnects with capped exponential backoff on unexpected closure.
//! The connection task is an explicit state machine:
//!
//! `Disconnected -> Connecting -> Subscribing -> Ready`
//!
//! On reconnect the task re-issues the subscription for whichever thread is
//! currently recorded in [`SubscriptionState`] *before* signaling `Ready`,
//! so callers never observe a ready channel that has silently lost its
//! subscription. Threads closed before the reconnect completed are not
//! resurrected.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carelink_config::model::ChannelConfig;
use carelink_core::{BearerToken, CarelinkError, ThreadMessage};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::frame::{ClientFrame, ReadReceipt, ServerFrame};
use crate::subscription::{SubscriptionManager, SubscriptionState};

/// Outbound frame queue depth. Frames sent while disconnected queue here
/// and drain after the next successful reconnect.
const OUTBOUND_BUFFER: usize = 64;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    /// Connected; rehydrating the per-thread subscription.
    Subscribing,
    Ready,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Disconnected => write!(f, "disconnected"),
            ChannelState::Connecting => write!(f, "connecting"),
            ChannelState::Subscribing => write!(f, "subscribing"),
            ChannelState::Ready => write!(f, "ready"),
        }
    }
}

/// Receives inbound push frames, dispatched by the `type` discriminator.
#[async_trait]
pub trait PushHandler: Send + Sync {
    async fn on_new_message(&self, message: ThreadMessage);
    async fn on_message_read(&self, receipt: ReadReceipt);
}

/// Handle to a running duplex channel task.
pub struct DuplexHandle {
    state_rx: watch::Receiver<ChannelState>,
    cancel: CancellationToken,
}

impl DuplexHandle {
    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        *self.state_rx.borrow()
    }

    /// Waits until the channel reaches `Ready`.
    pub async fn wait_ready(&self) -> Result<(), CarelinkError> {
        let mut rx = self.state_rx.clone();
        loop {
            if *rx.borrow_and_update() == ChannelState::Ready {
                return Ok(());
            }
            rx.changed()
                .await
                .map_err(|_| CarelinkError::channel_msg("duplex channel task has shut down"))?;
        }
    }

    /// Stops the connection task. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for DuplexHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Spawns the duplex channel task.
pub struct DuplexClient;

impl DuplexClient {
    /// Starts the connection task and returns its handle plus the
    /// subscription manager bound to it.
    ///
    /// The bearer credential, when present, is carried on the WebSocket
    /// handshake of every connect and reconnect.
    pub fn spawn(
        config: ChannelConfig,
        token: Option<BearerToken>,
        handler: Arc<dyn PushHandler>,
    ) -> (DuplexHandle, SubscriptionManager) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
        let cancel = CancellationToken::new();

        let subs_state = SubscriptionState::new();
        let manager = SubscriptionManager::new(subs_state.clone(), outbound_tx);

        let task_cancel = cancel.clone();
        tokio::spawn(run_loop(
            config,
            token,
            handler,
            subs_state,
            outbound_rx,
            state_tx,
            task_cancel,
        ));

        (DuplexHandle { state_rx, cancel }, manager)
    }
}

/// Builds the handshake request, attaching the bearer credential if any.
fn handshake_request(
    url: &str,
    token: Option<&BearerToken>,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, CarelinkError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| CarelinkError::channel("invalid channel url", e))?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&token.header_value())
            .map_err(|e| CarelinkError::channel("invalid bearer token", e))?;
        request.headers_mut().insert("authorization", value);
    }
    Ok(request)
}

/// Computes the reconnect delay for the given attempt (1-based).
///
/// `min(base * 2^(attempt-1), max)`; never zero for a non-zero base.
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(max)
}

async fn run_loop(
    config: ChannelConfig,
    token: Option<BearerToken>,
    handler: Arc<dyn PushHandler>,
    subs_state: SubscriptionState,
    mut outbound_rx: mpsc::Receiver<ClientFrame>,
    state_tx: watch::Sender<ChannelState>,
    cancel: CancellationToken,
) {
    let base = Duration::from_millis(config.backoff_base_ms);
    let max = Duration::from_millis(config.backoff_max_ms);
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let _ = state_tx.send(ChannelState::Connecting);

        let request = match handshake_request(&config.url, token.as_ref()) {
            Ok(request) => request,
            Err(e) => {
                // A malformed URL or token will not fix itself; stop.
                warn!(error = %e, "cannot build channel handshake, giving up");
                let _ = state_tx.send(ChannelState::Disconnected);
                return;
            }
        };

        match connect_async(request).await {
            Ok((ws, _)) => {
                attempt = 0;
                info!(url = %config.url, "duplex channel connected");
                let (mut sink, mut stream) = ws.split();

                // Rehydrate the subscription before signaling ready.
                let _ = state_tx.send(ChannelState::Subscribing);
                if let Some(thread_id) = subs_state.current().await {
                    debug!(thread_id = %thread_id, "re-issuing subscription after connect");
                    let frame = ClientFrame::Subscribe { thread_id };
                    if send_frame(&mut sink, &frame).await.is_err() {
                        warn!("subscription rehydration failed, reconnecting");
                        let _ = state_tx.send(ChannelState::Disconnected);
                        attempt = attempt.saturating_add(1);
                        if sleep_or_cancel(backoff_delay(base, max, attempt), &cancel).await {
                            return;
                        }
                        continue;
                    }
                }
                let _ = state_tx.send(ChannelState::Ready);

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = sink.send(Message::Close(None)).await;
                            let _ = state_tx.send(ChannelState::Disconnected);
                            return;
                        }
                        frame = outbound_rx.recv() => {
                            let Some(frame) = frame else {
                                // All senders dropped; nothing left to do.
                                let _ = sink.send(Message::Close(None)).await;
                                let _ = state_tx.send(ChannelState::Disconnected);
                                return;
                            };
                            if let Err(e) = send_frame(&mut sink, &frame).await {
                                warn!(error = %e, "outbound frame send failed, reconnecting");
                                break;
                            }
                        }
                        msg = stream.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    dispatch(text.as_str(), handler.as_ref()).await;
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    warn!("duplex channel closed by server");
                                    break;
                                }
                                Some(Ok(_)) => {
                                    // Ping/pong/binary handled by the protocol layer.
                                }
                                Some(Err(e)) => {
                                    warn!(error = %e, "duplex channel read error");
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, url = %config.url, "duplex channel connect failed");
            }
        }

        let _ = state_tx.send(ChannelState::Disconnected);
        attempt = attempt.saturating_add(1);
        let delay = backoff_delay(base, max, attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect backoff");
        if sleep_or_cancel(delay, &cancel).await {
            return;
        }
    }
}

/// Sleeps for `delay` unless cancelled first. Returns true when cancelled.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

async fn send_frame<S>(sink: &mut S, frame: &ClientFrame) -> Result<(), CarelinkError>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(frame)
        .map_err(|e| CarelinkError::channel("failed to encode frame", e))?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| CarelinkError::channel_msg(format!("failed to send frame: {e}")))
}

async fn dispatch(text: &str, handler: &dyn PushHandler) {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(ServerFrame::NewMessage { payload }) => handler.on_new_message(payload).await,
        Ok(ServerFrame::MessageRead { payload }) => handler.on_message_read(payload).await,
        Err(e) => {
            // Unknown or malformed frames never abort the connection.
            warn!(error = %e, "dropping unrecognized push frame");
        }
    }
}
