// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process WebSocket push server for duplex channel tests.
//!
//! Accepts any number of sequential client connections, records the
//! [`ClientFrame`]s each sends, and lets tests push [`ServerFrame`]s or
//! abruptly drop the live connection to exercise the reconnect path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use carelink_channel::{ClientFrame, ServerFrame};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

#[derive(Debug, Clone)]
enum ServerCommand {
    /// Deliver a JSON frame to every live connection.
    Frame(String),
    /// Sever every live connection without a close handshake.
    Drop,
}

/// An in-process push endpoint.
pub struct PushServer {
    addr: SocketAddr,
    command_tx: broadcast::Sender<ServerCommand>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<ClientFrame>>,
    connections: Arc<AtomicUsize>,
}

impl PushServer {
    /// Binds to an ephemeral local port and starts accepting connections.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test push server");
        let addr = listener.local_addr().expect("local addr");

        let (command_tx, _) = broadcast::channel(32);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));

        let accept_command_tx = command_tx.clone();
        let accept_connections = connections.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, peer)) = listener.accept().await else {
                    break;
                };
                debug!(%peer, "test push server accepted connection");
                accept_connections.fetch_add(1, Ordering::SeqCst);

                let mut command_rx = accept_command_tx.subscribe();
                let inbound_tx = inbound_tx.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                        return;
                    };
                    loop {
                        tokio::select! {
                            cmd = command_rx.recv() => match cmd {
                                Ok(ServerCommand::Frame(json)) => {
                                    if ws.send(Message::Text(json.into())).await.is_err() {
                                        break;
                                    }
                                }
                                // Dropping the socket without a close frame
                                // simulates a network failure.
                                Ok(ServerCommand::Drop) | Err(_) => break,
                            },
                            msg = ws.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    match serde_json::from_str::<ClientFrame>(text.as_str()) {
                                        Ok(frame) => {
                                            let _ = inbound_tx.send(frame);
                                        }
                                        Err(e) => debug!(error = %e, "unparseable client frame"),
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Ok(_)) => {}
                                Some(Err(_)) => break,
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            command_tx,
            inbound_rx: Mutex::new(inbound_rx),
            connections,
        }
    }

    /// The `ws://` URL clients should connect to.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Pushes a frame to every live connection.
    pub fn push_frame(&self, frame: &ServerFrame) {
        let json = serde_json::to_string(frame).expect("serialize server frame");
        // No receivers just means no live connections yet.
        let _ = self.command_tx.send(ServerCommand::Frame(json));
    }

    /// Pushes raw text to every live connection (for malformed-frame tests).
    pub fn push_raw(&self, text: &str) {
        let _ = self.command_tx.send(ServerCommand::Frame(text.to_string()));
    }

    /// Abruptly severs every live connection.
    pub fn drop_connections(&self) {
        let _ = self.command_tx.send(ServerCommand::Drop);
    }

    /// Total connections accepted since start.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Waits for the next frame sent by any client.
    ///
    /// Panics after `timeout` to keep failing tests from hanging.
    pub async fn next_client_frame(&self, timeout: Duration) -> ClientFrame {
        let mut rx = self.inbound_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("push server inbound channel closed")
    }

    /// Waits until `count` total connections have been accepted.
    pub async fn wait_for_connections(&self, count: usize, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.connection_count() < count {
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "timed out waiting for {count} connections, saw {}",
                    self.connection_count()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
