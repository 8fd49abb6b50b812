// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire frames for the duplex push channel.
//!
//! Server -> Client (JSON):
//! ```json
//! {"type": "new_message", "payload": { ...Message... }}
//! {"type": "message_read", "payload": {"thread_id": "...", "reader_type": "doctor"}}
//! ```
//!
//! Client -> Server (JSON):
//! ```json
//! {"type": "subscribe", "thread_id": "..."}
//! {"type": "unsubscribe", "thread_id": "..."}
//! ```

use carelink_core::{PartyRole, ThreadId, ThreadMessage};
use serde::{Deserialize, Serialize};

/// Frames pushed by the server. No other inbound frame types are defined
/// for this protocol; unknown types are logged and dropped at dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A message was created in a subscribed thread.
    NewMessage { payload: ThreadMessage },
    /// A party viewed a thread's messages.
    MessageRead { payload: ReadReceipt },
}

/// Signal that a party has viewed a thread's messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub thread_id: ThreadId,
    /// Which side of the thread performed the read.
    pub reader_type: PartyRole,
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe { thread_id: ThreadId },
    Unsubscribe { thread_id: ThreadId },
}
