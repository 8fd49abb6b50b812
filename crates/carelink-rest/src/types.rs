// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response bodies for the REST surface.

use carelink_core::{AttachmentId, MessageKind, Thread, ThreadMessage};
use serde::{Deserialize, Serialize};

/// One page of thread summaries.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadPage {
    pub threads: Vec<Thread>,
    #[serde(default)]
    pub has_more: bool,
}

/// One backward page of a thread's message history.
///
/// Messages are returned oldest-first within the page; `has_more` signals
/// that older messages exist before the first returned one.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadHistory {
    pub thread: Thread,
    pub messages: Vec<ThreadMessage>,
    #[serde(default)]
    pub has_more: bool,
}

/// Body for sending a message.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachment_ids: Vec<AttachmentId>,
}

/// Body for starting a thread with a counterpart (doctor-initiated).
#[derive(Debug, Clone, Serialize)]
pub struct StartThreadRequest {
    pub counterpart_id: String,
}
