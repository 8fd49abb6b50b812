// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the assistant streaming protocol.
//!
//! One turn is delivered as a sequence of server-sent events; each event
//! name maps to one [`StreamEvent`] variant. Events for one turn arrive in
//! a single ordered sequence over one logical stream.

use carelink_core::ConversationId;
use serde::{Deserialize, Serialize};

/// Typed events from the assistant streaming protocol.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Upstream risk classification signal, may arrive before completion.
    RiskCheck(RiskCheckEvent),
    /// A server-side tool invocation has begun.
    ToolStart(ToolStartEvent),
    /// A previously started tool invocation has finished.
    ToolEnd(ToolEndEvent),
    /// Incremental assistant text.
    TextDelta(TextDeltaEvent),
    /// Terminal success event carrying the authoritative final content.
    MessageComplete(MessageCompleteEvent),
    /// Conversation identifiers; may arrive at any point in the turn.
    Metadata(MetadataEvent),
    /// Terminal failure event.
    Error(ErrorEvent),
}

/// Risk classification delivered as an opaque upstream decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: String,
    #[serde(default)]
    pub risk_type: Option<String>,
}

/// SSE event: risk_check
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskCheckEvent {
    pub level: String,
    #[serde(default)]
    pub risk_type: Option<String>,
}

/// SSE event: tool_start
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStartEvent {
    pub tool_id: String,
    pub tool_name: String,
}

/// SSE event: tool_end
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEndEvent {
    pub tool_id: String,
    pub tool_name: String,
    pub result_preview: String,
}

/// SSE event: text_delta
#[derive(Debug, Clone, Deserialize)]
pub struct TextDeltaEvent {
    pub text: String,
}

/// SSE event: message_complete
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCompleteEvent {
    /// The authoritative final content. Always wins over the concatenation
    /// of the preceding text deltas.
    pub content: String,
    #[serde(default)]
    pub risk: Option<RiskAssessment>,
}

/// SSE event: metadata
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEvent {
    pub conversation_id: String,
    pub risk_alert: bool,
}

/// SSE event: error
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
}

// --- Request types ---

/// One user turn sent to the streaming endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub message: String,

    /// Present when continuing an existing conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,

    /// Optional inline images (base64 encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageAttachment>>,
}

/// An inline image carried with a turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    /// MIME type (e.g., "image/jpeg", "image/png").
    pub media_type: String,
    /// Base64-encoded image data.
    pub data: String,
}

// --- Turn result types ---

/// Lifecycle state of one tool call within a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCallStatus {
    Running,
    Completed { result_preview: String },
}

/// A named server-side action taken during a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub status: ToolCallStatus,
}

/// The finalized result of one turn. Immutable once returned.
#[derive(Debug, Clone)]
pub struct CompletedTurn {
    pub content: String,
    /// Tool calls in start order.
    pub tool_calls: Vec<ToolCall>,
    pub conversation_id: Option<ConversationId>,
    pub risk_alert: bool,
    pub risk: Option<RiskAssessment>,
}
