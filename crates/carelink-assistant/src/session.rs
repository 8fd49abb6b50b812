// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation session that drives one streaming turn end-to-end.
//!
//! Each turn goes through states: Idle -> Sending -> Streaming -> Idle.
//! The session owns the turn's mutable buffer for its lifetime; once the
//! turn is finalized (complete or errored) the buffer is discarded and the
//! caller receives an immutable [`CompletedTurn`].
//!
//! `send_turn` takes `&mut self`, so a second turn cannot start while one
//! is in flight: callers sharing a session serialize on the exclusive
//! borrow. Event ordering is only guaranteed within a single stream, and
//! the exclusive borrow keeps streams from interleaving.

use std::sync::Arc;
use std::time::Duration;

use carelink_core::{CarelinkError, ConversationId};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::client::AssistantClient;
use crate::event::{
    CompletedTurn, ImageAttachment, RiskAssessment, StreamEvent, ToolCall, ToolCallStatus,
    TurnRequest,
};

/// States in the turn FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// No turn in flight.
    Idle,
    /// Request sent, waiting for the first event.
    Sending,
    /// Consuming the event stream.
    Streaming,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnState::Idle => write!(f, "idle"),
            TurnState::Sending => write!(f, "sending"),
            TurnState::Streaming => write!(f, "streaming"),
        }
    }
}

/// Receives the crisis-flow side effect raised by a `riskAlert` metadata
/// event. Fired at most once per turn.
pub trait CrisisListener: Send + Sync {
    fn on_risk_alert(&self, conversation_id: Option<&ConversationId>);
}

/// Mutable accumulation state for one in-flight turn.
///
/// Never escapes the session; the terminal outcome is the only thing the
/// caller sees.
#[derive(Debug, Default)]
struct TurnBuffer {
    text: String,
    tool_calls: Vec<ToolCall>,
    conversation_id: Option<ConversationId>,
    risk: Option<RiskAssessment>,
    risk_alert: bool,
    crisis_fired: bool,
}

/// Drives streaming turns against the assistant endpoint for one
/// conversation.
pub struct ChatSession {
    client: AssistantClient,
    conversation_id: Option<ConversationId>,
    crisis: Option<Arc<dyn CrisisListener>>,
    state: TurnState,
    /// Maximum gap between stream events before the turn is failed.
    idle_timeout: Duration,
}

impl ChatSession {
    /// Creates a session with no prior conversation.
    pub fn new(client: AssistantClient, idle_timeout: Duration) -> Self {
        Self {
            client,
            conversation_id: None,
            crisis: None,
            state: TurnState::Idle,
            idle_timeout,
        }
    }

    /// Registers the crisis-flow listener.
    pub fn with_crisis_listener(mut self, listener: Arc<dyn CrisisListener>) -> Self {
        self.crisis = Some(listener);
        self
    }

    /// Resumes an existing conversation.
    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    /// Returns the current turn state.
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// The conversation id captured from the most recent turn, if any.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    /// Executes one user turn end-to-end and returns the finalized result.
    ///
    /// Exactly one terminal outcome per turn: `Ok(CompletedTurn)` on a
    /// `message_complete` event, `Err` on an `error` event, transport
    /// failure, idle timeout, or a stream that ends early. Partial buffers
    /// are never returned. Dropping the returned future aborts the request
    /// and discards the buffer without any client-visible error.
    pub async fn send_turn(
        &mut self,
        text: impl Into<String>,
        images: Option<Vec<ImageAttachment>>,
    ) -> Result<CompletedTurn, CarelinkError> {
        self.send_turn_observed(text, images, |_| {}).await
    }

    /// Like [`send_turn`](Self::send_turn), invoking `observe` on every
    /// stream event before it is applied. Lets a UI render deltas and
    /// tool-call lifecycle lines as they arrive.
    pub async fn send_turn_observed(
        &mut self,
        text: impl Into<String>,
        images: Option<Vec<ImageAttachment>>,
        observe: impl FnMut(&StreamEvent) + Send,
    ) -> Result<CompletedTurn, CarelinkError> {
        let request = TurnRequest {
            message: text.into(),
            conversation_id: self.conversation_id.clone(),
            images,
        };

        self.state = TurnState::Sending;
        let result = self.run_turn(&request, observe).await;
        self.state = TurnState::Idle;

        if let Ok(turn) = &result {
            // Carried into the next turn's request.
            self.conversation_id = turn.conversation_id.clone();
        }
        result
    }

    async fn run_turn(
        &mut self,
        request: &TurnRequest,
        mut observe: impl FnMut(&StreamEvent) + Send,
    ) -> Result<CompletedTurn, CarelinkError> {
        let mut stream = self.client.stream_turn(request).await?;
        self.state = TurnState::Streaming;

        let mut buffer = TurnBuffer::default();

        loop {
            let next = tokio::time::timeout(self.idle_timeout, stream.next())
                .await
                .map_err(|_| CarelinkError::Timeout {
                    duration: self.idle_timeout,
                })?;

            let Some(item) = next else {
                // Stream ended without a terminal event.
                return Err(CarelinkError::Stream {
                    message: "event stream ended before message_complete".to_string(),
                });
            };

            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    // Malformed record; the rest of the stream is still good.
                    warn!(error = %e, "skipping malformed stream record");
                    continue;
                }
            };

            observe(&event);

            match event {
                StreamEvent::RiskCheck(ev) => {
                    buffer.risk = Some(RiskAssessment {
                        level: ev.level,
                        risk_type: ev.risk_type,
                    });
                }
                StreamEvent::ToolStart(ev) => {
                    if buffer.tool_calls.iter().any(|t| t.id == ev.tool_id) {
                        debug!(tool_id = %ev.tool_id, "duplicate tool_start ignored");
                        continue;
                    }
                    buffer.tool_calls.push(ToolCall {
                        id: ev.tool_id,
                        name: ev.tool_name,
                        status: ToolCallStatus::Running,
                    });
                }
                StreamEvent::ToolEnd(ev) => {
                    match buffer.tool_calls.iter_mut().find(|t| t.id == ev.tool_id) {
                        Some(tool) => {
                            tool.status = ToolCallStatus::Completed {
                                result_preview: ev.result_preview,
                            };
                        }
                        None => {
                            // A tool_end for a tool that never started creates
                            // no orphan entry.
                            debug!(tool_id = %ev.tool_id, "tool_end for unknown tool ignored");
                        }
                    }
                }
                StreamEvent::TextDelta(ev) => {
                    buffer.text.push_str(&ev.text);
                }
                StreamEvent::Metadata(ev) => {
                    buffer.conversation_id = Some(ConversationId(ev.conversation_id));
                    if ev.risk_alert {
                        buffer.risk_alert = true;
                        if !buffer.crisis_fired {
                            buffer.crisis_fired = true;
                            if let Some(listener) = &self.crisis {
                                listener.on_risk_alert(buffer.conversation_id.as_ref());
                            }
                        }
                    }
                }
                StreamEvent::MessageComplete(ev) => {
                    // The terminal value always wins over the concatenated
                    // deltas, which may legitimately differ.
                    return Ok(CompletedTurn {
                        content: ev.content,
                        tool_calls: std::mem::take(&mut buffer.tool_calls),
                        conversation_id: buffer.conversation_id.take(),
                        risk_alert: buffer.risk_alert,
                        risk: ev.risk.or_else(|| buffer.risk.take()),
                    });
                }
                StreamEvent::Error(ev) => {
                    // Terminal failure; no further events are processed.
                    return Err(CarelinkError::Stream { message: ev.message });
                }
            }
        }
    }
}
