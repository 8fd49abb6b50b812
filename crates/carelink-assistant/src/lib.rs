// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming assistant client for the Carelink platform.
//!
//! Drives one AI exchange end-to-end: sends a user turn, consumes the
//! server-sent event stream, assembles the incremental assistant message
//! (text deltas plus the tool-call lifecycle), and surfaces the terminal
//! risk signal.

pub mod client;
pub mod event;
pub mod session;
pub mod sse;

pub use client::{AssistantClient, ImageLimits, validate_images};
pub use event::{
    CompletedTurn, ImageAttachment, RiskAssessment, StreamEvent, ToolCall, ToolCallStatus,
    TurnRequest,
};
pub use session::{ChatSession, CrisisListener, TurnState};
pub use sse::parse_event_stream;
