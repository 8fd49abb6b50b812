// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Carelink client.
//!
//! This crate provides the error type, domain types, and the
//! session-invalidation seam shared by the transport, store, and binary
//! crates of the workspace.

pub mod auth;
pub mod error;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use auth::{BearerToken, LatchingSessionGuard, SessionGuard};
pub use error::CarelinkError;
pub use types::{
    Attachment, AttachmentId, ConversationId, MessageId, MessageKind, PartyRole, Thread,
    ThreadId, ThreadMessage,
};
