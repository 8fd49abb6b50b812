// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST client for the Carelink messaging surface.
//!
//! Thin typed wrappers over the platform's REST endpoints: thread listing,
//! backward-paginated history, message send, read receipts, attachment
//! upload, and doctor-initiated thread creation. Every request carries the
//! bearer credential; a 401 anywhere fires the injected
//! [`SessionGuard`](carelink_core::SessionGuard) and fails the operation
//! with [`CarelinkError::Auth`].

mod client;
mod types;

pub use client::RestClient;
pub use types::{SendMessageRequest, StartThreadRequest, ThreadHistory, ThreadPage};
