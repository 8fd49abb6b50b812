// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Carelink integration tests.
//!
//! Provides deterministic fixtures, a recording push handler, and an
//! in-process WebSocket push server for exercising the duplex channel.

pub mod fixtures;
pub mod push;
pub mod server;

pub use fixtures::{make_message, make_thread};
pub use push::RecordingPushHandler;
pub use server::PushServer;
