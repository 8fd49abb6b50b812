// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Duplex push channel for the Carelink platform.
//!
//! Provides the WebSocket client with reconnect/backoff, typed wire frames,
//! and the per-thread subscription manager.

pub mod client;
pub mod frame;
pub mod subscription;

pub use client::{ChannelState, DuplexClient, DuplexHandle, PushHandler, backoff_delay};
pub use frame::{ClientFrame, ReadReceipt, ServerFrame};
pub use subscription::{SubscriptionManager, SubscriptionState};
