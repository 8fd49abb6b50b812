// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory thread store for the Carelink client.
//!
//! Reconciles three sources into one coherent timeline: locally-originated
//! optimistic messages, REST-fetched history pages, and asynchronously
//! pushed live updates from the duplex channel -- without duplication or
//! loss, with monotonic read-state and accurate unread counters.

pub mod entry;
pub mod read_state;
pub mod reducer;
pub mod store;

pub use entry::{Delivery, MessageEntry};
pub use read_state::{DEFAULT_DEBOUNCE, ReceiptDebouncer};
pub use reducer::{StoreEvent, StoreState, apply};
pub use store::ThreadStore;
