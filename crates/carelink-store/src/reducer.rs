// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The store's reconciliation reducer.
//!
//! All cache mutation funnels through [`apply`]: local-origin events
//! (optimistic sends, confirmations, failures) and remote-origin events
//! (REST pages, push frames) reduce over one [`StoreState`]. Keeping the
//! rules in one synchronous function makes the reconciliation invariants
//! directly testable without any transport in the loop.

use std::collections::HashMap;

use carelink_core::{MessageKind, PartyRole, Thread, ThreadId, ThreadMessage};
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::entry::{
    Delivery, MessageEntry, contains_message_id, insert_chronological, sort_chronological,
};

/// The currently open thread's full message log.
#[derive(Debug)]
pub struct OpenThread {
    pub thread_id: ThreadId,
    pub entries: Vec<MessageEntry>,
    /// Older messages exist before the earliest loaded one.
    pub has_more: bool,
    /// Generation stamp used to drop stale history responses.
    pub generation: u64,
    /// One read receipt per visibility session.
    pub receipt_sent: bool,
}

/// The single in-memory projection of all threads for the current user.
///
/// Mutated only through [`apply`] while the store's mutex is held.
#[derive(Debug, Default)]
pub struct StoreState {
    pub threads: Vec<Thread>,
    pub threads_has_more: bool,
    /// Last loaded summary page (1-based; 0 = nothing loaded).
    pub thread_page: u32,
    pub open: Option<OpenThread>,
    /// Locally-confirmed read times, used to clamp stale server unread
    /// counts during summary merges.
    pub read_marks: HashMap<ThreadId, DateTime<Utc>>,
    /// Bumped on every thread open; stamps in-flight history loads.
    pub generation: u64,
}

impl StoreState {
    /// Sum of per-thread unread counters.
    pub fn total_unread(&self) -> u32 {
        self.threads.iter().map(|t| t.unread_count).sum()
    }
}

/// Everything that can change the cache.
#[derive(Debug)]
pub enum StoreEvent {
    /// A REST page of thread summaries arrived.
    ThreadsLoaded {
        threads: Vec<Thread>,
        append: bool,
        has_more: bool,
    },
    /// A single authoritative summary arrived (thread detail response or a
    /// newly started thread). Known ids merge in place; new ids append.
    ThreadUpserted { thread: Thread },
    /// A REST history page for thread `thread_id` arrived.
    ///
    /// `generation` is the value captured when the request was issued;
    /// a mismatch (or a different open thread) means the response is stale
    /// and must be dropped.
    HistoryLoaded {
        thread_id: ThreadId,
        generation: u64,
        messages: Vec<ThreadMessage>,
        has_more: bool,
        prepend: bool,
    },
    /// A local send was queued optimistically.
    SendQueued {
        message: ThreadMessage,
        correlation_id: Uuid,
    },
    /// The server confirmed a local send.
    SendConfirmed {
        correlation_id: Uuid,
        message: ThreadMessage,
    },
    /// A local send failed; the entry is retained for manual retry.
    SendFailed {
        correlation_id: Uuid,
        error: String,
    },
    /// The user explicitly retried a failed send.
    SendRetried { correlation_id: Uuid },
    /// Push: a new message in some thread.
    PushMessage { message: ThreadMessage },
    /// Push: a party viewed a thread.
    PushRead {
        thread_id: ThreadId,
        reader_type: PartyRole,
        at: DateTime<Utc>,
    },
    /// The server acknowledged this client's own read receipt.
    ReadConfirmed {
        thread_id: ThreadId,
        at: DateTime<Utc>,
    },
}

/// Reduces one event into the state. `own_role` identifies which side of
/// every thread the current user is.
pub fn apply(state: &mut StoreState, event: StoreEvent, own_role: PartyRole) {
    match event {
        StoreEvent::ThreadsLoaded {
            threads,
            append,
            has_more,
        } => apply_threads_loaded(state, threads, append, has_more),
        StoreEvent::ThreadUpserted { thread } => {
            match state.threads.iter_mut().find(|t| t.id == thread.id) {
                Some(existing) => *existing = merge_summary(existing, thread, &state.read_marks),
                None => state.threads.push(thread),
            }
        }
        StoreEvent::HistoryLoaded {
            thread_id,
            generation,
            messages,
            has_more,
            prepend,
        } => apply_history_loaded(state, thread_id, generation, messages, has_more, prepend),
        StoreEvent::SendQueued {
            message,
            correlation_id,
        } => {
            touch_thread_preview(state, &message);
            if let Some(open) = state.open.as_mut()
                && open.thread_id == message.thread_id
            {
                insert_chronological(&mut open.entries, MessageEntry::pending(message, correlation_id));
            }
        }
        StoreEvent::SendConfirmed {
            correlation_id,
            message,
        } => apply_send_confirmed(state, correlation_id, message),
        StoreEvent::SendFailed {
            correlation_id,
            error,
        } => {
            if let Some(open) = state.open.as_mut()
                && let Some(entry) = open
                    .entries
                    .iter_mut()
                    .find(|e| e.delivery.correlation_id() == Some(correlation_id))
            {
                entry.delivery = Delivery::Failed {
                    correlation_id,
                    error,
                };
            }
        }
        StoreEvent::SendRetried { correlation_id } => {
            if let Some(open) = state.open.as_mut()
                && let Some(entry) = open
                    .entries
                    .iter_mut()
                    .find(|e| matches!(e.delivery, Delivery::Failed { correlation_id: c, .. } if c == correlation_id))
            {
                entry.delivery = Delivery::Pending { correlation_id };
            }
        }
        StoreEvent::PushMessage { message } => apply_push_message(state, message),
        StoreEvent::PushRead {
            thread_id,
            reader_type,
            at,
        } => apply_push_read(state, thread_id, reader_type, at, own_role),
        StoreEvent::ReadConfirmed { thread_id, at } => {
            apply_read_confirmed(state, thread_id, at, own_role)
        }
    }
}

fn apply_threads_loaded(
    state: &mut StoreState,
    incoming: Vec<Thread>,
    append: bool,
    has_more: bool,
) {
    if append {
        for thread in incoming {
            match state.threads.iter_mut().find(|t| t.id == thread.id) {
                // Known ids keep their position and merge counters.
                Some(existing) => *existing = merge_summary(existing, thread, &state.read_marks),
                None => state.threads.push(thread),
            }
        }
        state.thread_page += 1;
    } else {
        let merged = incoming
            .into_iter()
            .map(|thread| {
                match state.threads.iter().find(|t| t.id == thread.id) {
                    Some(existing) => merge_summary(existing, thread, &state.read_marks),
                    None => thread,
                }
            })
            .collect();
        state.threads = merged;
        state.thread_page = 1;
    }
    state.threads_has_more = has_more;
}

/// Merges an incoming summary with the locally cached one.
///
/// The unread counter only moves monotonically: the merged value is
/// `max(local, incoming)`, clamped to zero when a locally-confirmed read
/// covers the incoming thread's last message. Local counters only ever
/// decrease through confirmed reads, so `max` never loses a concurrent
/// peer increment.
fn merge_summary(
    local: &Thread,
    mut incoming: Thread,
    read_marks: &HashMap<ThreadId, DateTime<Utc>>,
) -> Thread {
    let covered_by_read = read_marks
        .get(&incoming.id)
        .is_some_and(|read_at| incoming.last_message_at.is_none_or(|t| t <= *read_at));

    incoming.unread_count = if covered_by_read {
        0
    } else {
        local.unread_count.max(incoming.unread_count)
    };
    incoming
}

fn apply_history_loaded(
    state: &mut StoreState,
    thread_id: ThreadId,
    generation: u64,
    messages: Vec<ThreadMessage>,
    has_more: bool,
    prepend: bool,
) {
    let Some(open) = state.open.as_mut() else {
        debug!(thread_id = %thread_id, "history response with no open thread dropped");
        return;
    };
    // Explicit id check: responses may complete out of issue-order, so
    // "most recent call wins" is not enough.
    if open.thread_id != thread_id || open.generation != generation {
        debug!(
            stale = %thread_id,
            open = %open.thread_id,
            "stale history response dropped"
        );
        return;
    }

    if prepend {
        for message in messages {
            if !contains_message_id(&open.entries, &message.id) {
                insert_chronological(&mut open.entries, MessageEntry::confirmed(message));
            }
        }
    } else {
        // Replace the confirmed log but never drop local-origin entries.
        let local: Vec<MessageEntry> = open
            .entries
            .drain(..)
            .filter(|e| e.delivery != Delivery::Confirmed)
            .collect();
        for message in messages {
            if !contains_message_id(&open.entries, &message.id) {
                insert_chronological(&mut open.entries, MessageEntry::confirmed(message));
            }
        }
        for entry in local {
            insert_chronological(&mut open.entries, entry);
        }
    }
    open.has_more = has_more;
}

fn apply_send_confirmed(state: &mut StoreState, correlation_id: Uuid, message: ThreadMessage) {
    touch_thread_preview(state, &message);

    let Some(open) = state.open.as_mut() else {
        return;
    };
    if open.thread_id != message.thread_id {
        return;
    }

    if contains_message_id(&open.entries, &message.id) {
        // The push copy of this message won the race; drop the optimistic
        // entry so the message appears exactly once.
        open.entries
            .retain(|e| e.delivery.correlation_id() != Some(correlation_id));
        return;
    }

    match open
        .entries
        .iter_mut()
        .find(|e| e.delivery.correlation_id() == Some(correlation_id))
    {
        Some(entry) => {
            // Server timestamp is authoritative; re-sort in case it differs
            // from the optimistic local one.
            entry.message = message;
            entry.delivery = Delivery::Confirmed;
            sort_chronological(&mut open.entries);
        }
        None => {
            // Thread was cleared and reopened between send and confirm.
            insert_chronological(&mut open.entries, MessageEntry::confirmed(message));
        }
    }
}

fn apply_push_message(state: &mut StoreState, message: ThreadMessage) {
    touch_thread_preview(state, &message);

    if let Some(open) = state.open.as_mut()
        && open.thread_id == message.thread_id
    {
        if contains_message_id(&open.entries, &message.id) {
            // Same message already confirmed via the REST response.
            debug!(message_id = %message.id, "duplicate pushed message skipped");
        } else {
            insert_chronological(&mut open.entries, MessageEntry::confirmed(message));
        }
        return;
    }

    let thread_id = message.thread_id;
    match state.threads.iter_mut().find(|t| t.id == thread_id) {
        Some(thread) => thread.unread_count += 1,
        // Summary list is refreshed from the server; nothing to patch.
        None => debug!(thread_id = %thread_id, "pushed message for unknown thread"),
    }
}

fn apply_push_read(
    state: &mut StoreState,
    thread_id: ThreadId,
    reader_type: PartyRole,
    at: DateTime<Utc>,
    own_role: PartyRole,
) {
    if reader_type == own_role {
        // Echo of this client's own mark-as-read; already applied locally.
        debug!(thread_id = %thread_id, "own read receipt echo ignored");
        return;
    }

    // The counterpart read the thread: stamp our *sent* copies as read.
    // The current user's own unread counter is untouched.
    if let Some(open) = state.open.as_mut()
        && open.thread_id == thread_id
    {
        for entry in open
            .entries
            .iter_mut()
            .filter(|e| e.message.sender_role == own_role && !e.message.is_read)
        {
            entry.message.is_read = true;
            entry.message.read_at = Some(at);
        }
    }
}

fn apply_read_confirmed(
    state: &mut StoreState,
    thread_id: ThreadId,
    at: DateTime<Utc>,
    own_role: PartyRole,
) {
    state.read_marks.insert(thread_id.clone(), at);

    if let Some(thread) = state.threads.iter_mut().find(|t| t.id == thread_id) {
        thread.unread_count = 0;
    }

    if let Some(open) = state.open.as_mut()
        && open.thread_id == thread_id
    {
        open.receipt_sent = true;
        for entry in open
            .entries
            .iter_mut()
            .filter(|e| e.message.sender_role != own_role && !e.message.is_read)
        {
            entry.message.is_read = true;
            entry.message.read_at = Some(at);
        }
    }
}

/// Updates a thread summary's preview and timestamp from a message.
fn touch_thread_preview(state: &mut StoreState, message: &ThreadMessage) {
    if let Some(thread) = state.threads.iter_mut().find(|t| t.id == message.thread_id) {
        thread.last_message_preview = Some(preview_of(message));
        thread.last_message_at = Some(message.created_at);
    }
}

fn preview_of(message: &ThreadMessage) -> String {
    match &message.content {
        Some(content) => content.clone(),
        None => match message.kind {
            MessageKind::Image => "[image]".to_string(),
            MessageKind::File => "[file]".to_string(),
            MessageKind::Text => String::new(),
        },
    }
}
