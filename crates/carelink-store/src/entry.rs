// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entries of the open thread's message log.

use carelink_core::{MessageId, ThreadMessage};
use uuid::Uuid;

/// Delivery state of one log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Mirrored from the server (REST page, push event, or confirmed send).
    Confirmed,
    /// Locally originated, awaiting server confirmation.
    Pending { correlation_id: Uuid },
    /// Locally originated, the send failed. Retried only on explicit user
    /// action, never silently.
    Failed { correlation_id: Uuid, error: String },
}

impl Delivery {
    /// The correlation id for locally originated entries.
    pub fn correlation_id(&self) -> Option<Uuid> {
        match self {
            Delivery::Confirmed => None,
            Delivery::Pending { correlation_id } | Delivery::Failed { correlation_id, .. } => {
                Some(*correlation_id)
            }
        }
    }
}

/// One entry of the open thread's log: the message plus its delivery state.
#[derive(Debug, Clone)]
pub struct MessageEntry {
    pub message: ThreadMessage,
    pub delivery: Delivery,
}

impl MessageEntry {
    pub fn confirmed(message: ThreadMessage) -> Self {
        Self {
            message,
            delivery: Delivery::Confirmed,
        }
    }

    pub fn pending(message: ThreadMessage, correlation_id: Uuid) -> Self {
        Self {
            message,
            delivery: Delivery::Pending { correlation_id },
        }
    }
}

/// True when any entry carries the given server message id.
pub fn contains_message_id(entries: &[MessageEntry], id: &MessageId) -> bool {
    entries.iter().any(|e| &e.message.id == id)
}

/// Inserts an entry keeping the log ordered by `created_at`.
///
/// Equal timestamps insert after existing entries, so arrival order is
/// preserved among ties.
pub fn insert_chronological(entries: &mut Vec<MessageEntry>, entry: MessageEntry) {
    let position = entries
        .partition_point(|e| e.message.created_at <= entry.message.created_at);
    entries.insert(position, entry);
}

/// Re-sorts the log after an in-place timestamp change (stable).
pub fn sort_chronological(entries: &mut [MessageEntry]) {
    entries.sort_by_key(|e| e.message.created_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelink_core::{MessageKind, PartyRole, ThreadId};
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, minute: u32) -> ThreadMessage {
        ThreadMessage {
            id: MessageId(id.into()),
            thread_id: ThreadId("t1".into()),
            sender_id: "u1".into(),
            sender_role: PartyRole::Patient,
            content: Some(id.into()),
            kind: MessageKind::Text,
            attachments: vec![],
            is_read: false,
            read_at: None,
            created_at: Utc.with_ymd_and_hms(2026, 2, 1, 9, minute, 0).unwrap(),
        }
    }

    #[test]
    fn insert_keeps_chronological_order() {
        let mut entries = vec![
            MessageEntry::confirmed(msg("m1", 0)),
            MessageEntry::confirmed(msg("m3", 20)),
        ];
        insert_chronological(&mut entries, MessageEntry::confirmed(msg("m2", 10)));
        let ids: Vec<_> = entries.iter().map(|e| e.message.id.0.as_str()).collect();
        assert_eq!(ids, ["m1", "m2", "m3"]);
    }

    #[test]
    fn equal_timestamps_insert_after_existing() {
        let mut entries = vec![MessageEntry::confirmed(msg("first", 5))];
        insert_chronological(&mut entries, MessageEntry::confirmed(msg("second", 5)));
        assert_eq!(entries[0].message.id.0, "first");
        assert_eq!(entries[1].message.id.0, "second");
    }

    #[test]
    fn contains_message_id_matches() {
        let entries = vec![MessageEntry::confirmed(msg("m1", 0))];
        assert!(contains_message_id(&entries, &MessageId("m1".into())));
        assert!(!contains_message_id(&entries, &MessageId("m2".into())));
    }

    proptest::proptest! {
        /// Inserting messages in any arrival order yields a log sorted by
        /// creation time.
        #[test]
        fn any_insertion_order_stays_chronological(minutes in proptest::collection::vec(0u32..60, 0..40)) {
            let mut entries = Vec::new();
            for (i, minute) in minutes.iter().enumerate() {
                insert_chronological(
                    &mut entries,
                    MessageEntry::confirmed(msg(&format!("m{i}"), *minute)),
                );
            }
            let times: Vec<_> = entries.iter().map(|e| e.message.created_at).collect();
            let mut sorted = times.clone();
            sorted.sort();
            proptest::prop_assert_eq!(times, sorted);
        }
    }
}
