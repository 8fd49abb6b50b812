// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixture builders for threads and messages.

use carelink_core::{
    MessageId, MessageKind, PartyRole, Thread, ThreadId, ThreadMessage,
};
use chrono::{Duration, TimeZone, Utc};

/// Fixed base timestamp so fixtures are deterministic and ordered.
fn base_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap()
}

/// A thread between the current (patient) user and a doctor counterpart.
pub fn make_thread(id: &str) -> Thread {
    Thread {
        id: ThreadId(id.to_string()),
        counterpart_id: format!("doc-{id}"),
        counterpart_name: "Dr. Ferreira".to_string(),
        counterpart_role: PartyRole::Doctor,
        can_send_message: true,
        last_message_preview: None,
        last_message_at: None,
        unread_count: 0,
        created_at: base_time(),
    }
}

/// A text message in `thread_id`, `minutes` after the fixture base time.
///
/// Message ids encode the offset so repeated calls with the same arguments
/// produce the same message.
pub fn make_message(
    thread_id: &str,
    id: &str,
    sender_role: PartyRole,
    content: &str,
    minutes: i64,
) -> ThreadMessage {
    ThreadMessage {
        id: MessageId(id.to_string()),
        thread_id: ThreadId(thread_id.to_string()),
        sender_id: match sender_role {
            PartyRole::Patient => "patient-1".to_string(),
            PartyRole::Doctor => format!("doc-{thread_id}"),
        },
        sender_role,
        content: Some(content.to_string()),
        kind: MessageKind::Text,
        attachments: vec![],
        is_read: false,
        read_at: None,
        created_at: base_time() + Duration::minutes(minutes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_order_by_offset() {
        let earlier = make_message("t1", "m1", PartyRole::Doctor, "first", 0);
        let later = make_message("t1", "m2", PartyRole::Doctor, "second", 5);
        assert!(earlier.created_at < later.created_at);
    }

    #[test]
    fn fixtures_are_deterministic() {
        let a = make_message("t1", "m1", PartyRole::Patient, "hello", 3);
        let b = make_message("t1", "m1", PartyRole::Patient, "hello", 3);
        assert_eq!(a.id, b.id);
        assert_eq!(a.created_at, b.created_at);
    }
}
