// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE stream parser for assistant streaming responses.
//!
//! Converts a reqwest response byte stream into typed [`StreamEvent`]
//! variants using the `eventsource-stream` crate. The crate buffers partial
//! records split across network reads; a record is only surfaced once its
//! blank-line terminator has arrived.

use std::pin::Pin;

use carelink_core::CarelinkError;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};

use crate::event::{
    ErrorEvent, MessageCompleteEvent, MetadataEvent, RiskCheckEvent, StreamEvent, TextDeltaEvent,
    ToolEndEvent, ToolStartEvent,
};

/// Parses a reqwest streaming response into a stream of typed [`StreamEvent`]s.
///
/// Each SSE record is deserialized into the matching [`StreamEvent`] variant
/// based on the event name. Unknown event names are silently skipped so that
/// server-side protocol additions do not break older clients. A malformed
/// payload yields an `Err` item and the stream continues with the next record.
pub fn parse_event_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, CarelinkError>> + Send>> {
    let byte_stream = response.bytes_stream();
    let event_stream = byte_stream.eventsource();

    let mapped = event_stream.filter_map(|result| async move {
        match result {
            Ok(event) => {
                let parsed = match event.event.as_str() {
                    "risk_check" => serde_json::from_str::<RiskCheckEvent>(&event.data)
                        .map(StreamEvent::RiskCheck)
                        .map_err(|e| CarelinkError::Stream {
                            message: format!("failed to parse risk_check: {e}"),
                        }),
                    "tool_start" => serde_json::from_str::<ToolStartEvent>(&event.data)
                        .map(StreamEvent::ToolStart)
                        .map_err(|e| CarelinkError::Stream {
                            message: format!("failed to parse tool_start: {e}"),
                        }),
                    "tool_end" => serde_json::from_str::<ToolEndEvent>(&event.data)
                        .map(StreamEvent::ToolEnd)
                        .map_err(|e| CarelinkError::Stream {
                            message: format!("failed to parse tool_end: {e}"),
                        }),
                    "text_delta" => serde_json::from_str::<TextDeltaEvent>(&event.data)
                        .map(StreamEvent::TextDelta)
                        .map_err(|e| CarelinkError::Stream {
                            message: format!("failed to parse text_delta: {e}"),
                        }),
                    "message_complete" => {
                        serde_json::from_str::<MessageCompleteEvent>(&event.data)
                            .map(StreamEvent::MessageComplete)
                            .map_err(|e| CarelinkError::Stream {
                                message: format!("failed to parse message_complete: {e}"),
                            })
                    }
                    "metadata" => serde_json::from_str::<MetadataEvent>(&event.data)
                        .map(StreamEvent::Metadata)
                        .map_err(|e| CarelinkError::Stream {
                            message: format!("failed to parse metadata: {e}"),
                        }),
                    "error" => serde_json::from_str::<ErrorEvent>(&event.data)
                        .map(StreamEvent::Error)
                        .map_err(|e| CarelinkError::Stream {
                            message: format!("failed to parse error event: {e}"),
                        }),
                    // Unknown event names are skipped for forward compatibility.
                    _ => return None,
                };
                Some(parsed)
            }
            Err(e) => Some(Err(CarelinkError::Stream {
                message: format!("event stream error: {e}"),
            })),
        }
    });

    Box::pin(mapped)
}
