// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the assistant streaming endpoint.
//!
//! Provides [`AssistantClient`] which handles request construction, bearer
//! authentication, image validation, and opening the event stream. A failed
//! request never yields partial events: the HTTP status is checked before
//! any stream parsing begins.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use carelink_core::{BearerToken, CarelinkError, SessionGuard};
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::debug;

use crate::event::{ImageAttachment, StreamEvent, TurnRequest};
use crate::sse;

/// Streaming endpoint path, relative to the API base URL.
const STREAM_PATH: &str = "/v1/chat/stream";

/// Media types accepted for inline images.
const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Limits applied to inline images before a turn is sent.
#[derive(Debug, Clone, Copy)]
pub struct ImageLimits {
    pub max_count: usize,
    pub max_bytes: usize,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_count: 4,
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

impl ImageLimits {
    /// Builds limits from the assistant config section.
    pub fn from_config(config: &carelink_config::model::AssistantConfig) -> Self {
        Self {
            max_count: config.max_images,
            max_bytes: config.max_image_bytes,
        }
    }
}

/// HTTP client for assistant streaming turns.
#[derive(Clone)]
pub struct AssistantClient {
    client: reqwest::Client,
    base_url: String,
    guard: Arc<dyn SessionGuard>,
    limits: ImageLimits,
}

impl AssistantClient {
    /// Creates a new assistant client.
    ///
    /// The bearer credential is installed as a default header; the
    /// [`SessionGuard`] is notified on any 401 response.
    pub fn new(
        base_url: impl Into<String>,
        token: &BearerToken,
        guard: Arc<dyn SessionGuard>,
        request_timeout: Duration,
        limits: ImageLimits,
    ) -> Result<Self, CarelinkError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&token.header_value())
                .map_err(|e| CarelinkError::Config(format!("invalid bearer token: {e}")))?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            // The connection carries a long-lived stream; only connection
            // establishment is bounded here.
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| CarelinkError::transport("failed to build HTTP client", e))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            guard,
            limits,
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Opens one streaming turn and returns the typed event stream.
    ///
    /// On 401 the session guard fires and the call returns
    /// [`CarelinkError::Auth`]; any other non-2xx status returns a transport
    /// error. No events are ever yielded for a failed request.
    pub async fn stream_turn(
        &self,
        request: &TurnRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent, CarelinkError>> + Send>>, CarelinkError>
    {
        if let Some(images) = &request.images {
            validate_images(images, self.limits)?;
        }

        let url = format!("{}{STREAM_PATH}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| CarelinkError::transport("streaming request failed", e))?;

        let status = response.status();
        debug!(status = %status, "streaming response received");

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.guard.on_session_invalid();
            return Err(CarelinkError::Auth);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CarelinkError::transport_msg(format!(
                "assistant endpoint returned {status}: {body}"
            )));
        }

        Ok(sse::parse_event_stream(response))
    }
}

/// Checks image count, per-image size, and media type allow list.
pub fn validate_images(images: &[ImageAttachment], limits: ImageLimits) -> Result<(), CarelinkError> {
    if images.len() > limits.max_count {
        return Err(CarelinkError::Config(format!(
            "at most {} images per turn, got {}",
            limits.max_count,
            images.len()
        )));
    }

    for image in images {
        if !ALLOWED_IMAGE_TYPES.contains(&image.media_type.as_str()) {
            return Err(CarelinkError::Config(format!(
                "unsupported image media type `{}`",
                image.media_type
            )));
        }
        // Base64 inflates by 4/3; compare against the decoded size.
        let decoded_len = image.data.len() / 4 * 3;
        if decoded_len > limits.max_bytes {
            return Err(CarelinkError::Config(format!(
                "image exceeds {} byte limit",
                limits.max_bytes
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelink_core::LatchingSessionGuard;
    use futures::StreamExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str, guard: Arc<LatchingSessionGuard>) -> AssistantClient {
        AssistantClient::new(
            "http://unused.example",
            &BearerToken::new("test-token"),
            guard,
            Duration::from_secs(5),
            ImageLimits::default(),
        )
        .unwrap()
        .with_base_url(base_url.to_string())
    }

    fn test_request() -> TurnRequest {
        TurnRequest {
            message: "Hello".into(),
            conversation_id: None,
            images: None,
        }
    }

    #[tokio::test]
    async fn stream_turn_sends_bearer_and_parses_events() {
        let server = MockServer::start().await;
        let sse = "event: message_complete\ndata: {\"content\":\"Hi\"}\n\n";

        Mock::given(method("POST"))
            .and(path("/v1/chat/stream"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let guard = Arc::new(LatchingSessionGuard::new());
        let client = test_client(&server.uri(), guard.clone());
        let mut stream = client.stream_turn(&test_request()).await.unwrap();

        let event = stream.next().await.unwrap().unwrap();
        assert!(matches!(event, StreamEvent::MessageComplete(ref ev) if ev.content == "Hi"));
        assert!(!guard.is_invalidated());
    }

    #[tokio::test]
    async fn unauthorized_fires_session_guard_and_yields_no_events() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/stream"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let guard = Arc::new(LatchingSessionGuard::new());
        let client = test_client(&server.uri(), guard.clone());
        let result = client.stream_turn(&test_request()).await;

        assert!(matches!(result, Err(CarelinkError::Auth)));
        assert!(guard.is_invalidated());
    }

    #[tokio::test]
    async fn server_error_is_transport_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/stream"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let guard = Arc::new(LatchingSessionGuard::new());
        let client = test_client(&server.uri(), guard.clone());
        let result = client.stream_turn(&test_request()).await;

        match result {
            Err(CarelinkError::Transport { message, .. }) => {
                assert!(message.contains("503"), "got: {message}");
            }
            Ok(_) => panic!("expected Transport error, got Ok(stream)"),
            Err(other) => panic!("expected Transport error, got {other:?}"),
        }
        assert!(!guard.is_invalidated());
    }

    #[test]
    fn too_many_images_rejected() {
        let limits = ImageLimits {
            max_count: 2,
            max_bytes: 1024,
        };
        let image = ImageAttachment {
            media_type: "image/png".into(),
            data: "aaaa".into(),
        };
        let images = vec![image.clone(), image.clone(), image];
        assert!(validate_images(&images, limits).is_err());
    }

    #[test]
    fn disallowed_media_type_rejected() {
        let images = vec![ImageAttachment {
            media_type: "image/tiff".into(),
            data: "aaaa".into(),
        }];
        assert!(validate_images(&images, ImageLimits::default()).is_err());
    }

    #[test]
    fn oversized_image_rejected() {
        let limits = ImageLimits {
            max_count: 4,
            max_bytes: 16,
        };
        let images = vec![ImageAttachment {
            media_type: "image/jpeg".into(),
            data: "a".repeat(64),
        }];
        assert!(validate_images(&images, limits).is_err());
    }

    #[test]
    fn valid_images_pass() {
        let images = vec![ImageAttachment {
            media_type: "image/jpeg".into(),
            data: "aGVsbG8=".into(),
        }];
        assert!(validate_images(&images, ImageLimits::default()).is_ok());
    }
}
