// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The REST client implementation.

use std::sync::Arc;
use std::time::Duration;

use carelink_core::{
    Attachment, BearerToken, CarelinkError, MessageId, SessionGuard, Thread, ThreadId,
    ThreadMessage,
};
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::debug;

use crate::types::{SendMessageRequest, StartThreadRequest, ThreadHistory, ThreadPage};

/// Typed client for the Carelink REST surface.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    guard: Arc<dyn SessionGuard>,
}

impl RestClient {
    /// Creates a REST client with the bearer credential installed as a
    /// default header.
    pub fn new(
        base_url: impl Into<String>,
        token: &BearerToken,
        guard: Arc<dyn SessionGuard>,
        request_timeout: Duration,
    ) -> Result<Self, CarelinkError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&token.header_value())
                .map_err(|e| CarelinkError::Config(format!("invalid bearer token: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()
            .map_err(|e| CarelinkError::transport("failed to build HTTP client", e))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            guard,
        })
    }

    /// Lists a page of thread summaries, optionally filtered by a search
    /// term.
    pub async fn list_threads(
        &self,
        search: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<ThreadPage, CarelinkError> {
        let mut request = self
            .client
            .get(format!("{}/v1/threads", self.base_url))
            .query(&[("page", page.to_string()), ("page_size", page_size.to_string())]);
        if let Some(search) = search {
            request = request.query(&[("search", search)]);
        }

        let response = self.send(request).await?;
        self.decode(response).await
    }

    /// Fetches one backward page of a thread's history.
    ///
    /// `before` is an exclusive cursor: only messages older than it are
    /// returned. `None` fetches the newest page.
    pub async fn get_thread(
        &self,
        id: &ThreadId,
        before: Option<&MessageId>,
        limit: u32,
    ) -> Result<ThreadHistory, CarelinkError> {
        let mut request = self
            .client
            .get(format!("{}/v1/threads/{}/messages", self.base_url, id.0))
            .query(&[("limit", limit.to_string())]);
        if let Some(before) = before {
            request = request.query(&[("before", before.0.as_str())]);
        }

        let response = self.send(request).await?;
        self.decode(response).await
    }

    /// Sends a message and returns the server-confirmed copy.
    pub async fn send_message(
        &self,
        thread_id: &ThreadId,
        body: &SendMessageRequest,
    ) -> Result<ThreadMessage, CarelinkError> {
        let request = self
            .client
            .post(format!("{}/v1/threads/{}/messages", self.base_url, thread_id.0))
            .json(body);

        let response = self.send(request).await?;
        self.decode(response).await
    }

    /// Marks every message in the thread as read by the current user.
    pub async fn mark_thread_read(&self, thread_id: &ThreadId) -> Result<(), CarelinkError> {
        let request = self
            .client
            .post(format!("{}/v1/threads/{}/read", self.base_url, thread_id.0));

        self.send(request).await?;
        Ok(())
    }

    /// Uploads an attachment (one-shot multipart) and returns the opaque
    /// reference to hand to [`send_message`](Self::send_message).
    pub async fn upload_attachment(
        &self,
        file_name: &str,
        media_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Attachment, CarelinkError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(media_type)
            .map_err(|e| CarelinkError::Config(format!("invalid media type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let request = self
            .client
            .post(format!("{}/v1/attachments", self.base_url))
            .multipart(form);

        let response = self.send(request).await?;
        self.decode(response).await
    }

    /// Starts a thread with a counterpart (doctor-initiated).
    pub async fn start_thread(&self, counterpart_id: &str) -> Result<Thread, CarelinkError> {
        let request = self
            .client
            .post(format!("{}/v1/threads", self.base_url))
            .json(&StartThreadRequest {
                counterpart_id: counterpart_id.to_string(),
            });

        let response = self.send(request).await?;
        self.decode(response).await
    }

    /// Sends the request and applies the shared status policy: 401 fires
    /// the session guard and maps to `Auth`; any other non-2xx maps to
    /// `Transport` with the body attached.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, CarelinkError> {
        let response = request
            .send()
            .await
            .map_err(|e| CarelinkError::transport("request failed", e))?;

        let status = response.status();
        debug!(status = %status, "REST response received");

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.guard.on_session_invalid();
            return Err(CarelinkError::Auth);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CarelinkError::transport_msg(format!(
                "server returned {status}: {body}"
            )));
        }

        Ok(response)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CarelinkError> {
        let body = response
            .text()
            .await
            .map_err(|e| CarelinkError::transport("failed to read response body", e))?;
        serde_json::from_str(&body)
            .map_err(|e| CarelinkError::transport_msg(format!("failed to parse response: {e}")))
    }
}
