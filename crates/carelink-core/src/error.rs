// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Carelink client core.

use thiserror::Error;

/// The primary error type used across all Carelink transport and store operations.
#[derive(Debug, Error)]
pub enum CarelinkError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// The bearer credential was rejected (HTTP 401 anywhere in the subsystem).
    ///
    /// The originating transport has already notified the registered
    /// [`SessionGuard`](crate::auth::SessionGuard); callers should let the
    /// operation fail and not retry.
    #[error("session invalid: credential rejected by the server")]
    Auth,

    /// HTTP transport errors (network failure, non-2xx response, bad body).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A malformed record inside an otherwise healthy event stream.
    #[error("stream error: {message}")]
    Stream { message: String },

    /// Duplex channel errors (connect failure, send on closed socket, bad frame).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CarelinkError {
    /// Convenience constructor for transport errors with a source.
    pub fn transport(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Convenience constructor for transport errors without a source.
    pub fn transport_msg(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Convenience constructor for channel errors with a source.
    pub fn channel(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Channel {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Convenience constructor for channel errors without a source.
    pub fn channel_msg(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
            source: None,
        }
    }
}
