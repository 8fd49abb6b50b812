// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Carelink client.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use carelink_core::PartyRole;
use serde::{Deserialize, Serialize};

/// Top-level Carelink configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CarelinkConfig {
    /// Local user identity and logging settings.
    #[serde(default)]
    pub profile: ProfileConfig,

    /// REST API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Duplex push channel settings.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Streaming assistant settings.
    #[serde(default)]
    pub assistant: AssistantConfig,
}

/// Local user identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    /// The current user's id as known by the platform.
    #[serde(default)]
    pub user_id: Option<String>,

    /// Which side of a thread the current user is.
    #[serde(default = "default_role")]
    pub role: PartyRole,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            user_id: None,
            role: default_role(),
            log_level: default_log_level(),
        }
    }
}

fn default_role() -> PartyRole {
    PartyRole::Patient
}

fn default_log_level() -> String {
    "info".to_string()
}

/// REST API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL of the platform's REST API.
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Bearer credential. `None` requires the environment variable.
    #[serde(default)]
    pub token: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.carelink.example".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Duplex push channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// WebSocket URL of the push channel.
    #[serde(default = "default_channel_url")]
    pub url: String,

    /// Initial reconnect backoff in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Maximum reconnect backoff in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: default_channel_url(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_channel_url() -> String {
    "wss://api.carelink.example/ws".to_string()
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

/// Streaming assistant configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AssistantConfig {
    /// Idle timeout between stream events before a turn is failed, in seconds.
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,

    /// Maximum images attached to one turn.
    #[serde(default = "default_max_images")]
    pub max_images: usize,

    /// Maximum size of a single attached image in bytes.
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
            max_images: default_max_images(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

fn default_stream_idle_timeout_secs() -> u64 {
    60
}

fn default_max_images() -> usize {
    4
}

fn default_max_image_bytes() -> usize {
    5 * 1024 * 1024
}
