// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as URL schemes and backoff bounds.

use crate::diagnostic::ConfigError;
use crate::model::CarelinkConfig;

/// Smallest permitted reconnect backoff. The channel must never spin with
/// zero-delay retries.
const MIN_BACKOFF_BASE_MS: u64 = 100;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CarelinkConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let api_url = config.api.base_url.trim();
    if api_url.is_empty() {
        errors.push(ConfigError::Validation {
            message: "api.base_url must not be empty".to_string(),
        });
    } else if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
        errors.push(ConfigError::Validation {
            message: format!("api.base_url `{api_url}` must use http:// or https://"),
        });
    }

    let ws_url = config.channel.url.trim();
    if ws_url.is_empty() {
        errors.push(ConfigError::Validation {
            message: "channel.url must not be empty".to_string(),
        });
    } else if !ws_url.starts_with("ws://") && !ws_url.starts_with("wss://") {
        errors.push(ConfigError::Validation {
            message: format!("channel.url `{ws_url}` must use ws:// or wss://"),
        });
    }

    if config.channel.backoff_base_ms < MIN_BACKOFF_BASE_MS {
        errors.push(ConfigError::Validation {
            message: format!(
                "channel.backoff_base_ms must be at least {MIN_BACKOFF_BASE_MS}, got {}",
                config.channel.backoff_base_ms
            ),
        });
    }

    if config.channel.backoff_max_ms < config.channel.backoff_base_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "channel.backoff_max_ms ({}) must not be below channel.backoff_base_ms ({})",
                config.channel.backoff_max_ms, config.channel.backoff_base_ms
            ),
        });
    }

    if config.api.request_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "api.request_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.assistant.stream_idle_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "assistant.stream_idle_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.assistant.max_images == 0 {
        errors.push(ConfigError::Validation {
            message: "assistant.max_images must be at least 1".to_string(),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
