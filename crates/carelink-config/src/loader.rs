// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./carelink.toml` > `~/.config/carelink/carelink.toml`
//! > `/etc/carelink/carelink.toml` with environment variable overrides via the
//! `CARELINK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CarelinkConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/carelink/carelink.toml` (system-wide)
/// 3. `~/.config/carelink/carelink.toml` (user XDG config)
/// 4. `./carelink.toml` (local directory)
/// 5. `CARELINK_*` environment variables
pub fn load_config() -> Result<CarelinkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CarelinkConfig::default()))
        .merge(Toml::file("/etc/carelink/carelink.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("carelink/carelink.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("carelink.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<CarelinkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CarelinkConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CarelinkConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CarelinkConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `CARELINK_API_BASE_URL` must map to
/// `api.base_url`, not `api.base.url`.
fn env_provider() -> Env {
    Env::prefixed("CARELINK_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: CARELINK_API_BASE_URL -> "api_base_url"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("profile_", "profile.", 1)
            .replacen("api_", "api.", 1)
            .replacen("channel_", "channel.", 1)
            .replacen("assistant_", "assistant.", 1);
        mapped.into()
    })
}
