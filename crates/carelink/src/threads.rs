// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `carelink threads` command implementation.
//!
//! Loads the first page of thread summaries through the thread store and
//! prints them with unread counts.

use std::sync::Arc;
use std::time::Duration;

use carelink_config::CarelinkConfig;
use carelink_core::{BearerToken, CarelinkError, LatchingSessionGuard};
use carelink_rest::RestClient;
use carelink_store::ThreadStore;
use colored::Colorize;

/// Runs the `carelink threads` listing.
pub async fn run_threads(config: CarelinkConfig) -> Result<(), CarelinkError> {
    let Some(token) = config.api.token.as_deref() else {
        return Err(CarelinkError::Config(
            "no credential configured: set api.token in carelink.toml or CARELINK_API_TOKEN"
                .to_string(),
        ));
    };

    let rest = Arc::new(RestClient::new(
        config.api.base_url.clone(),
        &BearerToken::new(token),
        Arc::new(LatchingSessionGuard::new()),
        Duration::from_secs(config.api.request_timeout_secs),
    )?);

    let user_id = config.profile.user_id.clone().unwrap_or_default();
    let store = ThreadStore::new(rest, config.profile.role, user_id);
    store.load_threads(None, false).await?;

    let threads = store.threads().await;
    if threads.is_empty() {
        println!("{}", "no threads".dimmed());
        return Ok(());
    }

    for thread in &threads {
        let unread = if thread.unread_count > 0 {
            format!(" ({} unread)", thread.unread_count).yellow().to_string()
        } else {
            String::new()
        };
        let locked = if thread.can_send_message {
            ""
        } else {
            " [pending approval]"
        };
        println!(
            "{}  {}{}{}",
            thread.id.0.dimmed(),
            thread.counterpart_name.bold(),
            unread,
            locked.dimmed()
        );
        if let Some(preview) = &thread.last_message_preview {
            println!("    {}", preview.dimmed());
        }
    }

    let total = store.total_unread().await;
    if total > 0 {
        println!("{}", format!("total unread: {total}").yellow());
    }
    Ok(())
}
