// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `carelink watch` command implementation.
//!
//! Opens one thread, marks it read, and tails it live over the duplex push
//! channel until Ctrl+C. Reconnects (and re-subscribes) survive network
//! drops without any action here.

use std::sync::Arc;
use std::time::Duration;

use carelink_channel::DuplexClient;
use carelink_config::CarelinkConfig;
use carelink_core::{BearerToken, CarelinkError, LatchingSessionGuard, ThreadId};
use carelink_rest::RestClient;
use carelink_store::{Delivery, MessageEntry, ThreadStore};
use colored::Colorize;

/// How often the tail loop checks for new entries.
const POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Runs the `carelink watch <thread-id>` live view.
pub async fn run_watch(config: CarelinkConfig, thread_id: String) -> Result<(), CarelinkError> {
    let Some(token) = config.api.token.as_deref() else {
        return Err(CarelinkError::Config(
            "no credential configured: set api.token in carelink.toml or CARELINK_API_TOKEN"
                .to_string(),
        ));
    };
    let token = BearerToken::new(token);
    let guard = Arc::new(LatchingSessionGuard::new());

    let rest = Arc::new(RestClient::new(
        config.api.base_url.clone(),
        &token,
        guard.clone(),
        Duration::from_secs(config.api.request_timeout_secs),
    )?);

    let user_id = config.profile.user_id.clone().unwrap_or_default();
    let store = Arc::new(ThreadStore::new(rest, config.profile.role, user_id));

    let (handle, subs) =
        DuplexClient::spawn(config.channel.clone(), Some(token), store.clone());
    store.attach_subscriptions(subs);

    let id = ThreadId(thread_id);
    store.load_threads(None, false).await?;
    store.open_thread(&id).await?;
    store.mark_open_thread_visible().await?;

    let mut printed = 0usize;
    for entry in &store.open_log().await {
        print_entry(entry);
        printed += 1;
    }
    println!("{}", "watching for new messages -- Ctrl+C to exit".dimmed());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                let log = store.open_log().await;
                for entry in log.iter().skip(printed) {
                    print_entry(entry);
                }
                printed = log.len();
                if guard.is_invalidated() {
                    eprintln!("{}", "session expired -- please sign in again".red());
                    break;
                }
            }
        }
    }

    store.clear_current_thread().await?;
    handle.close();
    Ok(())
}

fn print_entry(entry: &MessageEntry) {
    let message = &entry.message;
    let sender = message.sender_role.to_string();
    let body = message.content.as_deref().unwrap_or("[attachment]");
    let stamp = message.created_at.format("%H:%M");

    let line = format!("{stamp} {sender:>7}  {body}");
    match &entry.delivery {
        Delivery::Confirmed => println!("{line}"),
        Delivery::Pending { .. } => println!("{}", format!("{line} (sending...)").dimmed()),
        Delivery::Failed { error, .. } => {
            println!("{}", format!("{line} (failed: {error})").red())
        }
    }
}
