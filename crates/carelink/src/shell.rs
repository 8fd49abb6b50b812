// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `carelink shell` command implementation.
//!
//! Launches an interactive assistant chat with colored streaming output and
//! readline history. Text deltas print as they arrive; tool-call lifecycle
//! events render as dimmed status lines; a risk alert prints a banner the
//! moment the metadata event carries one.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use carelink_assistant::{
    AssistantClient, ChatSession, CrisisListener, ImageLimits, StreamEvent,
};
use carelink_config::CarelinkConfig;
use carelink_core::{BearerToken, CarelinkError, ConversationId, LatchingSessionGuard};
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

/// Prints the crisis banner when a turn raises a risk alert.
struct BannerCrisisListener;

impl CrisisListener for BannerCrisisListener {
    fn on_risk_alert(&self, _conversation_id: Option<&ConversationId>) {
        eprintln!();
        eprintln!(
            "{}",
            "If you are in crisis, contact your care team or local emergency services now."
                .red()
                .bold()
        );
    }
}

/// Runs the `carelink shell` interactive chat.
pub async fn run_shell(config: CarelinkConfig) -> Result<(), CarelinkError> {
    let token = resolve_token(&config)?;
    let guard = Arc::new(LatchingSessionGuard::new());

    let client = AssistantClient::new(
        config.api.base_url.clone(),
        &token,
        guard.clone(),
        Duration::from_secs(config.api.request_timeout_secs),
        ImageLimits::from_config(&config.assistant),
    )?;

    let mut session = ChatSession::new(
        client,
        Duration::from_secs(config.assistant.stream_idle_timeout_secs),
    )
    .with_crisis_listener(Arc::new(BannerCrisisListener));

    let mut editor = DefaultEditor::new()
        .map_err(|e| CarelinkError::Internal(format!("failed to start readline: {e}")))?;

    println!("{}", "carelink shell -- Ctrl+D to exit".dimmed());

    loop {
        match editor.readline(&"you> ".green().bold().to_string()) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(trimmed);

                if let Err(e) = run_one_turn(&mut session, trimmed).await {
                    match &e {
                        CarelinkError::Auth => {
                            eprintln!("{}", "session expired -- please sign in again".red());
                            break;
                        }
                        _ => eprintln!("{}: {e}", "error".red()),
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C
                break;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D
                break;
            }
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    println!("{}", "goodbye".dimmed());
    Ok(())
}

async fn run_one_turn(session: &mut ChatSession, input: &str) -> Result<(), CarelinkError> {
    let mut streamed_any = false;
    let turn = session
        .send_turn_observed(input, None, |event| match event {
            StreamEvent::TextDelta(delta) => {
                streamed_any = true;
                print!("{}", delta.text);
                let _ = std::io::stdout().flush();
            }
            StreamEvent::ToolStart(tool) => {
                eprintln!("{}", format!("[{} running...]", tool.tool_name).dimmed());
            }
            StreamEvent::ToolEnd(tool) => {
                eprintln!(
                    "{}",
                    format!("[{}: {}]", tool.tool_name, tool.result_preview).dimmed()
                );
            }
            _ => {}
        })
        .await?;

    if streamed_any {
        println!();
    }

    // The terminal content is authoritative; re-print it when it differs
    // from what streamed (or when nothing streamed at all).
    if !streamed_any {
        println!("{}", turn.content);
    }

    if let Some(risk) = &turn.risk {
        debug!(level = %risk.level, "turn risk classification");
    }
    Ok(())
}

fn resolve_token(config: &CarelinkConfig) -> Result<BearerToken, CarelinkError> {
    match &config.api.token {
        Some(token) => Ok(BearerToken::new(token.clone())),
        None => Err(CarelinkError::Config(
            "no credential configured: set api.token in carelink.toml or CARELINK_API_TOKEN"
                .to_string(),
        )),
    }
}
