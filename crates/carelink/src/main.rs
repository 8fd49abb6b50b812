// SPDX-FileCopyrightText: 2026 Carelink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Carelink - command line client for the Carelink care-messaging platform.
//!
//! This is the binary entry point.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod shell;
mod threads;
mod watch;

/// Carelink - patient/clinician messaging from the terminal.
#[derive(Parser, Debug)]
#[command(name = "carelink", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch an interactive assistant chat session.
    Shell,
    /// List message threads with unread counts.
    Threads,
    /// Tail one thread live over the push channel.
    Watch {
        /// Thread id to watch.
        thread_id: String,
    },
    /// Print the resolved configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup.
    let config = match carelink_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            carelink_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.profile.log_level.clone())),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Some(Commands::Shell) => shell::run_shell(config).await,
        Some(Commands::Threads) => threads::run_threads(config).await,
        Some(Commands::Watch { thread_id }) => watch::run_watch(config, thread_id).await,
        Some(Commands::Config) => {
            match toml::to_string_pretty(&config) {
                Ok(rendered) => {
                    println!("{rendered}");
                    Ok(())
                }
                Err(e) => Err(carelink_core::CarelinkError::Internal(format!(
                    "failed to render config: {e}"
                ))),
            }
        }
        None => {
            println!("carelink: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
