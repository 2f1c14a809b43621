// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - runtime core of a multi-platform conversational-agent host.
//!
//! This is the binary entry point. Platform adapters live out of process;
//! the binary offers a local shell harness that drives the full
//! claim -> history -> enqueue -> invoke -> deliver pipeline, plus storage
//! introspection commands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod shell;
mod status;

use clap::{Parser, Subcommand};

/// Parley - conversational-agent runtime core.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch an interactive shell against a local echo agent.
    Shell,
    /// Show on-disk runtime state (claims, history, archives).
    Status,
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup.
    let config = match parley_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Shell) => shell::run_shell(config).await,
        Some(Commands::Status) => status::run_status(&config).await,
        Some(Commands::Config) => {
            match toml::to_string_pretty(&config) {
                Ok(rendered) => {
                    print!("{rendered}");
                    Ok(())
                }
                Err(e) => Err(parley_core::ParleyError::Config(e.to_string())),
            }
        }
        None => {
            println!("parley: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber from config, honoring `RUST_LOG`.
fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
