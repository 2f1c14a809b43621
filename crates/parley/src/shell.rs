// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley shell` - an interactive harness over the full runtime pipeline.
//!
//! Each line you type is treated as one inbound platform message: it is
//! claimed through the idempotency guard, persisted as a user turn, and
//! enqueued on the lane scheduler, which invokes a built-in echo agent and
//! delivers the reply back to the terminal. Useful for poking at the
//! runtime without any platform adapter attached.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::warn;

use parley_config::ParleyConfig;
use parley_core::{
    AgentInvoker, ConversationKey, CorrectionSource, DeliveryCallback, InvokeOutcome,
    ParleyError, QueuedMessage, TurnContext,
};
use parley_guard::IdempotencyGuard;
use parley_history::{HistoryEntry, HistoryStore};
use parley_scheduler::{DeliveryRegistry, LaneScheduler, install_signal_handler};

const SHELL_CHANNEL: &str = "shell";
const SHELL_KEY: &str = "shell:local";

/// Built-in agent for the shell: echoes the merged turn text back.
struct EchoInvoker;

#[async_trait]
impl AgentInvoker for EchoInvoker {
    async fn invoke(
        &self,
        ctx: &TurnContext,
        corrections: &dyn CorrectionSource,
    ) -> Result<InvokeOutcome, ParleyError> {
        let mut text = ctx.text.clone();
        loop {
            let batch = corrections.drain();
            if batch.is_empty() {
                break;
            }
            for msg in batch {
                text.push('\n');
                text.push_str(&msg.text);
            }
        }
        Ok(InvokeOutcome::success(format!("(echo) {text}")))
    }
}

/// Prints delivered outcomes to the terminal.
struct TerminalDelivery;

#[async_trait]
impl DeliveryCallback for TerminalDelivery {
    async fn deliver(
        &self,
        _ctx: &TurnContext,
        outcome: &InvokeOutcome,
    ) -> Result<(), ParleyError> {
        match outcome {
            InvokeOutcome::Success { text, .. } => {
                println!("{} {}", "parley>".green().bold(), text);
            }
            InvokeOutcome::Failure { kind, detail } => {
                println!("{} [{kind}] {detail}", "parley!".red().bold());
            }
        }
        Ok(())
    }
}

/// Runs the interactive shell until EOF (Ctrl+D) or interrupt.
pub async fn run_shell(config: ParleyConfig) -> Result<(), ParleyError> {
    crate::init_tracing(&config.runtime.log_level);

    let data_dir = Path::new(&config.storage.data_dir);
    let guard = IdempotencyGuard::new(data_dir.join("claims"));
    let history = Arc::new(HistoryStore::new(
        data_dir.join("history"),
        config.storage.archive_threshold,
    ));

    let mut registry = DeliveryRegistry::new();
    registry.insert(SHELL_CHANNEL.to_string(), Arc::new(TerminalDelivery));
    let scheduler = LaneScheduler::new(
        config.scheduler.clone(),
        Arc::clone(&history),
        Arc::new(EchoInvoker),
        registry,
    );

    println!(
        "{} conversation {} (Ctrl+D to exit)",
        "parley shell".bold(),
        SHELL_KEY.cyan()
    );

    // SIGTERM during an in-flight turn drains it instead of cutting it off.
    let shutdown_token = install_signal_handler();

    let mut editor =
        DefaultEditor::new().map_err(|e| ParleyError::Internal(e.to_string()))?;

    loop {
        match editor.readline(&format!("{} ", "you>".cyan().bold())) {
            Ok(line) => {
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(text);
                handle_line(&guard, &history, &scheduler, text).await;

                // Serial harness: wait for the turn to finish so the reply
                // prints before the next prompt.
                while scheduler.is_busy() && !shutdown_token.is_cancelled() {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                }
                if shutdown_token.is_cancelled() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                warn!(error = %e, "readline error");
                break;
            }
        }
    }

    scheduler.shutdown().await;
    println!("bye");
    Ok(())
}

/// One inbound message: claim, persist the user turn, enqueue.
async fn handle_line(
    guard: &IdempotencyGuard,
    history: &HistoryStore,
    scheduler: &LaneScheduler,
    text: &str,
) {
    let message_id = uuid::Uuid::new_v4().to_string();
    let outcome = guard
        .claim(SHELL_CHANNEL, SHELL_KEY, &message_id, None)
        .await;
    if !outcome.claimed {
        // Freshly minted ids never collide; this would be a guard bug.
        warn!(message_id = message_id.as_str(), "duplicate claim in shell");
        return;
    }

    if let Err(e) = history.append(&HistoryEntry::user(SHELL_KEY, text)).await {
        warn!(error = %e, "failed to persist user turn");
    }

    scheduler.enqueue(QueuedMessage {
        channel: SHELL_CHANNEL.to_string(),
        conversation_key: ConversationKey::from(SHELL_KEY),
        external_chat_id: "terminal".to_string(),
        text: text.to_string(),
        thread_id: None,
        external_message_id: Some(message_id),
        actor: None,
    });
}
