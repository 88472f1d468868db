pub mod chat;
pub mod config_cmd;
pub mod run;
pub mod stream;

use anyhow::Context;
use moonagent_agent::{Manus, PendingAction};
use moonagent_config::{AppConfig, CheckpointBackend};
use moonagent_core::EventBus;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// Load the config and assemble Manus with the default tools and the
/// configured checkpoint store.
pub fn build_manus(offline: bool) -> anyhow::Result<(AppConfig, Manus)> {
    let config = AppConfig::load().context("Failed to load config")?;

    // Check for API key early to give a clear error
    if !offline && !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    MOONAGENT_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", config_cmd::config_path().display());
        eprintln!();
        eprintln!("  Or pass --offline to use the scripted model.");
        eprintln!();
        anyhow::bail!("No API key found. See above for setup instructions.");
    }

    let model = moonagent_providers::build_from_config(&config.model, offline)?;
    let store = moonagent_checkpoint::build_from_config(&config.checkpoint);
    let manus = Manus::new(&config, model, moonagent_tools::default_tools(), Some(store))?;
    log_events(manus.events());
    Ok((config, manus))
}

/// Forward domain events to the debug log until the bus is dropped.
fn log_events(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => debug!(event = ?event, "Domain event"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Print a held-back tool call.
pub fn print_pending(checkpoint_id: &str, pending: &PendingAction) {
    println!();
    println!("  ⏸  Run suspended before a tool call (checkpoint {checkpoint_id})");
    println!("     Thought:   {}", pending.thought);
    println!("     Tool:      {}", pending.tool_call.function.name);
    println!("     Arguments: {}", pending.tool_call.function.arguments);
    println!();
}

/// Explain how to resume from another process.
pub fn print_resume_hint(config: &AppConfig, checkpoint_id: &str) {
    match config.checkpoint.backend {
        CheckpointBackend::File => {
            println!("  Resume with: moonagent run --resume {checkpoint_id} [--args '<json>']");
        }
        CheckpointBackend::Memory => {
            println!("  Checkpoints are kept in memory and are lost when this process exits.");
            println!("  Set checkpoint.backend = \"file\" to resume later, or use `moonagent chat`.");
        }
    }
}
