//! `moonagent config`: Configuration management commands.

use std::path::{Path, PathBuf};

use anyhow::Context;
use moonagent_config::AppConfig;

pub fn config_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

pub fn show() -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;
    redact(&mut config);
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", config_path().display());
}

pub fn init(force: bool) -> anyhow::Result<()> {
    let path = config_path();
    if write_default(&path, force)? {
        println!("✅ Wrote default config to {}", path.display());
    } else {
        println!("  Config already exists at {} (use --force to overwrite)", path.display());
    }
    Ok(())
}

pub fn validate() -> anyhow::Result<()> {
    println!("🔍 Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Model:       {} @ {}", config.model.model, config.model.base_url);
    println!("   Agent:       {}", config.agent.name);
    println!(
        "   Budgets:     {} steps, {} loops",
        config.agent.max_steps, config.agent.max_loops
    );
    println!("   Memory:      {} messages", config.memory.capacity);
    println!("   Checkpoints: {:?}", config.checkpoint.backend);
    Ok(())
}

fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No API key set (set MOONAGENT_API_KEY or OPENAI_API_KEY, or use --offline)");
    }
    if config.checkpoint.interrupt_before_tools
        && config.checkpoint.backend == moonagent_config::CheckpointBackend::Memory
    {
        warnings.push("Interrupts with the memory backend can only be resumed within one process");
    }
    warnings
}

fn redact(config: &mut AppConfig) {
    if config.model.api_key.is_some() {
        config.model.api_key = Some("[REDACTED]".into());
    }
}

/// Write the default config to `path`. Returns `false` if a file already
/// exists and `force` is not set.
fn write_default(path: &Path, force: bool) -> anyhow::Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}
