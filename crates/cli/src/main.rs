//! MoonAgent CLI: the main entry point.
//!
//! Commands:
//! - `run`: Run one task to completion and print the aggregated result
//! - `stream`: Run one task, printing each step as it completes
//! - `chat`: Interactive session with tool-call review on interrupts
//! - `config`: Show, locate, initialize or validate the configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "moonagent",
    about = "MoonAgent: ReAct agent execution engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Answer with a scripted model instead of calling the configured backend
    #[arg(long, global = true, env = "MOONAGENT_OFFLINE")]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task and print the aggregated result
    Run {
        /// The task to run
        #[arg(short, long, required_unless_present = "resume")]
        message: Option<String>,

        /// Resume the suspended run stored under this checkpoint id
        #[arg(long)]
        resume: Option<String>,

        /// Replace the pending tool call's JSON arguments before resuming
        #[arg(long, requires = "resume")]
        args: Option<String>,
    },

    /// Run a task, printing each step result as it is produced
    Stream {
        /// The task to run
        #[arg(short, long)]
        message: String,
    },

    /// Start an interactive session
    Chat,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Load and validate the config file
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            message,
            resume,
            args,
        } => commands::run::run(message, resume, args, cli.offline).await?,
        Commands::Stream { message } => commands::stream::run(message, cli.offline).await?,
        Commands::Chat => commands::chat::run(cli.offline).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Init { force } => commands::config_cmd::init(force)?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
        },
    }

    Ok(())
}
