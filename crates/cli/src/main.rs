//! Council CLI, the main entry point.
//!
//! Commands:
//! - `init`    : Write the default config file
//! - `list`    : List conversations
//! - `new`     : Create a conversation
//! - `show`    : Render a stored conversation
//! - `ask`     : Ask the council and stream the run
//! - `status`  : Show configuration and server reachability

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use council_config::AppConfig;

mod commands;
mod render;

#[derive(Parser)]
#[command(
    name = "council",
    about = "Council: ask a council of LLMs, ranked by their peers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.council/config.toml
    #[arg(short, long, global = true, env = "COUNCIL_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init,

    /// List conversations
    List,

    /// Create a new conversation
    New,

    /// Render a stored conversation
    Show {
        /// Conversation id
        id: String,
    },

    /// Ask the council a question
    Ask {
        /// Continue this conversation instead of creating one
        #[arg(short, long)]
        conversation: Option<String>,

        /// The question
        message: String,
    },

    /// Show configuration and server reachability
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so rendered answers on stdout stay clean
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.unwrap_or_else(AppConfig::config_path);

    if let Commands::Init = cli.command {
        return commands::init::run(&config_path);
    }

    let config = AppConfig::load_with_overrides(&config_path)
        .map_err(|e| format!("Failed to load config: {e}"))?;

    match cli.command {
        Commands::Init => {}
        Commands::List => commands::list::run(&config).await?,
        Commands::New => commands::new::run(&config).await?,
        Commands::Show { id } => commands::show::run(&config, &id).await?,
        Commands::Ask {
            conversation,
            message,
        } => commands::ask::run(&config, conversation, &message).await?,
        Commands::Status => commands::status::run(&config, &config_path).await?,
    }

    Ok(())
}
