//! camview - receive-only WebRTC camera viewer
//!
//! Negotiates a single viewing session with a camera server and enforces the
//! server's maximum connection time.

mod api;
mod config;
mod session;
mod tui;
mod viewer;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use tui::log_capture::LogBuffer;

#[derive(Parser)]
#[command(name = "camview")]
#[command(about = "Receive-only WebRTC viewer for a camera server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Camera server URL (overrides the config file)
    #[arg(long, global = true)]
    server: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a session immediately and follow it until it ends
    Watch,

    /// Control the session from stdin (start, stop, status, quit)
    Console,

    /// Launch interactive terminal UI
    Tui,

    /// Show the config file path and effective settings
    Config {
        /// Write the effective settings to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let logs = LogBuffer::new();
    if matches!(cli.command, Commands::Tui) {
        // stderr output would tear the alternate screen
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(logs.clone()),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }

    let mut config = Config::load()?;
    if let Some(server) = cli.server {
        config.server_url = server;
    }

    match cli.command {
        Commands::Watch => {
            viewer::run_watch(&config).await?;
        }
        Commands::Console => {
            viewer::run_console(&config).await?;
        }
        Commands::Tui => {
            tui::run(&config, logs).await?;
        }
        Commands::Config { init } => {
            if init {
                let path = config.save()?;
                println!("Wrote {}", path.display());
            } else {
                println!("# {}", Config::config_path()?.display());
                print!("{}", config.to_toml()?);
            }
        }
    }

    Ok(())
}
