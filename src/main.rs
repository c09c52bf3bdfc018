use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pmboard::config::BoardConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "pmboard")]
#[command(version, about = "Project board server with sprints, analytics and overdue reminders")]
pub struct Cli {
    /// Directory holding `.pmboard/` and the JSON data directory
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Log level or filter directives (overrides RUST_LOG and pmboard.toml)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and WebSocket server
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// Enable dev mode (permissive CORS for a separately served front-end)
        #[arg(long)]
        dev: bool,
    },
    /// Write a default pmboard.toml and create the database
    Init {
        /// Overwrite an existing pmboard.toml
        #[arg(long)]
        force: bool,
    },
    /// Replace the database content with a JSON snapshot directory
    Import {
        /// Directory to read (defaults to the configured JSON directory)
        #[arg(long)]
        from: Option<PathBuf>,

        /// Import even when the database already holds data
        #[arg(long)]
        force: bool,
    },
    /// Write the database to a JSON snapshot directory
    Export {
        /// Directory to write (defaults to the configured JSON directory)
        #[arg(long)]
        to: Option<PathBuf>,
    },
    /// Mail the overdue-card digest now
    NotifyOverdue,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let mut config = BoardConfig::resolve(&project_dir)?;
    if let Some(dir) = config.logging.dir.take() {
        config.logging.dir = Some(project_dir.join(dir));
    }
    let _guard = pmboard::logging::init(&config.logging, cli.log_level.as_deref())?;

    match cli.command {
        Commands::Serve { host, port, dev } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.server.dev |= dev;
            cmd::cmd_serve(project_dir, config).await?;
        }
        Commands::Init { force } => cmd::cmd_init(&project_dir, &config, force).await?,
        Commands::Import { from, force } => {
            cmd::cmd_import(&project_dir, &config, from.as_deref(), force)?
        }
        Commands::Export { to } => cmd::cmd_export(&project_dir, &config, to.as_deref())?,
        Commands::NotifyOverdue => cmd::cmd_notify_overdue(&project_dir, &config).await?,
    }

    Ok(())
}
