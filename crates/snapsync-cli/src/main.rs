//! SnapSync CLI - Command-line front-end for the sync engine
//!
//! Provides commands for:
//! - Signing in and out (token stored in the system keyring)
//! - Capturing files into the upload queue and running upload passes
//! - Following the feed with its realtime updates
//! - Deleting items and managing the image cache

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use snapsync_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    auth::AuthCommand, capture::CaptureCommand, completions::CompletionsCommand,
    delete::DeleteCommand, feed::FeedCommand, images::ImagesCommand, private::PrivateCommand,
    status::StatusCommand, upload::UploadCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "snapsync", version, about = "Offline-first photo sync client")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sign in, sign out and show the signed-in user
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Queue a file for upload and run an upload pass
    Capture(CaptureCommand),
    /// Run one upload pass
    Upload(UploadCommand),
    /// Show queue counts and settings
    Status(StatusCommand),
    /// Turn private mode on or off
    Private(PrivateCommand),
    /// Load the feed and follow realtime updates until interrupted
    Feed(FeedCommand),
    /// Delete an item on the server
    Delete(DeleteCommand),
    /// Manage downloaded image variants
    #[command(subcommand)]
    Images(ImagesCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::load_or_default(&Config::default_path())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    // RUST_LOG wins, then -v, then the configured level
    let level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!(%problem, "Invalid configuration");
        }
        anyhow::bail!("Configuration has {} problem(s)", problems.len());
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Auth(cmd) => cmd.execute(&config, format).await,
        Commands::Capture(cmd) => cmd.execute(&config, format).await,
        Commands::Upload(cmd) => cmd.execute(&config, format).await,
        Commands::Status(cmd) => cmd.execute(&config, format).await,
        Commands::Private(cmd) => cmd.execute(&config, format).await,
        Commands::Feed(cmd) => cmd.execute(&config, format).await,
        Commands::Delete(cmd) => cmd.execute(&config, format).await,
        Commands::Images(cmd) => cmd.execute(&config, format).await,
        Commands::Completions(cmd) => cmd.execute(format).await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["snapsync", "status", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Status(_)));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(load_config(Some(&path)).is_err());
    }
}
