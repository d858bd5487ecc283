//! Private command - switch between the signed-in and the anonymous feed

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use snapsync_cache::{DatabasePool, SqliteSettingsStore};
use snapsync_core::config::Config;
use snapsync_core::ports::ISettingsStore;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Debug, Args)]
pub struct PrivateCommand {
    #[arg(value_enum)]
    pub mode: Toggle,
}

impl PrivateCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        let pool = DatabasePool::new(&config.cache.database)
            .await
            .context("Failed to open settings database")?;
        let settings = SqliteSettingsStore::new(pool.pool().clone());

        let private = self.mode == Toggle::On;
        if private && settings.private_email().await?.is_none() {
            fmt.error("Nobody is signed in. Run 'snapsync auth login' first.");
            return Ok(());
        }
        settings.set_private(private).await?;
        info!(private, "Changed private mode");

        if format.is_json() {
            fmt.print_json(&serde_json::json!({ "private": private }));
        } else {
            fmt.success(&format!("Private mode {}", if private { "on" } else { "off" }));
        }
        Ok(())
    }
}
