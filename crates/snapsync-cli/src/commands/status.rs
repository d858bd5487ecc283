//! Status command - queue counts and settings of the effective user

use anyhow::Result;
use clap::Args;
use snapsync_core::config::Config;
use snapsync_core::domain::Partition;
use snapsync_core::ports::ISettingsStore;

use super::context::AppContext;
use crate::output::{count, get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        let ctx = AppContext::open(config).await?;

        let pending = ctx.store.pending(ctx.email()).await?;
        let private = ctx.settings.is_private().await?;
        let partition = Partition::for_user(ctx.email());

        if format.is_json() {
            fmt.print_json(&serde_json::json!({
                "user": ctx.email().map(|e| e.as_str()),
                "private": private,
                "partition": partition.as_str(),
                "staged": pending.staged,
                "uploading": pending.uploading,
                "queue_root": config.queue.root,
                "backend": config.backend.base_url,
            }));
            return Ok(());
        }

        match ctx.email() {
            Some(email) => fmt.success(&format!("SnapSync Status - {}", email)),
            None => fmt.success("SnapSync Status - anonymous"),
        }
        fmt.info(&format!("Private mode: {}", if private { "on" } else { "off" }));
        fmt.info(&format!("Partition:    {}", partition));
        fmt.info(&format!("Staged:       {}", count(pending.staged, "file")));
        fmt.info(&format!("Uploading:    {}", count(pending.uploading, "file")));
        fmt.info(&format!("Queue root:   {}", config.queue.root.display()));
        fmt.info(&format!("Backend:      {}", config.backend.base_url));
        Ok(())
    }
}
