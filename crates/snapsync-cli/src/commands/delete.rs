//! Delete command - remove an item on the server

use anyhow::{Context, Result};
use clap::Args;
use snapsync_core::config::Config;
use snapsync_core::domain::ItemKey;
use snapsync_core::ports::IPicsBackend;

use super::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Key of the item to delete
    pub key: String,
}

impl DeleteCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        let key = ItemKey::new(self.key.as_str()).context("Invalid item key")?;
        let ctx = AppContext::open(config).await?;

        ctx.backend.delete_item(&key).await?;

        if format.is_json() {
            fmt.print_json(&serde_json::json!({ "deleted": key.as_str() }));
        } else {
            fmt.success(&format!("Deleted {}", key));
        }
        Ok(())
    }
}
