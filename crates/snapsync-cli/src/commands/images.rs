//! Images commands - fetch and prune downloaded image variants

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use snapsync_core::config::Config;
use snapsync_core::domain::{ItemKey, ItemSize};
use snapsync_core::ports::IPicsBackend;
use snapsync_sync::images::ImageCache;

use super::context::AppContext;
use crate::output::{count, get_formatter, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SizeArg {
    Small,
    Large,
}

impl From<SizeArg> for ItemSize {
    fn from(size: SizeArg) -> Self {
        match size {
            SizeArg::Small => ItemSize::Small,
            SizeArg::Large => ItemSize::Large,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum ImagesCommand {
    /// Print a local path holding an item's image, downloading it if needed
    Fetch {
        /// Key of an item in the first page of the feed
        key: String,
        #[arg(long, value_enum, default_value = "small")]
        size: SizeArg,
    },
    /// Delete downloaded variants older than cache.image_max_age_days
    Prune,
}

impl ImagesCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        let ctx = AppContext::open(config).await?;
        let images = ImageCache::from_config(
            &config.cache,
            ctx.store.local_dir(),
            ctx.backend.clone(),
        );

        match self {
            ImagesCommand::Fetch { key, size } => {
                let key = ItemKey::new(key.as_str()).context("Invalid item key")?;
                let items = ctx.backend.list_items(config.backend.page_size, 0).await?;
                let Some(item) = items.iter().find(|i| i.key == key) else {
                    fmt.error(&format!(
                        "{} is not among the latest {}",
                        key,
                        count(items.len(), "item")
                    ));
                    return Ok(());
                };

                let path = images.fetch(item, (*size).into()).await?;
                if format.is_json() {
                    fmt.print_json(&serde_json::json!({
                        "key": key.as_str(),
                        "path": path,
                    }));
                } else {
                    fmt.success(&path.display().to_string());
                }
            }
            ImagesCommand::Prune => {
                let report = images.maintenance().await?;
                if format.is_json() {
                    fmt.print_json(&serde_json::json!({
                        "deleted": report.deleted,
                        "freed_bytes": report.freed_bytes,
                        "errors": report.errors,
                    }));
                } else {
                    fmt.success(&format!(
                        "Deleted {} ({} bytes)",
                        count(report.deleted, "cached image"),
                        report.freed_bytes
                    ));
                    if report.errors > 0 {
                        fmt.warn(&format!("{} could not be deleted", count(report.errors, "file")));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_arg_maps_to_item_size() {
        assert_eq!(ItemSize::from(SizeArg::Small), ItemSize::Small);
        assert_eq!(ItemSize::from(SizeArg::Large), ItemSize::Large);
    }
}
