//! Capture command - queue an image for upload
//!
//! Either imports an existing file, or with `--new` reserves an empty
//! capture file in the staging directory for a camera to write into.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use snapsync_core::config::Config;
use tracing::info;

use super::context::AppContext;
use super::upload::print_summary;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct CaptureCommand {
    /// Image file to queue
    #[arg(required_unless_present = "new", conflicts_with = "new")]
    pub file: Option<PathBuf>,

    /// Create an empty capture file and print its path; it is uploaded by
    /// the next `snapsync upload` once written, or discarded if left empty
    #[arg(long)]
    pub new: bool,

    /// Only queue the file; upload on the next `snapsync upload`
    #[arg(long)]
    pub no_upload: bool,
}

impl CaptureCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        let ctx = AppContext::open(config).await?;

        let Some(file) = &self.file else {
            let path = ctx
                .store
                .create_capture(ctx.email())
                .await
                .context("Failed to create capture file")?;
            info!(path = %path.display(), "Created capture file");
            print_created(&path, format, &*fmt);
            return Ok(());
        };

        let staged = ctx
            .store
            .import(file, ctx.email())
            .await
            .with_context(|| format!("Failed to queue {}", file.display()))?;
        info!(staged = %staged.display(), "Queued capture");
        if !format.is_json() {
            fmt.success(&format!("Queued {}", file.display()));
        }

        if self.no_upload {
            return Ok(());
        }
        let summary = ctx.queue().run(ctx.user.as_ref()).await?;
        print_summary(&summary, format, &*fmt);
        Ok(())
    }
}

fn print_created(path: &std::path::Path, format: OutputFormat, fmt: &dyn OutputFormatter) {
    if format.is_json() {
        fmt.print_json(&serde_json::json!({ "path": path }));
    } else {
        fmt.success(&path.display().to_string());
    }
}
