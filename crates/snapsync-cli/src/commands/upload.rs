//! Upload command - one pass over the effective user's queue

use anyhow::Result;
use clap::Args;
use snapsync_core::config::Config;
use snapsync_sync::queue::QueueRunSummary;

use super::context::AppContext;
use crate::output::{count, get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct UploadCommand {}

impl UploadCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        let ctx = AppContext::open(config).await?;

        let summary = ctx.queue().run(ctx.user.as_ref()).await?;
        print_summary(&summary, format, &*fmt);
        Ok(())
    }
}

/// Prints the outcome of a queue run
pub fn print_summary(summary: &QueueRunSummary, format: OutputFormat, fmt: &dyn OutputFormatter) {
    if format.is_json() {
        fmt.print_json(&serde_json::json!({
            "recovered": summary.recovered,
            "uploaded": summary.uploaded,
            "discarded": summary.discarded,
            "failed": summary.failed,
        }));
        return;
    }

    if summary.is_noop() {
        fmt.success("Nothing to upload");
        return;
    }
    if summary.recovered > 0 {
        fmt.info(&format!("Recovered: {}", count(summary.recovered, "stale upload")));
    }
    if summary.discarded > 0 {
        fmt.info(&format!("Discarded: {}", count(summary.discarded, "empty file")));
    }
    match &summary.failed {
        Some(reason) => {
            fmt.error(&format!(
                "Upload stopped after {}: {}",
                count(summary.uploaded, "file"),
                reason
            ));
            fmt.info("Remaining files stay queued for the next pass");
        }
        None => fmt.success(&format!("Uploaded {}", count(summary.uploaded, "file"))),
    }
}
