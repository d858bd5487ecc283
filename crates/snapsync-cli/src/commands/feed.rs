//! Feed command - follow the feed until interrupted
//!
//! Wires the full engine the way an app session would:
//!
//! ```text
//! RealtimeFeed ──events──→ EngineHandle ──→ ReconciliationEngine ──snapshots──→ stdout
//!                                │
//!                          UploadScheduler ──→ UploadQueue
//! ```
//!
//! The first page is loaded cache-then-network, pending uploads are flushed,
//! and every snapshot the engine publishes is printed. Ctrl+C or SIGTERM
//! closes the realtime feed and stops the background tasks.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::Args;
use snapsync_core::config::Config;
use snapsync_core::domain::{FeedSnapshot, FeedStatus};
use snapsync_core::ports::IPageCache;
use snapsync_remote::socket::RealtimeFeed;
use snapsync_sync::engine::{EngineDeps, ReconciliationEngine};
use snapsync_sync::scheduler::UploadScheduler;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use super::context::AppContext;
use crate::output::{count, get_formatter, OutputFormat, OutputFormatter};

/// Items listed per snapshot in human output
const SHOWN_ITEMS: usize = 10;

#[derive(Debug, Args)]
pub struct FeedCommand {
    /// Number of items to load (defaults to backend.page_size)
    #[arg(long)]
    pub limit: Option<usize>,
}

impl FeedCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format);
        let ctx = AppContext::open(config).await?;
        let limit = self.limit.unwrap_or(config.backend.page_size);

        let shutdown = CancellationToken::new();
        tokio::spawn(shutdown_signal(shutdown.clone()));

        let (scheduler, uploads) = UploadScheduler::new(
            Arc::new(ctx.queue()),
            config.queue.trigger_debounce(),
            shutdown.child_token(),
        );
        let scheduler_task = tokio::spawn(scheduler.run());

        let page_cache: Arc<dyn IPageCache> = ctx.settings.clone();
        let deps = EngineDeps {
            backend: ctx.backend.clone(),
            page_cache: Some(page_cache),
            uploads: Some(uploads.clone()),
        };
        let (engine, engine_task) = ReconciliationEngine::spawn(deps, ctx.user.clone());
        let mut snapshots = engine.subscribe();

        uploads.trigger(ctx.user.clone());
        engine.load_page(limit, 0).await?;

        let socket_url = Url::parse(&config.backend.socket_url)
            .with_context(|| format!("Invalid socket URL {}", config.backend.socket_url))?;
        let feed = RealtimeFeed::new(socket_url, Arc::new(engine.clone()));
        feed.open(ctx.user.as_ref().map(|u| &u.id_token))?;

        if !format.is_json() {
            fmt.info("Following the feed; press Ctrl+C to stop");
        }
        print_snapshot(&snapshots.borrow_and_update(), format, &*fmt);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        warn!("Engine stopped unexpectedly");
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    print_snapshot(&snapshot, format, &*fmt);
                }
            }
        }

        info!("Stopping feed");
        feed.close();
        engine.shutdown();
        shutdown.cancel();
        engine_task.await.context("Engine task failed")?;
        scheduler_task.await.context("Upload scheduler task failed")?;
        Ok(())
    }
}

fn print_snapshot(snapshot: &FeedSnapshot, format: OutputFormat, fmt: &dyn OutputFormatter) {
    if format.is_json() {
        let keys: Vec<&str> = snapshot.items.iter().map(|i| i.key.as_str()).collect();
        fmt.print_json(&serde_json::json!({
            "revision": snapshot.revision,
            "status": snapshot.status,
            "diff": snapshot.diff,
            "items": keys,
        }));
        return;
    }

    match &snapshot.status {
        FeedStatus::Loading => {
            fmt.info("Loading...");
            return;
        }
        FeedStatus::Error(message) => {
            fmt.error(&format!("Feed unavailable: {}", message));
            return;
        }
        FeedStatus::Success => {}
    }

    let diff = &snapshot.diff;
    let mut changes = Vec::new();
    if !diff.inserted.is_empty() {
        changes.push(format!("+{}", diff.inserted.len()));
    }
    if !diff.removed.is_empty() {
        changes.push(format!("-{}", diff.removed.len()));
    }
    if diff.background {
        changes.push("background".to_string());
    }
    let changes = if changes.is_empty() {
        "no changes".to_string()
    } else {
        changes.join(", ")
    };
    fmt.success(&format!(
        "{} ({})",
        count(snapshot.items.len(), "item"),
        changes
    ));

    for item in snapshot.items.iter().take(SHOWN_ITEMS) {
        let added = Utc
            .timestamp_millis_opt(item.added)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "?".to_string());
        let marker = if item.is_local { " (local)" } else { "" };
        fmt.info(&format!("{}  {}{}", added, item.key, marker));
    }
    if snapshot.items.len() > SHOWN_ITEMS {
        fmt.info(&format!("... {} more", snapshot.items.len() - SHOWN_ITEMS));
    }
}

/// Waits for SIGTERM or SIGINT and cancels the token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}
