//! Upload scheduler - coalesces upload triggers into queue runs
//!
//! The [`UploadScheduler`] sits between the producers of upload triggers
//! (new captures, sign-in changes, "upload now" commands) and the
//! [`UploadQueue`]. Triggers arriving in a burst are coalesced per user
//! partition: every partition named in the burst gets exactly one run, in the
//! order the partitions were first triggered, with the most recent token for
//! that partition.
//!
//! ## Flow
//!
//! ```text
//! UploadHandle::trigger ──→ mpsc ──→ UploadScheduler ──→ UploadQueue::run
//!                                         │
//!                                   debounce window
//! ```

use std::sync::Arc;
use std::time::Duration;

use snapsync_core::domain::{Email, UserInfo};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::queue::{QueueRunSummary, UploadQueue};

/// Request to run the queue for a user (`None` for anonymous)
#[derive(Debug, Clone)]
pub struct UploadTrigger {
    pub user: Option<UserInfo>,
}

/// Progress reported by the scheduler after every run
#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    /// Number of completed runs
    pub runs: u64,
    pub last: Option<QueueRunSummary>,
}

/// Cloneable sender side of the scheduler
#[derive(Debug, Clone)]
pub struct UploadHandle {
    triggers: mpsc::UnboundedSender<UploadTrigger>,
    status: watch::Receiver<SchedulerStatus>,
}

impl UploadHandle {
    /// Requests a queue run for `user`
    ///
    /// Never blocks; after shutdown triggers are ignored.
    pub fn trigger(&self, user: Option<UserInfo>) {
        if self.triggers.send(UploadTrigger { user }).is_err() {
            debug!("Upload scheduler stopped");
        }
    }

    /// Subscribes to run completions
    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.clone()
    }
}

/// Runs the upload queue whenever triggered
pub struct UploadScheduler {
    queue: Arc<UploadQueue>,
    trigger_rx: mpsc::UnboundedReceiver<UploadTrigger>,
    status_tx: watch::Sender<SchedulerStatus>,
    debounce: Duration,
    cancel: CancellationToken,
}

impl UploadScheduler {
    /// Creates a scheduler and the handle used to trigger it
    ///
    /// # Arguments
    /// * `queue` - The queue to run
    /// * `debounce` - How long to wait for further triggers before running
    /// * `cancel` - Stops [`run`](UploadScheduler::run) when cancelled
    pub fn new(
        queue: Arc<UploadQueue>,
        debounce: Duration,
        cancel: CancellationToken,
    ) -> (Self, UploadHandle) {
        let (triggers, trigger_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SchedulerStatus::default());

        info!(
            debounce_ms = debounce.as_millis() as u64,
            "Creating upload scheduler"
        );

        let scheduler = Self {
            queue,
            trigger_rx,
            status_tx,
            debounce,
            cancel,
        };
        (scheduler, UploadHandle { triggers, status })
    }

    /// Main loop; returns when cancelled or when every handle is dropped
    pub async fn run(mut self) {
        info!("Upload scheduler starting");

        loop {
            let first = tokio::select! {
                _ = self.cancel.cancelled() => break,
                trigger = self.trigger_rx.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => {
                        info!("Trigger channel closed, scheduler shutting down");
                        break;
                    }
                },
            };

            let Some(pending) = self.coalesce(first).await else {
                break;
            };

            for user in pending {
                if self.cancel.is_cancelled() {
                    break;
                }
                self.run_once(user.as_ref()).await;
            }
        }

        info!("Upload scheduler stopped");
    }

    async fn run_once(&self, user: Option<&UserInfo>) {
        let summary = match self.queue.run(user).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Upload queue run failed");
                QueueRunSummary {
                    failed: Some(e.to_string()),
                    ..QueueRunSummary::default()
                }
            }
        };
        self.status_tx.send_modify(|status| {
            status.runs += 1;
            status.last = Some(summary);
        });
    }

    /// Absorbs triggers arriving within the debounce window
    ///
    /// Returns one user per distinct partition in first-seen order, each
    /// carrying the latest token seen for it, or `None` when cancelled.
    async fn coalesce(&mut self, first: UploadTrigger) -> Option<Vec<Option<UserInfo>>> {
        let mut pending = PendingRuns::default();
        pending.push(first);
        let mut absorbed = 0usize;
        let window = tokio::time::sleep(self.debounce);
        tokio::pin!(window);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = &mut window => break,
                trigger = self.trigger_rx.recv() => match trigger {
                    Some(trigger) => {
                        pending.push(trigger);
                        absorbed += 1;
                    }
                    None => break,
                },
            }
        }

        if absorbed > 0 {
            debug!(absorbed, partitions = pending.0.len(), "Coalesced upload triggers");
        }
        Some(pending.0.into_iter().map(|(_, user)| user).collect())
    }
}

/// Distinct partitions of a trigger burst, keyed by email (`None` = anonymous)
#[derive(Default)]
struct PendingRuns(Vec<(Option<Email>, Option<UserInfo>)>);

impl PendingRuns {
    fn push(&mut self, trigger: UploadTrigger) {
        let email = trigger.user.as_ref().map(|u| u.email.clone());
        match self.0.iter_mut().find(|(e, _)| *e == email) {
            Some(entry) => entry.1 = trigger.user,
            None => self.0.push((email, trigger.user)),
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================
