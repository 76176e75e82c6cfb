//! # Campaign Scheduler
//!
//! Polls for scheduled campaigns that have come due and dispatches them.
//!
//! ## Polling Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Campaign Scheduler Loop                            │
//! │                                                                         │
//! │  every poll_interval_secs:                                             │
//! │    1. SELECT campaigns WHERE status = 'scheduled'                      │
//! │                         AND scheduled_at <= now                        │
//! │    2. dispatch each, oldest first                                      │
//! │         Ok                 → info                                      │
//! │         AlreadyDispatching → debug (another worker owns it)            │
//! │         other error        → error, campaign picked up next poll       │
//! │                                                                         │
//! │  shutdown: handled between polls, a running dispatch finishes first   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use perk_db::Database;

use crate::config::EngineConfig;
use crate::dispatcher::CampaignDispatcher;
use crate::error::{EngineError, EngineResult};

/// Dispatches due campaigns on an interval.
pub struct CampaignScheduler {
    db: Arc<Database>,
    dispatcher: Arc<CampaignDispatcher>,
    poll_interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running scheduler.
#[derive(Clone)]
pub struct CampaignSchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CampaignSchedulerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::ChannelError("Shutdown channel closed".into()))
    }
}

/// Outcome counts of one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub due: usize,
    pub dispatched: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CampaignScheduler {
    /// Creates a scheduler and returns its handle.
    pub fn new(
        db: Arc<Database>,
        dispatcher: Arc<CampaignDispatcher>,
        config: &EngineConfig,
    ) -> (Self, CampaignSchedulerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let scheduler = CampaignScheduler {
            db,
            dispatcher,
            poll_interval: Duration::from_secs(config.dispatch.poll_interval_secs),
            shutdown_rx,
        };

        (scheduler, CampaignSchedulerHandle { shutdown_tx })
    }

    /// Runs the polling loop until shutdown.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(poll_interval = ?self.poll_interval, "Campaign scheduler starting");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll(Utc::now()).await {
                        error!(error = %e, "Failed to poll due campaigns");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Campaign scheduler shutting down");
                    break;
                }
            }
        }

        info!("Campaign scheduler stopped");
    }

    /// Dispatches every campaign due at `now`.
    pub async fn poll(&self, now: DateTime<Utc>) -> EngineResult<PollReport> {
        let due = self.db.campaigns().list_due(now).await?;
        let mut report = PollReport {
            due: due.len(),
            ..PollReport::default()
        };

        if due.is_empty() {
            debug!("No due campaigns");
            return Ok(report);
        }

        for campaign in due {
            match self.dispatcher.dispatch_at(&campaign.id, now).await {
                Ok(summary) => {
                    info!(
                        campaign_id = %campaign.id,
                        recipients = summary.recipient_count,
                        delivered = summary.delivered_count,
                        "Scheduled campaign sent"
                    );
                    report.dispatched += 1;
                }
                Err(e) if e.is_not_ready() => {
                    debug!(campaign_id = %campaign.id, reason = %e, "Skipping campaign");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(campaign_id = %campaign.id, error = %e, "Scheduled campaign failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
