//! # Perk Campaign Worker
//!
//! Polls the database for scheduled campaigns and dispatches them.
//!
//! ## Startup
//! ```text
//! config (TOML + PERK_*) ──► SQLite + migrations ──► dispatcher ──► scheduler loop
//!                                                                        │
//!                                      SIGINT / SIGTERM ──► shutdown ◄──┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use perk_core::CampaignStatus;
use perk_db::Database;
use perk_engine::{CampaignDispatcher, CampaignScheduler, EngineConfig, LoggingSender};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Perk campaign worker...");

    let config = EngineConfig::load(None).context("Failed to load engine configuration")?;
    info!(
        db_path = %config.database.path.display(),
        concurrency = config.dispatch.max_concurrency,
        poll_interval_secs = config.dispatch.poll_interval_secs,
        "Configuration loaded"
    );

    let db = Arc::new(
        Database::new(config.db_config())
            .await
            .context("Failed to open database")?,
    );
    let schema = db.schema_status().await?;
    info!(applied = schema.applied, "Database ready");

    // A crash mid-send leaves campaigns in `sending`; they need an operator reset.
    for campaign in db.campaigns().list_by_status(CampaignStatus::Sending).await? {
        warn!(
            campaign_id = %campaign.id,
            name = %campaign.name,
            "Campaign stuck in sending, reset it to scheduled to resume"
        );
    }

    let dispatcher = Arc::new(CampaignDispatcher::new(
        db.clone(),
        Arc::new(LoggingSender),
        &config,
    ));
    let (scheduler, handle) = CampaignScheduler::new(db.clone(), dispatcher, &config);
    let worker = tokio::spawn(scheduler.run());

    shutdown_signal().await;

    handle.shutdown().await?;
    worker.await.context("Scheduler task panicked")?;
    db.close().await;

    info!("Worker shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
