//! # Database Handle
//!
//! One SQLite pool shared by checkout calls, dispatch workers and
//! attribution reads, with a repository accessor per table group.
//!
//! ```text
//!  DbConfig::new("perk.db")          DbConfig::in_memory()
//!        │ WAL, NORMAL sync,               │ one connection, never reaped
//!        │ foreign keys, busy timeout      │ (the data lives in it)
//!        └───────────────┬─────────────────┘
//!                        ▼
//!               Database::new ── migrations ──► Database
//!                                                 ├─ coupons()
//!                                                 ├─ customers()
//!                                                 ├─ campaigns()
//!                                                 ├─ recipients()
//!                                                 └─ transactions()
//! ```
//!
//! Dispatch workers write recipient rows and minted coupons concurrently, so
//! file databases wait on a locked writer for `busy_timeout` instead of
//! failing with `SQLITE_BUSY`.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::migrations::{self, MigrationStatus};
use crate::repository::campaign::CampaignRepository;
use crate::repository::coupon::CouponRepository;
use crate::repository::customer::CustomerRepository;
use crate::repository::recipient::RecipientRepository;
use crate::repository::transaction::TransactionRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Where the database lives and how the pool behaves.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, created on first open. `None` means a private in-memory
    /// database.
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    /// How long a connection waits on another writer's lock.
    pub busy_timeout: Duration,
    /// How long a caller waits for a free pooled connection.
    pub acquire_timeout: Duration,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            path: Some(path.into()),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// A fresh, empty database per call. Used by tests.
    pub fn in_memory() -> Self {
        DbConfig {
            path: None,
            max_connections: 1,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Pool handle; clones share the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let pool = match &config.path {
            Some(path) => {
                info!(path = %path.display(), "Opening database");
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
                    .foreign_keys(true)
                    .busy_timeout(config.busy_timeout);

                SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(config.acquire_timeout)
                    .connect_with(options)
                    .await
            }
            None => {
                debug!("Opening in-memory database");
                let options = SqliteConnectOptions::new()
                    .in_memory(true)
                    .foreign_keys(true);

                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .acquire_timeout(config.acquire_timeout)
                    .connect_with(options)
                    .await
            }
        }
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        migrations::run_migrations(&pool).await?;

        debug!(max_connections = config.max_connections, "Database ready");
        Ok(Database { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Coupons and their rewards.
    pub fn coupons(&self) -> CouponRepository {
        CouponRepository::new(self.pool.clone())
    }

    /// Read-only customer records.
    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone())
    }

    /// Campaigns, variants and status transitions.
    pub fn campaigns(&self) -> CampaignRepository {
        CampaignRepository::new(self.pool.clone())
    }

    /// Per-recipient send records.
    pub fn recipients(&self) -> RecipientRepository {
        RecipientRepository::new(self.pool.clone())
    }

    /// Read-only checkout transactions.
    pub fn transactions(&self) -> TransactionRepository {
        TransactionRepository::new(self.pool.clone())
    }

    /// Embedded versus applied migrations.
    pub async fn schema_status(&self) -> DbResult<MigrationStatus> {
        migrations::migration_status(&self.pool).await
    }

    /// Waits for in-flight queries, then closes every connection.
    pub async fn close(&self) {
        if self.pool.is_closed() {
            warn!("Database already closed");
            return;
        }
        self.pool.close().await;
        info!("Database closed");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
