//! Embedded schema migrations.
//!
//! Files live in the workspace `migrations/sqlite/` directory as
//! `NNN_description.sql` and are compiled into the binary. Applied files are
//! never edited; schema changes go in a new file.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// How far a database is behind the embedded schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    pub embedded: usize,
    pub applied: usize,
}

impl MigrationStatus {
    pub fn is_current(&self) -> bool {
        self.applied >= self.embedded
    }
}

/// Applies every pending migration. Safe to call on an up-to-date database.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let before = migration_status(pool).await.ok();
    MIGRATOR.run(pool).await?;

    match before {
        Some(status) if status.is_current() => debug!("Schema already current"),
        _ => info!(embedded = MIGRATOR.migrations.len(), "Schema migrated"),
    }
    Ok(())
}

/// Embedded versus applied migration counts.
///
/// Fails on a database that has never been migrated, since the bookkeeping
/// table does not exist yet.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let applied: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;

    Ok(MigrationStatus {
        embedded: MIGRATOR.migrations.len(),
        applied: applied as usize,
    })
}
