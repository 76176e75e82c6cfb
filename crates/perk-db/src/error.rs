//! # Storage Errors
//!
//! ```text
//!  sqlx::Error ──┐
//!  MigrateError ─┼──► DbError ──► EngineError::Database   (dispatch, worker)
//!  serde_json ───┘          └───► CheckoutError::Database (checkout, generic text)
//! ```
//!
//! Constraint failures are classified with sqlx's `ErrorKind`, so callers can
//! tell a coupon code collision from a broken reference.

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Failures reading or writing Perk's tables.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE constraint rejected the write.
    ///
    /// Raised for coupon code collisions while minting and for repeated
    /// variant labels within one campaign.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// A row points at a customer, coupon or campaign that does not exist.
    #[error("Broken reference: {0}")]
    ForeignKeyViolation(String),

    #[error("Could not open database: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A JSON or enum column held something we cannot decode.
    #[error("Corrupt {column} column: {reason}")]
    CorruptColumn { column: String, reason: String },

    /// Every pooled connection stayed busy past the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn corrupt(column: impl Into<String>, reason: impl ToString) -> Self {
        DbError::CorruptColumn {
            column: column.into(),
            reason: reason.to_string(),
        }
    }

    /// True for UNIQUE constraint failures.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "unknown"),
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    // "UNIQUE constraint failed: coupons.code"
                    ErrorKind::UniqueViolation => DbError::UniqueViolation {
                        field: message
                            .rsplit(": ")
                            .next()
                            .unwrap_or("unknown")
                            .to_string(),
                        value: "unknown".to_string(),
                    },
                    ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation(message),
                    _ => DbError::QueryFailed(message),
                }
            }
            sqlx::Error::ColumnDecode { index, source } => DbError::corrupt(index, source),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            other => DbError::QueryFailed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}
