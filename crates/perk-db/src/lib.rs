//! # perk-db: Database Layer for Perk
//!
//! SQLite storage for coupons, campaigns and recipients, plus read access to
//! the customer and transaction tables owned by the booking/POS systems.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Perk Data Flow                                 │
//! │                                                                         │
//! │  perk-engine (checkout validation, campaign dispatch)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     perk-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ CouponRepo     │   │              │   │   │
//! │  │   │ SqlitePool    │◄───│ CampaignRepo   │   │ 001_initial… │   │   │
//! │  │   │ Connection    │    │ RecipientRepo  │   │              │   │   │
//! │  │   │ Management    │    │ Customer/TxRepo│   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Concurrency
//!
//! Every state change that two workers could race on is a single
//! conditional `UPDATE` whose affected-row count is the answer:
//! coupon usage, campaign status transitions and first-click stamping.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use perk_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("perk.db")).await?;
//!
//! let coupon = db.coupons().find_by_code("save20").await?;
//! let due = db.campaigns().list_due(chrono::Utc::now()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use migrations::MigrationStatus;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::campaign::CampaignRepository;
pub use repository::coupon::CouponRepository;
pub use repository::customer::CustomerRepository;
pub use repository::recipient::{RecipientCounts, RecipientRepository};
pub use repository::transaction::TransactionRepository;
