//! # Repository Module
//!
//! Database repository implementations for Perk.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  perk-engine                                                           │
//! │       │  db.coupons().find_by_code("save20")                           │
//! │       │  db.campaigns().try_begin_sending(id, now)                     │
//! │       │  db.recipients().insert(&row)                                  │
//! │       ▼                                                                 │
//! │  Repository                                                            │
//! │  ├── SQL text + binds                                                  │
//! │  ├── private `*Row` struct (sqlx::FromRow)                             │
//! │  └── TryFrom<Row> for the perk-core type (JSON columns decoded here)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CouponRepository`](coupon::CouponRepository) - Coupons, rewards, guarded redemption
//! - [`CustomerRepository`](customer::CustomerRepository) - Read-only customers, paged scans
//! - [`CampaignRepository`](campaign::CampaignRepository) - Campaigns, variants, status CAS
//! - [`RecipientRepository`](recipient::RecipientRepository) - Idempotent send records
//! - [`TransactionRepository`](transaction::TransactionRepository) - Read-only transactions

pub mod campaign;
pub mod coupon;
pub mod customer;
pub mod recipient;
pub mod transaction;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DbError, DbResult};

/// Largest number of bind parameters put into one `IN (...)` list.
pub const MAX_IN_LIST: usize = 500;

/// Decodes a JSON TEXT column.
pub(crate) fn decode_json<T: DeserializeOwned>(column: &str, raw: &str) -> DbResult<T> {
    serde_json::from_str(raw).map_err(|e| DbError::corrupt(column, e))
}

/// Encodes a value for a JSON TEXT column.
pub(crate) fn encode_json<T: Serialize + ?Sized>(column: &str, value: &T) -> DbResult<String> {
    serde_json::to_string(value).map_err(|e| DbError::corrupt(column, e))
}
