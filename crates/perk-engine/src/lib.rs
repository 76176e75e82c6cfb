//! # perk-engine: Checkout and Campaign Orchestration for Perk
//!
//! Connects the pure rules in `perk-core` to storage in `perk-db`.
//!
//! ## Components
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          perk-engine                                    │
//! │                                                                         │
//! │  checkout ───── CouponService: validate + redeem codes for booking/POS  │
//! │  audience ───── AudienceSelector: paged filter evaluation               │
//! │  dispatcher ─── CampaignDispatcher: mint coupons, render, send, record  │
//! │  scheduler ──── CampaignScheduler: dispatch scheduled campaigns         │
//! │  attribution ── AttributionEngine: revenue per campaign send            │
//! │  sender ─────── ChannelSender: SMS/email transport seam                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use perk_db::Database;
//! use perk_engine::{CampaignDispatcher, EngineConfig, LoggingSender};
//!
//! let config = EngineConfig::load(None)?;
//! let db = Arc::new(Database::new(config.db_config()).await?);
//! let dispatcher = CampaignDispatcher::new(db, Arc::new(LoggingSender), &config);
//! let summary = dispatcher.dispatch("spring-promo").await?;
//! ```

pub mod attribution;
pub mod audience;
pub mod checkout;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod scheduler;
pub mod sender;

#[cfg(test)]
mod test_support;

pub use attribution::AttributionEngine;
pub use audience::AudienceSelector;
pub use checkout::{CheckoutSurface, CouponRequest, CouponService, CouponValidator};
pub use config::EngineConfig;
pub use dispatcher::CampaignDispatcher;
pub use error::{CheckoutError, EngineError, EngineResult};
pub use scheduler::{CampaignScheduler, CampaignSchedulerHandle, PollReport};
pub use sender::{ChannelSender, LoggingSender, SendMetadata, SendReceipt};
