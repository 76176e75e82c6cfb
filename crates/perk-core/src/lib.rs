//! # perk-core: Pure Promotions Logic for Perk
//!
//! Everything that decides *what* a coupon is worth, *who* a campaign
//! reaches and *how much* a send earned lives here, as pure functions with
//! zero I/O. Storage (perk-db) and orchestration (perk-engine) sit on top.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Perk Architecture                                │
//! │                                                                         │
//! │  ┌──────────────────────┐          ┌──────────────────────┐            │
//! │  │  Online booking flow │          │   Point of sale      │            │
//! │  └──────────┬───────────┘          └──────────┬───────────┘            │
//! │             └───────────────┬──────────────────┘                        │
//! │                             │ CouponValidator                           │
//! │  ┌──────────────────────────▼──────────────────────────────────────┐   │
//! │  │          perk-engine (checkout, dispatch, attribution)          │   │
//! │  └──────────────────────────┬──────────────────────────────────────┘   │
//! │                             │                                           │
//! │  ┌──────────────────────────▼──────────────────────────────────────┐   │
//! │  │               ★ perk-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │  ┌──────────┐ ┌─────────────┐ ┌──────────┐ ┌───────────────┐   │   │
//! │  │  │  reward  │ │ eligibility │ │ audience │ │    variant    │   │   │
//! │  │  │  calc    │ │  evaluator  │ │  filters │ │   assigner    │   │   │
//! │  │  └──────────┘ └─────────────┘ └──────────┘ └───────────────┘   │   │
//! │  │  ┌──────────┐ ┌─────────────┐ ┌──────────┐                     │   │
//! │  │  │ template │ │    code     │ │attribution│                    │   │
//! │  │  └──────────┘ └─────────────┘ └──────────┘                     │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK READS • PURE FUNCTIONS       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                             │                                           │
//! │  ┌──────────────────────────▼──────────────────────────────────────┐   │
//! │  │                    perk-db (SQLite repositories)                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer-cent Money and basis-point rates
//! - [`types`] - Coupons, rewards, cart items, customers, transactions
//! - [`campaign`] - Campaigns, variants, recipients, dispatch summaries
//! - [`error`] - Coupon errors shown to shoppers, validation errors
//! - [`validation`] - Definition checks for coupons, rewards and variants
//! - [`reward`] - Discount for one reward over a price basis
//! - [`eligibility`] - Full coupon evaluation against a cart
//! - [`audience`] - Typed audience filter tree
//! - [`variant`] - Deterministic A/B split
//! - [`template`] - `{variable}` message rendering
//! - [`code`] - Unambiguous coupon code generation
//! - [`attribution`] - Revenue attributed to a campaign send
//!
//! ## Example Usage
//!
//! ```rust
//! use perk_core::money::Money;
//! use perk_core::reward::RewardCalculator;
//! use perk_core::types::{CouponReward, DiscountType, RewardScope};
//!
//! let reward = CouponReward {
//!     id: "r1".into(),
//!     coupon_id: "c1".into(),
//!     applies_to: RewardScope::Order,
//!     discount_type: DiscountType::Percentage,
//!     discount_value: 2000, // 20%
//!     max_discount_cents: None,
//!     target_product_id: None,
//!     target_service_id: None,
//!     target_product_category_id: None,
//!     target_service_category_id: None,
//!     target_label: None,
//! };
//!
//! let off = RewardCalculator::discount(&reward, Money::from_dollars(50));
//! assert_eq!(off.cents(), 1000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod attribution;
pub mod audience;
pub mod campaign;
pub mod code;
pub mod eligibility;
pub mod error;
pub mod money;
pub mod reward;
pub mod template;
pub mod types;
pub mod validation;
pub mod variant;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use audience::AudienceFilter;
pub use campaign::*;
pub use eligibility::{CouponApplication, EligibilityContext, RewardLine};
pub use error::{CoreError, CouponError, InactiveReason, ValidationError};
pub use money::{Money, PercentRate};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Length of a minted coupon code.
pub const COUPON_CODE_LENGTH: usize = 8;

/// Code alphabet without the look-alikes `0`, `O`, `1` and `I`.
pub const COUPON_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Attribution window used when the caller does not pick one.
pub const DEFAULT_ATTRIBUTION_WINDOW_DAYS: i64 = 7;

/// Upper bound for a single variant split and for the sum of splits.
pub const MAX_SPLIT_PERCENTAGE: i64 = 100;
