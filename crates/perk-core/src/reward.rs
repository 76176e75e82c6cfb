//! # Reward Calculator
//!
//! Discount for one reward over one price basis. No side effects, no errors.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────────────┐
//! │ percentage   │ basis × bps / 10000 (half-up), capped at max_discount │
//! │ flat         │ min(value, basis)                                     │
//! │ free         │ basis                                                 │
//! │ unsupported  │ 0                                                     │
//! └──────────────┴──────────────────────────────────────────────────────┘
//!   result is always within [0, basis]
//! ```

use crate::money::Money;
use crate::types::{CouponReward, DiscountType};

/// Stateless reward math.
pub struct RewardCalculator;

impl RewardCalculator {
    /// Discount `reward` grants on `basis`.
    ///
    /// A negative basis is treated as zero.
    pub fn discount(reward: &CouponReward, basis: Money) -> Money {
        let basis = basis.max(Money::zero());

        let raw = match reward.discount_type {
            DiscountType::Percentage => {
                let off = basis.percent_of(reward.rate());
                match reward.max_discount() {
                    Some(cap) => off.min(cap.max(Money::zero())),
                    None => off,
                }
            }
            DiscountType::Flat => reward.flat_amount(),
            DiscountType::Free => basis,
            DiscountType::Unsupported => Money::zero(),
        };

        raw.clamp_to(Money::zero(), basis)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
