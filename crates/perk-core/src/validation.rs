//! # Validation Module
//!
//! Definition checks for operator-supplied coupons, rewards and campaigns.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Admin UI (TypeScript, ts-rs types)                           │
//! │  └── Shape checks, immediate feedback                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Coupon codes, reward values, variant splits                       │
//! │  └── Campaign templates per channel                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE coupon code (NOCASE)                                       │
//! │  └── UNIQUE (campaign_id, customer_id) recipient rows                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use perk_core::validation::validate_coupon_code;
//!
//! assert!(validate_coupon_code("SAVE20").is_ok());
//! assert!(validate_coupon_code("SAVE 20").is_err());
//! ```

use std::collections::HashSet;

use crate::campaign::{Campaign, CampaignChannel, CampaignVariant};
use crate::error::{ValidationError, ValidationResult};
use crate::types::{CouponReward, DiscountType, RewardScope};
use crate::MAX_SPLIT_PERCENTAGE;

/// Longest accepted coupon code.
pub const MAX_COUPON_CODE_LENGTH: usize = 32;

// =============================================================================
// Coupons
// =============================================================================

/// Validates a coupon code as typed by an operator.
///
/// ## Rules
/// - Must not be empty (after trimming)
/// - At most 32 characters
/// - Letters, digits, hyphens and underscores only
pub fn validate_coupon_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.len() > MAX_COUPON_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: MAX_COUPON_CODE_LENGTH,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates one reward definition.
///
/// ## Rules
/// - percentage: 0 < value ≤ 10000 bps; `max_discount` positive if set
/// - flat: value > 0 cents
/// - product/service scope: target ids must match the scope
pub fn validate_reward(reward: &CouponReward) -> ValidationResult<()> {
    match reward.discount_type {
        DiscountType::Percentage => {
            if reward.discount_value <= 0 || reward.discount_value > 10_000 {
                return Err(ValidationError::OutOfRange {
                    field: "discount_value".to_string(),
                    min: 1,
                    max: 10_000,
                });
            }
            if matches!(reward.max_discount_cents, Some(cap) if cap <= 0) {
                return Err(ValidationError::MustBePositive {
                    field: "max_discount".to_string(),
                });
            }
        }
        DiscountType::Flat => {
            if reward.discount_value <= 0 {
                return Err(ValidationError::MustBePositive {
                    field: "discount_value".to_string(),
                });
            }
        }
        DiscountType::Free => {}
        DiscountType::Unsupported => {
            return Err(ValidationError::InvalidFormat {
                field: "discount_type".to_string(),
                reason: "must be percentage, flat or free".to_string(),
            });
        }
    }

    let has_product_target =
        reward.target_product_id.is_some() || reward.target_product_category_id.is_some();
    let has_service_target =
        reward.target_service_id.is_some() || reward.target_service_category_id.is_some();
    let mismatched = match reward.applies_to {
        RewardScope::Order => has_product_target || has_service_target,
        RewardScope::Product => has_service_target,
        RewardScope::Service => has_product_target,
    };
    if mismatched {
        return Err(ValidationError::InvalidFormat {
            field: "applies_to".to_string(),
            reason: "target does not match the reward scope".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Campaigns
// =============================================================================

/// Validates a campaign's A/B variants.
///
/// ## Rules
/// - Each split within 0-100
/// - Splits sum to at most 100
/// - Labels unique (case-insensitive)
pub fn validate_variant_splits(variants: &[CampaignVariant]) -> ValidationResult<()> {
    let mut labels = HashSet::new();
    let mut total = 0;

    for v in variants {
        if !(0..=MAX_SPLIT_PERCENTAGE).contains(&v.split_percentage) {
            return Err(ValidationError::OutOfRange {
                field: format!("variant '{}' split_percentage", v.label),
                min: 0,
                max: MAX_SPLIT_PERCENTAGE,
            });
        }
        if !labels.insert(v.label.trim().to_lowercase()) {
            return Err(ValidationError::Duplicate {
                field: "variant label".to_string(),
                value: v.label.clone(),
            });
        }
        total += v.split_percentage;
    }

    if total > MAX_SPLIT_PERCENTAGE {
        return Err(ValidationError::SplitsExceedTotal { total });
    }

    Ok(())
}

/// Checks a campaign has a body for every channel it sends on.
pub fn validate_campaign_templates(campaign: &Campaign) -> ValidationResult<()> {
    if campaign.name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    let blank = |t: &Option<String>| t.as_deref().map_or(true, |s| s.trim().is_empty());

    for channel in campaign.channel.concrete() {
        match channel {
            CampaignChannel::Sms if blank(&campaign.sms_template) => {
                return Err(ValidationError::Required {
                    field: "sms_template".to_string(),
                });
            }
            CampaignChannel::Email if blank(&campaign.email_template) => {
                return Err(ValidationError::Required {
                    field: "email_template".to_string(),
                });
            }
            _ => {}
        }
    }

    campaign.audience_filters.validate()
}

// =============================================================================
// Unit Tests
// =============================================================================
