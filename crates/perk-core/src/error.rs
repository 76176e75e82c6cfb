//! # Error Types
//!
//! Domain-specific error types for perk-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  perk-core errors (this file)                                          │
//! │  ├── CouponError      - Why a code was refused (shown to the shopper)  │
//! │  ├── ValidationError  - Malformed coupon/campaign definitions          │
//! │  └── CoreError        - Lifecycle rule violations                      │
//! │                                                                         │
//! │  perk-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  perk-engine errors                                                    │
//! │  ├── CheckoutError    - CouponError or infrastructure failure          │
//! │  └── EngineError      - Dispatch / scheduling / attribution failures   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Evaluation Order
//! The eligibility evaluator short-circuits on the first failure, so a
//! shopper always sees exactly one of these:
//! ```text
//! NotFound → Inactive(status) → Inactive(expired) → Inactive(usage)
//!          → AlreadyUsed → NotEligible(customer) → NotEligible(tags)
//!          → NotEligible(conditions) → NoMatchingItems
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::types::CouponStatus;

// =============================================================================
// Coupon Error
// =============================================================================

/// Why a coupon is not currently usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum InactiveReason {
    /// Status is anything other than `active`.
    Status(CouponStatus),
    Expired,
    UsageExhausted,
}

impl std::fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InactiveReason::Status(status) => write!(f, "{}", status),
            InactiveReason::Expired => f.write_str("expired"),
            InactiveReason::UsageExhausted => f.write_str("no longer available"),
        }
    }
}

/// A coupon was refused at checkout.
///
/// Messages are written for the shopper; both checkout surfaces show them
/// verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("Coupon code '{code}' was not found")]
    NotFound { code: String },

    /// ## When This Occurs
    /// - Status is paused, expired or disabled
    /// - `expires_at` has passed
    /// - `use_count` reached `max_uses`
    #[error("This coupon is {0}")]
    Inactive(InactiveReason),

    /// Single-use coupon already on a completed transaction of this customer.
    #[error("This coupon has already been used")]
    AlreadyUsed,

    /// Customer targeting or condition predicates failed.
    ///
    /// The reason is a complete sentence, e.g.
    /// `"Coupon requires: a minimum purchase of $40.00 and new customers only"`.
    #[error("{0}")]
    NotEligible(String),

    /// The coupon has rewards but none of their targets are in the cart.
    #[error("This coupon requires: {}", .required.join(", "))]
    NoMatchingItems { required: Vec<String> },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Definition validation errors.
///
/// Raised when an operator-supplied coupon, reward or campaign definition
/// cannot be used as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: String, value: i64 },

    /// Invalid format (e.g. coupon code with spaces).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Variant splits add up to more than the whole audience.
    #[error("variant splits total {total}%, which exceeds 100%")]
    SplitsExceedTotal { total: i64 },

    /// Duplicate value (e.g. two variants with one label).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Core Error
// =============================================================================

/// Core rule errors outside checkout.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Campaign status does not allow the requested transition.
    ///
    /// ## When This Occurs
    /// - Scheduling a campaign that is already sent
    /// - Cancelling a campaign mid-send
    /// - Resetting a campaign that is not stalled in `sending`
    #[error("Campaign {campaign_id} is {current_status}, cannot {operation}")]
    InvalidCampaignStatus {
        campaign_id: String,
        current_status: String,
        operation: String,
    },

    /// Coupon refusal (wraps CouponError).
    #[error(transparent)]
    Coupon(#[from] CouponError),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

/// Convenience type alias for Results with ValidationError.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupon_error_messages() {
        let err = CouponError::Inactive(InactiveReason::Status(CouponStatus::Paused));
        assert_eq!(err.to_string(), "This coupon is paused");

        let err = CouponError::Inactive(InactiveReason::Expired);
        assert_eq!(err.to_string(), "This coupon is expired");

        let err = CouponError::NoMatchingItems {
            required: vec!["Basic Wash".into(), "Tire Shine".into()],
        };
        assert_eq!(err.to_string(), "This coupon requires: Basic Wash, Tire Shine");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::SplitsExceedTotal { total: 110 };
        assert_eq!(err.to_string(), "variant splits total 110%, which exceeds 100%");

        let err = ValidationError::Required {
            field: "code".to_string(),
        };
        assert_eq!(err.to_string(), "code is required");
    }

    #[test]
    fn test_conversions_into_core_error() {
        let core_err: CoreError = ValidationError::MustBePositive {
            field: "discount_value".into(),
        }
        .into();
        assert!(matches!(core_err, CoreError::Validation(_)));

        let core_err: CoreError = CouponError::AlreadyUsed.into();
        assert_eq!(core_err.to_string(), "This coupon has already been used");
    }
}
