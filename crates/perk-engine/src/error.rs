//! # Engine Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Campaign     │  │     Wrapped             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  AlreadyDispat. │  │  Database (DbError)     │ │
//! │  │  ConfigLoad     │  │  NotDispatchable│  │  Validation             │ │
//! │  │  ConfigSave     │  │  NotYetDue      │  │  Core (status rules)    │ │
//! │  └─────────────────┘  │  CodeSpaceExh.  │  └─────────────────────────┘ │
//! │                       └─────────────────┘                              │
//! │                                                                         │
//! │  CheckoutError keeps the customer-facing CouponError apart from        │
//! │  infrastructure failures the checkout surface should not show.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use thiserror::Error;

use perk_core::{CampaignStatus, CoreError, CouponError, ValidationError};
use perk_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures of campaign orchestration and configuration.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Campaign Errors
    // =========================================================================
    #[error("Campaign not found: {0}")]
    CampaignNotFound(String),

    /// Another worker owns the send.
    #[error("Campaign {campaign_id} is already being dispatched")]
    AlreadyDispatching { campaign_id: String },

    #[error("Campaign {campaign_id} is {status} and cannot be dispatched")]
    NotDispatchable {
        campaign_id: String,
        status: CampaignStatus,
    },

    #[error("Campaign {campaign_id} is scheduled for {scheduled_at}")]
    NotYetDue {
        campaign_id: String,
        scheduled_at: DateTime<Utc>,
    },

    #[error("Audience resolution failed: {0}")]
    AudienceResolutionFailed(String),

    #[error("Campaign {campaign_id} references missing coupon template {coupon_id}")]
    TemplateCouponMissing {
        campaign_id: String,
        coupon_id: String,
    },

    /// Every generated code collided with an existing one.
    #[error("No free coupon code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

impl EngineError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }

    /// Returns true when the campaign was not in a state to send right now.
    ///
    /// The scheduler treats these as routine.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            EngineError::AlreadyDispatching { .. }
                | EngineError::NotDispatchable { .. }
                | EngineError::NotYetDue { .. }
        )
    }
}

// =============================================================================
// Checkout Error
// =============================================================================

/// Result of a checkout coupon call that did not produce a discount.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The coupon was refused; the message is safe to show the customer.
    #[error(transparent)]
    Coupon(#[from] CouponError),

    /// `redeem` was handed a coupon id that is not stored.
    #[error("Unknown coupon id: {coupon_id}")]
    UnknownCouponId { coupon_id: String },

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl CheckoutError {
    pub fn is_user_facing(&self) -> bool {
        matches!(self, CheckoutError::Coupon(_))
    }

    /// Text for the checkout screen.
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::Coupon(e) => e.to_string(),
            CheckoutError::UnknownCouponId { .. } | CheckoutError::Database(_) => {
                "Unable to check this coupon right now".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_errors() {
        assert!(EngineError::AlreadyDispatching { campaign_id: "c".into() }.is_not_ready());
        assert!(EngineError::NotYetDue {
            campaign_id: "c".into(),
            scheduled_at: Utc::now()
        }
        .is_not_ready());
        assert!(!EngineError::CodeSpaceExhausted { attempts: 5 }.is_not_ready());
        assert!(!EngineError::InvalidConfig("x".into()).is_not_ready());
    }

    #[test]
    fn test_checkout_error_hides_infrastructure() {
        let db = CheckoutError::Database(DbError::PoolExhausted);
        assert!(!db.is_user_facing());
        assert!(!db.user_message().contains("pool"));

        let unknown = CheckoutError::UnknownCouponId {
            coupon_id: "9f1c2e".into(),
        };
        assert!(!unknown.is_user_facing());
        assert!(!unknown.user_message().contains("9f1c2e"));

        let coupon = CheckoutError::Coupon(CouponError::AlreadyUsed);
        assert!(coupon.is_user_facing());
        assert_eq!(coupon.user_message(), CouponError::AlreadyUsed.to_string());
    }
}
