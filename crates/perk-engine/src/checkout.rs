//! # Checkout Coupon Validation
//!
//! Online booking and the point-of-sale both validate codes through
//! [`CouponValidator`]. The only implementation, [`CouponService`], loads
//! the coupon, its rewards and the customer from storage and hands them to
//! the pure evaluator in `perk_core::eligibility`.
//!
//! ## Flow
//! ```text
//! Booking ──┐                      ┌─► coupons.find_by_code (NOCASE)
//!           ├─► CouponValidator ───┼─► customers.get / transactions (single-use)
//! POS ──────┘    .evaluate()       └─► eligibility::evaluate ─► CouponApplication
//!
//! payment captured ─► CouponValidator.redeem() ─► guarded use_count + 1
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use perk_core::eligibility::{self, EligibilityContext};
use perk_core::{CartItem, CouponApplication, CouponError, InactiveReason, Money};
use perk_db::Database;

use crate::error::CheckoutError;

/// Which checkout is asking. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutSurface {
    Booking,
    PointOfSale,
}

impl std::fmt::Display for CheckoutSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckoutSurface::Booking => write!(f, "booking"),
            CheckoutSurface::PointOfSale => write!(f, "point_of_sale"),
        }
    }
}

/// A code typed at checkout plus the cart it should apply to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponRequest {
    pub surface: CheckoutSurface,
    pub code: String,
    pub subtotal: Money,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

impl CouponRequest {
    pub fn new(surface: CheckoutSurface, code: impl Into<String>, subtotal: Money) -> Self {
        CouponRequest {
            surface,
            code: code.into(),
            subtotal,
            items: Vec::new(),
            customer_id: None,
        }
    }

    pub fn with_items(mut self, items: Vec<CartItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }
}

/// Coupon checks shared by every checkout surface.
#[async_trait]
pub trait CouponValidator: Send + Sync {
    /// Validates the code against the cart and prices its rewards.
    async fn evaluate(&self, request: &CouponRequest) -> Result<CouponApplication, CheckoutError>;

    /// Counts one use of the coupon.
    ///
    /// Fails with `Inactive(UsageExhausted)` once `max_uses` is reached,
    /// however many checkouts race for the last use, and with
    /// `UnknownCouponId` for an id that is not stored.
    async fn redeem(&self, coupon_id: &str) -> Result<(), CheckoutError>;
}

/// Database-backed [`CouponValidator`].
#[derive(Clone)]
pub struct CouponService {
    db: Arc<Database>,
}

impl CouponService {
    pub fn new(db: Arc<Database>) -> Self {
        CouponService { db }
    }

    /// [`CouponValidator::evaluate`] with an explicit clock.
    pub async fn evaluate_at(
        &self,
        request: &CouponRequest,
        now: DateTime<Utc>,
    ) -> Result<CouponApplication, CheckoutError> {
        let code = request.code.trim();
        debug!(surface = %request.surface, code = %code, "Evaluating coupon");

        let coupon = self
            .db
            .coupons()
            .find_by_code(code)
            .await?
            .ok_or_else(|| CouponError::NotFound {
                code: code.to_string(),
            })?;

        let customer = match request.customer_id.as_deref() {
            Some(id) => self.db.customers().get(id).await?,
            None => None,
        };

        let has_redeemed = match (&customer, coupon.is_single_use) {
            (Some(c), true) => {
                self.db
                    .transactions()
                    .has_completed_with_coupon(&c.id, &coupon.id)
                    .await?
            }
            _ => false,
        };

        let rewards = self.db.coupons().rewards_for(&coupon.id).await?;

        let mut ctx = EligibilityContext::new(request.subtotal, &request.items, now);
        if let Some(c) = customer.as_ref() {
            ctx = ctx.with_customer(c, has_redeemed);
        }

        match eligibility::evaluate(&coupon, &rewards, &ctx) {
            Ok(application) => {
                info!(
                    surface = %request.surface,
                    coupon_id = %coupon.id,
                    discount = %application.discount,
                    "Coupon applied"
                );
                Ok(application)
            }
            Err(e) => {
                debug!(surface = %request.surface, coupon_id = %coupon.id, reason = %e, "Coupon refused");
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl CouponValidator for CouponService {
    async fn evaluate(&self, request: &CouponRequest) -> Result<CouponApplication, CheckoutError> {
        self.evaluate_at(request, Utc::now()).await
    }

    async fn redeem(&self, coupon_id: &str) -> Result<(), CheckoutError> {
        if self.db.coupons().increment_use(coupon_id).await? {
            info!(coupon_id = %coupon_id, "Coupon redeemed");
            return Ok(());
        }

        match self.db.coupons().get_by_id(coupon_id).await? {
            Some(_) => {
                warn!(coupon_id = %coupon_id, "Redeem refused, usage exhausted");
                Err(CouponError::Inactive(InactiveReason::UsageExhausted).into())
            }
            None => Err(CheckoutError::UnknownCouponId {
                coupon_id: coupon_id.to_string(),
            }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
