//! # Domain Types
//!
//! Coupon, cart, customer and transaction types shared by checkout and
//! campaign code. Campaign-specific types live in [`crate::campaign`].
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐ 1   N ┌─────────────────┐                         │
//! │  │     Coupon      │──────►│  CouponReward   │                         │
//! │  │  ─────────────  │       │  ─────────────  │                         │
//! │  │  code (NOCASE)  │       │  applies_to     │                         │
//! │  │  status         │       │  discount_type  │                         │
//! │  │  targeting      │       │  discount_value │                         │
//! │  │  conditions     │       │  target ids     │                         │
//! │  └─────────────────┘       └─────────────────┘                         │
//! │                                                                         │
//! │  ┌─────────────────┐       ┌─────────────────┐  ┌─────────────────┐    │
//! │  │    CartItem     │       │    Customer     │  │  Transaction    │    │
//! │  │  (from caller)  │       │  (read-only)    │  │  (read-only)    │    │
//! │  └─────────────────┘       └─────────────────┘  └─────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Units
//! Money columns are integer cents (`*_cents`). A percentage reward stores its
//! `discount_value` in basis points, a flat reward stores cents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::campaign::CampaignChannel;
use crate::money::{Money, PercentRate};

// =============================================================================
// Coupon Enums
// =============================================================================

/// Lifecycle status of a coupon. Only `Active` coupons can be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CouponStatus {
    Active,
    Paused,
    Expired,
    Disabled,
}

impl CouponStatus {
    /// Lowercase name, as stored and as shown to shoppers.
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponStatus::Active => "active",
            CouponStatus::Paused => "paused",
            CouponStatus::Expired => "expired",
            CouponStatus::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `customer_tags` are matched against a customer's tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TagMatchMode {
    /// At least one coupon tag present on the customer.
    #[default]
    Any,
    /// Every coupon tag present on the customer.
    All,
}

/// How a coupon's condition predicates combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConditionLogic {
    #[default]
    And,
    Or,
}

impl ConditionLogic {
    /// The conjunction used when listing unmet conditions to a shopper.
    pub fn conjunction(&self) -> &'static str {
        match self {
            ConditionLogic::And => "and",
            ConditionLogic::Or => "or",
        }
    }
}

// =============================================================================
// Coupon
// =============================================================================

/// A named discount offer.
///
/// ## Targeting vs Conditions
/// - Targeting (`customer_id`, `customer_tags`) decides WHO may use it.
/// - Conditions (`min_purchase`, `max_customer_visits`, `requires_*`) decide
///   WHEN a cart qualifies, combined with `condition_logic`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Coupon {
    pub id: String,
    /// Unique, matched case-insensitively.
    pub code: String,
    pub name: Option<String>,
    pub status: CouponStatus,
    #[ts(as = "Option<String>")]
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i64>,
    pub use_count: i64,
    pub is_single_use: bool,
    pub min_purchase_cents: Option<i64>,
    /// 0 means "new customers only".
    pub max_customer_visits: Option<i64>,
    /// Pins the coupon to one customer.
    pub customer_id: Option<String>,
    pub customer_tags: Option<Vec<String>>,
    pub tag_match_mode: TagMatchMode,
    pub requires_service_ids: Vec<String>,
    pub requires_service_category_ids: Vec<String>,
    pub requires_product_id: Option<String>,
    pub requires_product_category_id: Option<String>,
    pub condition_logic: ConditionLogic,
    /// Set when the coupon was minted by a campaign send.
    pub campaign_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Coupon {
    /// Returns the minimum purchase as Money, if set.
    #[inline]
    pub fn min_purchase(&self) -> Option<Money> {
        self.min_purchase_cents.map(Money::from_cents)
    }

    /// True when `max_uses` is set and already reached.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.max_uses, Some(max) if self.use_count >= max)
    }

    /// True when `expires_at` is set and not after `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// Tag list with blanks removed, or `None` when tag targeting is off.
    pub fn targeted_tags(&self) -> Option<Vec<&str>> {
        let tags: Vec<&str> = self
            .customer_tags
            .as_ref()?
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if tags.is_empty() {
            None
        } else {
            Some(tags)
        }
    }
}

// =============================================================================
// Coupon Reward
// =============================================================================

/// What a reward's price basis is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RewardScope {
    Order,
    Product,
    Service,
}

impl RewardScope {
    /// The cart item type this scope draws from, `None` for the whole order.
    pub fn item_type(&self) -> Option<ItemType> {
        match self {
            RewardScope::Order => None,
            RewardScope::Product => Some(ItemType::Product),
            RewardScope::Service => Some(ItemType::Service),
        }
    }
}

/// How a reward computes its discount.
///
/// Stored as free text; anything unrecognised decodes to `Unsupported` and
/// is worth nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` is basis points.
    Percentage,
    /// `discount_value` is cents.
    Flat,
    /// The whole basis is discounted.
    Free,
    #[serde(other)]
    Unsupported,
}

impl DiscountType {
    /// Parses a stored discount type, never failing.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "percentage" | "percent" => DiscountType::Percentage,
            "flat" | "fixed" => DiscountType::Flat,
            "free" => DiscountType::Free,
            _ => DiscountType::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Flat => "flat",
            DiscountType::Free => "free",
            DiscountType::Unsupported => "unsupported",
        }
    }
}

/// One discount rule attached to a coupon.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CouponReward {
    pub id: String,
    pub coupon_id: String,
    pub applies_to: RewardScope,
    pub discount_type: DiscountType,
    /// Basis points for percentage, cents for flat, ignored for free.
    pub discount_value: i64,
    /// Caps percentage discounts only.
    pub max_discount_cents: Option<i64>,
    pub target_product_id: Option<String>,
    pub target_service_id: Option<String>,
    pub target_product_category_id: Option<String>,
    pub target_service_category_id: Option<String>,
    /// Display name of the target for messages when it is not in the cart.
    pub target_label: Option<String>,
}

impl CouponReward {
    /// Percentage rate; negative values clamp to zero.
    pub fn rate(&self) -> PercentRate {
        PercentRate::from_bps(self.discount_value.clamp(0, u32::MAX as i64) as u32)
    }

    /// Flat amount; negative values clamp to zero.
    pub fn flat_amount(&self) -> Money {
        Money::from_cents(self.discount_value.max(0))
    }

    pub fn max_discount(&self) -> Option<Money> {
        self.max_discount_cents.map(Money::from_cents)
    }

    /// The specific item id this reward targets within its scope.
    pub fn target_item_id(&self) -> Option<&str> {
        match self.applies_to {
            RewardScope::Order => None,
            RewardScope::Product => self.target_product_id.as_deref(),
            RewardScope::Service => self.target_service_id.as_deref(),
        }
    }

    /// The category id this reward targets within its scope.
    pub fn target_category_id(&self) -> Option<&str> {
        match self.applies_to {
            RewardScope::Order => None,
            RewardScope::Product => self.target_product_category_id.as_deref(),
            RewardScope::Service => self.target_service_category_id.as_deref(),
        }
    }
}

// =============================================================================
// Cart
// =============================================================================

/// Kind of cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Product,
    Service,
}

/// A cart line supplied by the booking flow or the POS.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartItem {
    /// Product or service id.
    pub target_id: String,
    pub target_category_id: Option<String>,
    pub item_type: ItemType,
    pub unit_price_cents: i64,
    pub quantity: i64,
    pub name: String,
    /// Category display name, used when a category reward matches.
    #[serde(default)]
    pub category_name: Option<String>,
}

impl CartItem {
    /// Unit price × quantity, saturating at the i64 bounds.
    #[inline]
    pub fn extended_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// Customer record, read-only to this engine.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub visit_count: i64,
    pub sms_consent: bool,
    pub email_consent: bool,
    pub loyalty_points_balance: i64,
    #[ts(as = "Option<String>")]
    pub last_visit_date: Option<DateTime<Utc>>,
    pub lifetime_spend_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// "First Last", or just the first name.
    pub fn full_name(&self) -> String {
        match self.last_name.as_deref().map(str::trim) {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }

    /// Case-insensitive tag membership.
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim();
        self.tags.iter().any(|t| t.trim().eq_ignore_ascii_case(tag))
    }

    pub fn lifetime_spend(&self) -> Money {
        Money::from_cents(self.lifetime_spend_cents)
    }

    /// Whole days since the last visit, `None` if never visited.
    pub fn days_since_last_visit(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_visit_date
            .map(|last| (now - last).num_days().max(0))
    }

    /// Whether this customer can be messaged on a single channel.
    ///
    /// `Both` is answered as "reachable on at least one".
    pub fn reachable_on(&self, channel: CampaignChannel) -> bool {
        match channel {
            CampaignChannel::Sms => self.sms_consent && has_value(&self.phone),
            CampaignChannel::Email => self.email_consent && has_value(&self.email),
            CampaignChannel::Both => {
                self.reachable_on(CampaignChannel::Sms) || self.reachable_on(CampaignChannel::Email)
            }
        }
    }
}

fn has_value(field: &Option<String>) -> bool {
    field.as_deref().map_or(false, |v| !v.trim().is_empty())
}

// =============================================================================
// Transaction
// =============================================================================

/// Status of a checkout transaction owned by the booking/POS systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Voided,
    Refunded,
}

/// A checkout transaction, read-only to this engine.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    pub customer_id: Option<String>,
    pub total_cents: i64,
    #[ts(as = "String")]
    pub transaction_date: DateTime<Utc>,
    pub status: TransactionStatus,
    /// Coupon applied to this transaction, if any.
    pub coupon_id: Option<String>,
}

impl Transaction {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn customer() -> Customer {
        Customer {
            id: "c1".into(),
            first_name: "Dana".into(),
            last_name: Some("Ruiz".into()),
            phone: Some("+15550100".into()),
            email: None,
            tags: vec!["VIP".into()],
            visit_count: 4,
            sms_consent: true,
            email_consent: true,
            loyalty_points_balance: 120,
            last_visit_date: None,
            lifetime_spend_cents: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_discount_type_parse_lossy() {
        assert_eq!(DiscountType::parse_lossy("Percentage"), DiscountType::Percentage);
        assert_eq!(DiscountType::parse_lossy("flat"), DiscountType::Flat);
        assert_eq!(DiscountType::parse_lossy("free"), DiscountType::Free);
        assert_eq!(DiscountType::parse_lossy("bogo"), DiscountType::Unsupported);
    }

    #[test]
    fn test_customer_reachability() {
        let c = customer();
        assert!(c.reachable_on(CampaignChannel::Sms));
        // email consent but no address
        assert!(!c.reachable_on(CampaignChannel::Email));
        assert!(c.reachable_on(CampaignChannel::Both));
    }

    #[test]
    fn test_customer_tags_case_insensitive() {
        let c = customer();
        assert!(c.has_tag("vip"));
        assert!(!c.has_tag("new"));
    }

    #[test]
    fn test_days_since_last_visit() {
        let now = Utc::now();
        let mut c = customer();
        assert_eq!(c.days_since_last_visit(now), None);
        c.last_visit_date = Some(now - Duration::days(9));
        assert_eq!(c.days_since_last_visit(now), Some(9));
        assert_eq!(c.full_name(), "Dana Ruiz");
    }

    #[test]
    fn test_cart_item_extended_price() {
        let item = CartItem {
            target_id: "p1".into(),
            target_category_id: None,
            item_type: ItemType::Product,
            unit_price_cents: 299,
            quantity: 3,
            name: "Air Freshener".into(),
            category_name: None,
        };
        assert_eq!(item.extended_price().cents(), 897);

        let bulk = CartItem {
            unit_price_cents: i64::MAX / 2,
            quantity: 5,
            ..item
        };
        assert_eq!(bulk.extended_price().cents(), i64::MAX);
    }
}
