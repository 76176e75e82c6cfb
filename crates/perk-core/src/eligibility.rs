//! # Coupon Eligibility
//!
//! Full evaluation of one coupon against a cart. The lookup by code and the
//! single-use history query happen in perk-engine; everything after that is
//! here and pure.
//!
//! ## Evaluation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  status ─► expiry ─► usage ─► single-use ─► pinned customer ─► tags    │
//! │     │         │        │           │               │             │      │
//! │  Inactive  Inactive Inactive  AlreadyUsed     NotEligible   NotEligible │
//! │                                                                         │
//! │  conditions (AND / OR) ─► rewards ─► total clamp [0, subtotal]          │
//! │        │                     │                                          │
//! │   NotEligible         NoMatchingItems                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust
//! use chrono::Utc;
//! use perk_core::eligibility::{evaluate, EligibilityContext};
//! # use perk_core::types::*;
//! # use perk_core::money::Money;
//! # let now = Utc::now();
//! # let coupon = Coupon {
//! #     id: "c1".into(), code: "SAVE20".into(), name: None,
//! #     status: CouponStatus::Active, expires_at: None, max_uses: None,
//! #     use_count: 0, is_single_use: false, min_purchase_cents: None,
//! #     max_customer_visits: None, customer_id: None, customer_tags: None,
//! #     tag_match_mode: TagMatchMode::Any, requires_service_ids: vec![],
//! #     requires_service_category_ids: vec![], requires_product_id: None,
//! #     requires_product_category_id: None, condition_logic: ConditionLogic::And,
//! #     campaign_id: None, created_at: now, updated_at: now,
//! # };
//! # let rewards = vec![CouponReward {
//! #     id: "r1".into(), coupon_id: "c1".into(), applies_to: RewardScope::Order,
//! #     discount_type: DiscountType::Percentage, discount_value: 2000,
//! #     max_discount_cents: None, target_product_id: None, target_service_id: None,
//! #     target_product_category_id: None, target_service_category_id: None,
//! #     target_label: None,
//! # }];
//!
//! let ctx = EligibilityContext::new(Money::from_dollars(50), &[], now);
//! let applied = evaluate(&coupon, &rewards, &ctx).unwrap();
//! assert_eq!(applied.discount.cents(), 1000);
//! assert_eq!(applied.description, "Order $10.00 off");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CouponError, InactiveReason};
use crate::money::Money;
use crate::reward::RewardCalculator;
use crate::types::{
    CartItem, ConditionLogic, Coupon, CouponReward, CouponStatus, Customer, DiscountType,
    ItemType, RewardScope, TagMatchMode,
};

// =============================================================================
// Input / Output
// =============================================================================

/// Everything about the checkout the evaluator needs besides the coupon.
#[derive(Debug, Clone)]
pub struct EligibilityContext<'a> {
    pub subtotal: Money,
    pub items: &'a [CartItem],
    /// Resolved customer, if the surface identified one.
    pub customer: Option<&'a Customer>,
    /// The resolved customer has a completed transaction with this coupon.
    pub customer_has_redeemed: bool,
    pub now: DateTime<Utc>,
}

impl<'a> EligibilityContext<'a> {
    pub fn new(subtotal: Money, items: &'a [CartItem], now: DateTime<Utc>) -> Self {
        Self {
            subtotal,
            items,
            customer: None,
            customer_has_redeemed: false,
            now,
        }
    }

    pub fn with_customer(mut self, customer: &'a Customer, has_redeemed: bool) -> Self {
        self.customer = Some(customer);
        self.customer_has_redeemed = has_redeemed;
        self
    }
}

/// One matched reward in the breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RewardLine {
    pub reward_id: String,
    pub target_name: String,
    pub discount_type: DiscountType,
    pub amount: Money,
}

impl RewardLine {
    /// `"Free Basic Wash"` or `"Order $10.00 off"`.
    pub fn describe(&self) -> String {
        match self.discount_type {
            DiscountType::Free => format!("Free {}", self.target_name),
            _ => format!("{} {} off", self.target_name, self.amount),
        }
    }
}

/// A coupon that passed every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CouponApplication {
    pub coupon_id: String,
    pub code: String,
    /// Total discount, within `[0, subtotal]`.
    pub discount: Money,
    pub breakdown: Vec<RewardLine>,
    pub description: String,
}

// =============================================================================
// Evaluation
// =============================================================================

/// Runs every check after the code lookup, in order, and prices the rewards.
pub fn evaluate(
    coupon: &Coupon,
    rewards: &[CouponReward],
    ctx: &EligibilityContext<'_>,
) -> Result<CouponApplication, CouponError> {
    check_availability(coupon, ctx.now)?;

    if coupon.is_single_use && ctx.customer.is_some() && ctx.customer_has_redeemed {
        return Err(CouponError::AlreadyUsed);
    }

    check_targeting(coupon, ctx.customer)?;
    check_conditions(coupon, ctx)?;

    let breakdown = price_rewards(rewards, ctx);
    if !rewards.is_empty() && breakdown.is_empty() {
        return Err(CouponError::NoMatchingItems {
            required: rewards.iter().map(required_label).collect(),
        });
    }

    let discount = breakdown
        .iter()
        .map(|line| line.amount)
        .sum::<Money>()
        .clamp_to(Money::zero(), ctx.subtotal);

    let description = breakdown
        .iter()
        .map(RewardLine::describe)
        .collect::<Vec<_>>()
        .join(", ");

    Ok(CouponApplication {
        coupon_id: coupon.id.clone(),
        code: coupon.code.clone(),
        discount,
        breakdown,
        description,
    })
}

/// Status, expiry and usage checks.
pub fn check_availability(coupon: &Coupon, now: DateTime<Utc>) -> Result<(), CouponError> {
    if coupon.status != CouponStatus::Active {
        return Err(CouponError::Inactive(InactiveReason::Status(coupon.status)));
    }
    if coupon.is_expired_at(now) {
        return Err(CouponError::Inactive(InactiveReason::Expired));
    }
    if coupon.is_exhausted() {
        return Err(CouponError::Inactive(InactiveReason::UsageExhausted));
    }
    Ok(())
}

fn check_targeting(coupon: &Coupon, customer: Option<&Customer>) -> Result<(), CouponError> {
    if let Some(pinned) = coupon.customer_id.as_deref() {
        match customer {
            Some(c) if c.id == pinned => {}
            _ => {
                return Err(CouponError::NotEligible(
                    "This coupon is not available for your account".into(),
                ))
            }
        }
    }

    if let Some(tags) = coupon.targeted_tags() {
        let customer = customer.ok_or_else(|| {
            CouponError::NotEligible("This coupon is for selected customers only".into())
        })?;
        let ok = match coupon.tag_match_mode {
            TagMatchMode::Any => tags.iter().any(|t| customer.has_tag(t)),
            TagMatchMode::All => tags.iter().all(|t| customer.has_tag(t)),
        };
        if !ok {
            return Err(CouponError::NotEligible(
                "This coupon is for selected customers only".into(),
            ));
        }
    }

    Ok(())
}

fn check_conditions(coupon: &Coupon, ctx: &EligibilityContext<'_>) -> Result<(), CouponError> {
    // (passed, what the shopper needs if not)
    let mut predicates: Vec<(bool, String)> = Vec::new();

    if let Some(min) = coupon.min_purchase() {
        predicates.push((
            ctx.subtotal >= min,
            format!("a minimum purchase of {}", min),
        ));
    }

    if let Some(max_visits) = coupon.max_customer_visits {
        let visits = ctx.customer.map_or(0, |c| c.visit_count);
        let label = if max_visits == 0 {
            "new customers only".to_string()
        } else {
            format!("customers with {} or fewer visits", max_visits)
        };
        predicates.push((visits <= max_visits, label));
    }

    if !coupon.requires_service_ids.is_empty() {
        let ok = ctx.items.iter().any(|i| {
            i.item_type == ItemType::Service && coupon.requires_service_ids.contains(&i.target_id)
        });
        predicates.push((ok, "a qualifying service in the cart".into()));
    }

    if !coupon.requires_service_category_ids.is_empty() {
        let ok = ctx.items.iter().any(|i| {
            i.item_type == ItemType::Service
                && i.target_category_id
                    .as_ref()
                    .map_or(false, |cat| coupon.requires_service_category_ids.contains(cat))
        });
        predicates.push((ok, "a service from a qualifying category".into()));
    }

    if let Some(product_id) = coupon.requires_product_id.as_deref() {
        let ok = ctx
            .items
            .iter()
            .any(|i| i.item_type == ItemType::Product && i.target_id == product_id);
        predicates.push((ok, "a qualifying product in the cart".into()));
    }

    if let Some(category_id) = coupon.requires_product_category_id.as_deref() {
        let ok = ctx.items.iter().any(|i| {
            i.item_type == ItemType::Product && i.target_category_id.as_deref() == Some(category_id)
        });
        predicates.push((ok, "a product from a qualifying category".into()));
    }

    if predicates.is_empty() {
        return Ok(());
    }

    let passed = match coupon.condition_logic {
        ConditionLogic::And => predicates.iter().all(|(ok, _)| *ok),
        ConditionLogic::Or => predicates.iter().any(|(ok, _)| *ok),
    };
    if passed {
        return Ok(());
    }

    let unmet: Vec<String> = predicates
        .into_iter()
        .filter(|(ok, _)| !ok)
        .map(|(_, label)| label)
        .collect();
    let joiner = format!(" {} ", coupon.condition_logic.conjunction());
    Err(CouponError::NotEligible(format!(
        "Coupon requires: {}",
        unmet.join(&joiner)
    )))
}

// =============================================================================
// Reward Pricing
// =============================================================================

fn price_rewards(rewards: &[CouponReward], ctx: &EligibilityContext<'_>) -> Vec<RewardLine> {
    rewards
        .iter()
        .filter_map(|reward| {
            let (target_name, basis) = resolve_target(reward, ctx)?;
            Some(RewardLine {
                reward_id: reward.id.clone(),
                target_name,
                discount_type: reward.discount_type,
                amount: RewardCalculator::discount(reward, basis),
            })
        })
        .collect()
}

/// Target name and price basis, or `None` when the target is not in the cart.
fn resolve_target(reward: &CouponReward, ctx: &EligibilityContext<'_>) -> Option<(String, Money)> {
    let item_type = match reward.applies_to.item_type() {
        None => return Some(("Order".to_string(), ctx.subtotal)),
        Some(t) => t,
    };

    let of_type = ctx.items.iter().filter(|i| i.item_type == item_type);

    let (matched, name): (Vec<&CartItem>, Option<String>) =
        if let Some(target) = reward.target_item_id() {
            let matched: Vec<_> = of_type.filter(|i| i.target_id == target).collect();
            let name = matched.first().map(|i| i.name.clone());
            (matched, name)
        } else if let Some(category) = reward.target_category_id() {
            let matched: Vec<_> = of_type
                .filter(|i| i.target_category_id.as_deref() == Some(category))
                .collect();
            let name = matched
                .first()
                .and_then(|i| i.category_name.clone())
                .or_else(|| reward.target_label.clone());
            (matched, name)
        } else {
            let matched: Vec<_> = of_type.collect();
            let name = match matched.as_slice() {
                [only] => Some(only.name.clone()),
                _ => None,
            };
            (matched, name)
        };

    if matched.is_empty() {
        return None;
    }

    let name = name.unwrap_or_else(|| scope_plural(reward.applies_to).to_string());
    let basis = matched.iter().map(|i| i.extended_price()).sum();
    Some((name, basis))
}

fn scope_plural(scope: RewardScope) -> &'static str {
    match scope {
        RewardScope::Order => "Order",
        RewardScope::Product => "Products",
        RewardScope::Service => "Services",
    }
}

/// How a reward's target is named when it is missing from the cart.
fn required_label(reward: &CouponReward) -> String {
    if let Some(label) = reward.target_label.as_deref().filter(|l| !l.trim().is_empty()) {
        return label.to_string();
    }
    let kind = match reward.applies_to {
        RewardScope::Order => "an order",
        RewardScope::Product => "a product",
        RewardScope::Service => "a service",
    };
    if reward.target_item_id().is_some() {
        format!("{} named on the coupon", kind)
    } else if reward.target_category_id().is_some() {
        format!("{} from the coupon's category", kind)
    } else {
        kind.to_string()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(code: &str) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: format!("id-{}", code),
            code: code.into(),
            name: None,
            status: CouponStatus::Active,
            expires_at: None,
            max_uses: None,
            use_count: 0,
            is_single_use: false,
            min_purchase_cents: None,
            max_customer_visits: None,
            customer_id: None,
            customer_tags: None,
            tag_match_mode: TagMatchMode::Any,
            requires_service_ids: vec![],
            requires_service_category_ids: vec![],
            requires_product_id: None,
            requires_product_category_id: None,
            condition_logic: ConditionLogic::And,
            campaign_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn reward(scope: RewardScope, kind: DiscountType, value: i64) -> CouponReward {
        CouponReward {
            id: "r1".into(),
            coupon_id: "c1".into(),
            applies_to: scope,
            discount_type: kind,
            discount_value: value,
            max_discount_cents: None,
            target_product_id: None,
            target_service_id: None,
            target_product_category_id: None,
            target_service_category_id: None,
            target_label: None,
        }
    }

    fn item(id: &str, item_type: ItemType, cents: i64, name: &str) -> CartItem {
        CartItem {
            target_id: id.into(),
            target_category_id: None,
            item_type,
            unit_price_cents: cents,
            quantity: 1,
            name: name.into(),
            category_name: None,
        }
    }

    fn customer(visits: i64, tags: &[&str]) -> Customer {
        Customer {
            id: "cust-1".into(),
            first_name: "Sam".into(),
            last_name: None,
            phone: None,
            email: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            visit_count: visits,
            sms_consent: false,
            email_consent: false,
            loyalty_points_balance: 0,
            last_visit_date: None,
            lifetime_spend_cents: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_save20_on_fifty_dollars() {
        let c = coupon("SAVE20");
        let rewards = vec![reward(RewardScope::Order, DiscountType::Percentage, 2000)];
        let ctx = EligibilityContext::new(Money::from_cents(5000), &[], Utc::now());

        let applied = evaluate(&c, &rewards, &ctx).unwrap();
        assert_eq!(applied.discount.cents(), 1000);
        assert_eq!(applied.description, "Order $10.00 off");
    }

    #[test]
    fn test_freewash_targets_one_service() {
        let c = coupon("FREEWASH");
        let mut r = reward(RewardScope::Service, DiscountType::Free, 0);
        r.target_service_id = Some("svc-basic".into());
        let items = vec![
            item("svc-basic", ItemType::Service, 2500, "Basic Wash"),
            item("prd-fresh", ItemType::Product, 1000, "Air Freshener"),
        ];
        let ctx = EligibilityContext::new(Money::from_cents(3500), &items, Utc::now());

        let applied = evaluate(&c, &[r], &ctx).unwrap();
        assert_eq!(applied.discount.cents(), 2500);
        assert_eq!(applied.description, "Free Basic Wash");
    }

    #[test]
    fn test_missing_target_is_no_matching_items() {
        let c = coupon("FREEWASH");
        let mut r = reward(RewardScope::Service, DiscountType::Free, 0);
        r.target_service_id = Some("svc-basic".into());
        r.target_label = Some("Basic Wash".into());
        let items = vec![item("prd-fresh", ItemType::Product, 1000, "Air Freshener")];
        let ctx = EligibilityContext::new(Money::from_cents(1000), &items, Utc::now());

        let err = evaluate(&c, &[r], &ctx).unwrap_err();
        assert_eq!(
            err,
            CouponError::NoMatchingItems {
                required: vec!["Basic Wash".into()]
            }
        );
    }

    #[test]
    fn test_new_customers_only() {
        let mut c = coupon("WELCOME");
        c.max_customer_visits = Some(0);
        let regular = customer(3, &[]);
        let ctx = EligibilityContext::new(Money::from_cents(5000), &[], Utc::now())
            .with_customer(&regular, false);

        let err = evaluate(&c, &[], &ctx).unwrap_err();
        assert!(err.to_string().contains("new customers only"));

        // anonymous shoppers count as zero visits
        let ctx = EligibilityContext::new(Money::from_cents(5000), &[], Utc::now());
        assert!(evaluate(&c, &[], &ctx).is_ok());
    }

    #[test]
    fn test_condition_message_lists_every_unmet_predicate() {
        let mut c = coupon("BIGNEW");
        c.min_purchase_cents = Some(4000);
        c.max_customer_visits = Some(0);
        let regular = customer(2, &[]);
        let ctx = EligibilityContext::new(Money::from_cents(1000), &[], Utc::now())
            .with_customer(&regular, false);

        let err = evaluate(&c, &[], &ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Coupon requires: a minimum purchase of $40.00 and new customers only"
        );

        c.condition_logic = ConditionLogic::Or;
        let err = evaluate(&c, &[], &ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Coupon requires: a minimum purchase of $40.00 or new customers only"
        );

        let big = EligibilityContext::new(Money::from_cents(5000), &[], Utc::now())
            .with_customer(&regular, false);
        assert!(evaluate(&c, &[], &big).is_ok());
    }

    #[test]
    fn test_tag_match_all() {
        let mut c = coupon("VIPONLY");
        c.customer_tags = Some(vec!["vip".into()]);
        c.tag_match_mode = TagMatchMode::All;
        let ctx = |cust: &Customer| {
            evaluate(
                &c,
                &[],
                &EligibilityContext::new(Money::from_cents(100), &[], Utc::now())
                    .with_customer(cust, false),
            )
        };

        assert!(ctx(&customer(1, &["vip", "new"])).is_ok());
        assert!(matches!(
            ctx(&customer(1, &["new"])),
            Err(CouponError::NotEligible(_))
        ));

        let anonymous = EligibilityContext::new(Money::from_cents(100), &[], Utc::now());
        assert!(matches!(
            evaluate(&c, &[], &anonymous),
            Err(CouponError::NotEligible(_))
        ));
    }

    #[test]
    fn test_usage_exhausted_rejected() {
        let mut c = coupon("ONCE");
        c.max_uses = Some(1);
        c.use_count = 1;
        let ctx = EligibilityContext::new(Money::from_cents(100), &[], Utc::now());
        assert_eq!(
            evaluate(&c, &[], &ctx).unwrap_err(),
            CouponError::Inactive(InactiveReason::UsageExhausted)
        );
    }

    #[test]
    fn test_check_order_status_before_expiry() {
        let mut c = coupon("OLD");
        c.status = CouponStatus::Paused;
        c.expires_at = Some(Utc::now() - Duration::days(1));
        let ctx = EligibilityContext::new(Money::from_cents(100), &[], Utc::now());
        assert_eq!(
            evaluate(&c, &[], &ctx).unwrap_err(),
            CouponError::Inactive(InactiveReason::Status(CouponStatus::Paused))
        );

        c.status = CouponStatus::Active;
        assert_eq!(
            evaluate(&c, &[], &ctx).unwrap_err(),
            CouponError::Inactive(InactiveReason::Expired)
        );
    }

    #[test]
    fn test_single_use_and_pinned_customer() {
        let mut c = coupon("MINE");
        c.is_single_use = true;
        c.customer_id = Some("cust-1".into());
        let owner = customer(1, &[]);
        let mut other = customer(1, &[]);
        other.id = "cust-2".into();

        let used = EligibilityContext::new(Money::from_cents(100), &[], Utc::now())
            .with_customer(&owner, true);
        assert_eq!(evaluate(&c, &[], &used).unwrap_err(), CouponError::AlreadyUsed);

        let wrong = EligibilityContext::new(Money::from_cents(100), &[], Utc::now())
            .with_customer(&other, false);
        assert!(matches!(
            evaluate(&c, &[], &wrong),
            Err(CouponError::NotEligible(_))
        ));

        let anonymous = EligibilityContext::new(Money::from_cents(100), &[], Utc::now());
        assert!(matches!(
            evaluate(&c, &[], &anonymous),
            Err(CouponError::NotEligible(_))
        ));
    }

    #[test]
    fn test_total_clamped_to_subtotal() {
        let c = coupon("STACK");
        let mut a = reward(RewardScope::Order, DiscountType::Flat, 3000);
        a.id = "a".into();
        let mut b = reward(RewardScope::Order, DiscountType::Flat, 3000);
        b.id = "b".into();
        let ctx = EligibilityContext::new(Money::from_cents(4000), &[], Utc::now());

        let applied = evaluate(&c, &[a, b], &ctx).unwrap();
        assert_eq!(applied.discount.cents(), 4000);
        assert_eq!(applied.breakdown.len(), 2);
        assert_eq!(applied.description, "Order $30.00 off, Order $30.00 off");
    }

    #[test]
    fn test_untargeted_scope_uses_all_items_of_type() {
        let c = coupon("PRODUCTS10");
        let r = reward(RewardScope::Product, DiscountType::Percentage, 1000);
        let items = vec![
            item("p1", ItemType::Product, 1000, "Wax"),
            item("p2", ItemType::Product, 2000, "Polish"),
            item("s1", ItemType::Service, 5000, "Detail"),
        ];
        let ctx = EligibilityContext::new(Money::from_cents(8000), &items, Utc::now());

        let applied = evaluate(&c, &[r], &ctx).unwrap();
        assert_eq!(applied.discount.cents(), 300);
        assert_eq!(applied.description, "Products $3.00 off");
    }

    #[test]
    fn test_requires_service_condition() {
        let mut c = coupon("ADDON");
        c.requires_service_ids = vec!["svc-detail".into()];
        let items = vec![item("svc-basic", ItemType::Service, 2500, "Basic Wash")];
        let ctx = EligibilityContext::new(Money::from_cents(2500), &items, Utc::now());
        assert!(matches!(
            evaluate(&c, &[], &ctx),
            Err(CouponError::NotEligible(msg)) if msg.contains("qualifying service")
        ));
    }
}
