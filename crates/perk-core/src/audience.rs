//! # Audience Filters
//!
//! A typed predicate tree selecting which customers a campaign reaches.
//!
//! ## Wire Shape
//! The admin UI stores filters as tagged JSON, e.g.
//! ```json
//! { "type": "and", "filters": [
//!     { "type": "tag_in", "tags": ["vip"] },
//!     { "type": "not", "filter": { "type": "last_visit_within_days", "days": 30 } }
//! ] }
//! ```
//!
//! ## Selection
//! ```text
//! customers ──► filter.matches(c, now) ──► reachable_on(channel) ──► dedupe ──► ids
//!                                           sms:   consent + phone
//!                                           email: consent + email
//!                                           both:  either of the above
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;

use crate::campaign::CampaignChannel;
use crate::error::{ValidationError, ValidationResult};
use crate::types::Customer;

/// Audience predicate tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AudienceFilter {
    /// Every customer.
    #[default]
    All,
    /// Has at least one of the tags (case-insensitive).
    TagIn { tags: Vec<String> },
    /// Has none of the tags.
    TagNotIn { tags: Vec<String> },
    /// Inclusive visit count range; a missing bound is open.
    VisitCountBetween { min: Option<i64>, max: Option<i64> },
    /// Visited within the last `days` days.
    LastVisitWithinDays { days: i64 },
    /// Last visit was at least `days` days ago. Never-visited customers do not match.
    LastVisitBeforeDays { days: i64 },
    NeverVisited,
    LoyaltyPointsAtLeast { points: i64 },
    LifetimeSpendAtLeast { cents: i64 },
    /// All children match; empty matches everyone.
    And { filters: Vec<AudienceFilter> },
    /// Any child matches; empty matches no one.
    Or { filters: Vec<AudienceFilter> },
    Not { filter: Box<AudienceFilter> },
}

impl AudienceFilter {
    /// Evaluates the tree for one customer.
    pub fn matches(&self, customer: &Customer, now: DateTime<Utc>) -> bool {
        match self {
            AudienceFilter::All => true,
            AudienceFilter::TagIn { tags } => tags.iter().any(|t| customer.has_tag(t)),
            AudienceFilter::TagNotIn { tags } => !tags.iter().any(|t| customer.has_tag(t)),
            AudienceFilter::VisitCountBetween { min, max } => {
                min.map_or(true, |m| customer.visit_count >= m)
                    && max.map_or(true, |m| customer.visit_count <= m)
            }
            AudienceFilter::LastVisitWithinDays { days } => customer
                .days_since_last_visit(now)
                .map_or(false, |d| d <= *days),
            AudienceFilter::LastVisitBeforeDays { days } => customer
                .days_since_last_visit(now)
                .map_or(false, |d| d >= *days),
            AudienceFilter::NeverVisited => {
                customer.last_visit_date.is_none() && customer.visit_count == 0
            }
            AudienceFilter::LoyaltyPointsAtLeast { points } => {
                customer.loyalty_points_balance >= *points
            }
            AudienceFilter::LifetimeSpendAtLeast { cents } => customer.lifetime_spend_cents >= *cents,
            AudienceFilter::And { filters } => filters.iter().all(|f| f.matches(customer, now)),
            AudienceFilter::Or { filters } => filters.iter().any(|f| f.matches(customer, now)),
            AudienceFilter::Not { filter } => !filter.matches(customer, now),
        }
    }

    /// Rejects trees that can never be meant as written.
    pub fn validate(&self) -> ValidationResult<()> {
        match self {
            AudienceFilter::TagIn { tags } | AudienceFilter::TagNotIn { tags } => {
                if tags.iter().all(|t| t.trim().is_empty()) {
                    return Err(ValidationError::Required {
                        field: "audience tags".into(),
                    });
                }
                Ok(())
            }
            AudienceFilter::VisitCountBetween {
                min: Some(min),
                max: Some(max),
            } if min > max => Err(ValidationError::OutOfRange {
                field: "visit_count_between.min".into(),
                min: 0,
                max: *max,
            }),
            AudienceFilter::LastVisitWithinDays { days }
            | AudienceFilter::LastVisitBeforeDays { days }
                if *days < 0 =>
            {
                Err(ValidationError::MustBePositive {
                    field: "days".into(),
                })
            }
            AudienceFilter::And { filters } | AudienceFilter::Or { filters } => {
                filters.iter().try_for_each(AudienceFilter::validate)
            }
            AudienceFilter::Not { filter } => filter.validate(),
            _ => Ok(()),
        }
    }
}

/// Applies `filter` and channel consent to `customers`.
///
/// The result keeps input order and drops repeated ids.
pub fn select_audience<'a, I>(
    customers: I,
    filter: &AudienceFilter,
    channel: CampaignChannel,
    now: DateTime<Utc>,
) -> Vec<String>
where
    I: IntoIterator<Item = &'a Customer>,
{
    let mut seen = HashSet::new();
    customers
        .into_iter()
        .filter(|c| c.reachable_on(channel))
        .filter(|c| filter.matches(c, now))
        .filter(|c| seen.insert(c.id.clone()))
        .map(|c| c.id.clone())
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
