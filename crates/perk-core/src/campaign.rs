//! # Campaign Types
//!
//! Campaigns, their A/B variants and the per-recipient send records.
//!
//! ## Lifecycle
//! ```text
//!   ┌───────┐ schedule ┌───────────┐ dispatch ┌─────────┐ finish ┌──────┐
//!   │ draft │─────────►│ scheduled │─────────►│ sending │───────►│ sent │
//!   └───┬───┘          └─────┬─────┘          └────┬────┘        └──────┘
//!       │   dispatch now     │   ▲                 │
//!       └────────────────────┼───┼─────────────────┘ (draft → sending)
//!       │ cancel             │   │ reset_stalled
//!       ▼                    ▼   │
//!   ┌───────────┐◄───────────┘   └──── sending (operator retry)
//!   │ cancelled │
//!   └───────────┘
//! ```
//!
//! A send is never resumed mid-flight. Recipient rows that already exist
//! when a reset campaign is dispatched again are skipped, which keeps the
//! one-row-per-customer rule intact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::audience::AudienceFilter;
use crate::error::{CoreError, CoreResult};

// =============================================================================
// Enums
// =============================================================================

/// Delivery channel of a campaign or recipient row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CampaignChannel {
    Sms,
    Email,
    Both,
}

impl CampaignChannel {
    /// The concrete channels a send on this channel attempts.
    pub fn concrete(&self) -> &'static [CampaignChannel] {
        match self {
            CampaignChannel::Sms => &[CampaignChannel::Sms],
            CampaignChannel::Email => &[CampaignChannel::Email],
            CampaignChannel::Both => &[CampaignChannel::Sms, CampaignChannel::Email],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignChannel::Sms => "sms",
            CampaignChannel::Email => "email",
            CampaignChannel::Both => "both",
        }
    }
}

impl std::fmt::Display for CampaignChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Campaign status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Sent => "sent",
            CampaignStatus::Cancelled => "cancelled",
        }
    }

    /// Draft and scheduled campaigns may start a send.
    #[inline]
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, CampaignStatus::Draft | CampaignStatus::Scheduled)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Campaign
// =============================================================================

/// A marketing send to a filtered audience.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub channel: CampaignChannel,
    pub status: CampaignStatus,
    pub audience_filters: AudienceFilter,
    pub sms_template: Option<String>,
    pub email_subject: Option<String>,
    pub email_template: Option<String>,
    /// Template coupon cloned once per recipient.
    pub coupon_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub sent_at: Option<DateTime<Utc>>,
    pub recipient_count: i64,
    pub delivered_count: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Whether this campaign may start a send at `now`.
    ///
    /// A scheduled campaign without `scheduled_at` is due immediately.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            CampaignStatus::Draft => true,
            CampaignStatus::Scheduled => self.scheduled_at.map_or(true, |at| at <= now),
            _ => false,
        }
    }

    /// Status after `schedule`: draft or scheduled → scheduled.
    pub fn schedule_transition(&self) -> CoreResult<CampaignStatus> {
        self.transition("schedule", &[CampaignStatus::Draft, CampaignStatus::Scheduled])
            .map(|_| CampaignStatus::Scheduled)
    }

    /// Status after `cancel`: draft or scheduled → cancelled.
    pub fn cancel_transition(&self) -> CoreResult<CampaignStatus> {
        self.transition("cancel", &[CampaignStatus::Draft, CampaignStatus::Scheduled])
            .map(|_| CampaignStatus::Cancelled)
    }

    /// Status after `reset_stalled`: sending → scheduled.
    pub fn reset_transition(&self) -> CoreResult<CampaignStatus> {
        self.transition("reset", &[CampaignStatus::Sending])
            .map(|_| CampaignStatus::Scheduled)
    }

    fn transition(&self, operation: &str, allowed: &[CampaignStatus]) -> CoreResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(CoreError::InvalidCampaignStatus {
                campaign_id: self.id.clone(),
                current_status: self.status.to_string(),
                operation: operation.to_string(),
            })
        }
    }
}

// =============================================================================
// Variant
// =============================================================================

/// One arm of an A/B test.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CampaignVariant {
    pub id: String,
    pub campaign_id: String,
    pub label: String,
    /// 0 to 100.
    pub split_percentage: i64,
    /// Replaces the body on every channel.
    pub message_body: Option<String>,
    pub email_subject: Option<String>,
}

// =============================================================================
// Recipient
// =============================================================================

/// What happened for one customer in one campaign send.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CampaignRecipient {
    pub id: String,
    pub campaign_id: String,
    pub customer_id: String,
    pub channel: CampaignChannel,
    pub variant_id: Option<String>,
    pub coupon_code: Option<String>,
    /// At least one attempted channel accepted the message.
    pub delivered: bool,
    #[ts(as = "Option<String>")]
    pub clicked_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub sent_at: DateTime<Utc>,
}

/// Outcome of a dispatch, returned to the admin UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DispatchSummary {
    pub campaign_id: String,
    /// Recipient rows stored for the campaign.
    pub recipient_count: i64,
    /// Recipient rows with `delivered = true`.
    pub delivered_count: i64,
    /// Customers processed in this run whose sends all failed.
    pub failed_count: i64,
    /// Customers skipped because they already had a row.
    pub skipped_count: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn campaign(status: CampaignStatus) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: "camp-1".into(),
            name: "Spring".into(),
            channel: CampaignChannel::Sms,
            status,
            audience_filters: AudienceFilter::All,
            sms_template: Some("Hi {first_name}".into()),
            email_subject: None,
            email_template: None,
            coupon_id: None,
            scheduled_at: None,
            sent_at: None,
            recipient_count: 0,
            delivered_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        assert!(campaign(CampaignStatus::Draft).is_due(now));

        let mut c = campaign(CampaignStatus::Scheduled);
        c.scheduled_at = Some(now + Duration::hours(1));
        assert!(!c.is_due(now));
        c.scheduled_at = Some(now - Duration::minutes(1));
        assert!(c.is_due(now));

        assert!(!campaign(CampaignStatus::Sent).is_due(now));
    }

    #[test]
    fn test_lifecycle_transitions() {
        assert_eq!(
            campaign(CampaignStatus::Draft).schedule_transition().unwrap(),
            CampaignStatus::Scheduled
        );
        assert_eq!(
            campaign(CampaignStatus::Scheduled).cancel_transition().unwrap(),
            CampaignStatus::Cancelled
        );
        assert_eq!(
            campaign(CampaignStatus::Sending).reset_transition().unwrap(),
            CampaignStatus::Scheduled
        );

        let err = campaign(CampaignStatus::Sending).cancel_transition().unwrap_err();
        assert_eq!(err.to_string(), "Campaign camp-1 is sending, cannot cancel");
        assert!(campaign(CampaignStatus::Sent).reset_transition().is_err());
    }

    #[test]
    fn test_concrete_channels() {
        assert_eq!(CampaignChannel::Both.concrete().len(), 2);
        assert_eq!(CampaignChannel::Email.concrete(), &[CampaignChannel::Email]);
    }
}
