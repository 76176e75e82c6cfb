//! # Attribution Math
//!
//! Revenue a campaign send can claim, computed from recipient rows and the
//! recipients' transactions. Read-only and recomputed on demand.
//!
//! ```text
//!  recipient.sent_at                     sent_at + window_days
//!        │◄──────────── attribution window ────────────►│
//!        ├────────●───────────●──────────────────────────┤      ●
//!              counts      counts                           too late
//!   (completed transactions only; both ends inclusive)
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use ts_rs::TS;

use crate::campaign::{CampaignRecipient, CampaignVariant};
use crate::money::Money;
use crate::types::Transaction;

/// Per-variant slice of an attribution report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VariantAttribution {
    /// `None` for recipients on the base template.
    pub variant_id: Option<String>,
    pub label: String,
    pub recipients: i64,
    pub converted_customers: i64,
    pub revenue: Money,
}

/// Attributed outcome of one campaign send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AttributionReport {
    pub campaign_id: String,
    pub window_days: i64,
    pub recipient_count: i64,
    pub revenue: Money,
    pub transaction_count: i64,
    pub unique_customers: i64,
    /// unique_customers / recipient_count, 0 when nobody was sent to.
    pub conversion_rate: f64,
    pub variants: Vec<VariantAttribution>,
}

/// Builds the report from a campaign's recipients and their transactions.
///
/// `transactions` may include rows for other customers or outside the
/// window; they are ignored.
pub fn attribute(
    campaign_id: &str,
    recipients: &[CampaignRecipient],
    variants: &[CampaignVariant],
    transactions: &[Transaction],
    window_days: i64,
) -> AttributionReport {
    // `None` when the window reaches past the representable range.
    let window = Duration::try_days(window_days.max(0));
    let by_customer: HashMap<&str, &CampaignRecipient> = recipients
        .iter()
        .map(|r| (r.customer_id.as_str(), r))
        .collect();

    // variant key → (recipients, converted, revenue)
    let mut slices: BTreeMap<Option<&str>, (i64, HashSet<&str>, Money)> = BTreeMap::new();
    for r in recipients {
        slices.entry(r.variant_id.as_deref()).or_default().0 += 1;
    }

    let mut revenue = Money::zero();
    let mut transaction_count = 0;
    let mut converted: HashSet<&str> = HashSet::new();

    for tx in transactions.iter().filter(|t| t.is_completed()) {
        let Some(customer_id) = tx.customer_id.as_deref() else {
            continue;
        };
        let Some(recipient) = by_customer.get(customer_id) else {
            continue;
        };
        let start = recipient.sent_at;
        let end = window.and_then(|w| start.checked_add_signed(w));
        if tx.transaction_date < start || end.is_some_and(|end| tx.transaction_date > end) {
            continue;
        }

        revenue += tx.total();
        transaction_count += 1;
        converted.insert(customer_id);

        let slice = slices.entry(recipient.variant_id.as_deref()).or_default();
        slice.1.insert(customer_id);
        slice.2 += tx.total();
    }

    let labels: HashMap<&str, &str> = variants
        .iter()
        .map(|v| (v.id.as_str(), v.label.as_str()))
        .collect();

    let variants = slices
        .into_iter()
        .map(|(vid, (count, customers, rev))| VariantAttribution {
            variant_id: vid.map(str::to_string),
            label: match vid {
                Some(id) => labels.get(id).copied().unwrap_or(id).to_string(),
                None => "Base".to_string(),
            },
            recipients: count,
            converted_customers: customers.len() as i64,
            revenue: rev,
        })
        .collect();

    let recipient_count = recipients.len() as i64;
    let unique_customers = converted.len() as i64;

    AttributionReport {
        campaign_id: campaign_id.to_string(),
        window_days,
        recipient_count,
        revenue,
        transaction_count,
        unique_customers,
        conversion_rate: if recipient_count == 0 {
            0.0
        } else {
            unique_customers as f64 / recipient_count as f64
        },
        variants,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::CampaignChannel;
    use crate::types::TransactionStatus;
    use chrono::{DateTime, Utc};

    fn recipient(i: usize, sent_at: DateTime<Utc>, variant: Option<&str>) -> CampaignRecipient {
        CampaignRecipient {
            id: format!("rec-{}", i),
            campaign_id: "camp".into(),
            customer_id: format!("cust-{}", i),
            channel: CampaignChannel::Sms,
            variant_id: variant.map(str::to_string),
            coupon_code: None,
            delivered: true,
            clicked_at: None,
            sent_at,
        }
    }

    fn tx(customer: usize, cents: i64, at: DateTime<Utc>, status: TransactionStatus) -> Transaction {
        Transaction {
            id: format!("tx-{}-{}", customer, at.timestamp()),
            customer_id: Some(format!("cust-{}", customer)),
            total_cents: cents,
            transaction_date: at,
            status,
            coupon_id: None,
        }
    }

    #[test]
    fn test_twelve_converters_840_dollars() {
        let sent = Utc::now() - Duration::days(10);
        let recipients: Vec<_> = (0..100).map(|i| recipient(i, sent, None)).collect();
        let transactions: Vec<_> = (0..12)
            .map(|i| tx(i, 7000, sent + Duration::days(2), TransactionStatus::Completed))
            .collect();

        let report = attribute("camp", &recipients, &[], &transactions, 7);
        assert_eq!(report.revenue, Money::from_dollars(840));
        assert!(report.transaction_count >= 12);
        assert_eq!(report.unique_customers, 12);
        assert_eq!(report.recipient_count, 100);
        assert!((report.conversion_rate - 0.12).abs() < 1e-9);
    }

    #[test]
    fn test_window_edges_and_status() {
        let sent = Utc::now() - Duration::days(30);
        let recipients = vec![recipient(0, sent, None)];
        let transactions = vec![
            tx(0, 1000, sent, TransactionStatus::Completed),
            tx(0, 2000, sent + Duration::days(7), TransactionStatus::Completed),
            tx(0, 4000, sent + Duration::days(7) + Duration::seconds(1), TransactionStatus::Completed),
            tx(0, 8000, sent - Duration::seconds(1), TransactionStatus::Completed),
            tx(0, 16000, sent + Duration::days(1), TransactionStatus::Refunded),
            tx(5, 32000, sent + Duration::days(1), TransactionStatus::Completed),
        ];

        let report = attribute("camp", &recipients, &[], &transactions, 7);
        assert_eq!(report.revenue.cents(), 3000);
        assert_eq!(report.transaction_count, 2);
        assert_eq!(report.unique_customers, 1);
    }

    #[test]
    fn test_per_variant_breakdown() {
        let sent = Utc::now() - Duration::days(3);
        let variants = vec![CampaignVariant {
            id: "v-a".into(),
            campaign_id: "camp".into(),
            label: "Short copy".into(),
            split_percentage: 50,
            message_body: None,
            email_subject: None,
        }];
        let recipients = vec![
            recipient(0, sent, Some("v-a")),
            recipient(1, sent, Some("v-a")),
            recipient(2, sent, None),
        ];
        let transactions = vec![
            tx(0, 2500, sent + Duration::hours(5), TransactionStatus::Completed),
            tx(0, 1500, sent + Duration::hours(9), TransactionStatus::Completed),
            tx(2, 1000, sent + Duration::hours(1), TransactionStatus::Completed),
        ];

        let report = attribute("camp", &recipients, &variants, &transactions, 7);
        assert_eq!(report.variants.len(), 2);

        let base = &report.variants[0];
        assert_eq!(base.variant_id, None);
        assert_eq!(base.label, "Base");
        assert_eq!((base.recipients, base.converted_customers), (1, 1));

        let a = &report.variants[1];
        assert_eq!(a.label, "Short copy");
        assert_eq!((a.recipients, a.converted_customers), (2, 1));
        assert_eq!(a.revenue.cents(), 4000);
    }

    #[test]
    fn test_no_recipients() {
        let report = attribute("camp", &[], &[], &[], 7);
        assert_eq!(report.conversion_rate, 0.0);
        assert!(report.variants.is_empty());
    }

    #[test]
    fn test_huge_window_is_open_ended() {
        let sent = Utc::now() - Duration::days(3);
        let recipients = vec![recipient(0, sent, None)];
        let transactions = vec![
            tx(0, 1200, sent + Duration::days(1), TransactionStatus::Completed),
            tx(0, 800, sent - Duration::days(1), TransactionStatus::Completed),
        ];

        for days in [200_000_000, i64::MAX] {
            let report = attribute("camp", &recipients, &[], &transactions, days);
            assert_eq!(report.revenue.cents(), 1200);
            assert_eq!(report.window_days, days);
        }
    }
}
