//! Campaign revenue attribution.
//!
//! Loads a campaign's recipient rows and the recipients' completed
//! transactions, then defers to `perk_core::attribution` for the math.

use std::sync::Arc;
use tracing::debug;

use perk_core::attribution::{attribute, AttributionReport};
use perk_core::ValidationError;
use perk_db::Database;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Builds attribution reports on demand. Nothing is stored.
#[derive(Clone)]
pub struct AttributionEngine {
    db: Arc<Database>,
    default_window_days: i64,
}

impl AttributionEngine {
    pub fn new(db: Arc<Database>, config: &EngineConfig) -> Self {
        AttributionEngine {
            db,
            default_window_days: config.attribution.default_window_days,
        }
    }

    /// Report for one campaign; `window_days` falls back to the configured default.
    pub async fn attribute(
        &self,
        campaign_id: &str,
        window_days: Option<i64>,
    ) -> EngineResult<AttributionReport> {
        let window_days = window_days.unwrap_or(self.default_window_days);
        if window_days < 0 {
            return Err(ValidationError::Negative {
                field: "window_days".to_string(),
                value: window_days,
            }
            .into());
        }

        if self.db.campaigns().get(campaign_id).await?.is_none() {
            return Err(EngineError::CampaignNotFound(campaign_id.to_string()));
        }

        let recipients = self.db.recipients().list_for_campaign(campaign_id).await?;
        let variants = self.db.campaigns().variants(campaign_id).await?;

        let transactions = match recipients.iter().map(|r| r.sent_at).min() {
            Some(since) => {
                let ids: Vec<String> = recipients.iter().map(|r| r.customer_id.clone()).collect();
                self.db
                    .transactions()
                    .completed_for_customers(&ids, since)
                    .await?
            }
            None => Vec::new(),
        };

        let report = attribute(campaign_id, &recipients, &variants, &transactions, window_days);
        debug!(
            campaign_id = %campaign_id,
            window_days,
            revenue = %report.revenue,
            converted = report.unique_customers,
            "Attribution computed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::CampaignDispatcher;
    use crate::test_support::{self, campaign, customer, RecordingSender};
    use chrono::Duration;
    use perk_core::{CampaignChannel, Money, Transaction, TransactionStatus};

    fn tx(id: &str, customer_id: &str, cents: i64, at: chrono::DateTime<chrono::Utc>) -> Transaction {
        Transaction {
            id: id.into(),
            customer_id: Some(customer_id.into()),
            total_cents: cents,
            transaction_date: at,
            status: TransactionStatus::Completed,
            coupon_id: None,
        }
    }

    #[tokio::test]
    async fn test_attribution_after_dispatch() {
        let db = test_support::db().await;
        for id in ["c1", "c2", "c3"] {
            db.customers().insert(&customer(id)).await.unwrap();
        }
        db.campaigns()
            .insert(&campaign("camp", CampaignChannel::Sms))
            .await
            .unwrap();

        let config = EngineConfig::default();
        let dispatcher =
            CampaignDispatcher::new(db.clone(), Arc::new(RecordingSender::default()), &config);
        dispatcher.dispatch("camp").await.unwrap();

        let sent_at = db.recipients().get("camp", "c1").await.unwrap().unwrap().sent_at;
        let txs = db.transactions();
        txs.insert(&tx("t1", "c1", 1500, sent_at + Duration::days(1))).await.unwrap();
        txs.insert(&tx("t2", "c1", 500, sent_at + Duration::days(2))).await.unwrap();
        txs.insert(&tx("t3", "c2", 4000, sent_at + Duration::days(10))).await.unwrap();
        let mut pending = tx("t4", "c3", 9900, sent_at + Duration::hours(1));
        pending.status = TransactionStatus::Pending;
        txs.insert(&pending).await.unwrap();

        let engine = AttributionEngine::new(db.clone(), &config);

        let report = engine.attribute("camp", None).await.unwrap();
        assert_eq!(report.window_days, 7);
        assert_eq!(report.recipient_count, 3);
        assert_eq!(report.revenue, Money::from_cents(2000));
        assert_eq!(report.transaction_count, 2);
        assert_eq!(report.unique_customers, 1);
        assert_eq!(report.variants.len(), 1);
        assert_eq!(report.variants[0].label, "Base");

        let wide = engine.attribute("camp", Some(14)).await.unwrap();
        assert_eq!(wide.revenue, Money::from_cents(6000));
        assert_eq!(wide.unique_customers, 2);
    }

    #[tokio::test]
    async fn test_unsent_campaign_reports_zero() {
        let db = test_support::db().await;
        db.campaigns()
            .insert(&campaign("quiet", CampaignChannel::Email))
            .await
            .unwrap();

        let engine = AttributionEngine::new(db.clone(), &EngineConfig::default());
        let report = engine.attribute("quiet", Some(30)).await.unwrap();
        assert_eq!(report.recipient_count, 0);
        assert_eq!(report.revenue, Money::zero());
        assert_eq!(report.conversion_rate, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_campaign() {
        let db = test_support::db().await;
        let engine = AttributionEngine::new(db, &EngineConfig::default());
        let err = engine.attribute("missing", None).await.unwrap_err();
        assert!(matches!(err, EngineError::CampaignNotFound(_)));
    }

    #[tokio::test]
    async fn test_window_bounds() {
        let db = test_support::db().await;
        db.customers().insert(&customer("c1")).await.unwrap();
        db.campaigns()
            .insert(&campaign("camp", CampaignChannel::Sms))
            .await
            .unwrap();

        let config = EngineConfig::default();
        CampaignDispatcher::new(db.clone(), Arc::new(RecordingSender::default()), &config)
            .dispatch("camp")
            .await
            .unwrap();
        let sent_at = db.recipients().get("camp", "c1").await.unwrap().unwrap().sent_at;
        db.transactions()
            .insert(&tx("t1", "c1", 2500, sent_at + Duration::days(400)))
            .await
            .unwrap();

        let engine = AttributionEngine::new(db.clone(), &config);

        let report = engine.attribute("camp", Some(200_000_000)).await.unwrap();
        assert_eq!(report.revenue, Money::from_cents(2500));

        let err = engine.attribute("camp", Some(-1)).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::Negative { value: -1, .. })
        ));
    }
}
