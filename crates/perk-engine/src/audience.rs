//! # Audience Selection
//!
//! Walks the customer table in keyset pages and keeps the customers that
//! match the campaign's filter tree and can be reached on its channel.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use perk_core::audience::select_audience;
use perk_core::{AudienceFilter, CampaignChannel, Customer};
use perk_db::Database;

use crate::error::{EngineError, EngineResult};

/// Resolves filter trees against stored customers.
#[derive(Clone)]
pub struct AudienceSelector {
    db: Arc<Database>,
    page_size: i64,
}

impl AudienceSelector {
    pub fn new(db: Arc<Database>, page_size: i64) -> Self {
        AudienceSelector {
            db,
            page_size: page_size.max(1),
        }
    }

    /// Ids of the matching, reachable customers, in id order.
    pub async fn select(
        &self,
        filter: &AudienceFilter,
        channel: CampaignChannel,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<String>> {
        Ok(self
            .resolve(filter, channel, now)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect())
    }

    /// Like [`select`](Self::select) but returns the customer records.
    pub async fn resolve(
        &self,
        filter: &AudienceFilter,
        channel: CampaignChannel,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<Customer>> {
        filter.validate()?;

        let mut audience = Vec::new();
        let mut after: Option<String> = None;
        let mut scanned = 0usize;

        loop {
            let page = self
                .db
                .customers()
                .page(after.as_deref(), self.page_size)
                .await
                .map_err(|e| EngineError::AudienceResolutionFailed(e.to_string()))?;
            if page.is_empty() {
                break;
            }
            scanned += page.len();
            after = page.last().map(|c| c.id.clone());

            let keep = select_audience(&page, filter, channel, now);
            let mut keep = keep.into_iter().peekable();
            for customer in page {
                if keep.peek() == Some(&customer.id) {
                    keep.next();
                    audience.push(customer);
                }
            }
        }

        debug!(scanned, selected = audience.len(), channel = %channel, "Audience resolved");
        Ok(audience)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, customer};
    use chrono::Duration;

    #[tokio::test]
    async fn test_select_across_pages() {
        let db = test_support::db().await;
        for i in 0..12 {
            let mut c = customer(&format!("c{:02}", i));
            c.sms_consent = i % 3 != 0;
            if i % 2 == 0 {
                c.tags = vec!["vip".into()];
            }
            db.customers().insert(&c).await.unwrap();
        }

        let selector = AudienceSelector::new(db.clone(), 5);
        let filter = AudienceFilter::TagIn {
            tags: vec!["VIP".into()],
        };
        let ids = selector.select(&filter, CampaignChannel::Sms, Utc::now()).await.unwrap();

        // even ids are vip; multiples of 3 lack SMS consent
        assert_eq!(ids, vec!["c02", "c04", "c08", "c10"]);
    }

    #[tokio::test]
    async fn test_both_channel_keeps_single_channel_customers() {
        let db = test_support::db().await;
        let mut sms_only = customer("a");
        sms_only.email_consent = false;
        let mut email_only = customer("b");
        email_only.sms_consent = false;
        let mut neither = customer("c");
        neither.sms_consent = false;
        neither.email_consent = false;
        for c in [&sms_only, &email_only, &neither] {
            db.customers().insert(c).await.unwrap();
        }

        let selector = AudienceSelector::new(db.clone(), 100);
        let ids = selector
            .select(&AudienceFilter::All, CampaignChannel::Both, Utc::now())
            .await
            .unwrap();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_lapsed_customers() {
        let db = test_support::db().await;
        let mut lapsed = customer("lapsed");
        lapsed.last_visit_date = Some(Utc::now() - Duration::days(60));
        let recent = customer("recent");
        db.customers().insert(&lapsed).await.unwrap();
        db.customers().insert(&recent).await.unwrap();

        let selector = AudienceSelector::new(db.clone(), 100);
        let ids = selector
            .select(
                &AudienceFilter::LastVisitBeforeDays { days: 45 },
                CampaignChannel::Email,
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(ids, vec!["lapsed"]);
    }
}
