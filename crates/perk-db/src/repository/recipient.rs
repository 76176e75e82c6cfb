//! # Recipient Repository
//!
//! One row per (campaign, customer). The UNIQUE pair makes the insert the
//! idempotency marker for a send: a second insert for the same customer is
//! a no-op and reports `false`.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::debug;

use crate::error::DbResult;
use perk_core::{CampaignChannel, CampaignRecipient};

const RECIPIENT_COLUMNS: &str = r#"
    id, campaign_id, customer_id, channel, variant_id, coupon_code,
    delivered, clicked_at, sent_at
"#;

#[derive(sqlx::FromRow)]
struct RecipientRow {
    id: String,
    campaign_id: String,
    customer_id: String,
    channel: CampaignChannel,
    variant_id: Option<String>,
    coupon_code: Option<String>,
    delivered: bool,
    clicked_at: Option<DateTime<Utc>>,
    sent_at: DateTime<Utc>,
}

impl From<RecipientRow> for CampaignRecipient {
    fn from(row: RecipientRow) -> Self {
        CampaignRecipient {
            id: row.id,
            campaign_id: row.campaign_id,
            customer_id: row.customer_id,
            channel: row.channel,
            variant_id: row.variant_id,
            coupon_code: row.coupon_code,
            delivered: row.delivered,
            clicked_at: row.clicked_at,
            sent_at: row.sent_at,
        }
    }
}

/// Stored recipient totals for a campaign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct RecipientCounts {
    pub total: i64,
    pub delivered: i64,
}

/// Repository for campaign recipient rows.
#[derive(Debug, Clone)]
pub struct RecipientRepository {
    pool: SqlitePool,
}

impl RecipientRepository {
    /// Creates a new RecipientRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RecipientRepository { pool }
    }

    /// Inserts a row unless the customer already has one for this campaign.
    ///
    /// Returns `true` when the row was written.
    pub async fn insert(&self, recipient: &CampaignRecipient) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO campaign_recipients (
                id, campaign_id, customer_id, channel, variant_id, coupon_code,
                delivered, clicked_at, sent_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (campaign_id, customer_id) DO NOTHING
            "#,
        )
        .bind(&recipient.id)
        .bind(&recipient.campaign_id)
        .bind(&recipient.customer_id)
        .bind(recipient.channel)
        .bind(&recipient.variant_id)
        .bind(&recipient.coupon_code)
        .bind(recipient.delivered)
        .bind(recipient.clicked_at)
        .bind(recipient.sent_at)
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;
        if !inserted {
            debug!(
                campaign_id = %recipient.campaign_id,
                customer_id = %recipient.customer_id,
                "Recipient row already present"
            );
        }
        Ok(inserted)
    }

    /// Gets the row for one customer in one campaign.
    pub async fn get(&self, campaign_id: &str, customer_id: &str) -> DbResult<Option<CampaignRecipient>> {
        let sql = format!(
            "SELECT {} FROM campaign_recipients WHERE campaign_id = ?1 AND customer_id = ?2",
            RECIPIENT_COLUMNS
        );
        let row: Option<RecipientRow> = sqlx::query_as(&sql)
            .bind(campaign_id)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(CampaignRecipient::from))
    }

    /// All rows of a campaign, ordered by customer id.
    pub async fn list_for_campaign(&self, campaign_id: &str) -> DbResult<Vec<CampaignRecipient>> {
        let sql = format!(
            "SELECT {} FROM campaign_recipients WHERE campaign_id = ?1 ORDER BY customer_id",
            RECIPIENT_COLUMNS
        );
        let rows: Vec<RecipientRow> = sqlx::query_as(&sql)
            .bind(campaign_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(CampaignRecipient::from).collect())
    }

    /// Customers that already have a row for this campaign.
    pub async fn existing_customer_ids(&self, campaign_id: &str) -> DbResult<HashSet<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT customer_id FROM campaign_recipients WHERE campaign_id = ?1")
                .bind(campaign_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().collect())
    }

    /// Row totals, the source of a campaign's final counts.
    pub async fn counts(&self, campaign_id: &str) -> DbResult<RecipientCounts> {
        let counts: RecipientCounts = sqlx::query_as(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(delivered), 0) AS delivered
              FROM campaign_recipients
             WHERE campaign_id = ?1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(counts)
    }

    /// Stamps `clicked_at` on the first click only.
    ///
    /// Returns `true` when this call recorded the click.
    pub async fn record_click(
        &self,
        campaign_id: &str,
        customer_id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_recipients
               SET clicked_at = ?3
             WHERE campaign_id = ?1 AND customer_id = ?2 AND clicked_at IS NULL
            "#,
        )
        .bind(campaign_id)
        .bind(customer_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use perk_core::{AudienceFilter, Campaign, CampaignStatus, Customer};

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        for id in ["a", "b"] {
            db.customers()
                .insert(&Customer {
                    id: id.into(),
                    first_name: id.into(),
                    last_name: None,
                    phone: Some("+1555".into()),
                    email: None,
                    tags: vec![],
                    visit_count: 0,
                    sms_consent: true,
                    email_consent: false,
                    loyalty_points_balance: 0,
                    last_visit_date: None,
                    lifetime_spend_cents: 0,
                    created_at: now,
                })
                .await
                .unwrap();
        }
        db.campaigns()
            .insert(&Campaign {
                id: "camp".into(),
                name: "Test".into(),
                channel: CampaignChannel::Sms,
                status: CampaignStatus::Sending,
                audience_filters: AudienceFilter::All,
                sms_template: Some("hi".into()),
                email_subject: None,
                email_template: None,
                coupon_id: None,
                scheduled_at: None,
                sent_at: None,
                recipient_count: 0,
                delivered_count: 0,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        db
    }

    fn row(customer: &str, delivered: bool) -> CampaignRecipient {
        CampaignRecipient {
            id: uuid::Uuid::new_v4().to_string(),
            campaign_id: "camp".into(),
            customer_id: customer.into(),
            channel: CampaignChannel::Sms,
            variant_id: None,
            coupon_code: None,
            delivered,
            clicked_at: None,
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_one_row_per_customer() {
        let db = setup().await;
        assert!(db.recipients().insert(&row("a", true)).await.unwrap());
        assert!(!db.recipients().insert(&row("a", false)).await.unwrap());
        assert!(db.recipients().insert(&row("b", false)).await.unwrap());

        let counts = db.recipients().counts("camp").await.unwrap();
        assert_eq!(counts, RecipientCounts { total: 2, delivered: 1 });

        let existing = db.recipients().existing_customer_ids("camp").await.unwrap();
        assert!(existing.contains("a") && existing.contains("b"));

        // the first write wins
        assert!(db.recipients().get("camp", "a").await.unwrap().unwrap().delivered);
    }

    #[tokio::test]
    async fn test_first_click_wins() {
        let db = setup().await;
        db.recipients().insert(&row("a", true)).await.unwrap();

        let first = Utc::now();
        assert!(db.recipients().record_click("camp", "a", first).await.unwrap());
        assert!(!db
            .recipients()
            .record_click("camp", "a", first + Duration::minutes(5))
            .await
            .unwrap());
        assert!(!db.recipients().record_click("camp", "b", first).await.unwrap());

        let stored = db.recipients().get("camp", "a").await.unwrap().unwrap();
        assert_eq!(
            stored.clicked_at.map(|t| t.timestamp_millis()),
            Some(first.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_counts_empty_campaign() {
        let db = setup().await;
        assert_eq!(db.recipients().counts("camp").await.unwrap(), RecipientCounts::default());
        assert!(db.recipients().list_for_campaign("camp").await.unwrap().is_empty());
    }
}
