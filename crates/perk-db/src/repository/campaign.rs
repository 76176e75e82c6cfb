//! # Campaign Repository
//!
//! Campaign rows, A/B variants, and every status transition.
//!
//! ## Status Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every transition is ONE conditional UPDATE; rows_affected tells the    │
//! │  caller whether it won. Nothing is locked in process, so two workers   │
//! │  on two machines still cannot both start the same send.                │
//! │                                                                         │
//! │  schedule        draft|scheduled ──► scheduled                          │
//! │  cancel          draft|scheduled ──► cancelled                          │
//! │  try_begin_sending draft|scheduled(due) ──► sending                     │
//! │  mark_sent       sending ──► sent (+ counts, sent_at)                   │
//! │  reset_stalled   sending ──► scheduled                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::{decode_json, encode_json};
use crate::error::{DbError, DbResult};
use perk_core::{Campaign, CampaignChannel, CampaignStatus, CampaignVariant};

const CAMPAIGN_COLUMNS: &str = r#"
    id, name, channel, status, audience_filters, sms_template, email_subject,
    email_template, coupon_id, scheduled_at, sent_at, recipient_count,
    delivered_count, created_at, updated_at
"#;

#[derive(sqlx::FromRow)]
struct CampaignRow {
    id: String,
    name: String,
    channel: CampaignChannel,
    status: CampaignStatus,
    audience_filters: String,
    sms_template: Option<String>,
    email_subject: Option<String>,
    email_template: Option<String>,
    coupon_id: Option<String>,
    scheduled_at: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
    recipient_count: i64,
    delivered_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = DbError;

    fn try_from(row: CampaignRow) -> DbResult<Self> {
        Ok(Campaign {
            audience_filters: decode_json("audience_filters", &row.audience_filters)?,
            id: row.id,
            name: row.name,
            channel: row.channel,
            status: row.status,
            sms_template: row.sms_template,
            email_subject: row.email_subject,
            email_template: row.email_template,
            coupon_id: row.coupon_id,
            scheduled_at: row.scheduled_at,
            sent_at: row.sent_at,
            recipient_count: row.recipient_count,
            delivered_count: row.delivered_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: String,
    campaign_id: String,
    label: String,
    split_percentage: i64,
    message_body: Option<String>,
    email_subject: Option<String>,
}

impl From<VariantRow> for CampaignVariant {
    fn from(row: VariantRow) -> Self {
        CampaignVariant {
            id: row.id,
            campaign_id: row.campaign_id,
            label: row.label,
            split_percentage: row.split_percentage,
            message_body: row.message_body,
            email_subject: row.email_subject,
        }
    }
}

/// Repository for campaign database operations.
#[derive(Debug, Clone)]
pub struct CampaignRepository {
    pool: SqlitePool,
}

impl CampaignRepository {
    /// Creates a new CampaignRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CampaignRepository { pool }
    }

    /// Gets a campaign by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Campaign>> {
        let sql = format!("SELECT {} FROM campaigns WHERE id = ?1", CAMPAIGN_COLUMNS);
        let row: Option<CampaignRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Campaign::try_from).transpose()
    }

    /// Inserts a campaign.
    pub async fn insert(&self, campaign: &Campaign) -> DbResult<()> {
        debug!(id = %campaign.id, name = %campaign.name, "Inserting campaign");

        sqlx::query(
            r#"
            INSERT INTO campaigns (
                id, name, channel, status, audience_filters, sms_template, email_subject,
                email_template, coupon_id, scheduled_at, sent_at, recipient_count,
                delivered_count, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&campaign.id)
        .bind(&campaign.name)
        .bind(campaign.channel)
        .bind(campaign.status)
        .bind(encode_json("audience_filters", &campaign.audience_filters)?)
        .bind(&campaign.sms_template)
        .bind(&campaign.email_subject)
        .bind(&campaign.email_template)
        .bind(&campaign.coupon_id)
        .bind(campaign.scheduled_at)
        .bind(campaign.sent_at)
        .bind(campaign.recipient_count)
        .bind(campaign.delivered_count)
        .bind(campaign.created_at)
        .bind(campaign.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Variants of a campaign, ordered by label.
    pub async fn variants(&self, campaign_id: &str) -> DbResult<Vec<CampaignVariant>> {
        let rows: Vec<VariantRow> = sqlx::query_as(
            r#"
            SELECT id, campaign_id, label, split_percentage, message_body, email_subject
              FROM campaign_variants
             WHERE campaign_id = ?1
             ORDER BY label, id
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CampaignVariant::from).collect())
    }

    /// Inserts a variant.
    pub async fn insert_variant(&self, variant: &CampaignVariant) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO campaign_variants (
                id, campaign_id, label, split_percentage, message_body, email_subject
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.campaign_id)
        .bind(&variant.label)
        .bind(variant.split_percentage)
        .bind(&variant.message_body)
        .bind(&variant.email_subject)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("variant label", variant.label.clone()),
            other => other,
        })?;

        Ok(())
    }

    /// Scheduled campaigns whose `scheduled_at` has passed, oldest first.
    pub async fn list_due(&self, now: DateTime<Utc>) -> DbResult<Vec<Campaign>> {
        let sql = format!(
            r#"
            SELECT {} FROM campaigns
             WHERE status = 'scheduled'
               AND (scheduled_at IS NULL OR scheduled_at <= ?1)
             ORDER BY scheduled_at, id
            "#,
            CAMPAIGN_COLUMNS
        );
        let rows: Vec<CampaignRow> = sqlx::query_as(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Campaign::try_from).collect()
    }

    /// Campaigns in a status, newest first.
    pub async fn list_by_status(&self, status: CampaignStatus) -> DbResult<Vec<Campaign>> {
        let sql = format!(
            "SELECT {} FROM campaigns WHERE status = ?1 ORDER BY created_at DESC, id",
            CAMPAIGN_COLUMNS
        );
        let rows: Vec<CampaignRow> = sqlx::query_as(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Campaign::try_from).collect()
    }

    // -------------------------------------------------------------------------
    // Status transitions
    // -------------------------------------------------------------------------

    /// draft|scheduled → scheduled at `at`.
    pub async fn schedule(&self, id: &str, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
               SET status = 'scheduled', scheduled_at = ?2, updated_at = ?3
             WHERE id = ?1 AND status IN ('draft', 'scheduled')
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// draft|scheduled → cancelled.
    pub async fn cancel(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
               SET status = 'cancelled', updated_at = ?2
             WHERE id = ?1 AND status IN ('draft', 'scheduled')
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Compare-and-swap into `sending`.
    ///
    /// Only a draft, or a scheduled campaign that is due at `now`, moves.
    /// Returns `true` for exactly one caller.
    pub async fn try_begin_sending(&self, id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
               SET status = 'sending', updated_at = ?2
             WHERE id = ?1
               AND status IN ('draft', 'scheduled')
               AND (status = 'draft' OR scheduled_at IS NULL OR scheduled_at <= ?2)
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// sending → sent with final counts.
    pub async fn mark_sent(
        &self,
        id: &str,
        recipient_count: i64,
        delivered_count: i64,
        sent_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
               SET status = 'sent', recipient_count = ?2, delivered_count = ?3,
                   sent_at = ?4, updated_at = ?4
             WHERE id = ?1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .bind(recipient_count)
        .bind(delivered_count)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// sending → scheduled, for an operator retry of a stalled send.
    pub async fn reset_stalled(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns
               SET status = 'scheduled', updated_at = ?2
             WHERE id = ?1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
