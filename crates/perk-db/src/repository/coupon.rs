//! # Coupon Repository
//!
//! Coupons, their rewards, and the guarded usage counter.
//!
//! ## Redemption Guard
//! ```text
//! UPDATE coupons SET use_count = use_count + 1
//!  WHERE id = ? AND (max_uses IS NULL OR use_count < max_uses)
//!
//!  two registers redeem the last use at once:
//!    A: rows_affected = 1  ✓ redeemed
//!    B: rows_affected = 0  ✗ exhausted
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use super::{decode_json, encode_json};
use crate::error::{DbError, DbResult};
use perk_core::{ConditionLogic, Coupon, CouponReward, CouponStatus, DiscountType, RewardScope, TagMatchMode};

const COUPON_COLUMNS: &str = r#"
    id, code, name, status, expires_at, max_uses, use_count, is_single_use,
    min_purchase_cents, max_customer_visits, customer_id, customer_tags,
    tag_match_mode, requires_service_ids, requires_service_category_ids,
    requires_product_id, requires_product_category_id, condition_logic,
    campaign_id, created_at, updated_at
"#;

const REWARD_COLUMNS: &str = r#"
    id, coupon_id, applies_to, discount_type, discount_value, max_discount_cents,
    target_product_id, target_service_id, target_product_category_id,
    target_service_category_id, target_label
"#;

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: String,
    code: String,
    name: Option<String>,
    status: CouponStatus,
    expires_at: Option<DateTime<Utc>>,
    max_uses: Option<i64>,
    use_count: i64,
    is_single_use: bool,
    min_purchase_cents: Option<i64>,
    max_customer_visits: Option<i64>,
    customer_id: Option<String>,
    customer_tags: Option<String>,
    tag_match_mode: TagMatchMode,
    requires_service_ids: String,
    requires_service_category_ids: String,
    requires_product_id: Option<String>,
    requires_product_category_id: Option<String>,
    condition_logic: ConditionLogic,
    campaign_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = DbError;

    fn try_from(row: CouponRow) -> DbResult<Self> {
        Ok(Coupon {
            customer_tags: row
                .customer_tags
                .as_deref()
                .map(|raw| decode_json("customer_tags", raw))
                .transpose()?,
            requires_service_ids: decode_json("requires_service_ids", &row.requires_service_ids)?,
            requires_service_category_ids: decode_json(
                "requires_service_category_ids",
                &row.requires_service_category_ids,
            )?,
            id: row.id,
            code: row.code,
            name: row.name,
            status: row.status,
            expires_at: row.expires_at,
            max_uses: row.max_uses,
            use_count: row.use_count,
            is_single_use: row.is_single_use,
            min_purchase_cents: row.min_purchase_cents,
            max_customer_visits: row.max_customer_visits,
            customer_id: row.customer_id,
            tag_match_mode: row.tag_match_mode,
            requires_product_id: row.requires_product_id,
            requires_product_category_id: row.requires_product_category_id,
            condition_logic: row.condition_logic,
            campaign_id: row.campaign_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RewardRow {
    id: String,
    coupon_id: String,
    applies_to: RewardScope,
    discount_type: String,
    discount_value: i64,
    max_discount_cents: Option<i64>,
    target_product_id: Option<String>,
    target_service_id: Option<String>,
    target_product_category_id: Option<String>,
    target_service_category_id: Option<String>,
    target_label: Option<String>,
}

impl From<RewardRow> for CouponReward {
    fn from(row: RewardRow) -> Self {
        CouponReward {
            id: row.id,
            coupon_id: row.coupon_id,
            applies_to: row.applies_to,
            discount_type: DiscountType::parse_lossy(&row.discount_type),
            discount_value: row.discount_value,
            max_discount_cents: row.max_discount_cents,
            target_product_id: row.target_product_id,
            target_service_id: row.target_service_id,
            target_product_category_id: row.target_product_category_id,
            target_service_category_id: row.target_service_category_id,
            target_label: row.target_label,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for coupon database operations.
#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    /// Creates a new CouponRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Case-insensitive exact lookup (the column is `COLLATE NOCASE`).
    pub async fn find_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let sql = format!("SELECT {} FROM coupons WHERE code = ?1", COUPON_COLUMNS);
        let row: Option<CouponRow> = sqlx::query_as(&sql)
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Coupon::try_from).transpose()
    }

    /// Gets a coupon by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Coupon>> {
        let sql = format!("SELECT {} FROM coupons WHERE id = ?1", COUPON_COLUMNS);
        let row: Option<CouponRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Coupon::try_from).transpose()
    }

    /// Rewards of a coupon in definition order.
    pub async fn rewards_for(&self, coupon_id: &str) -> DbResult<Vec<CouponReward>> {
        let sql = format!(
            "SELECT {} FROM coupon_rewards WHERE coupon_id = ?1 ORDER BY position, rowid",
            REWARD_COLUMNS
        );
        let rows: Vec<RewardRow> = sqlx::query_as(&sql)
            .bind(coupon_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(CouponReward::from).collect())
    }

    /// Coupons minted by a campaign send.
    pub async fn list_by_campaign(&self, campaign_id: &str) -> DbResult<Vec<Coupon>> {
        let sql = format!(
            "SELECT {} FROM coupons WHERE campaign_id = ?1 ORDER BY created_at, code",
            COUPON_COLUMNS
        );
        let rows: Vec<CouponRow> = sqlx::query_as(&sql)
            .bind(campaign_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Coupon::try_from).collect()
    }

    /// Inserts a coupon and its rewards atomically.
    ///
    /// A code collision surfaces as `DbError::UniqueViolation { field: "code" }`.
    pub async fn insert(&self, coupon: &Coupon, rewards: &[CouponReward]) -> DbResult<()> {
        debug!(id = %coupon.id, code = %coupon.code, rewards = rewards.len(), "Inserting coupon");

        let mut tx = self.pool.begin().await?;

        insert_coupon_row(&mut tx, coupon).await.map_err(|e| match e {
            DbError::UniqueViolation { .. } => DbError::duplicate("code", coupon.code.clone()),
            other => other,
        })?;

        for (position, reward) in rewards.iter().enumerate() {
            insert_reward_row(&mut tx, reward, position as i64).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Increments `use_count` unless it would pass `max_uses`.
    ///
    /// Returns `false` when the coupon is exhausted or does not exist.
    pub async fn increment_use(&self, coupon_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE coupons
               SET use_count = use_count + 1,
                   updated_at = ?2
             WHERE id = ?1
               AND (max_uses IS NULL OR use_count < max_uses)
            "#,
        )
        .bind(coupon_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Sets the status of a coupon.
    pub async fn set_status(&self, coupon_id: &str, status: CouponStatus) -> DbResult<()> {
        let result = sqlx::query("UPDATE coupons SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(coupon_id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Coupon", coupon_id));
        }
        Ok(())
    }

    /// Total number of coupons.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coupons")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn insert_coupon_row(tx: &mut Transaction<'_, Sqlite>, coupon: &Coupon) -> DbResult<()> {
    let customer_tags = coupon
        .customer_tags
        .as_ref()
        .map(|tags| encode_json("customer_tags", tags))
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO coupons (
            id, code, name, status, expires_at, max_uses, use_count, is_single_use,
            min_purchase_cents, max_customer_visits, customer_id, customer_tags,
            tag_match_mode, requires_service_ids, requires_service_category_ids,
            requires_product_id, requires_product_category_id, condition_logic,
            campaign_id, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12,
            ?13, ?14, ?15,
            ?16, ?17, ?18,
            ?19, ?20, ?21
        )
        "#,
    )
    .bind(&coupon.id)
    .bind(&coupon.code)
    .bind(&coupon.name)
    .bind(coupon.status)
    .bind(coupon.expires_at)
    .bind(coupon.max_uses)
    .bind(coupon.use_count)
    .bind(coupon.is_single_use)
    .bind(coupon.min_purchase_cents)
    .bind(coupon.max_customer_visits)
    .bind(&coupon.customer_id)
    .bind(customer_tags)
    .bind(coupon.tag_match_mode)
    .bind(encode_json("requires_service_ids", &coupon.requires_service_ids)?)
    .bind(encode_json(
        "requires_service_category_ids",
        &coupon.requires_service_category_ids,
    )?)
    .bind(&coupon.requires_product_id)
    .bind(&coupon.requires_product_category_id)
    .bind(coupon.condition_logic)
    .bind(&coupon.campaign_id)
    .bind(coupon.created_at)
    .bind(coupon.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_reward_row(
    tx: &mut Transaction<'_, Sqlite>,
    reward: &CouponReward,
    position: i64,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO coupon_rewards (
            id, coupon_id, position, applies_to, discount_type, discount_value,
            max_discount_cents, target_product_id, target_service_id,
            target_product_category_id, target_service_category_id, target_label
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&reward.id)
    .bind(&reward.coupon_id)
    .bind(position)
    .bind(reward.applies_to)
    .bind(reward.discount_type.as_str())
    .bind(reward.discount_value)
    .bind(reward.max_discount_cents)
    .bind(&reward.target_product_id)
    .bind(&reward.target_service_id)
    .bind(&reward.target_product_category_id)
    .bind(&reward.target_service_category_id)
    .bind(&reward.target_label)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

// =============================================================================
// Test Fixtures
// =============================================================================


// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::fixtures::{coupon, reward};
    use super::*;
    use crate::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find_case_insensitive() {
        let db = db().await;
        let mut c = coupon("SAVE20");
        c.customer_tags = Some(vec!["vip".into()]);
        c.requires_service_ids = vec!["svc-1".into()];
        let r = reward(&c.id, DiscountType::Percentage, 2000);
        db.coupons().insert(&c, &[r]).await.unwrap();

        let found = db.coupons().find_by_code("save20").await.unwrap().unwrap();
        assert_eq!(found.id, c.id);
        assert_eq!(found.customer_tags, Some(vec!["vip".to_string()]));
        assert_eq!(found.requires_service_ids, vec!["svc-1".to_string()]);

        let rewards = db.coupons().rewards_for(&c.id).await.unwrap();
        assert_eq!(rewards.len(), 1);
        assert_eq!(rewards[0].discount_type, DiscountType::Percentage);

        assert!(db.coupons().find_by_code("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_code_any_case() {
        let db = db().await;
        db.coupons().insert(&coupon("FREEWASH"), &[]).await.unwrap();

        let err = db.coupons().insert(&coupon("freewash"), &[]).await.unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(db.coupons().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_discount_type_reads_as_unsupported() {
        let db = db().await;
        let c = coupon("ODD");
        db.coupons().insert(&c, &[]).await.unwrap();
        sqlx::query(
            "INSERT INTO coupon_rewards (id, coupon_id, applies_to, discount_type, discount_value) VALUES ('r-x', ?1, 'order', 'bogo', 1)",
        )
        .bind(&c.id)
        .execute(db.pool())
        .await
        .unwrap();

        let rewards = db.coupons().rewards_for(&c.id).await.unwrap();
        assert_eq!(rewards[0].discount_type, DiscountType::Unsupported);
    }

    #[tokio::test]
    async fn test_increment_use_respects_max_uses() {
        let db = db().await;
        let mut c = coupon("ONCE");
        c.max_uses = Some(1);
        db.coupons().insert(&c, &[]).await.unwrap();

        assert!(db.coupons().increment_use(&c.id).await.unwrap());
        assert!(!db.coupons().increment_use(&c.id).await.unwrap());

        let stored = db.coupons().get_by_id(&c.id).await.unwrap().unwrap();
        assert_eq!(stored.use_count, 1);
    }

    #[tokio::test]
    async fn test_set_status() {
        let db = db().await;
        let c = coupon("PAUSEME");
        db.coupons().insert(&c, &[]).await.unwrap();
        db.coupons().set_status(&c.id, CouponStatus::Paused).await.unwrap();

        let stored = db.coupons().get_by_id(&c.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CouponStatus::Paused);
        assert!(db.coupons().set_status("missing", CouponStatus::Paused).await.is_err());
    }
}
