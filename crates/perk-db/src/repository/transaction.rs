//! # Transaction Repository
//!
//! Checkout transactions are written by the booking/POS systems. Reads here
//! back the single-use coupon check and campaign attribution.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::MAX_IN_LIST;
use crate::error::DbResult;
use perk_core::{Transaction, TransactionStatus};

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: String,
    customer_id: Option<String>,
    total_cents: i64,
    transaction_date: DateTime<Utc>,
    status: TransactionStatus,
    coupon_id: Option<String>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            id: row.id,
            customer_id: row.customer_id,
            total_cents: row.total_cents,
            transaction_date: row.transaction_date,
            status: row.status,
            coupon_id: row.coupon_id,
        }
    }
}

/// Repository for transaction reads.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    /// Creates a new TransactionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Whether the customer has a completed transaction using this coupon.
    pub async fn has_completed_with_coupon(&self, customer_id: &str, coupon_id: &str) -> DbResult<bool> {
        let exists: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM transactions
                 WHERE customer_id = ?1 AND coupon_id = ?2 AND status = 'completed'
            )
            "#,
        )
        .bind(customer_id)
        .bind(coupon_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists == 1)
    }

    /// Completed transactions of the given customers on or after `since`.
    ///
    /// Ids are sent in batches of [`MAX_IN_LIST`].
    pub async fn completed_for_customers(
        &self,
        customer_ids: &[String],
        since: DateTime<Utc>,
    ) -> DbResult<Vec<Transaction>> {
        let mut out = Vec::new();

        for chunk in customer_ids.chunks(MAX_IN_LIST) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                r#"
                SELECT id, customer_id, total_cents, transaction_date, status, coupon_id
                  FROM transactions
                 WHERE status = 'completed'
                   AND transaction_date >= "#,
            );
            qb.push_bind(since);
            qb.push(" AND customer_id IN (");
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(") ORDER BY transaction_date, id");

            let rows: Vec<TransactionRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            out.extend(rows.into_iter().map(Transaction::from));
        }

        Ok(out)
    }

    /// Inserts a transaction (seeding and tests).
    pub async fn insert(&self, tx: &Transaction) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, customer_id, total_cents, transaction_date, status, coupon_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.customer_id)
        .bind(tx.total_cents)
        .bind(tx.transaction_date)
        .bind(tx.status)
        .bind(&tx.coupon_id)
        .execute(&self.pool)
        .await?;

        Ok(())
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
    use perk_core::Customer;

    async fn setup(customers: usize) -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for i in 0..customers {
            db.customers()
                .insert(&Customer {
                    id: format!("c{:04}", i),
                    first_name: "X".into(),
                    last_name: None,
                    phone: None,
                    email: None,
                    tags: vec![],
                    visit_count: 1,
                    sms_consent: false,
                    email_consent: false,
                    loyalty_points_balance: 0,
                    last_visit_date: None,
                    lifetime_spend_cents: 0,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        db
    }

    fn tx(id: &str, customer: &str, at: DateTime<Utc>, status: TransactionStatus) -> Transaction {
        Transaction {
            id: id.into(),
            customer_id: Some(customer.into()),
            total_cents: 1000,
            transaction_date: at,
            status,
            coupon_id: None,
        }
    }

    #[tokio::test]
    async fn test_completed_for_customers_filters() {
        let db = setup(3).await;
        let now = Utc::now();
        let repo = db.transactions();
        repo.insert(&tx("t1", "c0000", now, TransactionStatus::Completed)).await.unwrap();
        repo.insert(&tx("t2", "c0000", now - Duration::days(3), TransactionStatus::Completed))
            .await
            .unwrap();
        repo.insert(&tx("t3", "c0001", now, TransactionStatus::Voided)).await.unwrap();
        repo.insert(&tx("t4", "c0002", now, TransactionStatus::Completed)).await.unwrap();

        let ids = vec!["c0000".to_string(), "c0001".to_string()];
        let found = repo.completed_for_customers(&ids, now - Duration::days(1)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "t1");
    }

    #[tokio::test]
    async fn test_completed_for_customers_batches() {
        let db = setup(MAX_IN_LIST + 20).await;
        let now = Utc::now();
        let ids: Vec<String> = (0..MAX_IN_LIST + 20).map(|i| format!("c{:04}", i)).collect();
        for id in ids.iter().step_by(100) {
            db.transactions()
                .insert(&tx(&format!("t-{}", id), id, now, TransactionStatus::Completed))
                .await
                .unwrap();
        }
        let last = ids.last().unwrap().clone();
        db.transactions()
            .insert(&tx("t-last", &last, now, TransactionStatus::Completed))
            .await
            .unwrap();

        let found = db
            .transactions()
            .completed_for_customers(&ids, now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(found.len(), ids.iter().step_by(100).count() + 1);
    }

    #[tokio::test]
    async fn test_has_completed_with_coupon() {
        let db = setup(1).await;
        sqlx::query(
            "INSERT INTO coupons (id, code, created_at, updated_at) VALUES ('cp1', 'ONCE', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let mut pending = tx("t1", "c0000", Utc::now(), TransactionStatus::Pending);
        pending.coupon_id = Some("cp1".into());
        db.transactions().insert(&pending).await.unwrap();
        assert!(!db.transactions().has_completed_with_coupon("c0000", "cp1").await.unwrap());

        let mut done = tx("t2", "c0000", Utc::now(), TransactionStatus::Completed);
        done.coupon_id = Some("cp1".into());
        db.transactions().insert(&done).await.unwrap();
        assert!(db.transactions().has_completed_with_coupon("c0000", "cp1").await.unwrap());
    }
}
