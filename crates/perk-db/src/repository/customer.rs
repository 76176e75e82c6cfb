//! # Customer Repository
//!
//! Customers are owned by the booking/POS systems. This engine reads them
//! for eligibility checks, audience selection and message variables;
//! `insert` exists for seeding and tests.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::{decode_json, encode_json, MAX_IN_LIST};
use crate::error::{DbError, DbResult};
use perk_core::Customer;

const CUSTOMER_COLUMNS: &str = r#"
    id, first_name, last_name, phone, email, tags, visit_count,
    sms_consent, email_consent, loyalty_points_balance, last_visit_date,
    lifetime_spend_cents, created_at
"#;

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: String,
    first_name: String,
    last_name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    tags: String,
    visit_count: i64,
    sms_consent: bool,
    email_consent: bool,
    loyalty_points_balance: i64,
    last_visit_date: Option<DateTime<Utc>>,
    lifetime_spend_cents: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = DbError;

    fn try_from(row: CustomerRow) -> DbResult<Self> {
        Ok(Customer {
            tags: decode_json("tags", &row.tags)?,
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            email: row.email,
            visit_count: row.visit_count,
            sms_consent: row.sms_consent,
            email_consent: row.email_consent,
            loyalty_points_balance: row.loyalty_points_balance,
            last_visit_date: row.last_visit_date,
            lifetime_spend_cents: row.lifetime_spend_cents,
            created_at: row.created_at,
        })
    }
}

/// Repository for customer reads.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Gets a customer by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Customer>> {
        let sql = format!("SELECT {} FROM customers WHERE id = ?1", CUSTOMER_COLUMNS);
        let row: Option<CustomerRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Customer::try_from).transpose()
    }

    /// Keyset page of customers ordered by id, starting after `after_id`.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let mut after = None;
    /// loop {
    ///     let page = repo.page(after.as_deref(), 500).await?;
    ///     if page.is_empty() { break; }
    ///     after = page.last().map(|c| c.id.clone());
    /// }
    /// ```
    pub async fn page(&self, after_id: Option<&str>, limit: i64) -> DbResult<Vec<Customer>> {
        let sql = format!(
            "SELECT {} FROM customers WHERE (?1 IS NULL OR id > ?1) ORDER BY id LIMIT ?2",
            CUSTOMER_COLUMNS
        );
        let rows: Vec<CustomerRow> = sqlx::query_as(&sql)
            .bind(after_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Customer::try_from).collect()
    }

    /// Loads the given customers, in id order. Unknown ids are skipped.
    pub async fn get_many(&self, ids: &[String]) -> DbResult<Vec<Customer>> {
        let mut customers = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_IN_LIST) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("SELECT {} FROM customers WHERE id IN (", CUSTOMER_COLUMNS));
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(") ORDER BY id");

            let rows: Vec<CustomerRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            for row in rows {
                customers.push(Customer::try_from(row)?);
            }
        }

        customers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(customers)
    }

    /// Inserts a customer (seeding and tests).
    pub async fn insert(&self, customer: &Customer) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (
                id, first_name, last_name, phone, email, tags, visit_count,
                sms_consent, email_consent, loyalty_points_balance, last_visit_date,
                lifetime_spend_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(encode_json("tags", &customer.tags)?)
        .bind(customer.visit_count)
        .bind(customer.sms_consent)
        .bind(customer.email_consent)
        .bind(customer.loyalty_points_balance)
        .bind(customer.last_visit_date)
        .bind(customer.lifetime_spend_cents)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Total number of customers.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn customer(id: &str) -> Customer {
        Customer {
            id: id.to_string(),
            first_name: format!("First {}", id),
            last_name: None,
            phone: Some("+15550100".into()),
            email: None,
            tags: vec!["vip".into()],
            visit_count: 2,
            sms_consent: true,
            email_consent: false,
            loyalty_points_balance: 40,
            last_visit_date: Some(Utc::now()),
            lifetime_spend_cents: 5000,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.customers().insert(&customer("c1")).await.unwrap();

        let c = db.customers().get("c1").await.unwrap().unwrap();
        assert_eq!(c.tags, vec!["vip".to_string()]);
        assert!(c.sms_consent);
        assert!(db.customers().get("c2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_paging_visits_everyone_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for i in 0..7 {
            db.customers().insert(&customer(&format!("c{}", i))).await.unwrap();
        }

        let mut seen = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page = db.customers().page(after.as_deref(), 3).await.unwrap();
            if page.is_empty() {
                break;
            }
            after = page.last().map(|c| c.id.clone());
            seen.extend(page.into_iter().map(|c| c.id));
        }
        assert_eq!(seen.len(), 7);
        assert_eq!(db.customers().count().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_get_many() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for id in ["b", "a", "c"] {
            db.customers().insert(&customer(id)).await.unwrap();
        }

        let ids = vec!["c".to_string(), "a".to_string(), "zz".to_string()];
        let found = db.customers().get_many(&ids).await.unwrap();
        let found: Vec<_> = found.into_iter().map(|c| c.id).collect();
        assert_eq!(found, vec!["a".to_string(), "c".to_string()]);
    }
}
