//! PostgreSQL ledger store
//!
//! Schema is created lazily on first use. Each trait method issues a single
//! statement, so every operation is individually atomic.

use super::LedgerStore;
use crate::error::FintrackError;
use crate::models::{
    NewTransaction, Transaction, TransactionFilter, TransactionUpdate, User, UserUpdate,
};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, name, email, last_login, is_active";
const TRANSACTION_COLUMNS: &str =
    "id, user_id, title, description, transaction_type, amount, created_at, updated_at";

/// Bootstrap statements, run once per store in order.
const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
      id UUID PRIMARY KEY,
      name TEXT NOT NULL,
      email TEXT NOT NULL UNIQUE,
      last_login TIMESTAMPTZ,
      is_active BOOLEAN NOT NULL DEFAULT TRUE
    );
    "#,
    // Emails are compared case-insensitively everywhere else.
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS users_email_lower ON users (LOWER(email));
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
      id BIGSERIAL PRIMARY KEY,
      user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
      title VARCHAR(255) NOT NULL,
      description TEXT NOT NULL DEFAULT '',
      transaction_type VARCHAR(10) NOT NULL
        CHECK (transaction_type IN ('balance', 'expense')),
      amount BIGINT NOT NULL DEFAULT 0 CHECK (amount >= 0),
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_transactions_user_created
    ON transactions (user_id, created_at);
    "#,
];

pub struct PgLedgerStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(5).connect_lazy(url)?;
        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> Result<()> {
        let pool = &self.pool;

        self.schema_ready
            .get_or_try_init(|| async {
                for statement in SCHEMA {
                    sqlx::query(statement).execute(pool).await?;
                }
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                FintrackError::DatabaseError(format!("Failed to initialize ledger schema: {}", e))
            })?;

        Ok(())
    }

    fn user_from_row(row: &PgRow) -> Result<User> {
        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            last_login: row.try_get("last_login")?,
            is_active: row.try_get("is_active")?,
        })
    }

    fn transaction_from_row(row: &PgRow) -> Result<Transaction> {
        let kind: String = row.try_get("transaction_type")?;
        Ok(Transaction {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            transaction_type: kind.parse()?,
            amount: row.try_get("amount")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn email_taken(error: sqlx::Error, email: &str) -> FintrackError {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                FintrackError::Validation(format!("Email {} is already in use", email))
            }
            _ => error.into(),
        }
    }
}

/// Escape `%`, `_` and `\` so user text matches literally inside ILIKE.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait::async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::user_from_row).transpose()
    }

    async fn create_user(&self, name: &str, email: &str) -> Result<User> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!(
            "INSERT INTO users (id, name, email) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::email_taken(e, email))?;

        debug!(email = %email, "Created user");
        Self::user_from_row(&row)
    }

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.ensure_schema().await?;

        let result = sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(FintrackError::not_found("User", user_id));
        }
        Ok(())
    }

    async fn update_user(&self, user_id: Uuid, update: &UserUpdate) -> Result<User> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name), email = COALESCE($3, email)
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(update.name.as_deref())
        .bind(update.email.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::email_taken(e, update.email.as_deref().unwrap_or_default()))?;

        match row {
            Some(row) => Self::user_from_row(&row),
            None => Err(FintrackError::not_found("User", user_id)),
        }
    }

    async fn insert_transaction(&self, user_id: Uuid, tx: &NewTransaction) -> Result<Transaction> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO transactions (user_id, title, description, transaction_type, amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(&tx.title)
        .bind(tx.description.as_deref().unwrap_or_default())
        .bind(tx.transaction_type.as_str())
        .bind(tx.amount)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                FintrackError::not_found("User", user_id)
            }
            _ => e.into(),
        })?;

        Self::transaction_from_row(&row)
    }

    async fn balance(&self, user_id: Uuid) -> Result<i64> {
        self.ensure_schema().await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN transaction_type = 'balance' THEN amount ELSE -amount END), 0)::BIGINT
            FROM transactions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        self.ensure_schema().await?;

        // Column and direction come from a closed enum, never from user text.
        let direction = if filter.ordering.descending { "DESC" } else { "ASC" };
        let sql = format!(
            r#"
            SELECT {columns}
            FROM transactions
            WHERE user_id = $1
              AND transaction_type = $2
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at <= $4)
            ORDER BY {field} {direction}, id {direction}
            LIMIT $5 OFFSET $6
            "#,
            columns = TRANSACTION_COLUMNS,
            field = filter.ordering.field.column(),
            direction = direction,
        );

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(filter.transaction_type.as_str())
            .bind(filter.created_from)
            .bind(filter.created_until)
            .bind(filter.limit as i64)
            .bind(filter.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::transaction_from_row).collect()
    }

    async fn search_transactions(
        &self,
        user_id: Uuid,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE user_id = $1
              AND (title ILIKE $2 OR description ILIKE $2 OR transaction_type ILIKE $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(like_pattern(needle))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::transaction_from_row).collect()
    }

    async fn get_transaction(&self, user_id: Uuid, id: i64) -> Result<Option<Transaction>> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions WHERE id = $1 AND user_id = $2",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::transaction_from_row).transpose()
    }

    async fn update_transaction(
        &self,
        user_id: Uuid,
        id: i64,
        update: &TransactionUpdate,
    ) -> Result<Transaction> {
        self.ensure_schema().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE transactions
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                amount = COALESCE($5, amount),
                transaction_type = COALESCE($6, transaction_type),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(update.title.as_deref())
        .bind(update.description.as_deref())
        .bind(update.amount)
        .bind(update.transaction_type.map(|t| t.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::transaction_from_row(&row),
            None => Err(FintrackError::not_found("Transaction", id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_enforces_case_insensitive_email() {
        let index = SCHEMA
            .iter()
            .position(|s| s.contains("UNIQUE INDEX") && s.contains("LOWER(email)"))
            .unwrap();
        let users = SCHEMA
            .iter()
            .position(|s| s.contains("CREATE TABLE IF NOT EXISTS users"))
            .unwrap();
        assert!(users < index);
    }

    /// Runs only when TEST_DATABASE_URL points at a scratch database.
    #[tokio::test]
    async fn test_case_variant_email_is_taken() {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            return;
        };
        let store = PgLedgerStore::connect_lazy(&url).unwrap();
        let suffix = Uuid::new_v4().simple().to_string();
        let alice = format!("alice-{}@example.com", suffix);
        store.create_user("Alice", &alice).await.unwrap();
        let bob = store
            .create_user("Bob", &format!("bob-{}@example.com", suffix))
            .await
            .unwrap();

        let update = UserUpdate {
            email: Some(alice.to_uppercase()),
            ..Default::default()
        };
        let result = store.update_user(bob.id, &update).await;
        assert!(matches!(result, Err(FintrackError::Validation(_))));

        let duplicate = store.create_user("Alice 2", &alice.to_uppercase()).await;
        assert!(matches!(duplicate, Err(FintrackError::Validation(_))));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rent"), "%rent%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
