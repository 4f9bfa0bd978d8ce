//! Ledger operations

use crate::error::FintrackError;
use crate::models::{
    NewTransaction, Ordering, TransactionFilter, TransactionType, TransactionUpdate,
    TransactionView,
};
use crate::store::LedgerStore;
use crate::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

pub const MAX_LIST_LIMIT: usize = 100;
pub const SEARCH_LIMIT: usize = 20;
const MAX_TITLE_LEN: usize = 255;
/// Largest single amount accepted; keeps ledger sums far inside `i64`.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000_000;

/// Arguments of a list request, as the model supplies them.
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    pub transaction_type: String,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl ListQuery {
    pub fn of_type(transaction_type: TransactionType) -> Self {
        Self {
            transaction_type: transaction_type.as_str().to_string(),
            order_by: None,
            start_date: None,
            end_date: None,
            limit: None,
            offset: None,
        }
    }

    fn into_filter(self) -> Result<TransactionFilter> {
        let transaction_type: TransactionType = self.transaction_type.parse()?;
        let ordering = match self.order_by.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => Ordering::default(),
        };

        let created_from = self
            .start_date
            .as_deref()
            .map(|d| day_bound(d, NaiveTime::MIN))
            .transpose()?;
        let created_until = self
            .end_date
            .as_deref()
            .map(|d| day_bound(d, end_of_day()))
            .transpose()?;

        if let (Some(from), Some(until)) = (created_from, created_until) {
            if from > until {
                return Err(FintrackError::Validation(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }

        Ok(TransactionFilter {
            transaction_type,
            ordering,
            created_from,
            created_until,
            limit: self.limit.unwrap_or(MAX_LIST_LIMIT).min(MAX_LIST_LIMIT),
            offset: self.offset.unwrap_or(0),
        })
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

/// `YYYY-MM-DD` at the given time of day, in UTC.
fn day_bound(raw: &str, time: NaiveTime) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        FintrackError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", raw))
    })?;
    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(FintrackError::Validation("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(FintrackError::Validation(format!(
            "title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

fn validate_amount(amount: i64) -> Result<()> {
    if amount < 0 {
        return Err(FintrackError::Validation(
            "amount must not be negative; record spending as an expense".to_string(),
        ));
    }
    if amount > MAX_AMOUNT {
        return Err(FintrackError::Validation(format!(
            "amount must be at most {}",
            MAX_AMOUNT
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct FinanceService {
    store: Arc<dyn LedgerStore>,
}

impl FinanceService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Record a transaction for the caller and describe the outcome.
    pub async fn create_transaction(
        &self,
        user_id: Uuid,
        title: &str,
        description: Option<&str>,
        amount: i64,
        transaction_type: &str,
    ) -> String {
        info!(
            user_id = %user_id,
            title = %title,
            amount,
            transaction_type = %transaction_type,
            "Creating transaction"
        );

        let prepared = validate_title(title)
            .and_then(|_| validate_amount(amount))
            .and_then(|_| transaction_type.parse::<TransactionType>());

        let transaction_type = match prepared {
            Ok(kind) => kind,
            Err(e) => return format!("Could not create transaction. Error: {}", e),
        };

        let new_tx = NewTransaction {
            title: title.trim().to_string(),
            description: description.map(str::to_string),
            amount,
            transaction_type,
        };

        match self.store.insert_transaction(user_id, &new_tx).await {
            Ok(tx) => format!(
                "Transaction recorded of type {} with id {}",
                tx.transaction_type, tx.id
            ),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to create transaction");
                format!("Could not create transaction. Error: {}", e)
            }
        }
    }

    pub async fn get_balance(&self, user_id: Uuid) -> Result<i64> {
        self.store.balance(user_id).await
    }

    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        query: ListQuery,
    ) -> Result<Vec<TransactionView>> {
        let filter = query.into_filter()?;
        let rows = self.store.list_transactions(user_id, &filter).await?;
        Ok(rows.iter().map(TransactionView::from).collect())
    }

    pub async fn search_transactions(
        &self,
        user_id: Uuid,
        query: &str,
    ) -> Result<Vec<TransactionView>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(FintrackError::Validation(
                "search text must not be empty".to_string(),
            ));
        }

        let rows = self
            .store
            .search_transactions(user_id, query, SEARCH_LIMIT)
            .await?;
        Ok(rows.iter().map(TransactionView::from).collect())
    }

    /// Fails with `NotFound` when absent or owned by another user.
    pub async fn get_transaction(&self, user_id: Uuid, id: i64) -> Result<TransactionView> {
        self.store
            .get_transaction(user_id, id)
            .await?
            .as_ref()
            .map(TransactionView::from)
            .ok_or_else(|| FintrackError::not_found("Transaction", id))
    }

    pub async fn update_transaction(
        &self,
        user_id: Uuid,
        id: i64,
        fields: &Value,
    ) -> Result<TransactionView> {
        let update: TransactionUpdate = serde_json::from_value(fields.clone())
            .map_err(|e| FintrackError::Validation(format!("Invalid update fields: {}", e)))?;

        if update.is_empty() {
            return Err(FintrackError::Validation(
                "Nothing to update. Provide title, description, amount or transaction_type."
                    .to_string(),
            ));
        }
        if let Some(title) = &update.title {
            validate_title(title)?;
        }
        if let Some(amount) = update.amount {
            validate_amount(amount)?;
        }

        let tx = self.store.update_transaction(user_id, id, &update).await?;
        info!(user_id = %user_id, transaction_id = id, "Transaction updated");
        Ok(TransactionView::from(&tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTransaction;
    use crate::store::InMemoryLedgerStore;
    use chrono::Duration;
    use serde_json::json;

    async fn setup() -> (Arc<InMemoryLedgerStore>, FinanceService, Uuid) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let user = store.create_user("Alice", "alice@example.com").await.unwrap();
        let finance = FinanceService::new(store.clone());
        (store, finance, user.id)
    }

    #[tokio::test]
    async fn test_balance_aggregates_types() {
        let (_, finance, user) = setup().await;
        assert_eq!(finance.get_balance(user).await.unwrap(), 0);

        for (kind, amount) in [("balance", 100), ("expense", 30), ("balance", 20)] {
            let status = finance
                .create_transaction(user, "entry", None, amount, kind)
                .await;
            assert!(status.starts_with("Transaction recorded of type"));
        }

        assert_eq!(finance.get_balance(user).await.unwrap(), 90);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let (_, finance, user) = setup().await;

        let status = finance
            .create_transaction(user, "Refund", None, 10, "income")
            .await;
        assert!(status.starts_with("Could not create transaction. Error:"));

        let status = finance
            .create_transaction(user, "Lunch", None, -5, "expense")
            .await;
        assert!(status.contains("negative"));

        assert_eq!(finance.get_balance(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_amount() {
        let (_, finance, user) = setup().await;

        let status = finance
            .create_transaction(user, "Lottery", None, MAX_AMOUNT + 1, "balance")
            .await;
        assert!(status.starts_with("Could not create transaction. Error:"));

        let status = finance
            .create_transaction(user, "Lottery", None, MAX_AMOUNT, "balance")
            .await;
        assert!(status.starts_with("Transaction recorded of type"));

        let result = finance
            .update_transaction(user, 1, &json!({"amount": i64::MAX}))
            .await;
        assert!(matches!(result, Err(FintrackError::Validation(_))));
        assert_eq!(finance.get_balance(user).await.unwrap(), MAX_AMOUNT);
    }

    #[tokio::test]
    async fn test_list_clamps_limit() {
        let (store, finance, user) = setup().await;
        for i in 0..120 {
            store
                .insert_transaction(
                    user,
                    &NewTransaction {
                        title: format!("coffee {}", i),
                        description: None,
                        amount: 3,
                        transaction_type: TransactionType::Expense,
                    },
                )
                .await
                .unwrap();
        }

        let mut query = ListQuery::of_type(TransactionType::Expense);
        query.limit = Some(500);
        let rows = finance.list_transactions(user, query).await.unwrap();
        assert_eq!(rows.len(), MAX_LIST_LIMIT);

        let rows = finance
            .list_transactions(user, ListQuery::of_type(TransactionType::Balance))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_list_date_range_is_inclusive() {
        let (store, finance, user) = setup().await;
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap();

        for (d, title) in [(1, "early"), (5, "middle"), (9, "late")] {
            store
                .insert_transaction_at(
                    user,
                    &NewTransaction {
                        title: title.to_string(),
                        description: None,
                        amount: 10,
                        transaction_type: TransactionType::Expense,
                    },
                    day(d),
                )
                .await
                .unwrap();
        }
        store
            .insert_transaction_at(
                user,
                &NewTransaction {
                    title: "late night".to_string(),
                    description: None,
                    amount: 1,
                    transaction_type: TransactionType::Expense,
                },
                day(9) + Duration::hours(11) + Duration::minutes(59),
            )
            .await
            .unwrap();

        let mut query = ListQuery::of_type(TransactionType::Expense);
        query.start_date = Some("2024-03-05".to_string());
        query.end_date = Some("2024-03-09".to_string());
        query.order_by = Some("created_at".to_string());

        let rows = finance.list_transactions(user, query).await.unwrap();
        let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["middle", "late", "late night"]);
    }

    #[tokio::test]
    async fn test_list_rejects_malformed_input() {
        let (_, finance, user) = setup().await;

        let mut query = ListQuery::of_type(TransactionType::Expense);
        query.start_date = Some("03/05/2024".to_string());
        let result = finance.list_transactions(user, query).await;
        assert!(matches!(result, Err(FintrackError::Validation(_))));

        let mut query = ListQuery::of_type(TransactionType::Expense);
        query.order_by = Some("user_id".to_string());
        let result = finance.list_transactions(user, query).await;
        assert!(matches!(result, Err(FintrackError::Validation(_))));
    }

    #[tokio::test]
    async fn test_search_matches_case_insensitively() {
        let (_, finance, user) = setup().await;
        finance
            .create_transaction(user, "Monthly RENT", Some("flat"), 500, "expense")
            .await;
        finance
            .create_transaction(user, "Groceries", None, 40, "expense")
            .await;
        finance
            .create_transaction(user, "Salary", Some("march rent allowance"), 900, "balance")
            .await;

        let hits = finance.search_transactions(user, "rent").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.title != "Groceries"));
        assert_eq!(hits[0].title, "Salary");
    }

    #[tokio::test]
    async fn test_search_caps_results_newest_first() {
        let (store, finance, user) = setup().await;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        for i in 0..25 {
            store
                .insert_transaction_at(
                    user,
                    &NewTransaction {
                        title: format!("rent {}", i),
                        description: None,
                        amount: 100,
                        transaction_type: TransactionType::Expense,
                    },
                    start + Duration::days(i),
                )
                .await
                .unwrap();
        }

        let hits = finance.search_transactions(user, "RENT").await.unwrap();
        assert_eq!(hits.len(), SEARCH_LIMIT);
        assert_eq!(hits[0].title, "rent 24");
        assert_eq!(hits[SEARCH_LIMIT - 1].title, "rent 5");
    }

    #[tokio::test]
    async fn test_update_changes_only_given_fields() {
        let (_, finance, user) = setup().await;
        finance
            .create_transaction(user, "Rent", Some("flat"), 500, "expense")
            .await;

        let before = finance.get_transaction(user, 1).await.unwrap();
        let after = finance
            .update_transaction(user, 1, &json!({"amount": 50}))
            .await
            .unwrap();

        assert_eq!(after.amount, 50);
        assert_eq!(after.title, before.title);
        assert_eq!(after.description, before.description);
        assert_eq!(after.transaction_type, before.transaction_type);
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_fields_and_bad_types() {
        let (_, finance, user) = setup().await;
        finance
            .create_transaction(user, "Rent", None, 500, "expense")
            .await;

        let result = finance
            .update_transaction(user, 1, &json!({"user_id": "other"}))
            .await;
        assert!(matches!(result, Err(FintrackError::Validation(_))));

        let result = finance
            .update_transaction(user, 1, &json!({"transaction_type": "income"}))
            .await;
        assert!(matches!(result, Err(FintrackError::Validation(_))));

        let result = finance
            .update_transaction(user, 99, &json!({"amount": 1}))
            .await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "Transaction not found: 99"
        );
    }
}
