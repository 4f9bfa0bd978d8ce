//! In-memory ledger store for development and tests

use super::LedgerStore;
use crate::error::FintrackError;
use crate::models::{
    NewTransaction, SortField, Transaction, TransactionFilter, TransactionUpdate, User,
    UserUpdate,
};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Ledger {
    next_id: i64,
    rows: BTreeMap<i64, Transaction>,
}

pub struct InMemoryLedgerStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    ledger: Arc<RwLock<Ledger>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            ledger: Arc::new(RwLock::new(Ledger::default())),
        }
    }

    /// Insert with an explicit creation time. Used to seed date-range fixtures.
    pub async fn insert_transaction_at(
        &self,
        user_id: Uuid,
        tx: &NewTransaction,
        created_at: DateTime<Utc>,
    ) -> Result<Transaction> {
        if !self.users.read().await.contains_key(&user_id) {
            return Err(FintrackError::not_found("User", user_id));
        }

        let mut ledger = self.ledger.write().await;
        ledger.next_id += 1;

        let row = Transaction {
            id: ledger.next_id,
            user_id,
            title: tx.title.clone(),
            description: tx.description.clone().unwrap_or_default(),
            transaction_type: tx.transaction_type,
            amount: tx.amount,
            created_at,
            updated_at: created_at,
        };

        ledger.rows.insert(row.id, row.clone());
        Ok(row)
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compare(a: &Transaction, b: &Transaction, field: SortField) -> std::cmp::Ordering {
    let primary = match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::Amount => a.amount.cmp(&b.amount),
        SortField::Title => a.title.cmp(&b.title),
        SortField::Id => a.id.cmp(&b.id),
    };
    primary.then(a.id.cmp(&b.id))
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, name: &str, email: &str) -> Result<User> {
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(FintrackError::Validation(format!(
                "Email {} is already in use",
                email
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            last_login: None,
            is_active: true,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| FintrackError::not_found("User", user_id))?;
        user.last_login = Some(at);
        Ok(())
    }

    async fn update_user(&self, user_id: Uuid, update: &UserUpdate) -> Result<User> {
        let mut users = self.users.write().await;

        if !users.contains_key(&user_id) {
            return Err(FintrackError::not_found("User", user_id));
        }

        if let Some(email) = &update.email {
            let taken = users
                .values()
                .any(|u| u.id != user_id && u.email.eq_ignore_ascii_case(email));
            if taken {
                return Err(FintrackError::Validation(format!(
                    "Email {} is already in use",
                    email
                )));
            }
        }

        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| FintrackError::not_found("User", user_id))?;
        if let Some(name) = &update.name {
            user.name = name.clone();
        }
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        Ok(user.clone())
    }

    async fn insert_transaction(&self, user_id: Uuid, tx: &NewTransaction) -> Result<Transaction> {
        self.insert_transaction_at(user_id, tx, Utc::now()).await
    }

    async fn balance(&self, user_id: Uuid) -> Result<i64> {
        let ledger = self.ledger.read().await;
        ledger
            .rows
            .values()
            .filter(|tx| tx.user_id == user_id)
            .try_fold(0i64, |total, tx| {
                total.checked_add(tx.transaction_type.signed(tx.amount))
            })
            .ok_or_else(|| {
                FintrackError::Validation("balance is outside the supported range".to_string())
            })
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        let ledger = self.ledger.read().await;

        let mut rows: Vec<&Transaction> = ledger
            .rows
            .values()
            .filter(|tx| tx.user_id == user_id)
            .filter(|tx| tx.transaction_type == filter.transaction_type)
            .filter(|tx| filter.created_from.map_or(true, |from| tx.created_at >= from))
            .filter(|tx| filter.created_until.map_or(true, |until| tx.created_at <= until))
            .collect();

        rows.sort_by(|a, b| compare(a, b, filter.ordering.field));
        if filter.ordering.descending {
            rows.reverse();
        }

        Ok(rows
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn search_transactions(
        &self,
        user_id: Uuid,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        let needle = needle.to_lowercase();
        let ledger = self.ledger.read().await;

        let mut hits: Vec<&Transaction> = ledger
            .rows
            .values()
            .filter(|tx| tx.user_id == user_id)
            .filter(|tx| {
                tx.title.to_lowercase().contains(&needle)
                    || tx.description.to_lowercase().contains(&needle)
                    || tx.transaction_type.as_str().contains(&needle)
            })
            .collect();

        hits.sort_by(|a, b| compare(b, a, SortField::CreatedAt));

        Ok(hits.into_iter().take(limit).cloned().collect())
    }

    async fn get_transaction(&self, user_id: Uuid, id: i64) -> Result<Option<Transaction>> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .rows
            .get(&id)
            .filter(|tx| tx.user_id == user_id)
            .cloned())
    }

    async fn update_transaction(
        &self,
        user_id: Uuid,
        id: i64,
        update: &TransactionUpdate,
    ) -> Result<Transaction> {
        let mut ledger = self.ledger.write().await;

        let row = ledger
            .rows
            .get_mut(&id)
            .filter(|tx| tx.user_id == user_id)
            .ok_or_else(|| FintrackError::not_found("Transaction", id))?;

        update.apply(row);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ordering, TransactionType};

    fn new_tx(title: &str, kind: TransactionType, amount: i64) -> NewTransaction {
        NewTransaction {
            title: title.to_string(),
            description: None,
            amount,
            transaction_type: kind,
        }
    }

    #[tokio::test]
    async fn test_rows_are_scoped_to_owner() {
        let store = InMemoryLedgerStore::new();
        let alice = store.create_user("Alice", "alice@example.com").await.unwrap();
        let bob = store.create_user("Bob", "bob@example.com").await.unwrap();

        let tx = store
            .insert_transaction(alice.id, &new_tx("Rent", TransactionType::Expense, 500))
            .await
            .unwrap();

        assert!(store.get_transaction(bob.id, tx.id).await.unwrap().is_none());
        assert!(store.search_transactions(bob.id, "rent", 20).await.unwrap().is_empty());

        let update = TransactionUpdate {
            amount: Some(1),
            ..Default::default()
        };
        let result = store.update_transaction(bob.id, tx.id, &update).await;
        assert!(matches!(result, Err(FintrackError::NotFound { .. })));
        assert_eq!(store.balance(bob.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_balance_overflow_is_an_error() {
        let store = InMemoryLedgerStore::new();
        let alice = store.create_user("Alice", "alice@example.com").await.unwrap();
        for _ in 0..2 {
            store
                .insert_transaction(alice.id, &new_tx("Windfall", TransactionType::Balance, i64::MAX))
                .await
                .unwrap();
        }

        let result = store.balance(alice.id).await;
        assert!(matches!(result, Err(FintrackError::Validation(_))));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryLedgerStore::new();
        store.create_user("Alice", "alice@example.com").await.unwrap();
        let bob = store.create_user("Bob", "bob@example.com").await.unwrap();

        let result = store
            .update_user(
                bob.id,
                &UserUpdate {
                    email: Some("ALICE@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(FintrackError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_ordering_and_paging() {
        let store = InMemoryLedgerStore::new();
        let user = store.create_user("Alice", "alice@example.com").await.unwrap();

        for (title, amount) in [("a", 30), ("b", 10), ("c", 20)] {
            store
                .insert_transaction(user.id, &new_tx(title, TransactionType::Expense, amount))
                .await
                .unwrap();
        }

        let filter = TransactionFilter {
            transaction_type: TransactionType::Expense,
            ordering: "amount".parse::<Ordering>().unwrap(),
            created_from: None,
            created_until: None,
            limit: 2,
            offset: 1,
        };

        let rows = store.list_transactions(user.id, &filter).await.unwrap();
        let amounts: Vec<i64> = rows.iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![20, 30]);
    }
}
