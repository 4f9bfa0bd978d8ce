//! Ledger persistence layer
//!
//! Users and transactions live behind `LedgerStore`.
//! In-memory for development and tests; Postgres when a database URL is configured.

use crate::models::{
    NewTransaction, Transaction, TransactionFilter, TransactionUpdate, User, UserUpdate,
};
use crate::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Trait for ledger persistence.
///
/// Every method is a single atomic operation. Methods taking a `user_id`
/// only ever see rows owned by that user.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn create_user(&self, name: &str, email: &str) -> Result<User>;
    async fn touch_last_login(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Fails with `NotFound` for a missing user and `Validation` for a taken email.
    async fn update_user(&self, user_id: Uuid, update: &UserUpdate) -> Result<User>;

    async fn insert_transaction(&self, user_id: Uuid, tx: &NewTransaction) -> Result<Transaction>;

    /// Sum of balance amounts minus sum of expense amounts; zero when empty.
    async fn balance(&self, user_id: Uuid) -> Result<i64>;

    async fn list_transactions(
        &self,
        user_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>>;

    /// Case-insensitive substring match on title, description and type, newest first.
    async fn search_transactions(
        &self,
        user_id: Uuid,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<Transaction>>;

    async fn get_transaction(&self, user_id: Uuid, id: i64) -> Result<Option<Transaction>>;

    /// Fails with `NotFound` when the row is missing or owned by someone else.
    async fn update_transaction(
        &self,
        user_id: Uuid,
        id: i64,
        update: &TransactionUpdate,
    ) -> Result<Transaction>;
}

/// Pick the store backend from the environment-derived database URL.
pub fn build_store(database_url: Option<&str>) -> Arc<dyn LedgerStore> {
    if let Some(url) = database_url {
        match PgLedgerStore::connect_lazy(url) {
            Ok(store) => {
                info!("Ledger store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres ledger store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    warn!("Ledger store backend: in-memory (data is lost on restart)");
    Arc::new(InMemoryLedgerStore::new())
}
