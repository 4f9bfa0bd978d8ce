//! Core data models for the ledger and account domain

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::FintrackError;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Balance,
    Expense,
}

impl TransactionType {
    pub const ALL: [TransactionType; 2] = [TransactionType::Balance, TransactionType::Expense];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Balance => "balance",
            TransactionType::Expense => "expense",
        }
    }

    /// Contribution of `amount` to the running total.
    pub fn signed(&self, amount: i64) -> i64 {
        match self {
            TransactionType::Balance => amount,
            TransactionType::Expense => -amount,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = FintrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "balance" => Ok(TransactionType::Balance),
            "expense" => Ok(TransactionType::Expense),
            other => Err(FintrackError::Validation(format!(
                "transaction_type must be 'balance' or 'expense', got '{}'",
                other
            ))),
        }
    }
}

//
// ================= User =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// What the account tools expose about a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub last_login: Option<String>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            last_login: user
                .last_login
                .map(|ts| ts.format("%m/%d/%Y %I:%M:%S %p").to_string()),
        }
    }
}

/// Partial update of a user's own profile. Keys other than name/email are dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

//
// ================= Transaction =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTransaction {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub amount: i64,
    pub transaction_type: TransactionType,
}

/// Partial update of a transaction. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransactionUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub transaction_type: Option<TransactionType>,
}

impl TransactionUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.amount.is_none()
            && self.transaction_type.is_none()
    }

    pub fn apply(&self, tx: &mut Transaction) {
        if let Some(title) = &self.title {
            tx.title = title.clone();
        }
        if let Some(description) = &self.description {
            tx.description = description.clone();
        }
        if let Some(amount) = self.amount {
            tx.amount = amount;
        }
        if let Some(kind) = self.transaction_type {
            tx.transaction_type = kind;
        }
    }
}

/// Projection returned to the agent by list/search/get.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionView {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub created_at: String,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            title: tx.title.clone(),
            description: tx.description.clone(),
            transaction_type: tx.transaction_type,
            amount: tx.amount,
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

//
// ================= Listing =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Amount,
    Title,
    Id,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Amount => "amount",
            SortField::Title => "title",
            SortField::Id => "id",
        }
    }
}

/// Parsed `order_by` such as `-created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering {
    pub field: SortField,
    pub descending: bool,
}

impl Default for Ordering {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            descending: true,
        }
    }
}

impl FromStr for Ordering {
    type Err = FintrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let field = match name {
            "created_at" => SortField::CreatedAt,
            "updated_at" => SortField::UpdatedAt,
            "amount" => SortField::Amount,
            "title" => SortField::Title,
            "id" => SortField::Id,
            other => {
                return Err(FintrackError::Validation(format!(
                    "Cannot order by '{}'; use created_at, updated_at, amount, title or id, optionally prefixed with '-'",
                    other
                )))
            }
        };

        Ok(Self { field, descending })
    }
}

/// Store-level filter for a user's transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFilter {
    pub transaction_type: TransactionType,
    pub ordering: Ordering,
    pub created_from: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

//
// ================= Tool I/O =================
//

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub content: String,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
        }
    }

    pub fn failure(content: impl Into<String>) -> Self {
        Self {
            success: false,
            content: content.into(),
        }
    }

    pub fn json<T: Serialize>(value: &T) -> crate::Result<Self> {
        Ok(Self::success(serde_json::to_string(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_type_parsing() {
        assert_eq!("Balance".parse::<TransactionType>().unwrap(), TransactionType::Balance);
        assert_eq!(" expense ".parse::<TransactionType>().unwrap(), TransactionType::Expense);
        assert!(matches!(
            "income".parse::<TransactionType>(),
            Err(FintrackError::Validation(_))
        ));
    }

    #[test]
    fn test_transaction_type_serde() {
        let json = serde_json::to_string(&TransactionType::Expense).unwrap();
        assert_eq!(json, "\"expense\"");
        assert!(serde_json::from_str::<TransactionType>("\"refund\"").is_err());
    }

    #[test]
    fn test_ordering_parse() {
        let ordering: Ordering = "-amount".parse().unwrap();
        assert_eq!(ordering.field, SortField::Amount);
        assert!(ordering.descending);

        let ordering: Ordering = "title".parse().unwrap();
        assert!(!ordering.descending);

        assert!("password".parse::<Ordering>().is_err());
    }

    #[test]
    fn test_transaction_update_rejects_unknown_fields() {
        let parsed = serde_json::from_value::<TransactionUpdate>(serde_json::json!({
            "amount": 50,
            "user_id": "someone-else"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_user_update_ignores_unknown_fields() {
        let parsed: UserUpdate = serde_json::from_value(serde_json::json!({
            "email": "new@example.com",
            "is_active": false
        }))
        .unwrap();
        assert_eq!(parsed.email.as_deref(), Some("new@example.com"));
        assert!(parsed.name.is_none());
    }
}
