//! Ledger tools for the finance agent

use super::{optional_i64, optional_str, optional_usize, required_i64, required_str};
use super::{CallerContext, Tool};
use crate::error::FintrackError;
use crate::models::ToolOutput;
use crate::services::{FinanceService, ListQuery};
use crate::Result;
use serde_json::{json, Value};

fn transaction_type_schema() -> Value {
    json!({
        "type": "string",
        "enum": ["balance", "expense"],
        "description": "'balance' for money coming in, 'expense' for money going out"
    })
}

pub struct CreateTransactionTool {
    finance: FinanceService,
}

impl CreateTransactionTool {
    pub fn new(finance: FinanceService) -> Self {
        Self { finance }
    }
}

#[async_trait::async_trait]
impl Tool for CreateTransactionTool {
    fn name(&self) -> &'static str {
        "create_transaction"
    }

    fn description(&self) -> &'static str {
        "Record a new transaction for the user. transaction_type must be 'balance' (income, \
         deposits, money received) or 'expense' (spending). amount is a non-negative integer."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Short title of the transaction"},
                "description": {"type": "string", "description": "Optional details"},
                "amount": {"type": "integer", "description": "Non-negative amount"},
                "transaction_type": transaction_type_schema()
            },
            "required": ["title", "amount", "transaction_type"]
        })
    }

    async fn execute(&self, caller: &CallerContext, args: &Value) -> Result<ToolOutput> {
        let title = required_str(args, "title")?;
        let description = optional_str(args, "description")?;
        let amount = required_i64(args, "amount")?;
        let transaction_type = required_str(args, "transaction_type")?;

        let status = self
            .finance
            .create_transaction(caller.user_id, title, description, amount, transaction_type)
            .await;

        if status.starts_with("Could not") {
            Ok(ToolOutput::failure(status))
        } else {
            Ok(ToolOutput::success(status))
        }
    }
}

pub struct SearchTransactionsTool {
    finance: FinanceService,
}

impl SearchTransactionsTool {
    pub fn new(finance: FinanceService) -> Self {
        Self { finance }
    }
}

#[async_trait::async_trait]
impl Tool for SearchTransactionsTool {
    fn name(&self) -> &'static str {
        "search_transactions"
    }

    fn description(&self) -> &'static str {
        "Search the user's transactions by title, description or type (case-insensitive, at \
         most 20 results, newest first). Search one word at a time and combine the results of \
         several words yourself to narrow them down."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_text": {"type": "string", "description": "Text to look for"}
            },
            "required": ["search_text"]
        })
    }

    async fn execute(&self, caller: &CallerContext, args: &Value) -> Result<ToolOutput> {
        let text = required_str(args, "search_text")?;
        let hits = self.finance.search_transactions(caller.user_id, text).await?;
        ToolOutput::json(&hits)
    }
}

pub struct GetTransactionByIdTool {
    finance: FinanceService,
}

impl GetTransactionByIdTool {
    pub fn new(finance: FinanceService) -> Self {
        Self { finance }
    }
}

#[async_trait::async_trait]
impl Tool for GetTransactionByIdTool {
    fn name(&self) -> &'static str {
        "get_transaction_by_id"
    }

    fn description(&self) -> &'static str {
        "Fetch one of the user's transactions by its numeric id."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "transaction_id": {"type": "integer", "description": "Transaction id"}
            },
            "required": ["transaction_id"]
        })
    }

    async fn execute(&self, caller: &CallerContext, args: &Value) -> Result<ToolOutput> {
        let id = required_i64(args, "transaction_id")?;
        let tx = self.finance.get_transaction(caller.user_id, id).await?;
        ToolOutput::json(&tx)
    }
}

pub struct GetBalanceTool {
    finance: FinanceService,
}

impl GetBalanceTool {
    pub fn new(finance: FinanceService) -> Self {
        Self { finance }
    }
}

#[async_trait::async_trait]
impl Tool for GetBalanceTool {
    fn name(&self) -> &'static str {
        "get_current_balance"
    }

    fn description(&self) -> &'static str {
        "Get the user's current balance: total of 'balance' transactions minus total of \
         'expense' transactions."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, caller: &CallerContext, _args: &Value) -> Result<ToolOutput> {
        let balance = self.finance.get_balance(caller.user_id).await?;
        ToolOutput::json(&json!({
            "current_balance": balance,
            "currency": caller.currency,
        }))
    }
}

pub struct UpdateTransactionTool {
    finance: FinanceService,
}

impl UpdateTransactionTool {
    pub fn new(finance: FinanceService) -> Self {
        Self { finance }
    }
}

#[async_trait::async_trait]
impl Tool for UpdateTransactionTool {
    fn name(&self) -> &'static str {
        "update_transaction"
    }

    fn description(&self) -> &'static str {
        "Change fields of one of the user's transactions. Only title, description, amount and \
         transaction_type may be changed; fields not given stay as they are."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "transaction_id": {"type": "integer", "description": "Transaction id"},
                "fields": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "description": {"type": "string"},
                        "amount": {"type": "integer"},
                        "transaction_type": transaction_type_schema()
                    }
                }
            },
            "required": ["transaction_id", "fields"]
        })
    }

    async fn execute(&self, caller: &CallerContext, args: &Value) -> Result<ToolOutput> {
        let id = required_i64(args, "transaction_id")?;
        let fields = normalize_fields(args.get("fields").ok_or_else(|| {
            FintrackError::InvalidToolInput("Expected 'fields' (object) in tool arguments".into())
        })?)?;

        let tx = self
            .finance
            .update_transaction(caller.user_id, id, &fields)
            .await?;
        ToolOutput::json(&tx)
    }
}

/// Coerce a float-encoded `amount` to an integer before strict parsing.
fn normalize_fields(fields: &Value) -> Result<Value> {
    let mut fields = fields.clone();
    if let Some(amount) = optional_i64(&fields, "amount")? {
        fields["amount"] = json!(amount);
    }
    Ok(fields)
}

pub struct GetTransactionListTool {
    finance: FinanceService,
}

impl GetTransactionListTool {
    pub fn new(finance: FinanceService) -> Self {
        Self { finance }
    }
}

#[async_trait::async_trait]
impl Tool for GetTransactionListTool {
    fn name(&self) -> &'static str {
        "get_transaction_list"
    }

    fn description(&self) -> &'static str {
        "List the user's transactions of one type, optionally within a date range \
         (YYYY-MM-DD, inclusive). order_by is one of created_at, updated_at, amount, title, id, \
         optionally prefixed with '-' for descending (default '-created_at'). At most 100 rows."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "transaction_type": transaction_type_schema(),
                "order_by": {"type": "string"},
                "start_date": {"type": "string", "description": "YYYY-MM-DD"},
                "end_date": {"type": "string", "description": "YYYY-MM-DD"},
                "limit": {"type": "integer", "description": "Maximum rows, up to 100"},
                "offset": {"type": "integer", "description": "Rows to skip"}
            },
            "required": ["transaction_type"]
        })
    }

    async fn execute(&self, caller: &CallerContext, args: &Value) -> Result<ToolOutput> {
        let query = ListQuery {
            transaction_type: required_str(args, "transaction_type")?.to_string(),
            order_by: optional_str(args, "order_by")?.map(str::to_string),
            start_date: optional_str(args, "start_date")?.map(str::to_string),
            end_date: optional_str(args, "end_date")?.map(str::to_string),
            limit: optional_usize(args, "limit")?,
            offset: optional_usize(args, "offset")?,
        };

        let rows = self.finance.list_transactions(caller.user_id, query).await?;
        ToolOutput::json(&rows)
    }
}
