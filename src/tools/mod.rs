//! Tool trait and registry
//!
//! Tools wrap the data-access services for the model. The caller identity
//! always comes from the session, never from tool arguments.

use crate::error::FintrackError;
use crate::models::{ToolCall, ToolOutput};
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub mod account;
pub mod delegate;
pub mod finance;
pub mod market;

pub use account::{GetUserInformationTool, UpdateUserInformationTool};
pub use delegate::DelegateTool;
pub use finance::{
    CreateTransactionTool, GetBalanceTool, GetTransactionByIdTool, GetTransactionListTool,
    SearchTransactionsTool, UpdateTransactionTool,
};
pub use market::StockQuoteTool;

pub const ACCOUNT_TOOLS: [&str; 2] = ["get_user_information", "update_user_information"];
pub const FINANCE_TOOLS: [&str; 6] = [
    "create_transaction",
    "search_transactions",
    "get_transaction_by_id",
    "get_current_balance",
    "update_transaction",
    "get_transaction_list",
];

/// Facts bound to a connection at authentication time.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerContext {
    pub user_id: Uuid,
    pub connection_id: Uuid,
    pub currency: String,
    pub timezone: String,
}

impl CallerContext {
    pub fn new(user_id: Uuid, currency: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            user_id,
            connection_id: Uuid::new_v4(),
            currency: currency.into(),
            timezone: timezone.into(),
        }
    }

    /// Currency, timezone and today's date as stated to the model.
    pub fn facts(&self) -> String {
        format!(
            "Currency: {}. Timezone: {}. Today's date: {}.",
            self.currency,
            self.timezone,
            Utc::now().format("%Y-%m-%d")
        )
    }
}

/// Function declaration handed to the model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A single named capability the model may call.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;

    /// JSON schema of the arguments. Never includes a user id.
    fn parameters(&self) -> Value;

    async fn execute(&self, caller: &CallerContext, args: &Value) -> Result<ToolOutput>;
}

/// Tool registry for looking up and invoking tools
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: HashMap::new(),
            timeout,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Subset registry holding only `names`. Unknown names are skipped.
    pub fn scoped(&self, names: &[&str]) -> Self {
        let tools = names
            .iter()
            .filter_map(|name| self.tools.get(*name).map(|t| (name.to_string(), t.clone())))
            .collect();
        Self {
            tools,
            timeout: self.timeout,
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Run one model-requested call on behalf of `caller`.
    ///
    /// Not-found, validation and authorization problems come back as a
    /// failed `ToolOutput` for the model to read. Infrastructure errors and
    /// timeouts are returned as `Err` and end the turn.
    pub async fn invoke(&self, caller: &CallerContext, call: &ToolCall) -> Result<ToolOutput> {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, user_id = %caller.user_id, "Tool not available to agent");
            return Ok(ToolOutput::failure(format!(
                "Tool '{}' is not available to this agent.",
                call.name
            )));
        };

        if let Err(e) = ensure_object(&call.args).and_then(|_| authorize(caller, &call.args)) {
            warn!(tool = %call.name, user_id = %caller.user_id, error = %e, "Tool call rejected");
            return Ok(ToolOutput::failure(e.to_string()));
        }

        info!(tool = %call.name, user_id = %caller.user_id, "Invoking tool");

        let result = tokio::time::timeout(self.timeout, tool.execute(caller, &call.args))
            .await
            .map_err(|_| {
                FintrackError::Timeout(format!(
                    "tool '{}' did not finish within {}s",
                    call.name,
                    self.timeout.as_secs()
                ))
            })?;

        match result {
            Ok(output) => Ok(output),
            Err(e) if e.is_recoverable_in_tool() => {
                info!(tool = %call.name, error = %e, "Tool reported a recoverable error");
                Ok(ToolOutput::failure(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Reject any `user_id` argument, at any depth, that names someone other than the caller.
fn authorize(caller: &CallerContext, args: &Value) -> Result<()> {
    match args {
        Value::Object(map) => {
            for (key, value) in map {
                if key == "user_id" && !names_caller(caller, value) {
                    return Err(FintrackError::Unauthorized(
                        "Tools act only on the authenticated user's own records; user_id cannot be changed."
                            .to_string(),
                    ));
                }
                authorize(caller, value)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|item| authorize(caller, item)),
        _ => Ok(()),
    }
}

fn names_caller(caller: &CallerContext, value: &Value) -> bool {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .map_or(false, |id| id == caller.user_id)
}

fn ensure_object(args: &Value) -> Result<()> {
    if args.is_object() {
        Ok(())
    } else {
        Err(FintrackError::InvalidToolInput(
            "tool arguments must be a JSON object".to_string(),
        ))
    }
}

//
// ================= Argument helpers =================
//

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    optional_str(args, key)?.ok_or_else(|| {
        FintrackError::InvalidToolInput(format!("Expected '{}' (string) in tool arguments", key))
    })
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(FintrackError::InvalidToolInput(format!(
            "'{}' must be a string, got {}",
            key, other
        ))),
    }
}

/// Integers may arrive as `5`, `5.0` or `"5"` depending on the model.
pub(crate) fn optional_i64(args: &Value, key: &str) -> Result<Option<i64>> {
    let invalid = |v: &Value| {
        FintrackError::InvalidToolInput(format!("'{}' must be an integer, got {}", key, v))
    };

    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v @ Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| invalid(v)),
        Some(v @ Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid(v)),
        Some(other) => Err(invalid(other)),
    }
}

pub(crate) fn required_i64(args: &Value, key: &str) -> Result<i64> {
    optional_i64(args, key)?.ok_or_else(|| {
        FintrackError::InvalidToolInput(format!("Expected '{}' (integer) in tool arguments", key))
    })
}

pub(crate) fn optional_usize(args: &Value, key: &str) -> Result<Option<usize>> {
    match optional_i64(args, key)? {
        Some(n) if n < 0 => Err(FintrackError::InvalidToolInput(format!(
            "'{}' must not be negative",
            key
        ))),
        other => Ok(other.map(|n| n as usize)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo the text argument"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn execute(&self, _caller: &CallerContext, args: &Value) -> Result<ToolOutput> {
            Ok(ToolOutput::success(required_str(args, "text")?))
        }
    }

    struct SlowTool;

    #[async_trait::async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn description(&self) -> &'static str {
            "Never finishes in time"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _caller: &CallerContext, _args: &Value) -> Result<ToolOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolOutput::success("late"))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new(Duration::from_millis(50));
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(SlowTool));
        registry
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: None,
            name: name.to_string(),
            args,
        }
    }

    fn caller() -> CallerContext {
        CallerContext::new(Uuid::new_v4(), "BDT", "UTC")
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let output = registry()
            .invoke(&caller(), &call("echo", json!({"text": "hi"})))
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.content, "hi");
    }

    #[tokio::test]
    async fn test_scoped_registry_refuses_other_tools() {
        let scoped = registry().scoped(&["slow"]);
        assert_eq!(scoped.list(), vec!["slow"]);

        let output = scoped
            .invoke(&caller(), &call("echo", json!({"text": "hi"})))
            .await
            .unwrap();
        assert!(!output.success);
        assert!(output.content.contains("not available"));
    }

    #[tokio::test]
    async fn test_foreign_user_id_is_refused() {
        let me = caller();
        let output = registry()
            .invoke(
                &me,
                &call(
                    "echo",
                    json!({"text": "hi", "fields": {"user_id": Uuid::new_v4().to_string()}}),
                ),
            )
            .await
            .unwrap();
        assert!(!output.success);
        assert!(output.content.starts_with("Unauthorized"));

        let output = registry()
            .invoke(
                &me,
                &call("echo", json!({"text": "hi", "user_id": me.user_id.to_string()})),
            )
            .await
            .unwrap();
        assert!(output.success);
    }

    #[tokio::test]
    async fn test_invalid_input_is_reported_not_raised() {
        let output = registry()
            .invoke(&caller(), &call("echo", json!({"text": 5})))
            .await
            .unwrap();
        assert!(!output.success);

        let output = registry()
            .invoke(&caller(), &call("echo", json!("text")))
            .await
            .unwrap();
        assert!(!output.success);
    }

    #[tokio::test]
    async fn test_timeout_aborts() {
        let result = registry().invoke(&caller(), &call("slow", json!({}))).await;
        assert!(matches!(result, Err(FintrackError::Timeout(_))));
    }

    #[test]
    fn test_integer_coercion() {
        let args = json!({"a": 5, "b": 5.0, "c": "7", "d": 2.5, "e": -1});
        assert_eq!(optional_i64(&args, "a").unwrap(), Some(5));
        assert_eq!(optional_i64(&args, "b").unwrap(), Some(5));
        assert_eq!(optional_i64(&args, "c").unwrap(), Some(7));
        assert!(optional_i64(&args, "d").is_err());
        assert!(optional_usize(&args, "e").is_err());
        assert_eq!(optional_i64(&args, "missing").unwrap(), None);
    }

    #[test]
    fn test_definitions_are_sorted() {
        let names: Vec<String> = registry()
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["echo", "slow"]);
    }
}
