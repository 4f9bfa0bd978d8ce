//! Root router
//!
//! Builds the account and finance agents, exposes them to a root agent as
//! delegation tools next to `stock_quote`, and runs one user turn.

use crate::agent::directives::{
    ACCOUNT_AGENT_DESCRIPTION, ACCOUNT_AGENT_NAME, ACCOUNT_DIRECTIVE, FINANCE_AGENT_DESCRIPTION,
    FINANCE_AGENT_NAME, FINANCE_DIRECTIVE, ROOT_AGENT_NAME, ROOT_DIRECTIVE,
};
use crate::agent::{Agent, AgentReply};
use crate::classifier::IntentClassifier;
use crate::llm::{ChatMessage, LanguageModel};
use crate::services::{AccountService, FinanceService};
use crate::store::LedgerStore;
use crate::tools::{
    CallerContext, CreateTransactionTool, DelegateTool, GetBalanceTool, GetTransactionByIdTool,
    GetTransactionListTool, GetUserInformationTool, SearchTransactionsTool, StockQuoteTool, Tool,
    ToolRegistry, UpdateTransactionTool, UpdateUserInformationTool, ACCOUNT_TOOLS, FINANCE_TOOLS,
};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

pub const ACCOUNT_DELEGATE: &str = "account_management_agent";
pub const FINANCE_DELEGATE: &str = "finance_management_agent";

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub tool_timeout: Duration,
    /// Budget for one delegated agent run, which spans several model calls.
    pub delegate_timeout: Duration,
    pub max_iterations: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(crate::config::DEFAULT_TOOL_TIMEOUT_SECS),
            delegate_timeout: Duration::from_secs(crate::config::DEFAULT_TURN_TIMEOUT_SECS),
            max_iterations: crate::config::DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Every leaf tool the agents may be scoped to.
pub fn build_tool_registry(
    store: Arc<dyn LedgerStore>,
    market: Arc<dyn Tool>,
    timeout: Duration,
) -> ToolRegistry {
    let accounts = AccountService::new(store.clone());
    let finance = FinanceService::new(store);

    let mut registry = ToolRegistry::new(timeout);
    registry.register(Arc::new(GetUserInformationTool::new(accounts.clone())));
    registry.register(Arc::new(UpdateUserInformationTool::new(accounts)));
    registry.register(Arc::new(CreateTransactionTool::new(finance.clone())));
    registry.register(Arc::new(SearchTransactionsTool::new(finance.clone())));
    registry.register(Arc::new(GetTransactionByIdTool::new(finance.clone())));
    registry.register(Arc::new(GetBalanceTool::new(finance.clone())));
    registry.register(Arc::new(UpdateTransactionTool::new(finance.clone())));
    registry.register(Arc::new(GetTransactionListTool::new(finance)));
    registry.register(market);
    registry
}

pub struct Orchestrator {
    root: Agent,
}

impl Orchestrator {
    /// Production wiring with the Yahoo-backed stock quote tool.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn LedgerStore>,
        settings: &AgentSettings,
    ) -> Result<Self> {
        let market: Arc<dyn Tool> = Arc::new(StockQuoteTool::new()?);
        Ok(Self::with_market_tool(model, store, market, settings))
    }

    pub fn with_market_tool(
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn LedgerStore>,
        market: Arc<dyn Tool>,
        settings: &AgentSettings,
    ) -> Self {
        let registry = build_tool_registry(store, market.clone(), settings.tool_timeout);

        let account_agent = Agent::builder(ACCOUNT_AGENT_NAME, model.clone())
            .description(ACCOUNT_AGENT_DESCRIPTION)
            .directive(ACCOUNT_DIRECTIVE)
            .tools(registry.scoped(&ACCOUNT_TOOLS))
            .max_iterations(settings.max_iterations)
            .build();

        let finance_agent = Agent::builder(FINANCE_AGENT_NAME, model.clone())
            .description(FINANCE_AGENT_DESCRIPTION)
            .directive(FINANCE_DIRECTIVE)
            .tools(registry.scoped(&FINANCE_TOOLS))
            .max_iterations(settings.max_iterations)
            .build();

        let mut root_tools = ToolRegistry::new(settings.delegate_timeout);
        root_tools.register(market);
        root_tools.register(Arc::new(DelegateTool::new(
            ACCOUNT_DELEGATE,
            "Read or update the authenticated user's own profile (name, email, last login). \
             Describe the request in plain words.",
            Arc::new(account_agent),
        )));
        root_tools.register(Arc::new(DelegateTool::new(
            FINANCE_DELEGATE,
            "Create, search, list, fetch or update the user's transactions and get their current \
             balance. Describe the request in plain words.",
            Arc::new(finance_agent),
        )));

        let root = Agent::builder(ROOT_AGENT_NAME, model)
            .description("Routes requests to the account and finance agents")
            .directive(ROOT_DIRECTIVE)
            .tools(root_tools)
            .max_iterations(settings.max_iterations)
            .build();

        info!(tools = ?root.tools().list(), "Orchestrator initialized");
        Self { root }
    }

    pub fn root(&self) -> &Agent {
        &self.root
    }

    /// Run one user turn. `envelope` is what the model sees; `user_text` is
    /// the raw message used for routing. Root text increments go to `sink`.
    pub async fn respond(
        &self,
        caller: &CallerContext,
        history: &mut Vec<ChatMessage>,
        user_text: &str,
        envelope: String,
        sink: Option<&mpsc::Sender<String>>,
    ) -> Result<AgentReply> {
        let intents = IntentClassifier::classify(user_text);
        info!(
            user_id = %caller.user_id,
            connection_id = %caller.connection_id,
            intents = ?intents,
            "Routing message"
        );

        let hint = IntentClassifier::routing_hint(&intents);
        history.push(ChatMessage::user(envelope));
        self.root.run(caller, history, Some(&hint), sink).await
    }
}
