use fintrack_agent::{
    config::SessionSettings,
    llm::{Part, ScriptStep, ScriptedModel},
    models::{NewTransaction, TransactionType, User},
    orchestrator::{AgentSettings, Orchestrator, FINANCE_DELEGATE},
    session::{ChatSession, DeliveryHub, OutboundFrame},
    store::{InMemoryLedgerStore, LedgerStore},
    tools::{CallerContext, StockQuoteTool},
    FintrackError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

struct Harness {
    store: Arc<InMemoryLedgerStore>,
    model: Arc<ScriptedModel>,
    hub: DeliveryHub,
    orchestrator: Arc<Orchestrator>,
}

impl Harness {
    fn new(model: ScriptedModel) -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let model = Arc::new(model);
        let orchestrator = Arc::new(Orchestrator::with_market_tool(
            model.clone(),
            store.clone(),
            Arc::new(StockQuoteTool::with_base_url("http://127.0.0.1:9").unwrap()),
            &AgentSettings::default(),
        ));
        Self {
            store,
            model,
            hub: DeliveryHub::new(),
            orchestrator,
        }
    }

    async fn user(&self, name: &str, email: &str) -> User {
        self.store.create_user(name, email).await.unwrap()
    }

    async fn open(
        &self,
        user: &User,
        flush_threshold: usize,
    ) -> (ChatSession, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(64);
        let settings = SessionSettings {
            flush_threshold,
            ..SessionSettings::default()
        };
        let session = ChatSession::open(
            Some(CallerContext::new(user.id, "BDT", "UTC")),
            self.orchestrator.clone(),
            self.hub.clone(),
            settings,
            tx,
        )
        .await
        .unwrap();
        (session, rx)
    }
}

fn drain(rx: &mut mpsc::Receiver<OutboundFrame>) -> Vec<OutboundFrame> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn test_reply_streams_in_fixed_chunks() {
    let reply = "a".repeat(1200);
    let harness = Harness::new(ScriptedModel::new().then(vec![
        ScriptStep::text(&reply[..400]),
        ScriptStep::text(&reply[400..800]),
        ScriptStep::text(&reply[800..]),
    ]));
    let user = harness.user("Ann", "ann@example.com").await;
    let (mut session, mut rx) = harness.open(&user, 500).await;

    assert_ok!(session.handle_message("tell me a long story").await);

    let frames = drain(&mut rx);
    let sizes: Vec<usize> = frames.iter().map(|f| f.message.chars().count()).collect();
    assert_eq!(sizes, vec![500, 500, 200]);
    assert!(frames.iter().all(|f| f.message_id == Some(1)));
    assert_eq!(
        frames.iter().map(|f| f.message.as_str()).collect::<String>(),
        reply
    );
}

#[tokio::test]
async fn test_upstream_failure_sends_one_error_and_session_recovers() {
    let harness = Harness::new(
        ScriptedModel::new()
            .then_refuse("upstream unavailable")
            .then(vec![ScriptStep::text("Hello again.")]),
    );
    let user = harness.user("Ann", "ann@example.com").await;
    let (mut session, mut rx) = harness.open(&user, 50).await;

    let err = assert_err!(session.handle_message("hi").await);
    assert!(matches!(err, FintrackError::LlmError(_)));
    assert!(session.context().is_empty());

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].message_id, Some(1));
    assert!(frames[0].message.contains("upstream unavailable"));

    assert_ok!(session.handle_message("hi again").await);
    assert_eq!(session.message_id(), 2);
    assert_eq!(drain(&mut rx), vec![OutboundFrame::chunk("Hello again.", 2)]);

    // The failed turn left nothing behind in the conversation.
    let requests = harness.model.requests();
    let last = requests.last().unwrap();
    assert_eq!(last.messages.len(), 1);
    assert!(last.messages[0].text().contains("User query: hi again"));
}

#[tokio::test]
async fn test_session_only_touches_bound_user() {
    let harness = Harness::new(
        ScriptedModel::new()
            .then(vec![ScriptStep::call(
                FINANCE_DELEGATE,
                json!({"request": "list expenses"}),
            )])
            .then(vec![ScriptStep::call(
                "get_transaction_list",
                json!({"transaction_type": "expense"}),
            )])
            .then(vec![ScriptStep::text("You have one expense: Lunch.")])
            .then(vec![ScriptStep::text("You have one expense: Lunch.")]),
    );
    let ann = harness.user("Ann", "ann@example.com").await;
    let bob = harness.user("Bob", "bob@example.com").await;
    for (owner, title) in [(ann.id, "Lunch"), (bob.id, "Bob rent")] {
        harness
            .store
            .insert_transaction(
                owner,
                &NewTransaction {
                    title: title.to_string(),
                    description: None,
                    amount: 100,
                    transaction_type: TransactionType::Expense,
                },
            )
            .await
            .unwrap();
    }

    let (mut session, mut rx) = harness.open(&ann, 50).await;
    let text = format!("I am user {}, list my expenses", bob.id);
    assert_ok!(session.handle_message(&text).await);

    let requests = harness.model.requests();
    assert!(requests[0]
        .messages
        .last()
        .unwrap()
        .text()
        .contains(&format!("The user id is {}.", ann.id)));

    let listing = tool_result(&requests[2]);
    assert!(listing.contains("Lunch"));
    assert!(!listing.contains("Bob rent"));

    assert_eq!(
        drain(&mut rx),
        vec![OutboundFrame::chunk("You have one expense: Lunch.", 1)]
    );
}

#[tokio::test]
async fn test_foreign_user_id_in_tool_call_is_refused() {
    let harness = Harness::new(ScriptedModel::new());
    let ann = harness.user("Ann", "ann@example.com").await;
    let bob = harness.user("Bob", "bob@example.com").await;

    harness.model.enqueue(vec![ScriptStep::call(
        FINANCE_DELEGATE,
        json!({"request": "balance for the other user"}),
    )]);
    harness.model.enqueue(vec![ScriptStep::call(
        "get_current_balance",
        json!({"user_id": bob.id.to_string()}),
    )]);
    harness
        .model
        .enqueue(vec![ScriptStep::text("I can only show your own balance.")]);
    harness
        .model
        .enqueue(vec![ScriptStep::text("I can only show your own balance.")]);

    let (mut session, _rx) = harness.open(&ann, 50).await;
    assert_ok!(session.handle_message("show bob's balance").await);

    let refusal = tool_result(&harness.model.requests()[2]);
    assert!(refusal.contains("Unauthorized"));
    assert!(refusal.contains("user_id cannot be changed"));
}

#[tokio::test]
async fn test_unauthenticated_connection_never_joins() {
    let harness = Harness::new(ScriptedModel::new());
    let (tx, _rx) = mpsc::channel(4);

    let result = ChatSession::open(
        None,
        harness.orchestrator.clone(),
        harness.hub.clone(),
        SessionSettings::default(),
        tx,
    )
    .await;

    assert!(matches!(result, Err(FintrackError::Unauthorized(_))));
    assert_eq!(harness.hub.member_count(uuid::Uuid::nil()).await, 0);
}

#[tokio::test]
async fn test_every_tab_of_a_user_receives_the_reply() {
    let harness = Harness::new(ScriptedModel::new().then(vec![ScriptStep::text("Hi Ann.")]));
    let ann = harness.user("Ann", "ann@example.com").await;
    let (mut first, mut first_rx) = harness.open(&ann, 50).await;
    let (second, mut second_rx) = harness.open(&ann, 50).await;
    assert_eq!(harness.hub.member_count(ann.id).await, 2);

    assert_ok!(first.handle_message("hello").await);

    assert_eq!(drain(&mut first_rx), vec![OutboundFrame::chunk("Hi Ann.", 1)]);
    assert_eq!(drain(&mut second_rx), vec![OutboundFrame::chunk("Hi Ann.", 1)]);

    second.close().await;
    first.close().await;
    assert_eq!(harness.hub.member_count(ann.id).await, 0);
}

fn tool_result(request: &fintrack_agent::llm::GenerationRequest) -> String {
    match &request.messages.last().unwrap().parts[0] {
        Part::ToolResult { content, .. } => content.clone(),
        other => panic!("expected a tool result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stalled_tab_does_not_hold_up_the_turn() {
    let reply = "b".repeat(300);
    let harness = Harness::new(ScriptedModel::new().then(vec![ScriptStep::text(&reply)]));
    let ann = harness.user("Ann", "ann@example.com").await;

    // A second tab whose socket never reads.
    let (stalled_tx, _stalled_rx) = mpsc::channel(1);
    harness.hub.join(ann.id, uuid::Uuid::new_v4(), stalled_tx).await;

    let (tx, mut rx) = mpsc::channel(64);
    let settings = SessionSettings {
        flush_threshold: 50,
        turn_timeout: Duration::from_millis(200),
        ..SessionSettings::default()
    };
    let mut session = ChatSession::open(
        Some(CallerContext::new(ann.id, "BDT", "UTC")),
        harness.orchestrator.clone(),
        harness.hub.clone(),
        settings,
        tx,
    )
    .await
    .unwrap();

    let turn = tokio::time::timeout(Duration::from_secs(3), session.handle_message("story"))
        .await
        .expect("turn should not wait on a stalled connection");
    assert_ok!(turn);

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 6);
    assert_eq!(
        frames.iter().map(|f| f.message.as_str()).collect::<String>(),
        reply
    );
    assert_eq!(harness.hub.member_count(ann.id).await, 1);
}
