//! End-to-end turns against a scripted provider and the in-memory store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

use hb_domain::config::Config;
use hb_domain::crm::{ContentType, NewMemoryFact, UndoKind};
use hb_domain::error::{Error, Result};
use hb_domain::stream::{BoxStream, StopReason, StreamEvent, Usage};
use hb_domain::tool::{ContentPart, MessageContent, Role};
use hb_gateway::api::{self, auth::Authenticator};
use hb_gateway::bootstrap::{assemble_state, Services};
use hb_gateway::runtime::memory_extract::FactCandidate;
use hb_gateway::runtime::{run_turn, CancelToken, ClientEvent, TurnInput, TurnReport};
use hb_gateway::state::AppState;
use hb_providers::{ChatRequest, ChatResponse, LlmProvider};
use hb_store::{CrmStore, InMemoryFileStore, InMemoryStore};
use hb_tools::{PropertyDataSource, PropertyRecord};

const OWNER: &str = "owner-1";
const TOKEN: &str = "test-token";

const LONG_REPLY: &str = "I added 123 Main St to your pipeline as a new listing. Public records show \
4 bedrooms, 3 baths and about 2,400 square feet, built in 2010.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Script {
    Events(Vec<StreamEvent>),
    Fail(Error),
}

#[derive(Default)]
struct ScriptedProvider {
    rounds: Mutex<VecDeque<Script>>,
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
    stream_calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(rounds: Vec<Script>, replies: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            rounds: Mutex::new(rounds.into()),
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            ..Default::default()
        })
    }

    fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
        let content = self
            .replies
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Other("no scripted reply".into()))?;
        Ok(ChatResponse {
            content,
            tool_calls: vec![],
            usage: None,
            model: "cheap".into(),
            stop_reason: Some(StopReason::EndTurn),
        })
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(req);
        let script = self
            .rounds
            .lock()
            .pop_front()
            .unwrap_or_else(|| Script::Events(vec![text("Done."), done(StopReason::EndTurn)]));
        match script {
            Script::Fail(e) => Err(e),
            Script::Events(events) => Ok(Box::pin(futures_util::stream::iter(
                events.into_iter().map(Ok::<_, Error>),
            ))),
        }
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }
}

fn text(t: &str) -> StreamEvent {
    StreamEvent::Token { text: t.into() }
}

fn tool(id: &str, name: &str, args: Value) -> StreamEvent {
    StreamEvent::ToolCallFinished {
        call_id: id.into(),
        tool_name: name.into(),
        arguments: args,
    }
}

fn done_with(stop: StopReason, input_tokens: u32, output_tokens: u32) -> StreamEvent {
    StreamEvent::Done {
        usage: Some(Usage {
            input_tokens,
            output_tokens,
        }),
        stop_reason: Some(stop),
    }
}

fn done(stop: StopReason) -> StreamEvent {
    done_with(stop, 100, 20)
}

fn busy(status: u16) -> Error {
    Error::Provider {
        provider: "scripted".into(),
        status: Some(status),
        message: "overloaded".into(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Property sources
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn record() -> PropertyRecord {
    PropertyRecord {
        bedrooms: Some(4.0),
        bathrooms: Some(3.0),
        square_footage: Some(2400),
        year_built: Some(2010),
        ..Default::default()
    }
}

/// Answers immediately, optionally after a delay.
struct FixedSource {
    delay: Duration,
}

#[async_trait]
impl PropertyDataSource for FixedSource {
    async fn lookup(&self, _a: &str, _c: Option<&str>, _s: Option<&str>) -> Result<Option<PropertyRecord>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Some(record()))
    }
}

/// Blocks until the test opens the gate.
struct GatedSource {
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

#[async_trait]
impl PropertyDataSource for GatedSource {
    async fn lookup(&self, _a: &str, _c: Option<&str>, _s: Option<&str>) -> Result<Option<PropertyRecord>> {
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(Some(record()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    state: AppState,
    store: Arc<InMemoryStore>,
    llm: Arc<ScriptedProvider>,
}

fn harness_with(
    llm: Arc<ScriptedProvider>,
    source: Arc<dyn PropertyDataSource>,
    tweak: impl FnOnce(&mut Config),
) -> Harness {
    let mut config = Config::default();
    config.turn.retry_delay_ms = 1;
    config.memory.enabled = false;
    tweak(&mut config);

    let store = Arc::new(InMemoryStore::new());
    let state = assemble_state(
        Arc::new(config),
        Services {
            llm: llm.clone(),
            store: store.clone(),
            files: Arc::new(InMemoryFileStore::new()),
            property_source: source,
        },
        Authenticator::static_tokens([(TOKEN, OWNER)]),
    )
    .unwrap();
    Harness { state, store, llm }
}

fn harness(llm: Arc<ScriptedProvider>) -> Harness {
    harness_with(llm, Arc::new(FixedSource { delay: Duration::ZERO }), |_| {})
}

async fn run(h: &Harness, conversation_id: &str, message: &str) -> (TurnReport, Vec<ClientEvent>) {
    let input = TurnInput {
        owner_id: OWNER.into(),
        conversation_id: conversation_id.into(),
        message: message.into(),
    };
    let (handle, mut rx) = run_turn(h.state.clone(), input, CancelToken::new()).await.unwrap();
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    let report = handle.await.unwrap();
    h.state.dispatcher.flush().await;
    (report, events)
}

fn names(events: &[ClientEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}

fn done_payload(events: &[ClientEvent]) -> &hb_gateway::runtime::DonePayload {
    events
        .iter()
        .find_map(|e| match e {
            ClientEvent::Done(d) => Some(d.as_ref()),
            _ => None,
        })
        .expect("done event")
}

fn streamed_text(events: &[ClientEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::TextDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario A: new listing with enrichment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn new_listing_is_created_enriched_and_undoable() {
    let llm = ScriptedProvider::new(
        vec![
            Script::Events(vec![
                text("Adding that now."),
                tool(
                    "call_1",
                    "create_deal",
                    json!({ "property_address": "123 Main St, Austin TX", "deal_type": "listing" }),
                ),
                done(StopReason::ToolUse),
            ]),
            Script::Events(vec![text(LONG_REPLY), done(StopReason::EndTurn)]),
        ],
        vec!["Main St listing"],
    );
    let h = harness(llm);

    let (report, events) = run(&h, "conv-a", "Add 123 Main St, Austin TX as a new listing").await;

    assert!(!report.cancelled && !report.failed);
    assert_eq!(report.rounds, 2);
    assert_eq!(report.content_type, Some(ContentType::PropertyEnriched));

    let deals = h.store.deals(OWNER);
    assert_eq!(deals.len(), 1);
    assert_eq!(deals[0].bedrooms, Some(4.0));

    let seq = names(&events);
    let start = seq.iter().position(|n| *n == "tool_start").unwrap();
    let finished = seq.iter().position(|n| *n == "tool_done").unwrap();
    let done_at = seq.iter().position(|n| *n == "done").unwrap();
    assert!(start < finished && finished < done_at);
    assert!(seq.contains(&"iteration"));
    assert_eq!(seq.last(), Some(&"title_update"));

    let done = done_payload(&events);
    assert_eq!(done.content_type, ContentType::PropertyEnriched);
    assert_eq!(done.undo_actions.len(), 1);
    assert_eq!(done.undo_actions[0].kind, UndoKind::DeleteDeal);
    assert_eq!(done.undo_actions[0].entity_id, deals[0].id);
    assert_eq!(done.last_deal_id.as_deref(), Some(deals[0].id.as_str()));
    assert_eq!(done.chip_context.active_deal_count, 1);

    // Both messages persisted, the assistant one with its tool log.
    let messages = h.store.messages(OWNER, "conv-a");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, format!("Adding that now.{LONG_REPLY}"));
    let meta = messages[1].metadata.as_ref().unwrap();
    assert_eq!(meta.tool_calls.len(), 1);
    assert_eq!(meta.tool_calls[0].name, "create_deal");

    let conv = h.store.get_conversation(OWNER, "conv-a").await.unwrap().unwrap();
    assert_eq!(conv.title.as_deref(), Some("Main St listing"));

    // The undo endpoint removes the deal again.
    let app = api::router(h.state.clone()).with_state(h.state.clone());
    let undo = serde_json::to_value(&done.undo_actions[0]).unwrap();
    let (status, body) = post(&app, "/api/undo", Some(TOKEN), undo).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert!(h.store.deals(OWNER).is_empty());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario B: draft with no matching deal
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn draft_without_a_deal_still_produces_a_post() {
    let post_text = "Just listed in Westlake! This bright four-bedroom home sits on a quiet \
cul-de-sac with a big backyard and an updated kitchen. DM me for a private tour this weekend.";
    let llm = ScriptedProvider::new(
        vec![
            Script::Events(vec![
                tool("call_1", "draft_social_post", json!({ "address": "77 Lake Dr", "platform": "instagram" })),
                done(StopReason::ToolUse),
            ]),
            Script::Events(vec![text(post_text), done(StopReason::EndTurn)]),
        ],
        vec![],
    );
    let h = harness(llm);

    let (report, events) = run(&h, "conv-b", "Write an Instagram post for 77 Lake Dr").await;

    assert_eq!(report.rounds, 2);
    let tool_done = events
        .iter()
        .find_map(|e| match e {
            ClientEvent::ToolDone { success, .. } => Some(*success),
            _ => None,
        })
        .unwrap();
    assert!(tool_done);
    assert_eq!(streamed_text(&events), post_text);

    let done = done_payload(&events);
    assert_eq!(done.content_type, ContentType::SocialPost);
    assert!(done.undo_actions.is_empty());
    assert!(h.store.deals(OWNER).is_empty());

    // The model saw the no-match flag.
    let second = h.llm.requests.lock()[1].messages.clone();
    let MessageContent::Parts(parts) = &second.last().unwrap().content else {
        panic!("expected tool results");
    };
    let ContentPart::ToolResult { content, is_error, .. } = &parts[0] else {
        panic!("expected a tool_result block");
    };
    assert!(!is_error);
    assert_eq!(serde_json::from_str::<Value>(content).unwrap()["no_deal_found"], true);
}

#[tokio::test]
async fn long_draft_text_skips_the_confirmation_round() {
    let draft = "Subject: Your new home search\n\nHi Jordan, thanks for meeting with me today. \
I pulled together a few homes in East Austin that match your budget and the yard size you \
mentioned. Let me know which ones you would like to see this weekend and I will set up showings.";
    let llm = ScriptedProvider::new(
        vec![Script::Events(vec![
            text(draft),
            tool("call_1", "draft_email", json!({ "recipient": "Jordan" })),
            done(StopReason::ToolUse),
        ])],
        vec![],
    );
    let h = harness(llm);

    let (report, events) = run(&h, "conv-e", "Email Jordan about East Austin homes").await;

    assert_eq!(h.llm.stream_calls(), 1);
    assert_eq!(report.rounds, 1);
    assert_eq!(done_payload(&events).content_type, ContentType::Email);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario C: undo endpoint rejects unknown kinds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn post(app: &axum::Router, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut req = Request::post(path).header("content-type", "application/json");
    if let Some(t) = token {
        req = req.header("authorization", format!("Bearer {t}"));
    }
    let resp = app
        .clone()
        .oneshot(req.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn undo_rejects_unknown_type() {
    let h = harness(ScriptedProvider::new(vec![], vec![]));
    let app = api::router(h.state.clone()).with_state(h.state.clone());

    let (status, body) = post(
        &app,
        "/api/undo",
        Some(TOKEN),
        json!({ "type": "update_deal", "entity_id": "deal-1" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unknown undo type: update_deal");

    let (status, _) = post(&app, "/api/undo", None, json!({ "type": "delete_deal" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_requires_conversation_and_message() {
    let h = harness(ScriptedProvider::new(vec![], vec![]));
    let app = api::router(h.state.clone()).with_state(h.state.clone());

    let (status, body) = post(&app, "/api/chat", Some(TOKEN), json!({ "message": "hi" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "conversation_id and message are required");

    let (status, _) = post(
        &app,
        "/api/chat",
        Some(TOKEN),
        json!({ "conversation_id": "c", "message": "   " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/api/chat", Some("wrong"), json!({ "conversation_id": "c", "message": "hi" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.llm.stream_calls(), 0);
}

#[tokio::test]
async fn chat_streams_sse_frames() {
    let llm = ScriptedProvider::new(
        vec![Script::Events(vec![text("Hi there!"), done(StopReason::EndTurn)])],
        vec!["Greeting"],
    );
    let h = harness(llm);
    let app = api::router(h.state.clone()).with_state(h.state.clone());

    let req = Request::post("/api/chat")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::from(json!({ "conversation_id": "conv-sse", "message": "hello" }).to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("event: text_delta\ndata: {\"text\":\"Hi there!\"}"));
    assert!(body.contains("event: done\n"));
    assert!(body.contains("event: title_update\n"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario D: client disconnect mid-tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn disconnect_lets_the_running_tool_finish_and_stops_the_turn() {
    let entered = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let llm = ScriptedProvider::new(
        vec![Script::Events(vec![
            text("On it."),
            tool("call_1", "create_deal", json!({ "property_address": "9 Elm Ct, Austin TX" })),
            done(StopReason::ToolUse),
        ])],
        vec!["Elm Ct"],
    );
    let h = harness_with(
        llm,
        Arc::new(GatedSource {
            entered: entered.clone(),
            gate: gate.clone(),
        }),
        |_| {},
    );

    let input = TurnInput {
        owner_id: OWNER.into(),
        conversation_id: "conv-d".into(),
        message: "Add 9 Elm Ct".into(),
    };
    let (handle, mut rx) = run_turn(h.state.clone(), input, CancelToken::new()).await.unwrap();

    let mut received = Vec::new();
    while let Some(ev) = rx.recv().await {
        let is_start = matches!(ev, ClientEvent::ToolStart { .. });
        received.push(ev);
        if is_start {
            break;
        }
    }
    drop(rx);

    entered.notified().await;
    gate.notify_one();
    let report = handle.await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.events_sent, received.len());
    assert_eq!(h.llm.stream_calls(), 1);
    // The write completed; nothing was said about it afterwards.
    assert_eq!(h.store.deals(OWNER).len(), 1);
    let messages = h.store.messages(OWNER, "conv-d");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loop bounds and dispatch order
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn loop_stops_at_five_rounds() {
    let rounds = (0..8)
        .map(|i| {
            Script::Events(vec![
                tool(&format!("call_{i}"), "get_active_deals", json!({})),
                done(StopReason::ToolUse),
            ])
        })
        .collect();
    let h = harness(ScriptedProvider::new(rounds, vec!["Deals"]));

    let (report, events) = run(&h, "conv-loop", "What's in my pipeline?").await;

    assert_eq!(report.rounds, 5);
    assert_eq!(h.llm.stream_calls(), 5);
    assert_eq!(report.tool_calls, 5);
    let iterations: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::Iteration { current, .. } => Some(*current),
            _ => None,
        })
        .collect();
    assert_eq!(iterations, vec![2, 3, 4, 5]);
    assert_eq!(names(&events).iter().filter(|n| **n == "done").count(), 1);
}

#[tokio::test]
async fn token_ceiling_cuts_the_turn_before_tools_run() {
    let llm = ScriptedProvider::new(
        vec![Script::Events(vec![
            text("Let me check."),
            tool("call_1", "create_deal", json!({ "property_address": "1 Oak St" })),
            done_with(StopReason::ToolUse, 900, 200),
        ])],
        vec![],
    );
    let h = harness_with(llm, Arc::new(FixedSource { delay: Duration::ZERO }), |c| {
        c.turn.token_ceiling = 1_000;
    });

    let (report, events) = run(&h, "conv-ceiling", "Add 1 Oak St").await;

    assert!(report.truncated);
    assert_eq!(h.llm.stream_calls(), 1);
    assert!(h.store.deals(OWNER).is_empty());
    assert!(streamed_text(&events).contains("processing limit"));
    assert!(names(&events).contains(&"done"));
}

#[tokio::test]
async fn tool_results_follow_call_order_not_completion_order() {
    let llm = ScriptedProvider::new(
        vec![
            Script::Events(vec![
                tool("call_slow", "create_deal", json!({ "property_address": "5 Pine Rd, Austin TX" })),
                tool("call_fast", "get_active_deals", json!({})),
                done(StopReason::ToolUse),
            ]),
            Script::Events(vec![text("Done, both handled."), done(StopReason::EndTurn)]),
        ],
        vec![],
    );
    let h = harness_with(
        llm,
        Arc::new(FixedSource {
            delay: Duration::from_millis(50),
        }),
        |_| {},
    );

    let (_report, events) = run(&h, "conv-order", "Add 5 Pine Rd and show my deals").await;

    let completed: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::ToolDone { tool, .. } => Some(tool.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec!["get_active_deals", "create_deal"]);

    let second = h.llm.requests.lock()[1].messages.clone();
    let MessageContent::Parts(parts) = &second.last().unwrap().content else {
        panic!("expected tool results");
    };
    let ids: Vec<&str> = parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(ids, vec!["call_slow", "call_fast"]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Upstream failures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn rate_limit_is_retried() {
    let llm = ScriptedProvider::new(
        vec![
            Script::Fail(busy(429)),
            Script::Events(vec![text("All good now."), done(StopReason::EndTurn)]),
        ],
        vec![],
    );
    let h = harness(llm);

    let (report, events) = run(&h, "conv-429", "hello").await;

    assert!(!report.failed);
    assert_eq!(h.llm.stream_calls(), 2);
    assert_eq!(streamed_text(&events), "All good now.");
}

#[tokio::test]
async fn persistent_overload_ends_with_an_apology() {
    let llm = ScriptedProvider::new(
        vec![
            Script::Fail(busy(529)),
            Script::Fail(busy(529)),
            Script::Fail(busy(529)),
        ],
        vec![],
    );
    let h = harness(llm);

    let (report, events) = run(&h, "conv-529", "hello").await;

    assert!(report.failed);
    assert_eq!(h.llm.stream_calls(), 3);
    let message = events
        .iter()
        .find_map(|e| match e {
            ClientEvent::Error { message } => Some(message.clone()),
            _ => None,
        })
        .unwrap();
    assert!(message.contains("try again in a moment"));
    assert!(!names(&events).contains(&"done"));
}

fn too_long() -> Error {
    Error::Provider {
        provider: "scripted".into(),
        status: Some(400),
        message: "prompt is too long: 210000 tokens > 200000 maximum".into(),
    }
}

#[tokio::test]
async fn context_overflow_retries_with_a_shorter_history() {
    let llm = ScriptedProvider::new(
        vec![
            Script::Events(vec![text("First answer."), done(StopReason::EndTurn)]),
            Script::Events(vec![text("Second answer."), done(StopReason::EndTurn)]),
            Script::Fail(too_long()),
            Script::Events(vec![text("Recovered."), done(StopReason::EndTurn)]),
        ],
        vec![],
    );
    let h = harness_with(llm, Arc::new(FixedSource { delay: Duration::ZERO }), |c| {
        c.turn.context_window_messages = 2;
    });

    run(&h, "conv-long", "first question").await;
    run(&h, "conv-long", "second question").await;
    let (report, events) = run(&h, "conv-long", "third question").await;

    assert!(!report.failed);
    assert_eq!(h.llm.stream_calls(), 4);
    assert_eq!(streamed_text(&events), "Recovered.");

    let requests = h.llm.requests.lock();
    let lens: Vec<usize> = requests.iter().map(|r| r.messages.len()).collect();
    assert_eq!(lens, vec![1, 3, 5, 1]);
    let retried = &requests[3].messages[0];
    assert_eq!(retried.role, Role::User);
    assert!(matches!(&retried.content, MessageContent::Text(t) if t == "third question"));
}

#[tokio::test]
async fn repeated_context_overflow_asks_for_a_new_conversation() {
    let llm = ScriptedProvider::new(vec![Script::Fail(too_long()), Script::Fail(too_long())], vec![]);
    let h = harness(llm);

    let (report, events) = run(&h, "conv-overflow", "hello").await;

    assert!(report.failed);
    assert_eq!(h.llm.stream_calls(), 2);
    let message = events
        .iter()
        .find_map(|e| match e {
            ClientEvent::Error { message } => Some(message.clone()),
            _ => None,
        })
        .unwrap();
    assert!(message.contains("start a new conversation"));
    assert!(!names(&events).contains(&"done"));
}

#[tokio::test]
async fn paused_round_continues_the_turn() {
    let llm = ScriptedProvider::new(
        vec![
            Script::Events(vec![text("Searching... "), done(StopReason::PauseTurn)]),
            Script::Events(vec![text("found it."), done(StopReason::EndTurn)]),
        ],
        vec![],
    );
    let h = harness(llm);

    let (report, events) = run(&h, "conv-pause", "Look up mortgage rates today").await;

    assert!(!report.failed);
    assert_eq!(report.rounds, 2);
    assert_eq!(h.llm.stream_calls(), 2);
    assert_eq!(streamed_text(&events), "Searching... found it.");
    assert!(names(&events).contains(&"iteration"));

    // The partial assistant message is carried into the next request.
    let second = h.llm.requests.lock()[1].messages.clone();
    assert_eq!(second.len(), 2);
    assert_eq!(second[1].role, Role::Assistant);

    let messages = h.store.messages(OWNER, "conv-pause");
    assert_eq!(messages[1].content, "Searching... found it.");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn near_duplicate_facts_are_not_stored_twice() {
    let h = harness(ScriptedProvider::new(vec![], vec![]));
    h.store
        .insert_memory_fact(
            OWNER,
            NewMemoryFact {
                fact: "Prefers texting over phone calls".into(),
                category: "preference".into(),
                source_conversation_id: None,
            },
        )
        .await
        .unwrap();

    let inserted = h
        .state
        .memory
        .store_facts(
            OWNER,
            "conv-m",
            vec![
                FactCandidate {
                    fact: "prefers texting over phone calls.".into(),
                    category: "preference".into(),
                },
                FactCandidate {
                    fact: "Works mostly with first-time buyers in East Austin".into(),
                    category: "client".into(),
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(inserted, 1);
    assert_eq!(h.store.memory_facts(OWNER).len(), 2);
}

#[tokio::test]
async fn facts_are_extracted_after_a_turn_once_per_cooldown() {
    let llm = ScriptedProvider::new(
        vec![
            Script::Events(vec![text("Noted, I will keep that in mind."), done(StopReason::EndTurn)]),
            Script::Events(vec![text("Got it."), done(StopReason::EndTurn)]),
        ],
        vec![
            "Buyer preferences",
            r#"[{"fact": "Works mostly with first-time buyers in East Austin", "category": "client"}]"#,
        ],
    );
    let h = harness_with(llm, Arc::new(FixedSource { delay: Duration::ZERO }), |c| {
        c.memory.enabled = true;
    });

    let statement = "I mostly work with first-time buyers in East Austin and I prefer texting.";
    run(&h, "conv-mem", statement).await;
    assert_eq!(h.store.memory_facts(OWNER).len(), 1);

    // Second turn falls inside the cooldown: no extraction call, no reply consumed.
    run(&h, "conv-mem", statement).await;
    assert_eq!(h.store.memory_facts(OWNER).len(), 1);
}
