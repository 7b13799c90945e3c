//! Tool execution: one handler per [`ToolKind`], looked up in a table built
//! at startup, with a uniform outcome whatever happens inside.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hb_domain::crm::{DealStage, NewTaskRecord, UndoAction};
use hb_domain::error::{Error, Result};
use hb_domain::tool::ToolDefinition;
use hb_domain::trace::TraceEvent;
use hb_store::{CrmStore, FileStore};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::Instrument;

use crate::address::AddressParser;
use crate::background::Dispatcher;
use crate::enrichment::{Enricher, PropertyDataSource};
use crate::files::GeneratedFile;
use crate::input::InputError;
use crate::kind::ToolKind;
use crate::summary;
use crate::todo::TodoList;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Limits for generated files.
#[derive(Debug, Clone, Copy)]
pub struct ToolSettings {
    pub signed_url_ttl: Duration,
    pub max_file_bytes: usize,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            signed_url_ttl: Duration::from_secs(3600),
            max_file_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Shared collaborators handed to every handler.
pub struct ToolEnv {
    pub store: Arc<dyn CrmStore>,
    pub files: Arc<dyn FileStore>,
    pub enricher: Enricher,
    pub addresses: AddressParser,
    pub settings: ToolSettings,
}

/// Per-call context: who is asking and the turn's todo list.
#[derive(Clone)]
pub struct ToolContext {
    pub owner_id: String,
    pub conversation_id: String,
    pub todos: Arc<Mutex<TodoList>>,
    pub now: DateTime<Utc>,
}

impl ToolContext {
    pub fn new(owner_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            conversation_id: conversation_id.into(),
            todos: Arc::new(Mutex::new(TodoList::new())),
            now: Utc::now(),
        }
    }
}

/// Entities a call touched, for the terminal event's references and chip
/// context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Touched {
    pub deal_id: Option<String>,
    pub deal_stage: Option<DealStage>,
    pub contact_id: Option<String>,
    pub contact_type: Option<String>,
}

/// What a handler produces on success.
#[derive(Debug, Clone, Default)]
pub struct Handled {
    pub result: Value,
    pub description: String,
    pub undo: Option<UndoAction>,
    pub touched: Touched,
    pub file: Option<GeneratedFile>,
}

impl Handled {
    pub fn new(result: Value, description: impl Into<String>) -> Self {
        Self {
            result,
            description: description.into(),
            ..Default::default()
        }
    }
}

/// An expected failure. Becomes `{"error": message}` in the tool result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolFailure(pub String);

impl From<InputError> for ToolFailure {
    fn from(e: InputError) -> Self {
        ToolFailure(e.0)
    }
}

impl From<Error> for ToolFailure {
    fn from(e: Error) -> Self {
        match e {
            Error::NotFound(what) => ToolFailure(format!("Not found: {what}")),
            other => ToolFailure(other.to_string()),
        }
    }
}

impl From<&str> for ToolFailure {
    fn from(s: &str) -> Self {
        ToolFailure(s.to_string())
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(
        &self,
        env: &ToolEnv,
        ctx: &ToolContext,
        input: &Value,
    ) -> std::result::Result<Handled, ToolFailure>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<ToolKind, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every catalog entry with its handler.
    pub fn builtin() -> Self {
        use crate::handlers::*;
        let mut r = Self::new();
        r.register(ToolKind::GetActiveDeals, GetActiveDeals);
        r.register(ToolKind::GetDealDetails, GetDealDetails);
        r.register(ToolKind::CheckUpcomingDeadlines, CheckUpcomingDeadlines);
        r.register(ToolKind::SearchContacts, SearchContacts);
        r.register(ToolKind::CreateDeal, CreateDeal);
        r.register(ToolKind::UpdateDeal, UpdateDeal);
        r.register(ToolKind::AddContact, AddContact);
        r.register(ToolKind::UpdateContact, UpdateContact);
        r.register(ToolKind::DraftSocialPost, Draft(ToolKind::DraftSocialPost));
        r.register(ToolKind::DraftEmail, Draft(ToolKind::DraftEmail));
        r.register(
            ToolKind::DraftListingDescription,
            Draft(ToolKind::DraftListingDescription),
        );
        r.register(ToolKind::EnrichProperty, EnrichProperty);
        r.register(ToolKind::CreateFile, CreateFile);
        r.register(ToolKind::CreateTodos, CreateTodos);
        r.register(ToolKind::UpdateTodo, UpdateTodo);
        r
    }

    pub fn register(&mut self, kind: ToolKind, handler: impl ToolHandler + 'static) {
        self.handlers.insert(kind, Arc::new(handler));
    }

    pub fn get(&self, kind: ToolKind) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.get(&kind)
    }

    /// Definitions of registered tools, in catalog order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolKind::ALL
            .iter()
            .filter(|k| self.handlers.contains_key(k))
            .map(|k| k.definition())
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of one tool call. Always well-formed, even for failures.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub tool_name: String,
    pub kind: Option<ToolKind>,
    pub result: Value,
    pub task_type: String,
    pub task_description: String,
    pub undo: Option<UndoAction>,
    pub success: bool,
    /// One-liner for the client and the message's tool-call log.
    pub summary: String,
    pub touched: Touched,
    pub file: Option<GeneratedFile>,
}

impl ToolOutcome {
    fn unknown(name: &str) -> Self {
        Self {
            tool_name: name.to_string(),
            kind: None,
            result: json!({ "error": "Unknown tool" }),
            task_type: "unknown_tool".into(),
            task_description: format!("Unknown tool: {name}"),
            undo: None,
            success: false,
            summary: "Error: Unknown tool".into(),
            touched: Touched::default(),
            file: None,
        }
    }
}

pub struct ToolExecutor {
    env: ToolEnv,
    registry: ToolRegistry,
    dispatcher: Dispatcher,
}

impl ToolExecutor {
    pub fn new(
        store: Arc<dyn CrmStore>,
        files: Arc<dyn FileStore>,
        property_source: Arc<dyn PropertyDataSource>,
        settings: ToolSettings,
        dispatcher: Dispatcher,
    ) -> Result<Self> {
        Ok(Self {
            env: ToolEnv {
                enricher: Enricher::new(property_source, store.clone()),
                store,
                files,
                addresses: AddressParser::new()?,
                settings,
            },
            registry: ToolRegistry::builtin(),
            dispatcher,
        })
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Run one call. Never fails: domain errors land in `result.error` and
    /// an unknown name yields `{"error": "Unknown tool"}`.
    pub async fn execute(&self, ctx: &ToolContext, name: &str, input: &Value) -> ToolOutcome {
        let Some(kind) = ToolKind::from_name(name) else {
            tracing::warn!(tool = name, "model called an unknown tool");
            return ToolOutcome::unknown(name);
        };
        let Some(handler) = self.registry.get(kind) else {
            tracing::warn!(tool = name, "tool has no registered handler");
            return ToolOutcome::unknown(name);
        };

        let span = tracing::info_span!("tool.call", tool = name, owner = %ctx.owner_id);
        let start = Instant::now();
        let handled = handler.handle(&self.env, ctx, input).instrument(span).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = match handled {
            Ok(h) => ToolOutcome {
                tool_name: name.to_string(),
                kind: Some(kind),
                summary: summary::result_summary(kind, &h.result),
                result: h.result,
                task_type: name.to_string(),
                task_description: h.description,
                undo: h.undo,
                success: true,
                touched: h.touched,
                file: h.file,
            },
            Err(ToolFailure(message)) => {
                tracing::info!(tool = name, error = %message, "tool returned an error");
                let result = json!({ "error": message });
                ToolOutcome {
                    tool_name: name.to_string(),
                    kind: Some(kind),
                    summary: summary::result_summary(kind, &result),
                    result,
                    task_type: name.to_string(),
                    task_description: format!("{} failed: {message}", kind.status_label()),
                    undo: None,
                    success: false,
                    touched: Touched::default(),
                    file: None,
                }
            }
        };

        TraceEvent::ToolExecuted {
            tool_name: name.to_string(),
            success: outcome.success,
            duration_ms,
        }
        .emit();

        if outcome.success && !kind.is_todo() {
            self.audit(ctx, &outcome);
        }
        outcome
    }

    /// Append the task-history record in the background. A failed write is
    /// logged by the dispatcher and otherwise ignored.
    fn audit(&self, ctx: &ToolContext, outcome: &ToolOutcome) {
        let store = self.env.store.clone();
        let owner = ctx.owner_id.clone();
        let record = NewTaskRecord {
            task_type: outcome.task_type.clone(),
            description: outcome.task_description.clone(),
            metadata: json!({
                "conversation_id": ctx.conversation_id,
                "deal_id": outcome.touched.deal_id,
                "contact_id": outcome.touched.contact_id,
                "summary": outcome.summary,
            }),
        };
        self.dispatcher.spawn("audit", async move {
            store.insert_task_record(&owner, record).await.map(|_| ())
        });
    }
}
