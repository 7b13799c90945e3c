use std::sync::Arc;

use hb_context::ContextAssembler;
use hb_domain::config::Config;
use hb_providers::LlmProvider;
use hb_store::CrmStore;
use hb_tools::{Dispatcher, ToolExecutor, UndoService};
use tokio::sync::Semaphore;

use crate::api::auth::Authenticator;
use crate::runtime::{ConversationLocks, MemoryExtractor};

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services**: config, LLM provider, CRM store
/// - **Turn machinery**: tools, context assembly, undo, memory extraction
/// - **Concurrency**: background jobs, per-conversation locks, turn slots
/// - **Security**: bearer-token authentication
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<dyn LlmProvider>,
    pub store: Arc<dyn CrmStore>,

    // ── Turn machinery ────────────────────────────────────────────────
    pub tools: Arc<ToolExecutor>,
    pub assembler: Arc<ContextAssembler>,
    pub undo: Arc<UndoService>,
    pub memory: Arc<MemoryExtractor>,

    // ── Concurrency ───────────────────────────────────────────────────
    pub dispatcher: Dispatcher,
    /// One turn at a time per (owner, conversation).
    pub conversation_locks: Arc<ConversationLocks>,
    /// Global cap on concurrently running turns.
    pub turn_slots: Arc<Semaphore>,

    // ── Security ──────────────────────────────────────────────────────
    pub auth: Arc<Authenticator>,
}
