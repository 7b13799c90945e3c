//! AppState construction extracted from `main.rs`.
//!
//! [`build_app_state`] is the production boot path: it validates the config
//! and builds the external collaborators from it. [`assemble_state`] wires
//! already-built collaborators together, which is what tests use to run
//! turns against scripted providers and the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Semaphore;

use hb_context::{AssemblerLimits, ContextAssembler};
use hb_domain::config::{Config, ConfigSeverity};
use hb_providers::LlmProvider;
use hb_store::{CrmStore, FileStore};
use hb_tools::{Dispatcher, PropertyDataSource, RentCastSource, ToolExecutor, ToolSettings, UndoService};

use crate::api::auth::Authenticator;
use crate::runtime::{ConversationLocks, MemoryExtractor, SystemClock};
use crate::state::AppState;

/// The external collaborators a running server talks to.
pub struct Services {
    pub llm: Arc<dyn LlmProvider>,
    pub store: Arc<dyn CrmStore>,
    pub files: Arc<dyn FileStore>,
    pub property_source: Arc<dyn PropertyDataSource>,
}

/// Validate config, build every collaborator and return a fully-wired
/// [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if Config::has_errors(&issues) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Store ────────────────────────────────────────────────────────
    let (store, files) =
        hb_store::create_store(&config.store, &config.files).context("creating CRM store")?;
    if let Err(e) = store.ping().await {
        tracing::warn!(error = %e, "store is not reachable yet; continuing");
    }

    // ── LLM provider ─────────────────────────────────────────────────
    let llm = hb_providers::create_provider(&config.llm).context("initializing LLM provider")?;
    tracing::info!(
        provider = llm.provider_id(),
        model = %config.llm.model,
        cheap_model = %config.llm.cheap_model,
        "LLM provider ready"
    );

    // ── Property enrichment ──────────────────────────────────────────
    let property_source: Arc<dyn PropertyDataSource> = Arc::new(
        RentCastSource::from_config(&config.enrichment).context("creating property data client")?,
    );

    // ── Auth ─────────────────────────────────────────────────────────
    let auth = Authenticator::from_config(&config.auth).context("configuring auth")?;

    assemble_state(
        config,
        Services {
            llm,
            store,
            files,
            property_source,
        },
        auth,
    )
}

/// Wire collaborators into an [`AppState`]. No I/O.
pub fn assemble_state(
    config: Arc<Config>,
    services: Services,
    auth: Authenticator,
) -> anyhow::Result<AppState> {
    let Services {
        llm,
        store,
        files,
        property_source,
    } = services;

    let dispatcher = Dispatcher::new();

    // ── Tools ────────────────────────────────────────────────────────
    let settings = ToolSettings {
        signed_url_ttl: Duration::from_secs(config.files.signed_url_ttl_secs),
        max_file_bytes: config.files.max_file_bytes,
    };
    let tools = Arc::new(
        ToolExecutor::new(
            store.clone(),
            files,
            property_source,
            settings,
            dispatcher.clone(),
        )
        .context("building tool executor")?,
    );
    tracing::info!(tools = tools.definitions().len(), "tool registry ready");

    // ── Context assembly ─────────────────────────────────────────────
    let assembler = Arc::new(ContextAssembler::new(
        store.clone(),
        AssemblerLimits {
            history_messages: config.turn.history_limit,
            memory_facts: config.memory.prompt_facts,
            ..AssemblerLimits::default()
        },
    ));

    let undo = Arc::new(UndoService::new(store.clone(), dispatcher.clone()));

    // ── Memory extraction ────────────────────────────────────────────
    let memory = Arc::new(MemoryExtractor::new(
        llm.clone(),
        store.clone(),
        config.memory.clone(),
        config.llm.cheap_model.clone(),
        Arc::new(SystemClock),
    ));
    tracing::info!(
        enabled = config.memory.enabled,
        cooldown_secs = config.memory.cooldown_secs,
        "memory extraction ready"
    );

    // ── Concurrency ──────────────────────────────────────────────────
    let turn_slots = Arc::new(Semaphore::new(config.server.max_concurrent_turns.max(1)));

    Ok(AppState {
        config,
        llm,
        store,
        tools,
        assembler,
        undo,
        memory,
        dispatcher,
        conversation_locks: Arc::new(ConversationLocks::new()),
        turn_slots,
        auth: Arc::new(auth),
    })
}
