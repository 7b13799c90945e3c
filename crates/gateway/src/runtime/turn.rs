//! Turn execution loop: the orchestrator that streams inference rounds,
//! runs the tools the model asks for, and finalizes the turn.
//!
//! Entry points: [`prepare_turn`] does the fallible set-up that should map
//! to an HTTP error (conversation, context, user message), then
//! [`spawn_turn`] runs the loop on its own task and returns a channel of
//! [`ClientEvent`]s for the SSE body.

use chrono::Utc;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use hb_context::truncation::clip;
use hb_domain::crm::ContentType;
use hb_domain::error::Result;
use hb_domain::stream::{StopReason, Usage};
use hb_domain::tool::{Message, Role, SystemBlock, ToolCall};
use hb_domain::trace::TraceEvent;
use hb_providers::ChatRequest;
use hb_tools::summary::input_summary;
use hb_tools::{ToolContext, ToolKind, ToolOutcome};
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::state::AppState;

use super::cancel::CancelToken;
use super::events::ClientEvent;
use super::finalize::{self, CallRecord, TurnRecord};
use super::round::{self, Emitter};
use super::title;

/// Channel depth between the turn task and the SSE body.
const EVENT_BUFFER: usize = 64;

const TRUNCATION_NOTICE: &str = "\n\n_I stopped here because this request hit its processing limit. \
Ask me to continue if you need more._";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single turn.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub owner_id: String,
    pub conversation_id: String,
    pub message: String,
}

/// Everything gathered before the first inference call.
pub struct PreparedTurn {
    pub input: TurnInput,
    pub system: Vec<SystemBlock>,
    /// Rebuilt history followed by the new user message.
    pub messages: Vec<Message>,
    /// No prior messages and no title yet: the turn will title the
    /// conversation.
    pub first_exchange: bool,
}

/// How a turn ended, for the caller and for tests.
#[derive(Debug, Clone, Default)]
pub struct TurnReport {
    pub rounds: u32,
    pub usage: Usage,
    pub tool_calls: usize,
    pub cancelled: bool,
    pub truncated: bool,
    pub failed: bool,
    pub content_type: Option<ContentType>,
    /// Events delivered to the client.
    pub events_sent: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Preparation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Create the conversation if needed, assemble context, and persist the
/// user message. History is loaded before the insert, so the new message
/// is appended exactly once.
pub async fn prepare_turn(state: &AppState, input: TurnInput) -> Result<PreparedTurn> {
    let owner = input.owner_id.as_str();
    let conversation_id = input.conversation_id.as_str();

    let conversation = match state.store.get_conversation(owner, conversation_id).await? {
        Some(c) => c,
        None => {
            tracing::debug!(conversation_id, "creating conversation");
            state.store.create_conversation(owner, conversation_id).await?
        }
    };

    let context = state
        .assembler
        .assemble(owner, conversation_id, Utc::now())
        .await?;
    let first_exchange = conversation.title.is_none() && context.history.is_empty();

    state
        .store
        .insert_message(owner, conversation_id, Role::User, &input.message, None)
        .await?;

    let mut messages = context.history;
    messages.push(Message::user(input.message.as_str()));

    Ok(PreparedTurn {
        input,
        system: context.system,
        messages,
        first_exchange,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// spawn_turn: the core orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the turn on its own task. `permits` (conversation lock, global turn
/// slot) are held until the task ends, which may be after the client has
/// gone: in-flight tools always finish.
pub fn spawn_turn(
    state: AppState,
    turn: PreparedTurn,
    cancel: CancelToken,
    permits: Vec<OwnedSemaphorePermit>,
) -> (JoinHandle<TurnReport>, mpsc::Receiver<ClientEvent>) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let emit = Emitter::new(tx, cancel.clone());

    let span = tracing::info_span!(
        "turn",
        turn_id = %Uuid::new_v4(),
        owner = %turn.input.owner_id,
        conversation_id = %turn.input.conversation_id,
        "otel.kind" = "SERVER",
    );
    let conversation_id = turn.input.conversation_id.clone();
    let handle = tokio::spawn(
        async move {
            tracing::debug!("turn started");
            let report = TurnLoop::new(&state, turn, &emit, &cancel).run().await;
            drop(permits);

            TraceEvent::TurnCompleted {
                conversation_id,
                rounds: report.rounds,
                total_tokens: report.usage.total(),
                tool_calls: report.tool_calls,
                cancelled: report.cancelled,
                truncated: report.truncated,
            }
            .emit();
            report
        }
        .instrument(span),
    );
    (handle, rx)
}

/// Prepare and spawn in one call, without lock or slot permits. Used by
/// callers that serialize turns themselves.
pub async fn run_turn(
    state: AppState,
    input: TurnInput,
    cancel: CancelToken,
) -> Result<(JoinHandle<TurnReport>, mpsc::Receiver<ClientEvent>)> {
    let turn = prepare_turn(&state, input).await?;
    Ok(spawn_turn(state, turn, cancel, Vec::new()))
}

/// Why the round loop stopped.
enum TurnEnd {
    Complete,
    Cancelled,
    Failed,
}

struct TurnLoop<'a> {
    state: &'a AppState,
    turn: PreparedTurn,
    emit: &'a Emitter,
    cancel: &'a CancelToken,
    ctx: ToolContext,
    record: TurnRecord,
    report: TurnReport,
}

impl<'a> TurnLoop<'a> {
    fn new(
        state: &'a AppState,
        turn: PreparedTurn,
        emit: &'a Emitter,
        cancel: &'a CancelToken,
    ) -> Self {
        let ctx = ToolContext::new(&turn.input.owner_id, &turn.input.conversation_id);
        Self {
            state,
            turn,
            emit,
            cancel,
            ctx,
            record: TurnRecord::default(),
            report: TurnReport::default(),
        }
    }

    async fn run(mut self) -> TurnReport {
        let end = self.round_loop().await;
        match end {
            TurnEnd::Complete => self.finish().await,
            TurnEnd::Cancelled => {
                self.report.cancelled = true;
                tracing::info!(rounds = self.report.rounds, "turn cancelled by client");
            }
            TurnEnd::Failed => self.report.failed = true,
        }
        self.report.events_sent = self.emit.sent();
        self.report
    }

    fn base_request(&self) -> ChatRequest {
        let llm = &self.state.config.llm;
        ChatRequest {
            system: self.turn.system.clone(),
            tools: self.state.tools.definitions(),
            web_search_max_uses: (llm.web_search_max_uses > 0).then_some(llm.web_search_max_uses),
            max_tokens: Some(llm.max_tokens),
            model: Some(llm.model.clone()),
            ..Default::default()
        }
    }

    async fn round_loop(&mut self) -> TurnEnd {
        let cfg = self.state.config.turn.clone();
        let base = self.base_request();
        let mut messages = std::mem::take(&mut self.turn.messages);
        let mut last_tool: Option<String> = None;
        let mut round = 0u32;

        loop {
            round += 1;
            if self.cancel.is_cancelled() {
                return TurnEnd::Cancelled;
            }
            if round > 1 {
                self.emit
                    .send(ClientEvent::Iteration {
                        current: round,
                        max: cfg.max_rounds,
                        tool: last_tool.clone(),
                    })
                    .await;
            }

            let out = match round::infer(
                self.state.llm.as_ref(),
                &base,
                &mut messages,
                self.emit,
                self.cancel,
                &cfg,
                round,
            )
            .await
            {
                Ok(out) => out,
                Err(e) => {
                    tracing::error!(round, error = %e, "inference failed");
                    self.emit
                        .send(ClientEvent::error(round::failure_message(&e)))
                        .await;
                    return TurnEnd::Failed;
                }
            };
            self.report.rounds = round;
            self.report.usage.add(&out.usage);
            self.record.text.push_str(&out.text);
            self.record.sources.extend(out.sources.iter().cloned());

            if self.cancel.is_cancelled() {
                return TurnEnd::Cancelled;
            }

            if self.report.usage.total() > cfg.token_ceiling {
                tracing::warn!(
                    round,
                    total_tokens = self.report.usage.total(),
                    ceiling = cfg.token_ceiling,
                    "token ceiling reached, stopping turn"
                );
                self.record.text.push_str(TRUNCATION_NOTICE);
                self.emit
                    .send(ClientEvent::TextDelta {
                        text: TRUNCATION_NOTICE.to_string(),
                    })
                    .await;
                self.report.truncated = true;
                return TurnEnd::Complete;
            }

            match out.stop_reason {
                StopReason::PauseTurn => {
                    tracing::debug!(round, "provider paused the turn, continuing");
                    if let Some(msg) = out.assistant_message() {
                        messages.push(msg);
                    }
                }
                StopReason::ToolUse if !out.tool_calls.is_empty() => {
                    if let Some(msg) = out.assistant_message() {
                        messages.push(msg);
                    }
                    let (results, drafted) = self.execute_batch(&out.tool_calls).await;
                    if self.cancel.is_cancelled() {
                        return TurnEnd::Cancelled;
                    }
                    if drafted && out.text.chars().count() >= cfg.draft_text_threshold {
                        tracing::debug!(round, "draft already written, skipping confirmation round");
                        return TurnEnd::Complete;
                    }
                    messages.push(Message::tool_results(results));
                    last_tool = out.tool_calls.last().map(|c| c.tool_name.clone());
                }
                _ => return TurnEnd::Complete,
            }

            if round >= cfg.max_rounds {
                tracing::warn!(max_rounds = cfg.max_rounds, "round limit reached, stopping turn");
                return TurnEnd::Complete;
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Tool dispatch
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Run one round's tool calls and return the `tool_result` triples in
    /// call order, plus whether a drafting tool ran.
    ///
    /// Todo tools run first, in process and in order. Every other call is
    /// dispatched concurrently; `tool_done` goes out as each finishes.
    async fn execute_batch(&mut self, calls: &[ToolCall]) -> (Vec<(String, String, bool)>, bool) {
        let state = self.state;
        let tools = state.tools.as_ref();
        let ctx = &self.ctx;
        let emit = self.emit;
        let is_todo = |c: &ToolCall| {
            ToolKind::from_name(&c.tool_name)
                .map(|k| k.is_todo())
                .unwrap_or(false)
        };

        // 1. Announce every custom call before any of them runs.
        for call in calls.iter().filter(|c| !is_todo(c)) {
            let (status, summary) = match ToolKind::from_name(&call.tool_name) {
                Some(kind) => (kind.status_label(), input_summary(kind, &call.arguments)),
                None => ("Working", String::new()),
            };
            emit.send(ClientEvent::ToolStart {
                tool: call.tool_name.clone(),
                status: status.to_string(),
                input_summary: summary,
            })
            .await;
        }

        let mut slots: Vec<Option<ToolOutcome>> = calls.iter().map(|_| None).collect();

        // 2. Todo bookkeeping, synchronously.
        for (i, call) in calls.iter().enumerate().filter(|(_, c)| is_todo(c)) {
            let outcome = tools.execute(ctx, &call.tool_name, &call.arguments).await;
            let todos = ctx.todos.lock().snapshot();
            emit.send(ClientEvent::TodoUpdate { todos }).await;
            slots[i] = Some(outcome);
        }

        // 3. Everything else, fan-out / fan-in.
        let mut pending: FuturesUnordered<_> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| !is_todo(c))
            .map(|(i, call)| async move {
                (i, tools.execute(ctx, &call.tool_name, &call.arguments).await)
            })
            .collect();
        while let Some((i, outcome)) = pending.next().await {
            emit.send(ClientEvent::ToolDone {
                tool: outcome.tool_name.clone(),
                result_summary: outcome.summary.clone(),
                success: outcome.success,
            })
            .await;
            if let Some(file) = &outcome.file {
                emit.send(ClientEvent::FileCreated(file.clone())).await;
            }
            slots[i] = Some(outcome);
        }
        drop(pending);

        // 4. Feed back in call order.
        let max_chars = state.config.turn.tool_result_max_chars;
        let mut results = Vec::with_capacity(calls.len());
        let mut drafted = false;
        for (call, slot) in calls.iter().zip(slots) {
            let Some(outcome) = slot else { continue };
            drafted |= outcome.kind.map(|k| k.is_draft()).unwrap_or(false);
            let content = clip(&outcome.result.to_string(), max_chars);
            results.push((call.call_id.clone(), content, !outcome.success));
            self.record.calls.push(CallRecord {
                input: call.arguments.clone(),
                outcome,
            });
        }
        self.report.tool_calls += results.len();
        (results, drafted)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Finalization
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Persist the assistant message, send `done`, title a new
    /// conversation, and queue memory extraction.
    async fn finish(&mut self) {
        let state = self.state;
        let owner = self.turn.input.owner_id.clone();
        let conversation_id = self.turn.input.conversation_id.clone();

        let content_type = finalize::derive_content_type(
            &self.record.text,
            self.record.calls.iter().map(|c| &c.outcome),
            state.config.turn.conversational_threshold,
        );
        self.report.content_type = Some(content_type);

        finalize::persist_assistant(
            state.store.as_ref(),
            &owner,
            &conversation_id,
            &self.record,
            content_type,
        )
        .await;

        let chips = finalize::chip_context(
            state.store.as_ref(),
            &owner,
            &self.record,
            Utc::now().date_naive(),
        )
        .await;
        let done = finalize::done_payload(&self.record, content_type, chips);
        self.emit.send(ClientEvent::Done(Box::new(done))).await;

        // The title job is awaited so its event reaches the client before
        // the stream closes.
        if self.turn.first_exchange {
            let title = title::generate_title(
                state.llm.as_ref(),
                &state.config.llm.cheap_model,
                &self.turn.input.message,
                &self.record.text,
            )
            .await;
            match title {
                Some(title) => {
                    match state
                        .store
                        .set_conversation_title(&owner, &conversation_id, &title)
                        .await
                    {
                        Ok(()) => {
                            self.emit.send(ClientEvent::TitleUpdate { title }).await;
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to save conversation title"),
                    }
                    TraceEvent::TitleGenerated {
                        conversation_id: conversation_id.clone(),
                        fallback: false,
                    }
                    .emit();
                }
                None => TraceEvent::TitleGenerated {
                    conversation_id: conversation_id.clone(),
                    fallback: true,
                }
                .emit(),
            }
        }

        if state.memory.should_run(&owner, &self.turn.input.message) {
            let memory = state.memory.clone();
            state.dispatcher.spawn("memory_extract", async move {
                memory.extract(&owner, &conversation_id).await.map(|_| ())
            });
        }
    }
}
