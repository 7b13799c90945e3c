//! One inference round: call the provider, relay its stream to the client
//! as it arrives, and collect what the model asked for.
//!
//! This is the translation layer between the provider's stream events and
//! the client vocabulary in [`super::events`]. Retries for rate limits and
//! overloads, and the single truncate-and-retry after a context overflow,
//! also live here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use hb_context::truncate_window;
use hb_domain::config::TurnConfig;
use hb_domain::error::Error;
use hb_domain::stream::{StopReason, StreamEvent, Usage, WebSource};
use hb_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall};
use hb_domain::trace::TraceEvent;
use hb_providers::{ChatRequest, LlmProvider};
use tokio::sync::mpsc;
use tracing::Instrument;

use super::cancel::CancelToken;
use super::events::ClientEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Emitter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sends client events for one turn. Once the client is gone (receiver
/// dropped or token cancelled) nothing more is sent.
#[derive(Clone)]
pub struct Emitter {
    tx: mpsc::Sender<ClientEvent>,
    cancel: CancelToken,
    sent: Arc<AtomicUsize>,
}

impl Emitter {
    pub fn new(tx: mpsc::Sender<ClientEvent>, cancel: CancelToken) -> Self {
        Self {
            tx,
            cancel,
            sent: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns false when the event was not delivered.
    pub async fn send(&self, event: ClientEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if self.tx.is_closed() || self.tx.send(event).await.is_err() {
            tracing::info!("client disconnected, cancelling turn");
            self.cancel.cancel();
            return false;
        }
        self.sent.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Round output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything one completed round produced.
#[derive(Debug, Clone)]
pub struct RoundOutput {
    /// Visible text of this round only.
    pub text: String,
    /// Assistant content blocks in stream order, for the next request.
    pub parts: Vec<ContentPart>,
    /// Client-side tool calls, in the order the model made them.
    pub tool_calls: Vec<ToolCall>,
    pub sources: Vec<WebSource>,
    pub usage: Usage,
    pub stop_reason: StopReason,
}

impl RoundOutput {
    fn empty() -> Self {
        Self {
            text: String::new(),
            parts: Vec::new(),
            tool_calls: Vec::new(),
            sources: Vec::new(),
            usage: Usage::default(),
            stop_reason: StopReason::EndTurn,
        }
    }

    /// The assistant message to append before the next round, if the
    /// round produced any content.
    pub fn assistant_message(&self) -> Option<Message> {
        if self.parts.is_empty() {
            return None;
        }
        Some(Message {
            role: Role::Assistant,
            content: MessageContent::Parts(self.parts.clone()),
        })
    }
}

/// A failed attempt. `emitted` tells whether any of it reached the client,
/// in which case a retry would duplicate visible output.
struct RoundFailure {
    error: Error,
    emitted: bool,
}

fn push_text(parts: &mut Vec<ContentPart>, text: &str) {
    if let Some(ContentPart::Text { text: last }) = parts.last_mut() {
        last.push_str(text);
        return;
    }
    parts.push(ContentPart::Text {
        text: text.to_string(),
    });
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn stream_round(
    llm: &dyn LlmProvider,
    req: ChatRequest,
    emit: &Emitter,
    cancel: &CancelToken,
) -> Result<RoundOutput, RoundFailure> {
    let mut stream = llm
        .chat_stream(req)
        .await
        .map_err(|error| RoundFailure { error, emitted: false })?;

    let mut out = RoundOutput::empty();
    let mut emitted = false;
    let mut queries: HashMap<String, String> = HashMap::new();

    while let Some(item) = stream.next().await {
        if cancel.is_cancelled() {
            tracing::debug!("turn cancelled mid-stream");
            break;
        }
        let event = match item {
            Ok(ev) => ev,
            Err(error) => return Err(RoundFailure { error, emitted }),
        };
        match event {
            StreamEvent::Token { text } => {
                if text.is_empty() {
                    continue;
                }
                push_text(&mut out.parts, &text);
                out.text.push_str(&text);
                emitted = true;
                emit.send(ClientEvent::TextDelta { text }).await;
            }
            // The provider assembles argument fragments; only the finished
            // call matters here.
            StreamEvent::ToolCallStarted { .. } | StreamEvent::ToolCallDelta { .. } => {}
            StreamEvent::ToolCallFinished {
                call_id,
                tool_name,
                arguments,
            } => {
                out.parts.push(ContentPart::ToolUse {
                    id: call_id.clone(),
                    name: tool_name.clone(),
                    input: arguments.clone(),
                });
                out.tool_calls.push(ToolCall {
                    call_id,
                    tool_name,
                    arguments,
                });
            }
            StreamEvent::ServerToolCall {
                call_id,
                tool_name,
                arguments,
            } => {
                if let Some(q) = arguments.get("query").and_then(|v| v.as_str()) {
                    queries.insert(call_id.clone(), q.to_string());
                }
                out.parts.push(ContentPart::ServerToolUse {
                    id: call_id,
                    name: tool_name,
                    input: arguments,
                });
            }
            StreamEvent::WebSearchResults {
                call_id,
                sources,
                raw,
            } => {
                emitted = true;
                emit.send(ClientEvent::WebSearchResult {
                    query: queries.get(&call_id).cloned().unwrap_or_default(),
                    results_count: sources.len(),
                    sources: sources.clone(),
                })
                .await;
                out.sources.extend(sources);
                out.parts.push(ContentPart::WebSearchToolResult {
                    tool_use_id: call_id,
                    content: raw,
                });
            }
            StreamEvent::Done { usage, stop_reason } => {
                if let Some(u) = usage {
                    out.usage = u;
                }
                out.stop_reason = stop_reason.unwrap_or(StopReason::EndTurn);
                break;
            }
        }
    }

    Ok(out)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retry policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one round with the turn's retry policy.
///
/// - 429 / 529 (and mid-stream overload errors before anything was shown):
///   up to `retry_attempts` extra attempts after `retry_delay_ms`.
/// - Context overflow: `messages` is cut to the most recent window once,
///   then the call is retried.
/// - Anything else is returned to the caller.
pub async fn infer(
    llm: &dyn LlmProvider,
    base: &ChatRequest,
    messages: &mut Vec<Message>,
    emit: &Emitter,
    cancel: &CancelToken,
    cfg: &TurnConfig,
    round: u32,
) -> Result<RoundOutput, Error> {
    let model = base
        .model
        .clone()
        .unwrap_or_else(|| llm.default_model().to_string());
    let mut attempt = 0u32;
    let mut truncated = false;

    loop {
        let req = ChatRequest {
            messages: messages.clone(),
            ..base.clone()
        };
        let span = tracing::info_span!(
            "llm.call",
            round,
            attempt,
            model = %model,
            input_tokens = tracing::field::Empty,
            output_tokens = tracing::field::Empty,
        );
        let start = Instant::now();
        let result = stream_round(llm, req, emit, cancel)
            .instrument(span.clone())
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let failure = match result {
            Ok(out) => {
                span.record("input_tokens", out.usage.input_tokens);
                span.record("output_tokens", out.usage.output_tokens);
                TraceEvent::LlmRequest {
                    provider: llm.provider_id().to_string(),
                    model: model.clone(),
                    round,
                    duration_ms,
                    input_tokens: Some(out.usage.input_tokens),
                    output_tokens: Some(out.usage.output_tokens),
                }
                .emit();
                return Ok(out);
            }
            Err(f) => f,
        };

        let RoundFailure { error, emitted } = failure;
        if !emitted && error.is_retryable() && attempt < cfg.retry_attempts {
            attempt += 1;
            tracing::warn!(round, attempt, error = %error, "inference busy, retrying");
            TraceEvent::LlmRetry {
                round,
                attempt,
                reason: error.to_string(),
                backoff_ms: cfg.retry_delay_ms,
            }
            .emit();
            tokio::time::sleep(Duration::from_millis(cfg.retry_delay_ms)).await;
            continue;
        }
        if !emitted && error.is_context_overflow() && !truncated {
            truncated = true;
            let before = messages.len();
            *messages = truncate_window(messages, cfg.context_window_messages);
            tracing::warn!(
                round,
                before,
                after = messages.len(),
                "context too long, retrying with a truncated history"
            );
            TraceEvent::ContextTruncated {
                round,
                messages_before: before,
                messages_after: messages.len(),
            }
            .emit();
            continue;
        }
        return Err(error);
    }
}

/// What the user sees when a round fails for good.
pub fn failure_message(error: &Error) -> &'static str {
    if error.is_retryable() {
        "The assistant is handling a lot of requests right now. Please try again in a moment."
    } else if error.is_context_overflow() {
        "This conversation has grown too long for me to keep track of. Please start a new conversation."
    } else {
        "Sorry, something went wrong while generating a response. Please try again."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_text_merges_into_one_block() {
        let mut parts = Vec::new();
        push_text(&mut parts, "Hel");
        push_text(&mut parts, "lo");
        parts.push(ContentPart::ToolUse {
            id: "t1".into(),
            name: "get_active_deals".into(),
            input: serde_json::json!({}),
        });
        push_text(&mut parts, "Done");
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[0], ContentPart::Text { text } if text == "Hello"));
    }

    #[test]
    fn failure_messages_follow_error_class() {
        let busy = Error::Provider {
            provider: "anthropic".into(),
            status: Some(529),
            message: "overloaded".into(),
        };
        assert!(failure_message(&busy).contains("try again in a moment"));
        let long = Error::Provider {
            provider: "anthropic".into(),
            status: Some(400),
            message: "prompt is too long".into(),
        };
        assert!(failure_message(&long).contains("new conversation"));
    }

    #[tokio::test]
    async fn emitter_stops_after_receiver_drops() {
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancelToken::new();
        let emit = Emitter::new(tx, cancel.clone());
        assert!(emit.send(ClientEvent::TextDelta { text: "a".into() }).await);
        drop(rx);
        assert!(!emit.send(ClientEvent::TextDelta { text: "b".into() }).await);
        assert!(cancel.is_cancelled());
        assert_eq!(emit.sent(), 1);
    }
}
