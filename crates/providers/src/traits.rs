use hb_domain::error::Result;
use hb_domain::stream::{BoxStream, StopReason, StreamEvent, Usage};
use hb_domain::tool::{Message, SystemBlock, ToolCall, ToolDefinition};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// System prompt segments, in order. Cacheable segments must precede
    /// volatile ones for prefix caching to be effective.
    pub system: Vec<SystemBlock>,
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Client-side tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Enable provider-side web search with this many uses per call.
    pub web_search_max_uses: Option<u32>,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
}

/// A provider-agnostic chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Textual content of the response.
    pub content: String,
    /// Tool calls emitted by the model.
    pub tool_calls: Vec<ToolCall>,
    /// Token usage information.
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
    pub stop_reason: Option<StopReason>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every inference adapter must implement.
///
/// Errors carry the upstream HTTP status where known so callers can tell
/// transient failures (`429`/`529`) from context overflows and hard errors;
/// see [`hb_domain::error::Error::is_retryable`].
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// Send a chat completion request and return a stream of events.
    ///
    /// A failure after the stream has started (an upstream `error` frame)
    /// is yielded as an `Err` item; the stream ends after it.
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;

    /// Default model used when a request does not override it.
    fn default_model(&self) -> &str;
}
