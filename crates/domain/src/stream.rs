use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events decoded from an upstream inference stream (provider-agnostic).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A visible text chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// A client-side tool call has started; input JSON follows as deltas.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted { call_id: String, tool_name: String },

    /// Incremental tool call argument data (raw partial JSON).
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { call_id: String, delta: String },

    /// A tool call block closed. `arguments` is the parsed input, or an
    /// empty object when the accumulated fragment did not parse.
    #[serde(rename = "tool_call_finished")]
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// A provider-executed tool call (e.g. web search) closed.
    #[serde(rename = "server_tool_call")]
    ServerToolCall {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// Results of a provider-executed web search.
    #[serde(rename = "web_search_results")]
    WebSearchResults {
        call_id: String,
        sources: Vec<WebSource>,
        /// Raw result block, echoed back to the provider on later rounds.
        raw: serde_json::Value,
    },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        stop_reason: Option<StopReason>,
    },
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    PauseTurn,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "pause_turn" => StopReason::PauseTurn,
            "stop_sequence" => StopReason::StopSequence,
            other => StopReason::Other(other.to_string()),
        }
    }
}

/// A cited web page returned by provider-side search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSource {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}
