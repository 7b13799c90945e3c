use serde::{Deserialize, Serialize};

/// Internal tool call format (provider-agnostic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A message in the conversation (provider-agnostic).
///
/// System instructions are not messages; they travel separately as
/// [`SystemBlock`]s so providers can mark cacheable prefixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    /// A provider-executed tool call, echoed back verbatim on later rounds.
    #[serde(rename = "server_tool_use")]
    ServerToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// The provider's own result block for a server tool call.
    #[serde(rename = "web_search_tool_result")]
    WebSearchToolResult {
        tool_use_id: String,
        content: serde_json::Value,
    },
}

/// One segment of the system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemBlock {
    pub text: String,
    /// When true the provider may cache the prompt prefix ending here.
    pub cacheable: bool,
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(text.into()) }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: MessageContent::Text(text.into()) }
    }

    /// A single user turn carrying one `tool_result` block per call, in
    /// the order given.
    pub fn tool_results(results: Vec<(String, String, bool)>) -> Self {
        let parts = results
            .into_iter()
            .map(|(tool_use_id, content, is_error)| ContentPart::ToolResult {
                tool_use_id,
                content,
                is_error,
            })
            .collect();
        Self { role: Role::User, content: MessageContent::Parts(parts) }
    }
}

impl MessageContent {
    /// Extract the plain-text content (first text part, or the full text).
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    /// Concatenate every text part.
    pub fn all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// True when this content holds at least one `tool_result` block.
    pub fn has_tool_results(&self) -> bool {
        matches!(self, MessageContent::Parts(parts)
            if parts.iter().any(|p| matches!(p, ContentPart::ToolResult { .. })))
    }
}
