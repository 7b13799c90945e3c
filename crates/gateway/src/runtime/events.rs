//! Client-facing event vocabulary of the chat stream.
//!
//! Every event goes over the wire as an SSE frame
//! `event: <name>\ndata: <json>\n\n`. Payloads carry human-readable
//! summaries, never raw tool results.

use hb_domain::crm::{ContentType, DealStage, Todo, UndoAction};
use hb_domain::stream::WebSource;
use hb_tools::GeneratedFile;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ClientEvent {
    TextDelta {
        text: String,
    },
    ToolStart {
        tool: String,
        status: String,
        input_summary: String,
    },
    ToolDone {
        tool: String,
        result_summary: String,
        success: bool,
    },
    WebSearchResult {
        query: String,
        results_count: usize,
        sources: Vec<WebSource>,
    },
    TodoUpdate {
        todos: Vec<Todo>,
    },
    FileCreated(GeneratedFile),
    Iteration {
        current: u32,
        max: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool: Option<String>,
    },
    TitleUpdate {
        title: String,
    },
    Error {
        message: String,
    },
    Done(Box<DonePayload>),
}

impl ClientEvent {
    /// The SSE `event:` name.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::TextDelta { .. } => "text_delta",
            ClientEvent::ToolStart { .. } => "tool_start",
            ClientEvent::ToolDone { .. } => "tool_done",
            ClientEvent::WebSearchResult { .. } => "web_search_result",
            ClientEvent::TodoUpdate { .. } => "todo_update",
            ClientEvent::FileCreated(_) => "file_created",
            ClientEvent::Iteration { .. } => "iteration",
            ClientEvent::TitleUpdate { .. } => "title_update",
            ClientEvent::Error { .. } => "error",
            ClientEvent::Done(_) => "done",
        }
    }

    /// The SSE `data:` payload.
    pub fn data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        ClientEvent::Error {
            message: message.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Terminal event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Payload of the `done` event.
#[derive(Debug, Clone, Serialize)]
pub struct DonePayload {
    pub tools_used: Vec<ToolUsed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_deal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_contact_id: Option<String>,
    pub chip_context: ChipContext,
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub undo_actions: Vec<UndoAction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<WebSource>,
}

/// One tool call of the turn with the entity it touched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolUsed {
    pub tool: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
}

/// Small summary the client uses to pick quick-reply chips.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChipContext {
    pub active_deal_count: usize,
    pub upcoming_deadline_count: usize,
    pub last_stage: Option<DealStage>,
    pub last_contact_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_names_and_payload() {
        let ev = ClientEvent::TextDelta { text: "Hi".into() };
        assert_eq!(ev.name(), "text_delta");
        assert_eq!(ev.data(), r#"{"text":"Hi"}"#);
    }

    #[test]
    fn iteration_omits_missing_tool() {
        let ev = ClientEvent::Iteration { current: 2, max: 5, tool: None };
        assert_eq!(ev.data(), r#"{"current":2,"max":5}"#);
    }

    #[test]
    fn file_created_is_flat() {
        let ev = ClientEvent::FileCreated(GeneratedFile {
            filename: "notes.md".into(),
            url: "https://files/x".into(),
            format: "md".into(),
            size: 12,
        });
        let v: serde_json::Value = serde_json::from_str(&ev.data()).unwrap();
        assert_eq!(v["filename"], "notes.md");
        assert_eq!(v["size"], 12);
        assert_eq!(ev.name(), "file_created");
    }

    #[test]
    fn done_skips_empty_optionals() {
        let ev = ClientEvent::Done(Box::new(DonePayload {
            tools_used: vec![],
            last_deal_id: None,
            last_contact_id: None,
            chip_context: ChipContext::default(),
            content_type: ContentType::Conversational,
            undo_actions: vec![],
            sources: vec![],
        }));
        let v: serde_json::Value = serde_json::from_str(&ev.data()).unwrap();
        assert_eq!(v["content_type"], "conversational");
        assert!(v.get("undo_actions").is_none());
        assert!(v.get("last_deal_id").is_none());
        assert_eq!(v["chip_context"]["active_deal_count"], 0);
    }
}
