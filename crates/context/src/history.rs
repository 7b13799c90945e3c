//! Rebuilds the model-facing message list from stored conversation rows.
//!
//! Stored assistant rows keep their tool usage in metadata rather than as
//! structured `tool_use` blocks. On reload each logged call becomes an
//! inline marker line ahead of the text, so the model can see what was
//! done without the original tool blocks being resent.

use hb_domain::crm::{StoredMessage, ToolCallLog};
use hb_domain::tool::{Message, MessageContent, Role};

use crate::truncation::clip;

/// Marker line for one logged tool call.
pub fn tool_marker(call: &ToolCallLog) -> String {
    format!("[Tool used: {} — {}]", call.name, clip(&call.result_summary, 200))
}

/// Convert stored rows (oldest first) into provider messages.
///
/// Consecutive rows with the same role are merged, empty rows dropped, and
/// any assistant rows before the first user row discarded, so the result
/// always alternates and starts with the user.
pub fn rebuild_history(rows: &[StoredMessage]) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::new();

    for row in rows {
        let mut text = String::new();
        if row.role == Role::Assistant {
            if let Some(meta) = &row.metadata {
                for call in &meta.tool_calls {
                    text.push_str(&tool_marker(call));
                    text.push('\n');
                }
                if !meta.tool_calls.is_empty() && !row.content.trim().is_empty() {
                    text.push('\n');
                }
            }
        }
        text.push_str(row.content.trim_end());
        if text.trim().is_empty() {
            continue;
        }

        if out.is_empty() && row.role == Role::Assistant {
            continue;
        }

        match out.last_mut() {
            Some(prev) if prev.role == row.role => {
                if let MessageContent::Text(prev_text) = &mut prev.content {
                    prev_text.push_str("\n\n");
                    prev_text.push_str(&text);
                }
            }
            _ => out.push(Message {
                role: row.role,
                content: MessageContent::Text(text),
            }),
        }
    }

    out
}

fn is_plain_user(msg: &Message) -> bool {
    msg.role == Role::User && !msg.content.has_tool_results()
}

/// Keep roughly the last `keep` messages, starting the window at a user
/// message that is not a tool-result carrier (a `tool_result` without its
/// `tool_use` would be rejected upstream).
///
/// If the tail holds no such message, the window is widened back to the
/// nearest one instead.
pub fn truncate_window(messages: &[Message], keep: usize) -> Vec<Message> {
    let len = messages.len();
    let mut start = len.saturating_sub(keep.max(1));

    let forward = (start..len).find(|&i| is_plain_user(&messages[i]));
    start = match forward {
        Some(i) => i,
        None => (0..start)
            .rev()
            .find(|&i| is_plain_user(&messages[i]))
            .unwrap_or(0),
    };

    messages[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hb_domain::crm::MessageMetadata;
    use hb_domain::tool::ContentPart;
    use serde_json::json;

    fn row(role: Role, content: &str, calls: Vec<ToolCallLog>) -> StoredMessage {
        StoredMessage {
            id: "m".into(),
            conversation_id: "c".into(),
            owner_id: "o".into(),
            role,
            content: content.into(),
            metadata: if calls.is_empty() {
                None
            } else {
                Some(MessageMetadata {
                    tool_calls: calls,
                    ..Default::default()
                })
            },
            created_at: Utc::now(),
        }
    }

    fn call(name: &str, summary: &str) -> ToolCallLog {
        ToolCallLog {
            name: name.into(),
            input: json!({}),
            result_summary: summary.into(),
            success: true,
        }
    }

    #[test]
    fn assistant_tool_calls_become_inline_markers() {
        let rows = vec![
            row(Role::User, "Add the Main St listing", vec![]),
            row(
                Role::Assistant,
                "Done, it's in your pipeline.",
                vec![call("create_deal", "Created deal 123 Main St")],
            ),
        ];
        let msgs = rebuild_history(&rows);
        assert_eq!(msgs.len(), 2);
        assert_eq!(
            msgs[1].content.all_text(),
            "[Tool used: create_deal — Created deal 123 Main St]\n\nDone, it's in your pipeline."
        );
    }

    #[test]
    fn leading_assistant_and_empty_rows_dropped_same_roles_merged() {
        let rows = vec![
            row(Role::Assistant, "Welcome!", vec![]),
            row(Role::User, "hi", vec![]),
            row(Role::User, "  ", vec![]),
            row(Role::User, "are you there?", vec![]),
            row(Role::Assistant, "Yes.", vec![]),
        ];
        let msgs = rebuild_history(&rows);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[0].content.all_text(), "hi\n\nare you there?");
    }

    #[test]
    fn window_starts_at_plain_user_message() {
        let msgs = vec![
            Message::user("old question"),
            Message::assistant("old answer"),
            Message::user("new question"),
            Message {
                role: Role::Assistant,
                content: MessageContent::Parts(vec![ContentPart::ToolUse {
                    id: "t1".into(),
                    name: "get_active_deals".into(),
                    input: json!({}),
                }]),
            },
            Message::tool_results(vec![("t1".into(), "{}".into(), false)]),
        ];
        // A window of 2 would start on the tool_use; widen back to the user turn.
        let w = truncate_window(&msgs, 2);
        assert_eq!(w.len(), 3);
        assert_eq!(w[0].content.all_text(), "new question");

        // A window of 4 starts on "old answer"; shrink forward instead.
        let w = truncate_window(&msgs, 4);
        assert_eq!(w[0].content.all_text(), "new question");
    }
}
