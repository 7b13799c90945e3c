//! Conversation auto-titling after the first exchange.

use hb_domain::tool::{Message, SystemBlock};
use hb_providers::{ChatRequest, LlmProvider};

const MAX_TITLE_CHARS: usize = 60;

const TITLE_PROMPT: &str = "\
Write a short title (at most six words) for a conversation between a \
real-estate agent and their assistant. Reply with the title only: no \
quotes, no trailing punctuation.";

/// Ask the cheap model for a title. `None` on any failure or an unusable
/// reply; the conversation then keeps its null title.
pub async fn generate_title(
    llm: &dyn LlmProvider,
    model: &str,
    user_message: &str,
    assistant_text: &str,
) -> Option<String> {
    let exchange = format!(
        "Agent: {}\n\nAssistant: {}",
        clip_chars(user_message, 1_000),
        clip_chars(assistant_text, 1_000)
    );
    let req = ChatRequest {
        system: vec![SystemBlock {
            text: TITLE_PROMPT.into(),
            cacheable: false,
        }],
        messages: vec![Message::user(exchange)],
        temperature: Some(0.3),
        max_tokens: Some(32),
        model: Some(model.to_string()),
        ..Default::default()
    };
    match llm.chat(req).await {
        Ok(resp) => clean_title(&resp.content),
        Err(e) => {
            tracing::warn!(error = %e, "title generation failed");
            None
        }
    }
}

/// First line, without wrapping quotes or trailing punctuation, capped at
/// a fixed length on a word boundary.
pub fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("Title:")
        .map(str::trim)
        .unwrap_or(line)
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '#')
        .trim_end_matches(['.', '!', ':'])
        .trim();
    if line.is_empty() {
        return None;
    }
    if line.chars().count() <= MAX_TITLE_CHARS {
        return Some(line.to_string());
    }
    let clipped = clip_chars(line, MAX_TITLE_CHARS);
    let cut = clipped.rfind(' ').unwrap_or(clipped.len());
    Some(clipped[..cut].trim_end().to_string())
}

fn clip_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_quotes_and_labels() {
        assert_eq!(clean_title("\"Main St listing.\"").as_deref(), Some("Main St listing"));
        assert_eq!(clean_title("Title: Austin buyers").as_deref(), Some("Austin buyers"));
        assert_eq!(clean_title("\n\n  Open house plan\nextra").as_deref(), Some("Open house plan"));
    }

    #[test]
    fn empty_reply_is_none() {
        assert!(clean_title("").is_none());
        assert!(clean_title("\"\"").is_none());
    }

    #[test]
    fn long_titles_cut_on_a_word() {
        let long = "A very long title about the listing on Main Street and the open house schedule";
        let t = clean_title(long).unwrap();
        assert!(t.chars().count() <= MAX_TITLE_CHARS);
        assert!(long.starts_with(&t));
        assert!(!t.ends_with(' '));
    }
}
