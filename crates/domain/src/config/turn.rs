use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn loop bounds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bounds and retry policy for one conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Hard cap on inference rounds per turn.
    #[serde(default = "d_max_rounds")]
    pub max_rounds: u32,
    /// Cumulative input+output tokens after which the turn is cut short.
    #[serde(default = "d_token_ceiling")]
    pub token_ceiling: u32,
    /// Extra attempts after a rate-limited / overloaded inference call.
    #[serde(default = "d_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "d_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Messages kept when history is truncated after a context overflow.
    #[serde(default = "d_context_window_messages")]
    pub context_window_messages: usize,
    /// Visible text (chars) in a round that makes a drafting round final.
    #[serde(default = "d_draft_text_threshold")]
    pub draft_text_threshold: usize,
    /// Final text shorter than this is always tagged conversational.
    #[serde(default = "d_conversational_threshold")]
    pub conversational_threshold: usize,
    /// Max chars of a serialized tool result fed back to the model.
    #[serde(default = "d_tool_result_max_chars")]
    pub tool_result_max_chars: usize,
    /// Stored messages loaded as history for a turn.
    #[serde(default = "d_history_limit")]
    pub history_limit: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_rounds: d_max_rounds(),
            token_ceiling: d_token_ceiling(),
            retry_attempts: d_retry_attempts(),
            retry_delay_ms: d_retry_delay_ms(),
            context_window_messages: d_context_window_messages(),
            draft_text_threshold: d_draft_text_threshold(),
            conversational_threshold: d_conversational_threshold(),
            tool_result_max_chars: d_tool_result_max_chars(),
            history_limit: d_history_limit(),
        }
    }
}

fn d_max_rounds() -> u32 {
    5
}
fn d_token_ceiling() -> u32 {
    60_000
}
fn d_retry_attempts() -> u32 {
    2
}
fn d_retry_delay_ms() -> u64 {
    2_000
}
fn d_context_window_messages() -> usize {
    10
}
fn d_draft_text_threshold() -> usize {
    200
}
fn d_conversational_threshold() -> usize {
    80
}
fn d_tool_result_max_chars() -> usize {
    12_000
}
fn d_history_limit() -> usize {
    50
}
