use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory-fact extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Minimum gap between two extraction runs for the same owner.
    #[serde(default = "d_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Token-overlap ratio above which a new fact counts as a duplicate.
    #[serde(default = "d_similarity_threshold")]
    pub similarity_threshold: f64,
    /// User text shorter than this is not worth an extraction call.
    #[serde(default = "d_min_text_chars")]
    pub min_text_chars: usize,
    /// Share of digits/symbols above which text is treated as a data dump.
    #[serde(default = "d_max_symbol_ratio")]
    pub max_symbol_ratio: f64,
    /// Recent messages fed to the extraction call.
    #[serde(default = "d_recent_messages")]
    pub recent_messages: usize,
    /// Facts loaded into the dynamic prompt tier.
    #[serde(default = "d_prompt_facts")]
    pub prompt_facts: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: d_cooldown_secs(),
            similarity_threshold: d_similarity_threshold(),
            min_text_chars: d_min_text_chars(),
            max_symbol_ratio: d_max_symbol_ratio(),
            recent_messages: d_recent_messages(),
            prompt_facts: d_prompt_facts(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_cooldown_secs() -> u64 {
    300
}
fn d_similarity_threshold() -> f64 {
    0.8
}
fn d_min_text_chars() -> usize {
    40
}
fn d_max_symbol_ratio() -> f64 {
    0.3
}
fn d_recent_messages() -> usize {
    6
}
fn d_prompt_facts() -> usize {
    30
}
