use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Environment variable holding the inference API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Model used for the main conversation loop.
    #[serde(default = "d_model")]
    pub model: String,
    /// Cheaper model used for titling and memory extraction.
    #[serde(default = "d_cheap_model")]
    pub cheap_model: String,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on provider-side web searches per inference call.
    /// `0` disables the web search tool.
    #[serde(default = "d_web_search_max_uses")]
    pub web_search_max_uses: u32,
    /// Request timeout for non-streaming calls.
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            model: d_model(),
            cheap_model: d_cheap_model(),
            max_tokens: d_max_tokens(),
            web_search_max_uses: d_web_search_max_uses(),
            timeout_ms: d_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Anthropic,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://api.anthropic.com".into()
}
fn d_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn d_model() -> String {
    "claude-sonnet-4-5".into()
}
fn d_cheap_model() -> String {
    "claude-haiku-4-5".into()
}
fn d_max_tokens() -> u32 {
    4096
}
fn d_web_search_max_uses() -> u32 {
    5
}
fn d_timeout_ms() -> u64 {
    120_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_anthropic() {
        let cfg = LlmConfig::default();
        assert_eq!(cfg.kind, ProviderKind::Anthropic);
        assert_eq!(cfg.api_key_env, "ANTHROPIC_API_KEY");
        assert_ne!(cfg.model, cfg.cheap_model);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: LlmConfig = toml::from_str(r#"model = "claude-opus-4""#).unwrap();
        assert_eq!(cfg.model, "claude-opus-4");
        assert_eq!(cfg.max_tokens, 4096);
        assert_eq!(cfg.web_search_max_uses, 5);
    }
}
