use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bearer authentication
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Tokens come from an env var of `token=owner_id` pairs.
    #[default]
    Static,
    /// Tokens are checked against the hosted auth provider's user endpoint.
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Env var holding `token=owner_id` pairs separated by commas.
    #[serde(default = "d_tokens_env")]
    pub tokens_env: String,
    /// User-info endpoint for [`AuthMode::Remote`]; it must answer a
    /// bearer-authenticated GET with `{ "id": "<owner>" }`.
    #[serde(default)]
    pub user_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            tokens_env: d_tokens_env(),
            user_url: String::new(),
        }
    }
}

fn d_tokens_env() -> String {
    "HB_API_TOKENS".into()
}
