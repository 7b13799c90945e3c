use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_8787")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Upper bound on concurrently streaming turns across the process.
    /// Requests beyond this get 503 instead of queueing.
    #[serde(default = "d_max_concurrent_turns")]
    pub max_concurrent_turns: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_8787(),
            host: d_host(),
            cors: CorsConfig::default(),
            max_concurrent_turns: d_max_concurrent_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. Use `["*"]` for permissive (NOT recommended).
    /// Defaults to localhost-only.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_8787() -> u16 {
    8787
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_max_concurrent_turns() -> usize {
    64
}
fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".into(), "http://127.0.0.1:*".into()]
}
