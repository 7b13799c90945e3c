mod auth;
mod llm;
mod memory;
mod observability;
mod server;
mod store;
mod turn;

pub use auth::*;
pub use llm::*;
pub use memory::*;
pub use observability::*;
pub use server::*;
pub use store::*;
pub use turn::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.max_concurrent_turns == 0 {
            errors.push(ConfigError::error(
                "server.max_concurrent_turns",
                "must allow at least one turn",
            ));
        }
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        if self.llm.base_url.is_empty() {
            errors.push(ConfigError::error("llm.base_url", "base_url must not be empty"));
        }
        if self.llm.model.is_empty() {
            errors.push(ConfigError::error("llm.model", "model must not be empty"));
        }
        if self.llm.max_tokens == 0 {
            errors.push(ConfigError::error("llm.max_tokens", "must be greater than 0"));
        }

        if self.turn.max_rounds == 0 {
            errors.push(ConfigError::error("turn.max_rounds", "must be at least 1"));
        }
        if self.turn.token_ceiling < self.llm.max_tokens {
            errors.push(ConfigError::warning(
                "turn.token_ceiling",
                "ceiling is below llm.max_tokens; most turns will be cut after one round",
            ));
        }
        if self.turn.context_window_messages == 0 {
            errors.push(ConfigError::error(
                "turn.context_window_messages",
                "truncation window must keep at least one message",
            ));
        }

        if self.store.backend == StoreBackend::Rest && self.store.base_url.is_empty() {
            errors.push(ConfigError::error(
                "store.base_url",
                "base_url is required for the rest backend",
            ));
        }
        if self.store.backend == StoreBackend::Memory {
            errors.push(ConfigError::warning(
                "store.backend",
                "in-memory store: data is lost on restart",
            ));
        }

        if !(0.0..=1.0).contains(&self.memory.similarity_threshold) {
            errors.push(ConfigError::error(
                "memory.similarity_threshold",
                "must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.memory.max_symbol_ratio) {
            errors.push(ConfigError::error(
                "memory.max_symbol_ratio",
                "must be between 0.0 and 1.0",
            ));
        }

        if self.auth.mode == AuthMode::Remote && self.auth.user_url.is_empty() {
            errors.push(ConfigError::error(
                "auth.user_url",
                "user_url is required for remote auth",
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "must be between 0.0 and 1.0",
            ));
        }

        errors
    }

    /// True when [`Config::validate`] found at least one hard error.
    pub fn has_errors(issues: &[ConfigError]) -> bool {
        issues.iter().any(|e| e.severity == ConfigSeverity::Error)
    }
}
