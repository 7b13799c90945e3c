/// Shared error type used across all Homebase crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// An upstream inference provider failed. `status` is the HTTP status
    /// when one is known (including synthetic statuses mapped from
    /// mid-stream `error` events).
    #[error("provider {provider}: {message}")]
    Provider {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("store: {0}")]
    Store(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("enrichment: {0}")]
    Enrichment(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// HTTP status used by Anthropic for "overloaded".
pub const STATUS_OVERLOADED: u16 = 529;
/// HTTP status for rate limiting.
pub const STATUS_RATE_LIMITED: u16 = 429;

impl Error {
    /// Rate-limited or overloaded upstream: worth retrying after a pause.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Provider {
                status: Some(s), ..
            } => *s == STATUS_RATE_LIMITED || *s == STATUS_OVERLOADED,
            Error::Provider { message, .. } => {
                let m = message.to_ascii_lowercase();
                m.contains("overloaded_error") || m.contains("rate_limit_error")
            }
            _ => false,
        }
    }

    /// The prompt no longer fits the model's context window.
    pub fn is_context_overflow(&self) -> bool {
        match self {
            Error::Provider { message, .. } => {
                let m = message.to_ascii_lowercase();
                m.contains("prompt is too long")
                    || m.contains("context length")
                    || m.contains("context_length_exceeded")
                    || m.contains("too many tokens")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(status: Option<u16>, message: &str) -> Error {
        Error::Provider {
            provider: "anthropic".into(),
            status,
            message: message.into(),
        }
    }

    #[test]
    fn rate_limit_and_overload_are_retryable() {
        assert!(provider(Some(429), "slow down").is_retryable());
        assert!(provider(Some(529), "busy").is_retryable());
        assert!(provider(None, "{\"type\":\"overloaded_error\"}").is_retryable());
        assert!(!provider(Some(500), "boom").is_retryable());
        assert!(!Error::Http("reset".into()).is_retryable());
    }

    #[test]
    fn prompt_too_long_is_context_overflow() {
        let e = provider(Some(400), "prompt is too long: 210000 tokens > 200000 maximum");
        assert!(e.is_context_overflow());
        assert!(!e.is_retryable());
        assert!(!provider(Some(400), "invalid tool schema").is_context_overflow());
    }
}
