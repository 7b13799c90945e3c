//! `hb-providers` — inference provider adapters.

pub mod anthropic;
pub mod sse;
pub mod traits;
pub(crate) mod util;

use std::sync::Arc;

use hb_domain::config::{LlmConfig, ProviderKind};
use hb_domain::error::Result;

// Re-exports for convenience.
pub use anthropic::AnthropicProvider;
pub use sse::{SseDecoder, SseFrame};
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
pub use util::resolve_api_key;

/// Build the configured provider.
pub fn create_provider(cfg: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    match cfg.kind {
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicProvider::from_config(cfg)?)),
    }
}
