use serde::Serialize;

/// Structured trace events emitted across all Homebase crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ContextBuilt {
        owner_id: String,
        static_chars: usize,
        profile_chars: usize,
        dynamic_chars: usize,
        history_messages: usize,
        memory_facts: usize,
    },
    StoreCall {
        endpoint: String,
        status: u16,
        duration_ms: u64,
    },
    LlmRequest {
        provider: String,
        model: String,
        round: u32,
        duration_ms: u64,
        input_tokens: Option<u32>,
        output_tokens: Option<u32>,
    },
    LlmRetry {
        round: u32,
        attempt: u32,
        reason: String,
        backoff_ms: u64,
    },
    ContextTruncated {
        round: u32,
        messages_before: usize,
        messages_after: usize,
    },
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
    },
    EnrichmentLookup {
        address: String,
        found: bool,
        duration_ms: u64,
    },
    TurnCompleted {
        conversation_id: String,
        rounds: u32,
        total_tokens: u32,
        tool_calls: usize,
        cancelled: bool,
        truncated: bool,
    },
    UndoApplied {
        owner_id: String,
        kind: String,
        entity_id: String,
    },
    MemoryExtracted {
        owner_id: String,
        candidates: usize,
        inserted: usize,
    },
    TitleGenerated {
        conversation_id: String,
        fallback: bool,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "hb_event");
    }
}
