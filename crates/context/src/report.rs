use serde::{Deserialize, Serialize};

/// What went into one assembled prompt, for logging and `/health`-style
/// diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextReport {
    pub static_chars: usize,
    pub profile_chars: usize,
    pub dynamic_chars: usize,
    pub history_messages: usize,
    pub memory_facts: usize,
    pub recent_tasks: usize,
    /// True when the profile, facts or activity lookups failed and the
    /// prompt was built without them.
    pub degraded: bool,
}
