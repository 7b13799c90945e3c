use std::sync::Arc;

use chrono::{DateTime, Utc};
use hb_domain::error::Result;
use hb_domain::tool::{Message, SystemBlock};
use hb_domain::trace::TraceEvent;
use hb_store::CrmStore;

use crate::history::rebuild_history;
use crate::injection::{self, DynamicInputs};
use crate::report::ContextReport;

/// Limits applied while gathering context.
#[derive(Debug, Clone, Copy)]
pub struct AssemblerLimits {
    pub history_messages: usize,
    pub memory_facts: usize,
    pub recent_tasks: usize,
}

impl Default for AssemblerLimits {
    fn default() -> Self {
        Self {
            history_messages: 50,
            memory_facts: 30,
            recent_tasks: 10,
        }
    }
}

/// A prompt ready for the orchestrator.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// Static, profile (optional) and dynamic blocks, in that order.
    pub system: Vec<SystemBlock>,
    /// Prior conversation, oldest first, without the new user message.
    pub history: Vec<Message>,
    pub report: ContextReport,
}

/// Gathers per-turn context from the store and splits it into cacheable
/// and volatile prompt segments.
///
/// The static and profile blocks depend only on the instruction text and
/// the stored profile, so consecutive turns produce byte-identical
/// prefixes and upstream prompt caching stays warm.
pub struct ContextAssembler {
    store: Arc<dyn CrmStore>,
    limits: AssemblerLimits,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn CrmStore>, limits: AssemblerLimits) -> Self {
        Self { store, limits }
    }

    /// Build the prompt for one turn. Only a history load failure is
    /// fatal; profile, facts and activity degrade to empty.
    pub async fn assemble(
        &self,
        owner: &str,
        conversation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AssembledContext> {
        let (profile, facts, tasks, previous, rows) = futures_util::join!(
            self.store.get_profile(owner),
            self.store.list_memory_facts(owner, self.limits.memory_facts),
            self.store.recent_task_records(owner, self.limits.recent_tasks),
            self.store.latest_other_conversation(owner, conversation_id),
            self.store
                .list_messages(owner, conversation_id, self.limits.history_messages),
        );
        let rows = rows?;

        let mut degraded = false;
        let mut soften = |what: &str, e: hb_domain::error::Error| {
            tracing::warn!(owner, error = %e, "context: {what} lookup failed, continuing without it");
            degraded = true;
        };
        let profile = profile.unwrap_or_else(|e| {
            soften("profile", e);
            None
        });
        let facts = facts.unwrap_or_else(|e| {
            soften("memory facts", e);
            Vec::new()
        });
        let tasks = tasks.unwrap_or_else(|e| {
            soften("task history", e);
            Vec::new()
        });
        let previous = previous.unwrap_or_else(|e| {
            soften("previous conversation", e);
            None
        });

        let mut system = vec![SystemBlock {
            text: injection::STATIC_INSTRUCTIONS.to_string(),
            cacheable: true,
        }];
        let profile_text = profile.as_ref().and_then(injection::format_profile);
        let profile_chars = profile_text.as_ref().map(|t| t.len()).unwrap_or(0);
        if let Some(text) = profile_text {
            system.push(SystemBlock { text, cacheable: true });
        }
        let dynamic = injection::format_dynamic(&DynamicInputs {
            now,
            facts: &facts,
            recent_tasks: &tasks,
            previous_conversation: previous.as_ref(),
        });
        let dynamic_chars = dynamic.len();
        system.push(SystemBlock {
            text: dynamic,
            cacheable: false,
        });

        let history = rebuild_history(&rows);

        let report = ContextReport {
            static_chars: injection::STATIC_INSTRUCTIONS.len(),
            profile_chars,
            dynamic_chars,
            history_messages: history.len(),
            memory_facts: facts.len(),
            recent_tasks: tasks.len(),
            degraded,
        };

        TraceEvent::ContextBuilt {
            owner_id: owner.to_string(),
            static_chars: report.static_chars,
            profile_chars: report.profile_chars,
            dynamic_chars: report.dynamic_chars,
            history_messages: report.history_messages,
            memory_facts: report.memory_facts,
        }
        .emit();

        Ok(AssembledContext {
            system,
            history,
            report,
        })
    }
}
