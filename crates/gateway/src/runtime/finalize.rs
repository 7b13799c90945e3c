//! Post-turn finalization: content-type hint, the persisted assistant
//! message, and the terminal `done` payload.

use std::collections::HashSet;

use chrono::NaiveDate;
use hb_domain::crm::{ContentType, MessageMetadata, ToolCallLog, UndoAction};
use hb_domain::stream::WebSource;
use hb_domain::tool::Role;
use hb_store::CrmStore;
use hb_tools::{upcoming_deadlines, ToolKind, ToolOutcome};
use serde_json::Value;

use super::events::{ChipContext, DonePayload, ToolUsed};

/// One executed call with the input the model gave it.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub input: Value,
    pub outcome: ToolOutcome,
}

/// What a turn produced, accumulated across rounds.
#[derive(Debug, Clone, Default)]
pub struct TurnRecord {
    pub text: String,
    pub calls: Vec<CallRecord>,
    pub sources: Vec<WebSource>,
}

impl TurnRecord {
    fn outcomes(&self) -> impl Iterator<Item = &ToolOutcome> {
        self.calls.iter().map(|c| &c.outcome)
    }

    /// Calls shown to the client as tool activity (todo bookkeeping is
    /// reported through `todo_update` instead).
    fn visible(&self) -> impl Iterator<Item = &ToolOutcome> {
        self.outcomes()
            .filter(|o| !o.kind.map(|k| k.is_todo()).unwrap_or(false))
    }

    pub fn undo_actions(&self) -> Vec<UndoAction> {
        self.outcomes().filter_map(|o| o.undo.clone()).collect()
    }

    /// The per-call log kept on the assistant message: input plus a
    /// one-line summary, never the full result.
    pub fn tool_log(&self) -> Vec<ToolCallLog> {
        self.calls
            .iter()
            .map(|c| ToolCallLog {
                name: c.outcome.tool_name.clone(),
                input: c.input.clone(),
                result_summary: c.outcome.summary.clone(),
                success: c.outcome.success,
            })
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Content type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn has_enrichment(result: &Value) -> bool {
    result
        .get("enrichment")
        .and_then(|e| e.get("property"))
        .map(|p| p.is_object())
        .unwrap_or(false)
}

/// Pick the rendering hint for the turn. In priority order:
///
/// 1. text shorter than `conversational_threshold` chars: conversational
/// 2. a deal was created and property data was found: property_enriched
/// 3. the first successful drafting tool: its content type
/// 4. conversational
pub fn derive_content_type<'a>(
    text: &str,
    outcomes: impl IntoIterator<Item = &'a ToolOutcome>,
    conversational_threshold: usize,
) -> ContentType {
    if text.trim().chars().count() < conversational_threshold {
        return ContentType::Conversational;
    }

    let ok: Vec<&ToolOutcome> = outcomes.into_iter().filter(|o| o.success).collect();
    let created = ok.iter().any(|o| o.kind == Some(ToolKind::CreateDeal));
    let enriched = ok.iter().any(|o| {
        matches!(o.kind, Some(ToolKind::CreateDeal) | Some(ToolKind::EnrichProperty))
            && has_enrichment(&o.result)
    });
    if created && enriched {
        return ContentType::PropertyEnriched;
    }

    ok.iter()
        .find_map(|o| o.kind.and_then(|k| k.draft_content_type()))
        .unwrap_or(ContentType::Conversational)
}

/// Drop repeated URLs, keeping first occurrence order.
pub fn dedup_sources(sources: &[WebSource]) -> Vec<WebSource> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .filter(|s| seen.insert(s.url.clone()))
        .cloned()
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistence and the terminal payload
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Write the assistant row. A failure is logged: the client already has
/// the text and the turn still completes.
pub async fn persist_assistant(
    store: &dyn CrmStore,
    owner: &str,
    conversation_id: &str,
    record: &TurnRecord,
    content_type: ContentType,
) {
    let metadata = MessageMetadata {
        content_type: Some(content_type),
        tool_calls: record.tool_log(),
        undo_actions: record.undo_actions(),
    };
    if let Err(e) = store
        .insert_message(
            owner,
            conversation_id,
            Role::Assistant,
            &record.text,
            Some(metadata),
        )
        .await
    {
        tracing::error!(owner, conversation_id, error = %e, "failed to persist assistant message");
    }
}

/// Chip context from the owner's pipeline plus the entities touched this
/// turn. Store failures degrade to zero counts.
pub async fn chip_context(
    store: &dyn CrmStore,
    owner: &str,
    record: &TurnRecord,
    today: NaiveDate,
) -> ChipContext {
    let (active_deal_count, upcoming_deadline_count) = match store.list_active_deals(owner).await {
        Ok(deals) => (deals.len(), upcoming_deadlines(&deals, today).len()),
        Err(e) => {
            tracing::warn!(owner, error = %e, "chip context: deal lookup failed");
            (0, 0)
        }
    };
    ChipContext {
        active_deal_count,
        upcoming_deadline_count,
        last_stage: record.outcomes().filter_map(|o| o.touched.deal_stage).last(),
        last_contact_type: record
            .outcomes()
            .filter_map(|o| o.touched.contact_type.clone())
            .last(),
    }
}

pub fn done_payload(
    record: &TurnRecord,
    content_type: ContentType,
    chip_context: ChipContext,
) -> DonePayload {
    let tools_used = record
        .visible()
        .map(|o| ToolUsed {
            tool: o.tool_name.clone(),
            success: o.success,
            deal_id: o.touched.deal_id.clone(),
            contact_id: o.touched.contact_id.clone(),
        })
        .collect();
    DonePayload {
        tools_used,
        last_deal_id: record.outcomes().filter_map(|o| o.touched.deal_id.clone()).last(),
        last_contact_id: record
            .outcomes()
            .filter_map(|o| o.touched.contact_id.clone())
            .last(),
        chip_context,
        content_type,
        undo_actions: record.undo_actions(),
        sources: dedup_sources(&record.sources),
    }
}
