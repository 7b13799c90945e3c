//! Text of the three prompt tiers. Every formatter here is a pure
//! function of its inputs so identical inputs give byte-identical output.

use chrono::{DateTime, Utc};
use hb_domain::crm::{BusinessProfile, Conversation, MemoryFact, TaskHistoryRecord};

use crate::truncation::clip;

/// Behavior, formatting and tool-usage rules. Unchanging across turns.
pub const STATIC_INSTRUCTIONS: &str = "\
You are Homebase, an AI coworker for a real-estate agent. You manage their \
pipeline (deals and contacts), keep track of deadlines, research properties \
and markets, and draft marketing content in their voice.

## Behavior
- Act, then report. When the agent asks for something a tool can do, call the tool \
instead of describing what you would do.
- Never invent CRM data. If a lookup returns nothing, say so plainly.
- When a tool result contains an `error` field, tell the agent what went wrong in one \
sentence and suggest the next step. Do not retry the same call with the same input.
- Keep the agent's clients' personal details inside this workspace. Do not put them \
into web searches.

## Formatting
- Lead with the answer. Use short paragraphs and bullet lists; no headings for replies \
under a few paragraphs.
- Format prices as $450,000 and dates as Mar 14, 2025.
- When you draft a social post, email, or listing description, output only the draft \
text after one short intro line, so it can be copied as-is.

## Tools
- For requests with three or more distinct steps, call `create_todos` first, then mark \
each item `in_progress` and `completed` with `update_todo` as you go. Keep at most one \
item in progress at a time.
- `create_deal` already looks up property details for the address; do not call \
`enrich_property` again for a deal you just created.
- Use `update_deal` with only the fields that change. Valid stages: lead, active, \
showing, offer, under_contract, pending, closed, lost.
- Drafting tools return the deal's facts. If they report `no_deal_found`, draft from \
what the agent told you in this conversation.
- Use web search for market data, news, and anything outside the CRM. Cite what you \
used.
- Use `create_file` only when the agent asks for a downloadable file.";

/// Render the owner's business facts. Returns `None` when there is nothing
/// worth injecting.
pub fn format_profile(profile: &BusinessProfile) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();
    if let Some(v) = nonempty(&profile.agent_name) {
        lines.push(format!("Agent: {v}"));
    }
    if let Some(v) = nonempty(&profile.brokerage) {
        lines.push(format!("Brokerage: {v}"));
    }
    if let Some(v) = nonempty(&profile.market_area) {
        lines.push(format!("Market area: {v}"));
    }
    if !profile.specialties.is_empty() {
        lines.push(format!("Specialties: {}", profile.specialties.join(", ")));
    }
    if let Some(years) = profile.years_experience {
        lines.push(format!("Years in real estate: {years}"));
    }
    if let Some(v) = nonempty(&profile.brand_voice) {
        lines.push(format!("Brand voice: {v}"));
    }
    if let Some(v) = nonempty(&profile.phone) {
        lines.push(format!("Phone: {v}"));
    }
    if let Some(v) = nonempty(&profile.website) {
        lines.push(format!("Website: {v}"));
    }
    if lines.is_empty() {
        return None;
    }
    Some(format!(
        "=== AGENT_PROFILE ===\n{}\n=== END_AGENT_PROFILE ===",
        lines.join("\n")
    ))
}

/// Inputs of the volatile tier.
pub struct DynamicInputs<'a> {
    pub now: DateTime<Utc>,
    pub facts: &'a [MemoryFact],
    pub recent_tasks: &'a [TaskHistoryRecord],
    pub previous_conversation: Option<&'a Conversation>,
}

/// Render the per-turn block: date, remembered facts, recent activity, and
/// a pointer to the previous conversation.
pub fn format_dynamic(inputs: &DynamicInputs<'_>) -> String {
    let mut out = format!(
        "Today is {} ({}).",
        inputs.now.format("%A, %B %-d, %Y"),
        inputs.now.format("%Y-%m-%d")
    );

    if !inputs.facts.is_empty() {
        out.push_str("\n\n=== REMEMBERED_FACTS ===\n");
        for f in inputs.facts {
            out.push_str(&format!("- [{}] {}\n", f.category, clip(&f.fact, 300)));
        }
        out.push_str("=== END_REMEMBERED_FACTS ===");
    }

    if !inputs.recent_tasks.is_empty() {
        out.push_str("\n\n=== RECENT_ACTIVITY ===\n");
        for t in inputs.recent_tasks {
            out.push_str(&format!(
                "- {} {}\n",
                t.created_at.format("%b %-d %H:%M"),
                clip(&t.description, 200)
            ));
        }
        out.push_str("=== END_RECENT_ACTIVITY ===");
    }

    if let Some(conv) = inputs.previous_conversation {
        let title = conv.title.as_deref().unwrap_or("Untitled");
        out.push_str(&format!(
            "\n\nMost recent other conversation: \"{}\" (last active {}).",
            clip(title, 120),
            conv.updated_at.format("%Y-%m-%d")
        ));
    }

    out
}

fn nonempty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_profile_renders_nothing() {
        let p = BusinessProfile {
            owner_id: "o".into(),
            agent_name: Some("  ".into()),
            ..Default::default()
        };
        assert!(format_profile(&p).is_none());
    }

    #[test]
    fn profile_lines_follow_fixed_order() {
        let p = BusinessProfile {
            owner_id: "o".into(),
            agent_name: Some("Dana Reyes".into()),
            market_area: Some("Austin, TX".into()),
            specialties: vec!["luxury".into(), "first-time buyers".into()],
            ..Default::default()
        };
        let text = format_profile(&p).unwrap();
        let agent = text.find("Agent:").unwrap();
        let market = text.find("Market area:").unwrap();
        let spec = text.find("Specialties: luxury, first-time buyers").unwrap();
        assert!(agent < market && market < spec);
    }

    #[test]
    fn dynamic_block_contains_date_and_previous_conversation() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap();
        let conv = Conversation {
            id: "c0".into(),
            owner_id: "o".into(),
            title: Some("Oak Ave offer strategy".into()),
            created_at: now,
            updated_at: now,
        };
        let text = format_dynamic(&DynamicInputs {
            now,
            facts: &[],
            recent_tasks: &[],
            previous_conversation: Some(&conv),
        });
        assert!(text.starts_with("Today is Friday, March 14, 2025 (2025-03-14)."));
        assert!(text.contains("\"Oak Ave offer strategy\""));
        assert!(!text.contains("REMEMBERED_FACTS"));
    }
}
