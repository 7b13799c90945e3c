//! Background extraction of durable memory facts.
//!
//! After a turn, the last few messages may be handed to the cheap model to
//! pull out facts worth remembering ("prefers email over calls", "works
//! the Westlake market"). The job is gated three ways before any call is
//! made: the user text must be long enough, it must not look like a data
//! dump, and the owner must be outside the cooldown window. Candidates are
//! then deduplicated against stored facts by token overlap.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use hb_domain::config::MemoryConfig;
use hb_domain::crm::NewMemoryFact;
use hb_domain::error::Result;
use hb_domain::tool::{Message, Role, SystemBlock};
use hb_domain::trace::TraceEvent;
use hb_providers::{ChatRequest, LlmProvider};
use hb_store::CrmStore;
use serde::Deserialize;

use super::cooldown::{Clock, CooldownLimiter};

/// Facts already stored are compared against at most this many rows.
const EXISTING_FACTS_SCAN: usize = 500;
/// Upper bound on facts accepted from one extraction.
const MAX_CANDIDATES: usize = 10;

const CATEGORIES: [&str; 5] = ["preference", "client", "market", "business", "personal"];

const EXTRACTION_PROMPT: &str = "\
You extract durable facts about a real-estate agent from their recent chat \
with an assistant. Keep only facts that will still be true and useful weeks \
from now: preferences, recurring clients, markets they work, how they run \
their business. Ignore one-off requests, deal figures and anything already \
obvious from a CRM record.

Answer with a JSON array only, e.g.
[{\"fact\": \"Prefers texts over phone calls\", \"category\": \"preference\"}]
Categories: preference, client, market, business, personal.
Answer [] when there is nothing worth keeping.";

/// One fact proposed by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FactCandidate {
    pub fact: String,
    #[serde(default)]
    pub category: String,
}

pub struct MemoryExtractor {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn CrmStore>,
    cfg: MemoryConfig,
    model: String,
    limiter: CooldownLimiter,
}

impl MemoryExtractor {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn CrmStore>,
        cfg: MemoryConfig,
        model: String,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let limiter = CooldownLimiter::new(Duration::from_secs(cfg.cooldown_secs), clock);
        Self {
            llm,
            store,
            cfg,
            model,
            limiter,
        }
    }

    /// Decide whether this turn warrants an extraction call. A `true`
    /// answer consumes the owner's cooldown slot.
    pub fn should_run(&self, owner: &str, user_text: &str) -> bool {
        if !self.cfg.enabled {
            return false;
        }
        if !looks_fact_bearing(user_text, self.cfg.min_text_chars, self.cfg.max_symbol_ratio) {
            tracing::debug!(owner, "memory extraction skipped: text not fact-bearing");
            return false;
        }
        if !self.limiter.try_acquire(owner) {
            tracing::debug!(
                owner,
                remaining_secs = self.limiter.remaining(owner).map(|d| d.as_secs()),
                "memory extraction skipped: cooldown"
            );
            return false;
        }
        true
    }

    /// Run one extraction over the conversation's recent messages and
    /// store the new facts. Returns how many were inserted.
    pub async fn extract(&self, owner: &str, conversation_id: &str) -> Result<usize> {
        let recent = self
            .store
            .list_messages(owner, conversation_id, self.cfg.recent_messages)
            .await?;
        if recent.is_empty() {
            return Ok(0);
        }

        let transcript = recent
            .iter()
            .map(|m| {
                let who = match m.role {
                    Role::User => "Agent",
                    Role::Assistant => "Assistant",
                };
                format!("{who}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let req = ChatRequest {
            system: vec![SystemBlock {
                text: EXTRACTION_PROMPT.into(),
                cacheable: false,
            }],
            messages: vec![Message::user(transcript)],
            temperature: Some(0.0),
            max_tokens: Some(512),
            model: Some(self.model.clone()),
            ..Default::default()
        };
        let resp = self.llm.chat(req).await?;
        let candidates = parse_candidates(&resp.content);
        let found = candidates.len();
        let inserted = self.store_facts(owner, conversation_id, candidates).await?;

        TraceEvent::MemoryExtracted {
            owner_id: owner.to_string(),
            candidates: found,
            inserted,
        }
        .emit();
        Ok(inserted)
    }

    /// Insert the candidates that are not near-duplicates of a stored fact
    /// or of one another.
    pub async fn store_facts(
        &self,
        owner: &str,
        conversation_id: &str,
        candidates: Vec<FactCandidate>,
    ) -> Result<usize> {
        if candidates.is_empty() {
            return Ok(0);
        }
        let mut known: Vec<String> = self
            .store
            .list_memory_facts(owner, EXISTING_FACTS_SCAN)
            .await?
            .into_iter()
            .map(|f| f.fact)
            .collect();

        let mut inserted = 0;
        for c in candidates {
            let duplicate = known
                .iter()
                .any(|k| similarity(k, &c.fact) > self.cfg.similarity_threshold);
            if duplicate {
                tracing::debug!(owner, fact = %c.fact, "memory fact already known");
                continue;
            }
            self.store
                .insert_memory_fact(
                    owner,
                    NewMemoryFact {
                        fact: c.fact.clone(),
                        category: c.category,
                        source_conversation_id: Some(conversation_id.to_string()),
                    },
                )
                .await?;
            known.push(c.fact);
            inserted += 1;
        }
        Ok(inserted)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Heuristics
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Long enough to carry a statement, and not dominated by digits and
/// punctuation (pasted tables, addresses lists, CSV).
pub fn looks_fact_bearing(text: &str, min_chars: usize, max_symbol_ratio: f64) -> bool {
    text.trim().chars().count() >= min_chars && symbol_ratio(text) <= max_symbol_ratio
}

/// Share of non-whitespace characters that are not letters.
pub fn symbol_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut other = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if !c.is_alphabetic() {
            other += 1;
        }
    }
    if total == 0 {
        return 1.0;
    }
    other as f64 / total as f64
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Token-set overlap: `|A ∩ B| / max(|A|, |B|)`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (ta, tb) = (tokens(a), tokens(b));
    let denom = ta.len().max(tb.len());
    if denom == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / denom as f64
}

/// Pull the JSON array out of a model reply. Anything unparseable yields
/// no candidates.
pub fn parse_candidates(raw: &str) -> Vec<FactCandidate> {
    let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }
    let parsed: Vec<FactCandidate> = match serde_json::from_str(&raw[start..=end]) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "memory extraction reply was not a fact list");
            return Vec::new();
        }
    };
    parsed
        .into_iter()
        .filter_map(|c| {
            let fact = c.fact.trim().to_string();
            if fact.is_empty() {
                return None;
            }
            let category = c.category.trim().to_ascii_lowercase();
            let category = if CATEGORIES.contains(&category.as_str()) {
                category
            } else {
                "general".to_string()
            };
            Some(FactCandidate { fact, category })
        })
        .take(MAX_CANDIDATES)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_is_overlap_over_larger_set() {
        assert_eq!(similarity("Prefers email", "prefers EMAIL!"), 1.0);
        let s = similarity("Works the Westlake market", "Works the Austin market");
        assert!((s - 0.75).abs() < 1e-9);
        assert_eq!(similarity("", ""), 0.0);
    }

    #[test]
    fn data_dumps_are_not_fact_bearing() {
        let prose = "I mostly work with first-time buyers in East Austin and prefer texting.";
        assert!(looks_fact_bearing(prose, 40, 0.3));

        let dump = "123,456,789 | 4/3 | 2400 | $450,000 | 78701 | 2010-05-01 | 0.25ac";
        assert!(!looks_fact_bearing(dump, 40, 0.3));

        assert!(!looks_fact_bearing("thanks!", 40, 0.3));
    }

    #[test]
    fn candidates_parse_from_wrapped_reply() {
        let raw = "Here you go:\n[{\"fact\": \" Prefers texts \", \"category\": \"Preference\"},\
                   {\"fact\": \"\", \"category\": \"client\"},\
                   {\"fact\": \"Has a golden retriever\", \"category\": \"pets\"}]";
        let c = parse_candidates(raw);
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].fact, "Prefers texts");
        assert_eq!(c[0].category, "preference");
        assert_eq!(c[1].category, "general");

        assert!(parse_candidates("nothing to add").is_empty());
        assert!(parse_candidates("[not json]").is_empty());
    }
}
