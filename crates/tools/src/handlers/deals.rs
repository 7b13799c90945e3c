use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use hb_domain::crm::{Deal, DEADLINE_FIELDS, UndoAction, UndoKind};
use serde_json::{json, Value};

use super::{deal_view, resolve_deal};
use crate::enrichment::EnrichmentOutcome;
use crate::executor::{Handled, ToolContext, ToolEnv, ToolFailure, ToolHandler, Touched};
use crate::input::{CreateDealInput, DealLookup, ToolInput, UpdateDealInput};

/// Forward window of the deadline view, in days.
pub const DEADLINE_WINDOW_DAYS: i64 = 7;

fn touched(deal: &Deal) -> Touched {
    Touched {
        deal_id: Some(deal.id.clone()),
        deal_stage: Some(deal.stage),
        ..Default::default()
    }
}

// ── get_active_deals ────────────────────────────────────────────────

pub struct GetActiveDeals;

#[async_trait]
impl ToolHandler for GetActiveDeals {
    async fn handle(
        &self,
        env: &ToolEnv,
        ctx: &ToolContext,
        _input: &Value,
    ) -> Result<Handled, ToolFailure> {
        let deals = env.store.list_active_deals(&ctx.owner_id).await?;
        let n = deals.len();
        let views: Vec<Value> = deals.iter().map(deal_view).collect();
        Ok(Handled::new(
            json!({ "deals": views, "count": n }),
            format!("Listed {n} active deals"),
        ))
    }
}

// ── get_deal_details ────────────────────────────────────────────────

pub struct GetDealDetails;

#[async_trait]
impl ToolHandler for GetDealDetails {
    async fn handle(
        &self,
        env: &ToolEnv,
        ctx: &ToolContext,
        input: &Value,
    ) -> Result<Handled, ToolFailure> {
        let lookup = DealLookup::from_value(input)?;
        let deal = resolve_deal(env.store.as_ref(), &ctx.owner_id, &lookup)
            .await?
            .ok_or("Deal not found")?;
        let mut handled = Handled::new(
            json!({ "deal": deal_view(&deal) }),
            format!("Viewed deal {}", deal.property_address),
        );
        handled.touched = touched(&deal);
        Ok(handled)
    }
}

// ── check_upcoming_deadlines ────────────────────────────────────────

pub struct CheckUpcomingDeadlines;

#[async_trait]
impl ToolHandler for CheckUpcomingDeadlines {
    async fn handle(
        &self,
        env: &ToolEnv,
        ctx: &ToolContext,
        _input: &Value,
    ) -> Result<Handled, ToolFailure> {
        let deals = env.store.list_active_deals(&ctx.owner_id).await?;
        let today = ctx.now.date_naive();
        let deadlines = upcoming_deadlines(&deals, today);
        let n = deadlines.len();
        Ok(Handled::new(
            json!({
                "deadlines": deadlines,
                "window": {
                    "from": today.format("%Y-%m-%d").to_string(),
                    "to": (today + Duration::days(DEADLINE_WINDOW_DAYS)).format("%Y-%m-%d").to_string(),
                }
            }),
            format!("Checked deadlines: {n} in the next {DEADLINE_WINDOW_DAYS} days"),
        ))
    }
}

/// Deadlines dated from `today` through `today + 7d`, soonest first.
/// Dates are ISO strings, so string comparison is date comparison.
pub fn upcoming_deadlines(deals: &[Deal], today: NaiveDate) -> Vec<Value> {
    let from = today.format("%Y-%m-%d").to_string();
    let to = (today + Duration::days(DEADLINE_WINDOW_DAYS))
        .format("%Y-%m-%d")
        .to_string();

    let mut hits: Vec<(String, Value)> = Vec::new();
    for deal in deals {
        for field in DEADLINE_FIELDS {
            let Some(date) = deal.date_field(field) else {
                continue;
            };
            if date < from.as_str() || date > to.as_str() {
                continue;
            }
            let days_until = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map(|d| (d - today).num_days())
                .ok();
            hits.push((
                date.to_string(),
                json!({
                    "deal_id": deal.id,
                    "property_address": deal.property_address,
                    "client_name": deal.client_name,
                    "deadline_type": field.as_str(),
                    "date": date,
                    "days_until": days_until,
                }),
            ));
        }
    }
    hits.sort_by(|a, b| a.0.cmp(&b.0));
    hits.into_iter().map(|(_, v)| v).collect()
}

// ── create_deal ─────────────────────────────────────────────────────

pub struct CreateDeal;

#[async_trait]
impl ToolHandler for CreateDeal {
    async fn handle(
        &self,
        env: &ToolEnv,
        ctx: &ToolContext,
        input: &Value,
    ) -> Result<Handled, ToolFailure> {
        let CreateDealInput { mut deal } = CreateDealInput::from_value(input)?;
        let parsed = env.addresses.parse(&deal.property_address);
        if let Some(p) = &parsed {
            deal.city = Some(p.city.clone());
            deal.state = Some(p.state.clone());
            deal.zip_code = p.zip.clone();
        }

        let mut created = env.store.insert_deal(&ctx.owner_id, deal).await?;

        // The deal exists from here on; enrichment can only add to it.
        let enrichment = match &parsed {
            Some(p) => {
                let outcome = env
                    .enricher
                    .enrich(
                        &ctx.owner_id,
                        &p.street,
                        Some(&p.city),
                        Some(&p.state),
                        Some(&created.id),
                    )
                    .await;
                if let EnrichmentOutcome::Found { deal: Some(d), .. } = &outcome {
                    created = d.clone();
                }
                outcome.to_json()
            }
            None => json!({
                "property": null,
                "skipped": "Address has no city and state; property lookup skipped",
            }),
        };

        let mut handled = Handled::new(
            json!({ "deal": deal_view(&created), "enrichment": enrichment }),
            format!("Created deal {}", created.property_address),
        );
        handled.undo = Some(UndoAction {
            kind: UndoKind::DeleteDeal,
            entity_id: created.id.clone(),
            previous_values: None,
            label: format!("Undo create {}", created.property_address),
        });
        handled.touched = touched(&created);
        Ok(handled)
    }
}

// ── update_deal ─────────────────────────────────────────────────────

pub struct UpdateDeal;

#[async_trait]
impl ToolHandler for UpdateDeal {
    async fn handle(
        &self,
        env: &ToolEnv,
        ctx: &ToolContext,
        input: &Value,
    ) -> Result<Handled, ToolFailure> {
        // Validation happens before any read or write.
        let UpdateDealInput { target, patch } = UpdateDealInput::from_value(input)?;
        let current = resolve_deal(env.store.as_ref(), &ctx.owner_id, &target)
            .await?
            .ok_or("Deal not found")?;

        let previous = patch.previous_values(&current);
        let updated = env
            .store
            .update_deal(&ctx.owner_id, &current.id, &patch)
            .await?;

        let fields: Vec<&str> = patch.fields().map(|f| f.as_str()).collect();
        let mut handled = Handled::new(
            json!({ "deal": deal_view(&updated), "updated_fields": fields }),
            format!(
                "Updated {} on {}",
                fields.join(", "),
                updated.property_address
            ),
        );
        handled.undo = Some(UndoAction {
            kind: UndoKind::RevertDeal,
            entity_id: updated.id.clone(),
            previous_values: Some(previous),
            label: format!("Undo update to {}", updated.property_address),
        });
        handled.touched = touched(&updated);
        Ok(handled)
    }
}
