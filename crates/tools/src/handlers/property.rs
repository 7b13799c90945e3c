use async_trait::async_trait;
use serde_json::{json, Value};

use super::deal_view;
use crate::enrichment::EnrichmentOutcome;
use crate::executor::{Handled, ToolContext, ToolEnv, ToolFailure, ToolHandler, Touched};
use crate::input::{EnrichInput, ToolInput};

/// Stand-alone property lookup. Upstream failures are reported inside the
/// `enrichment` object, not as a tool error.
pub struct EnrichProperty;

#[async_trait]
impl ToolHandler for EnrichProperty {
    async fn handle(
        &self,
        env: &ToolEnv,
        ctx: &ToolContext,
        input: &Value,
    ) -> Result<Handled, ToolFailure> {
        let mut req = EnrichInput::from_value(input)?;
        let mut street = req.address.clone();
        if req.city.is_none() || req.state.is_none() {
            if let Some(p) = env.addresses.parse(&req.address) {
                street = p.street;
                req.city.get_or_insert(p.city);
                req.state.get_or_insert(p.state);
            }
        }

        let outcome = env
            .enricher
            .enrich(
                &ctx.owner_id,
                &street,
                req.city.as_deref(),
                req.state.as_deref(),
                req.deal_id.as_deref(),
            )
            .await;

        let mut result = json!({ "address": req.address, "enrichment": outcome.to_json() });
        let mut touched = Touched::default();
        if let EnrichmentOutcome::Found { deal: Some(deal), .. } = &outcome {
            result["deal"] = deal_view(deal);
            touched.deal_id = Some(deal.id.clone());
            touched.deal_stage = Some(deal.stage);
        }
        let description = match &outcome {
            EnrichmentOutcome::Found { .. } => format!("Looked up property data for {}", req.address),
            EnrichmentOutcome::NotFound => format!("No property data for {}", req.address),
            EnrichmentOutcome::Failed(_) => format!("Property lookup unavailable for {}", req.address),
        };
        let mut handled = Handled::new(result, description);
        handled.touched = touched;
        Ok(handled)
    }
}
