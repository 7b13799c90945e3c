use async_trait::async_trait;
use serde_json::{json, Value};

use super::{deal_view, resolve_deal};
use crate::executor::{Handled, ToolContext, ToolEnv, ToolFailure, ToolHandler, Touched};
use crate::input::{DraftInput, ToolInput};
use crate::kind::ToolKind;

/// Shared handler of the three drafting tools. The model writes the draft
/// itself; the tool hands it the deal's facts, or tells it there is no
/// matching deal so it drafts from the conversation instead.
pub struct Draft(pub ToolKind);

impl Draft {
    fn noun(&self) -> &'static str {
        match self.0 {
            ToolKind::DraftSocialPost => "social post",
            ToolKind::DraftEmail => "email",
            _ => "listing description",
        }
    }
}

#[async_trait]
impl ToolHandler for Draft {
    async fn handle(
        &self,
        env: &ToolEnv,
        ctx: &ToolContext,
        input: &Value,
    ) -> Result<Handled, ToolFailure> {
        let DraftInput { target, options } = DraftInput::from_value(input)?;
        let content_type = self.0.draft_content_type();

        let deal = if target.is_empty() {
            None
        } else {
            resolve_deal(env.store.as_ref(), &ctx.owner_id, &target).await?
        };

        let Some(deal) = deal else {
            return Ok(Handled::new(
                json!({
                    "no_deal_found": true,
                    "searched": { "deal_id": target.deal_id, "address": target.address },
                    "request": options,
                    "content_type": content_type,
                    "message": "No matching deal in the CRM. Draft from what the agent said in this conversation.",
                }),
                format!("Drafted {} without a matching deal", self.noun()),
            ));
        };

        let mut handled = Handled::new(
            json!({
                "deal": deal_view(&deal),
                "request": options,
                "content_type": content_type,
            }),
            format!("Drafted {} for {}", self.noun(), deal.property_address),
        );
        handled.touched = Touched {
            deal_id: Some(deal.id.clone()),
            deal_stage: Some(deal.stage),
            ..Default::default()
        };
        Ok(handled)
    }
}
