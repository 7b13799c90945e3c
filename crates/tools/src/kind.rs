//! The closed tool catalog and the definitions exposed to the model.

use hb_domain::crm::{ContentType, DealStage};
use hb_domain::tool::ToolDefinition;
use serde_json::json;

/// Every tool the model may call. Dispatch goes through this enum; a name
/// that does not parse here is answered with `{"error": "Unknown tool"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    GetActiveDeals,
    GetDealDetails,
    CheckUpcomingDeadlines,
    SearchContacts,
    CreateDeal,
    UpdateDeal,
    AddContact,
    UpdateContact,
    DraftSocialPost,
    DraftEmail,
    DraftListingDescription,
    EnrichProperty,
    CreateFile,
    CreateTodos,
    UpdateTodo,
}

impl ToolKind {
    pub const ALL: [ToolKind; 15] = [
        ToolKind::GetActiveDeals,
        ToolKind::GetDealDetails,
        ToolKind::CheckUpcomingDeadlines,
        ToolKind::SearchContacts,
        ToolKind::CreateDeal,
        ToolKind::UpdateDeal,
        ToolKind::AddContact,
        ToolKind::UpdateContact,
        ToolKind::DraftSocialPost,
        ToolKind::DraftEmail,
        ToolKind::DraftListingDescription,
        ToolKind::EnrichProperty,
        ToolKind::CreateFile,
        ToolKind::CreateTodos,
        ToolKind::UpdateTodo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::GetActiveDeals => "get_active_deals",
            ToolKind::GetDealDetails => "get_deal_details",
            ToolKind::CheckUpcomingDeadlines => "check_upcoming_deadlines",
            ToolKind::SearchContacts => "search_contacts",
            ToolKind::CreateDeal => "create_deal",
            ToolKind::UpdateDeal => "update_deal",
            ToolKind::AddContact => "add_contact",
            ToolKind::UpdateContact => "update_contact",
            ToolKind::DraftSocialPost => "draft_social_post",
            ToolKind::DraftEmail => "draft_email",
            ToolKind::DraftListingDescription => "draft_listing_description",
            ToolKind::EnrichProperty => "enrich_property",
            ToolKind::CreateFile => "create_file",
            ToolKind::CreateTodos => "create_todos",
            ToolKind::UpdateTodo => "update_todo",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Todo tools touch only turn-local state and run in-process before
    /// the concurrent fan-out.
    pub fn is_todo(&self) -> bool {
        matches!(self, ToolKind::CreateTodos | ToolKind::UpdateTodo)
    }

    /// Content drafting tools. Once one of these ran and the model already
    /// wrote the draft, the turn needs no confirmation round.
    pub fn is_draft(&self) -> bool {
        self.draft_content_type().is_some()
    }

    pub fn draft_content_type(&self) -> Option<ContentType> {
        match self {
            ToolKind::DraftSocialPost => Some(ContentType::SocialPost),
            ToolKind::DraftEmail => Some(ContentType::Email),
            ToolKind::DraftListingDescription => Some(ContentType::ListingDescription),
            _ => None,
        }
    }

    /// Whether a successful call writes to the store.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ToolKind::CreateDeal
                | ToolKind::UpdateDeal
                | ToolKind::AddContact
                | ToolKind::UpdateContact
                | ToolKind::EnrichProperty
                | ToolKind::CreateFile
        )
    }

    /// Progress label shown while the tool runs.
    pub fn status_label(&self) -> &'static str {
        match self {
            ToolKind::GetActiveDeals => "Checking your pipeline",
            ToolKind::GetDealDetails => "Looking up the deal",
            ToolKind::CheckUpcomingDeadlines => "Checking deadlines",
            ToolKind::SearchContacts => "Searching contacts",
            ToolKind::CreateDeal => "Creating deal",
            ToolKind::UpdateDeal => "Updating deal",
            ToolKind::AddContact => "Adding contact",
            ToolKind::UpdateContact => "Updating contact",
            ToolKind::DraftSocialPost => "Drafting social post",
            ToolKind::DraftEmail => "Drafting email",
            ToolKind::DraftListingDescription => "Drafting listing description",
            ToolKind::EnrichProperty => "Looking up property details",
            ToolKind::CreateFile => "Creating file",
            ToolKind::CreateTodos => "Planning",
            ToolKind::UpdateTodo => "Updating plan",
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let (description, parameters) = match self {
            ToolKind::GetActiveDeals => (
                "List the agent's active deals (every stage except closed and lost).",
                json!({ "type": "object", "properties": {} }),
            ),
            ToolKind::GetDealDetails => (
                "Get full details of one deal by id or by address.",
                json!({
                    "type": "object",
                    "properties": {
                        "deal_id": { "type": "string", "description": "Deal id" },
                        "address": { "type": "string", "description": "Full or partial property address" }
                    }
                }),
            ),
            ToolKind::CheckUpcomingDeadlines => (
                "List closing, inspection, appraisal and financing deadlines in the next 7 days, soonest first.",
                json!({ "type": "object", "properties": {} }),
            ),
            ToolKind::SearchContacts => (
                "Search contacts by name, email or phone.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "Text to match" },
                        "limit": { "type": "integer", "description": "Maximum results (default 10)" }
                    },
                    "required": ["query"]
                }),
            ),
            ToolKind::CreateDeal => (
                "Create a deal. Property details are looked up automatically when the address includes city and state.",
                json!({
                    "type": "object",
                    "properties": {
                        "property_address": { "type": "string", "description": "Street address, ideally with city and state" },
                        "client_name": { "type": "string" },
                        "client_email": { "type": "string" },
                        "client_phone": { "type": "string" },
                        "deal_type": { "type": "string", "enum": ["listing", "buyer"] },
                        "stage": { "type": "string", "enum": stage_enum() },
                        "list_price": { "type": "number", "description": "Price in dollars" },
                        "closing_date": { "type": "string", "description": "YYYY-MM-DD" },
                        "notes": { "type": "string" }
                    },
                    "required": ["property_address"]
                }),
            ),
            ToolKind::UpdateDeal => (
                "Update fields of an existing deal. Pass only the fields that change.",
                json!({
                    "type": "object",
                    "properties": {
                        "deal_id": { "type": "string" },
                        "address": { "type": "string", "description": "Used to find the deal when deal_id is unknown" },
                        "stage": { "type": "string", "enum": stage_enum() },
                        "list_price": { "type": "number" },
                        "offer_price": { "type": "number" },
                        "sale_price": { "type": "number" },
                        "closing_date": { "type": "string", "description": "YYYY-MM-DD" },
                        "inspection_deadline": { "type": "string", "description": "YYYY-MM-DD" },
                        "appraisal_deadline": { "type": "string", "description": "YYYY-MM-DD" },
                        "financing_deadline": { "type": "string", "description": "YYYY-MM-DD" },
                        "client_name": { "type": "string" },
                        "client_email": { "type": "string" },
                        "client_phone": { "type": "string" },
                        "notes": { "type": "string" }
                    }
                }),
            ),
            ToolKind::AddContact => (
                "Add a contact.",
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "email": { "type": "string" },
                        "phone": { "type": "string" },
                        "contact_type": { "type": "string", "description": "buyer, seller, lender, agent, vendor, other" },
                        "notes": { "type": "string" }
                    },
                    "required": ["name"]
                }),
            ),
            ToolKind::UpdateContact => (
                "Update fields of an existing contact.",
                json!({
                    "type": "object",
                    "properties": {
                        "contact_id": { "type": "string" },
                        "name": { "type": "string" },
                        "email": { "type": "string" },
                        "phone": { "type": "string" },
                        "contact_type": { "type": "string" },
                        "notes": { "type": "string" }
                    },
                    "required": ["contact_id"]
                }),
            ),
            ToolKind::DraftSocialPost => (
                "Gather deal facts for a social media post. Write the post yourself from the result.",
                draft_schema(json!({
                    "platform": { "type": "string", "description": "instagram, facebook, linkedin, x" },
                    "tone": { "type": "string" }
                })),
            ),
            ToolKind::DraftEmail => (
                "Gather deal facts for an email. Write the email yourself from the result.",
                draft_schema(json!({
                    "recipient": { "type": "string", "description": "Who the email is for" },
                    "purpose": { "type": "string", "description": "What the email should achieve" }
                })),
            ),
            ToolKind::DraftListingDescription => (
                "Gather deal facts for an MLS listing description. Write the description yourself from the result.",
                draft_schema(json!({
                    "style": { "type": "string", "description": "e.g. luxury, cozy, modern" }
                })),
            ),
            ToolKind::EnrichProperty => (
                "Look up public property data (beds, baths, square footage, year built) for an address. Saves it on the deal when deal_id is given.",
                json!({
                    "type": "object",
                    "properties": {
                        "address": { "type": "string" },
                        "city": { "type": "string" },
                        "state": { "type": "string", "description": "Two-letter state code" },
                        "deal_id": { "type": "string" }
                    },
                    "required": ["address"]
                }),
            ),
            ToolKind::CreateFile => (
                "Save content as a downloadable file and return a temporary link.",
                json!({
                    "type": "object",
                    "properties": {
                        "filename": { "type": "string" },
                        "content": { "type": "string" },
                        "format": { "type": "string", "enum": crate::files::FORMATS }
                    },
                    "required": ["filename", "content", "format"]
                }),
            ),
            ToolKind::CreateTodos => (
                "Create a task list for a multi-step request. Replaces any existing list.",
                json!({
                    "type": "object",
                    "properties": {
                        "todos": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "content": { "type": "string", "description": "Imperative, e.g. 'Create the deal'" },
                                    "active_form": { "type": "string", "description": "Progressive, e.g. 'Creating the deal'" }
                                },
                                "required": ["content", "active_form"]
                            }
                        }
                    },
                    "required": ["todos"]
                }),
            ),
            ToolKind::UpdateTodo => (
                "Set the status of one task list item.",
                json!({
                    "type": "object",
                    "properties": {
                        "index": { "type": "integer" },
                        "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] }
                    },
                    "required": ["index", "status"]
                }),
            ),
        };
        ToolDefinition {
            name: self.name().into(),
            description: description.into(),
            parameters,
        }
    }
}

fn stage_enum() -> Vec<&'static str> {
    DealStage::ALL.iter().map(|s| s.as_str()).collect()
}

fn draft_schema(extra: serde_json::Value) -> serde_json::Value {
    let mut properties = json!({
        "deal_id": { "type": "string" },
        "address": { "type": "string", "description": "Used to find the deal when deal_id is unknown" },
        "instructions": { "type": "string", "description": "Anything the agent asked for" }
    });
    if let (Some(base), serde_json::Value::Object(more)) = (properties.as_object_mut(), extra) {
        base.extend(more);
    }
    json!({ "type": "object", "properties": properties })
}

/// Definitions for every catalog entry, in catalog order.
pub fn all_definitions() -> Vec<ToolDefinition> {
    ToolKind::ALL.iter().map(|k| k.definition()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_and_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
            assert!(seen.insert(kind.name()));
        }
        assert_eq!(ToolKind::from_name("web_search"), None);
    }

    #[test]
    fn definitions_are_object_schemas() {
        for def in all_definitions() {
            assert_eq!(def.parameters["type"], "object", "{}", def.name);
        }
        let draft = ToolKind::DraftEmail.definition();
        assert!(draft.parameters["properties"]["recipient"].is_object());
        assert!(draft.parameters["properties"]["deal_id"].is_object());
    }

    #[test]
    fn draft_tools_map_to_content_types() {
        assert_eq!(
            ToolKind::DraftSocialPost.draft_content_type(),
            Some(ContentType::SocialPost)
        );
        assert!(!ToolKind::CreateDeal.is_draft());
    }
}
