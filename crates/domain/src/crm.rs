//! CRM entities owned by a single authenticated agent (the "owner").
//!
//! Everything here is persisted by the external store except [`Todo`],
//! which lives only for the duration of one streamed turn.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::tool::Role;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deals
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pipeline stage of a deal. The set is closed: anything else is rejected
/// before it reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    Lead,
    Active,
    Showing,
    Offer,
    UnderContract,
    Pending,
    Closed,
    Lost,
}

impl DealStage {
    pub const ALL: [DealStage; 8] = [
        DealStage::Lead,
        DealStage::Active,
        DealStage::Showing,
        DealStage::Offer,
        DealStage::UnderContract,
        DealStage::Pending,
        DealStage::Closed,
        DealStage::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DealStage::Lead => "lead",
            DealStage::Active => "active",
            DealStage::Showing => "showing",
            DealStage::Offer => "offer",
            DealStage::UnderContract => "under_contract",
            DealStage::Pending => "pending",
            DealStage::Closed => "closed",
            DealStage::Lost => "lost",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|s| s.as_str() == normalized)
    }

    /// Closed and lost deals drop out of the active pipeline.
    pub fn is_active(&self) -> bool {
        !matches!(self, DealStage::Closed | DealStage::Lost)
    }

    pub fn allowed_values() -> String {
        Self::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
    }
}

impl Default for DealStage {
    fn default() -> Self {
        DealStage::Lead
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub owner_id: String,
    pub property_address: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub client_phone: Option<String>,
    /// "listing" or "buyer".
    #[serde(default)]
    pub deal_type: Option<String>,
    #[serde(default)]
    pub stage: DealStage,
    #[serde(default)]
    pub list_price: Option<f64>,
    #[serde(default)]
    pub offer_price: Option<f64>,
    #[serde(default)]
    pub sale_price: Option<f64>,
    /// Dates are ISO `YYYY-MM-DD` strings, compared lexically.
    #[serde(default)]
    pub closing_date: Option<String>,
    #[serde(default)]
    pub inspection_deadline: Option<String>,
    #[serde(default)]
    pub appraisal_deadline: Option<String>,
    #[serde(default)]
    pub financing_deadline: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    // Enrichment fields.
    #[serde(default)]
    pub bedrooms: Option<f64>,
    #[serde(default)]
    pub bathrooms: Option<f64>,
    #[serde(default)]
    pub square_feet: Option<i64>,
    #[serde(default)]
    pub year_built: Option<i32>,
    #[serde(default)]
    pub lot_size: Option<i64>,
    #[serde(default)]
    pub property_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Date fields scanned by the upcoming-deadline view.
pub const DEADLINE_FIELDS: [DealField; 4] = [
    DealField::ClosingDate,
    DealField::InspectionDeadline,
    DealField::AppraisalDeadline,
    DealField::FinancingDeadline,
];

impl Deal {
    /// Current value of one field as JSON (`null` when unset).
    pub fn field_value(&self, field: DealField) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get(field.as_str()).cloned())
            .unwrap_or(Value::Null)
    }

    /// The ISO date stored in a deadline field, if any.
    pub fn date_field(&self, field: DealField) -> Option<&str> {
        match field {
            DealField::ClosingDate => self.closing_date.as_deref(),
            DealField::InspectionDeadline => self.inspection_deadline.as_deref(),
            DealField::AppraisalDeadline => self.appraisal_deadline.as_deref(),
            DealField::FinancingDeadline => self.financing_deadline.as_deref(),
            _ => None,
        }
    }
}

/// Fields that may be written through a [`DealPatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealField {
    PropertyAddress,
    City,
    State,
    ZipCode,
    ClientName,
    ClientEmail,
    ClientPhone,
    DealType,
    Stage,
    ListPrice,
    OfferPrice,
    SalePrice,
    ClosingDate,
    InspectionDeadline,
    AppraisalDeadline,
    FinancingDeadline,
    Notes,
    Bedrooms,
    Bathrooms,
    SquareFeet,
    YearBuilt,
    LotSize,
    PropertyType,
}

impl DealField {
    pub const ALL: [DealField; 23] = [
        DealField::PropertyAddress,
        DealField::City,
        DealField::State,
        DealField::ZipCode,
        DealField::ClientName,
        DealField::ClientEmail,
        DealField::ClientPhone,
        DealField::DealType,
        DealField::Stage,
        DealField::ListPrice,
        DealField::OfferPrice,
        DealField::SalePrice,
        DealField::ClosingDate,
        DealField::InspectionDeadline,
        DealField::AppraisalDeadline,
        DealField::FinancingDeadline,
        DealField::Notes,
        DealField::Bedrooms,
        DealField::Bathrooms,
        DealField::SquareFeet,
        DealField::YearBuilt,
        DealField::LotSize,
        DealField::PropertyType,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DealField::PropertyAddress => "property_address",
            DealField::City => "city",
            DealField::State => "state",
            DealField::ZipCode => "zip_code",
            DealField::ClientName => "client_name",
            DealField::ClientEmail => "client_email",
            DealField::ClientPhone => "client_phone",
            DealField::DealType => "deal_type",
            DealField::Stage => "stage",
            DealField::ListPrice => "list_price",
            DealField::OfferPrice => "offer_price",
            DealField::SalePrice => "sale_price",
            DealField::ClosingDate => "closing_date",
            DealField::InspectionDeadline => "inspection_deadline",
            DealField::AppraisalDeadline => "appraisal_deadline",
            DealField::FinancingDeadline => "financing_deadline",
            DealField::Notes => "notes",
            DealField::Bedrooms => "bedrooms",
            DealField::Bathrooms => "bathrooms",
            DealField::SquareFeet => "square_feet",
            DealField::YearBuilt => "year_built",
            DealField::LotSize => "lot_size",
            DealField::PropertyType => "property_type",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == raw)
    }

    pub fn is_price(&self) -> bool {
        matches!(
            self,
            DealField::ListPrice | DealField::OfferPrice | DealField::SalePrice
        )
    }
}

/// A sparse set of field writes against one deal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealPatch(pub BTreeMap<DealField, Value>);

impl DealPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: DealField, value: Value) {
        self.0.insert(field, value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = DealField> + '_ {
        self.0.keys().copied()
    }

    /// Build a patch from a loosely-typed map (e.g. undo `previous_values`).
    /// Unknown keys are rejected.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let mut patch = DealPatch::new();
        for (key, value) in map {
            let field = DealField::parse(key)
                .ok_or_else(|| Error::InvalidInput(format!("unknown deal field: {key}")))?;
            patch.set(field, value.clone());
        }
        Ok(patch)
    }

    /// Snapshot of `deal`'s current values for exactly the fields this
    /// patch touches; applying the snapshot reverses the patch.
    pub fn previous_values(&self, deal: &Deal) -> Map<String, Value> {
        self.fields()
            .map(|f| (f.as_str().to_string(), deal.field_value(f)))
            .collect()
    }

    /// Apply the patch to a copy of `deal`, bumping `updated_at`.
    pub fn apply(&self, deal: &Deal, now: DateTime<Utc>) -> Result<Deal> {
        let mut value = serde_json::to_value(deal)?;
        if let Value::Object(obj) = &mut value {
            for (field, v) in &self.0 {
                obj.insert(field.as_str().to_string(), v.clone());
            }
        }
        let mut updated: Deal = serde_json::from_value(value)
            .map_err(|e| Error::InvalidInput(format!("deal patch does not fit schema: {e}")))?;
        updated.updated_at = now;
        Ok(updated)
    }
}

/// Fields accepted when inserting a deal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDeal {
    pub property_address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub deal_type: Option<String>,
    pub stage: DealStage,
    pub list_price: Option<f64>,
    pub closing_date: Option<String>,
    pub notes: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contacts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// buyer, seller, lender, agent, vendor, ...
    #[serde(default)]
    pub contact_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewContact {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub contact_type: Option<String>,
    pub notes: Option<String>,
}

/// Partial contact update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ContactPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.contact_type.is_none()
            && self.notes.is_none()
    }

    pub fn apply(&self, contact: &Contact, now: DateTime<Utc>) -> Contact {
        let mut c = contact.clone();
        if let Some(v) = &self.name {
            c.name = v.clone();
        }
        if let Some(v) = &self.email {
            c.email = Some(v.clone());
        }
        if let Some(v) = &self.phone {
            c.phone = Some(v.clone());
        }
        if let Some(v) = &self.contact_type {
            c.contact_type = Some(v.clone());
        }
        if let Some(v) = &self.notes {
            c.notes = Some(v.clone());
        }
        c.updated_at = now;
        c
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversations & messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub owner_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub owner_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<MessageMetadata>,
    pub created_at: DateTime<Utc>,
}

/// Structured metadata written on the assistant row of a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallLog>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub undo_actions: Vec<UndoAction>,
}

/// One tool invocation as recorded on the assistant message. Only a compact
/// summary of the result is kept to bound row size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallLog {
    pub name: String,
    pub input: Value,
    pub result_summary: String,
    #[serde(default = "d_true")]
    pub success: bool,
}

fn d_true() -> bool {
    true
}

/// Rendering hint for the assistant's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Conversational,
    PropertyEnriched,
    SocialPost,
    Email,
    ListingDescription,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Undo
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoKind {
    DeleteDeal,
    DeleteContact,
    RevertDeal,
}

impl UndoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UndoKind::DeleteDeal => "delete_deal",
            UndoKind::DeleteContact => "delete_contact",
            UndoKind::RevertDeal => "revert_deal",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "delete_deal" => Some(UndoKind::DeleteDeal),
            "delete_contact" => Some(UndoKind::DeleteContact),
            "revert_deal" => Some(UndoKind::RevertDeal),
            _ => None,
        }
    }
}

/// A compensating operation offered to the client after a mutating tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoAction {
    #[serde(rename = "type")]
    pub kind: UndoKind,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_values: Option<Map<String, Value>>,
    pub label: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Todos (turn-scoped)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in_progress",
            TodoStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(TodoStatus::Pending),
            "in_progress" => Some(TodoStatus::InProgress),
            "completed" => Some(TodoStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub index: usize,
    pub content: String,
    pub active_form: String,
    pub status: TodoStatus,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory, audit, profile
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryFact {
    pub id: String,
    pub owner_id: String,
    pub fact: String,
    pub category: String,
    #[serde(default)]
    pub source_conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemoryFact {
    pub fact: String,
    pub category: String,
    pub source_conversation_id: Option<String>,
}

/// Append-only audit row written for every tool invocation that touches
/// the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHistoryRecord {
    pub id: String,
    pub owner_id: String,
    pub task_type: String,
    pub description: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTaskRecord {
    pub task_type: String,
    pub description: String,
    pub metadata: Value,
}

/// The owner's business facts, injected into the cacheable profile tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub owner_id: String,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub brokerage: Option<String>,
    #[serde(default)]
    pub market_area: Option<String>,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default)]
    pub years_experience: Option<u32>,
    #[serde(default)]
    pub brand_voice: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_deal() -> Deal {
        let now = Utc::now();
        Deal {
            id: "d1".into(),
            owner_id: "o1".into(),
            property_address: "123 Main St".into(),
            city: Some("Austin".into()),
            state: Some("TX".into()),
            zip_code: None,
            client_name: None,
            client_email: None,
            client_phone: None,
            deal_type: None,
            stage: DealStage::Active,
            list_price: Some(450_000.0),
            offer_price: None,
            sale_price: None,
            closing_date: None,
            inspection_deadline: None,
            appraisal_deadline: None,
            financing_deadline: None,
            notes: None,
            bedrooms: None,
            bathrooms: None,
            square_feet: None,
            year_built: None,
            lot_size: None,
            property_type: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stage_parse_normalizes_spacing() {
        assert_eq!(DealStage::parse("Under Contract"), Some(DealStage::UnderContract));
        assert_eq!(DealStage::parse("under-contract"), Some(DealStage::UnderContract));
        assert_eq!(DealStage::parse("escrow"), None);
    }

    #[test]
    fn patch_previous_values_cover_only_touched_fields() {
        let deal = sample_deal();
        let mut patch = DealPatch::new();
        patch.set(DealField::Stage, json!("pending"));
        patch.set(DealField::ListPrice, json!(440000.0));

        let prev = patch.previous_values(&deal);
        assert_eq!(prev.len(), 2);
        assert_eq!(prev["stage"], json!("active"));
        assert_eq!(prev["list_price"], json!(450000.0));
    }

    #[test]
    fn patch_apply_then_revert_restores_fields() {
        let deal = sample_deal();
        let mut patch = DealPatch::new();
        patch.set(DealField::Stage, json!("closed"));
        let prev = patch.previous_values(&deal);

        let updated = patch.apply(&deal, Utc::now()).unwrap();
        assert_eq!(updated.stage, DealStage::Closed);

        let revert = DealPatch::from_map(&prev).unwrap();
        let restored = revert.apply(&updated, Utc::now()).unwrap();
        assert_eq!(restored.stage, DealStage::Active);
    }

    #[test]
    fn patch_from_map_rejects_unknown_field() {
        let mut map = Map::new();
        map.insert("owner_id".into(), json!("someone-else"));
        assert!(DealPatch::from_map(&map).is_err());
    }

    #[test]
    fn undo_action_serializes_type_tag() {
        let undo = UndoAction {
            kind: UndoKind::DeleteDeal,
            entity_id: "d1".into(),
            previous_values: None,
            label: "Undo create deal".into(),
        };
        let v = serde_json::to_value(&undo).unwrap();
        assert_eq!(v["type"], "delete_deal");
        assert!(v.get("previous_values").is_none());
    }
}
