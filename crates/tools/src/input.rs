//! Typed tool inputs. Each one is built from the model's raw JSON through a
//! validating constructor, so handlers only ever see well-formed values.

use chrono::NaiveDate;
use hb_domain::crm::{ContactPatch, DealField, DealPatch, DealStage, NewContact, NewDeal, TodoStatus};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

/// A rejected input. The message is returned to the model verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct InputError(pub String);

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for InputError {
    fn from(s: String) -> Self {
        InputError(s)
    }
}

impl From<&str> for InputError {
    fn from(s: &str) -> Self {
        InputError(s.to_string())
    }
}

/// Construction of a validated input from raw tool arguments.
pub trait ToolInput: Sized {
    fn from_value(input: &Value) -> Result<Self, InputError>;
}

/// `null` arguments are treated as an empty object.
fn decode<T: DeserializeOwned>(input: &Value) -> Result<T, InputError> {
    let value = if input.is_null() {
        Value::Object(Map::new())
    } else {
        input.clone()
    };
    serde_json::from_value(value).map_err(|e| InputError(format!("Invalid input: {e}")))
}

fn as_object(input: &Value) -> Result<Map<String, Value>, InputError> {
    match input {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        _ => Err("Invalid input: expected an object".into()),
    }
}

/// Trimmed, non-empty copy of an optional string.
fn clean(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Coercions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Accept `450000`, `"450000"`, `"$450,000"`, `"450k"` or `"1.2M"`.
pub fn coerce_price(value: &Value) -> Result<Option<f64>, InputError> {
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_price_text(s),
        _ => None,
    };
    match parsed {
        Some(p) if p.is_finite() && p >= 0.0 => Ok(Some(p)),
        _ => Err(InputError(format!("Invalid price: {value}"))),
    }
}

fn parse_price_text(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '_'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let (digits, multiplier) = match cleaned.chars().last() {
        Some('k' | 'K') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('m' | 'M') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };
    digits.parse::<f64>().ok().map(|v| v * multiplier)
}

/// Dates must be ISO `YYYY-MM-DD` so lexical comparison orders them.
pub fn validate_date(field: &str, raw: &str) -> Result<String, InputError> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| InputError(format!("Invalid {field}: '{raw}'. Use YYYY-MM-DD.")))
}

pub fn validate_stage(raw: &str) -> Result<DealStage, InputError> {
    DealStage::parse(raw).ok_or_else(|| {
        InputError(format!(
            "Invalid stage '{raw}'. Allowed values: {}",
            DealStage::allowed_values()
        ))
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deals
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a tool names the deal it works on.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DealLookup {
    #[serde(default)]
    pub deal_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl DealLookup {
    fn cleaned(self) -> Self {
        Self {
            deal_id: clean(self.deal_id),
            address: clean(self.address),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.deal_id.is_none() && self.address.is_none()
    }
}

impl ToolInput for DealLookup {
    fn from_value(input: &Value) -> Result<Self, InputError> {
        let lookup = decode::<DealLookup>(input)?.cleaned();
        if lookup.is_empty() {
            return Err("Provide deal_id or address".into());
        }
        Ok(lookup)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateDealInput {
    pub deal: NewDeal,
}

#[derive(Deserialize)]
struct RawCreateDeal {
    #[serde(default)]
    property_address: Option<String>,
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    client_email: Option<String>,
    #[serde(default)]
    client_phone: Option<String>,
    #[serde(default)]
    deal_type: Option<String>,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    list_price: Value,
    #[serde(default)]
    closing_date: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl ToolInput for CreateDealInput {
    fn from_value(input: &Value) -> Result<Self, InputError> {
        let raw: RawCreateDeal = decode(input)?;
        let property_address =
            clean(raw.property_address).ok_or("property_address is required")?;
        let stage = match clean(raw.stage) {
            Some(s) => validate_stage(&s)?,
            None => DealStage::Lead,
        };
        let deal_type = match clean(raw.deal_type).map(|t| t.to_ascii_lowercase()) {
            Some(t) if t == "listing" || t == "buyer" => Some(t),
            Some(t) => {
                return Err(InputError(format!(
                    "Invalid deal_type '{t}'. Allowed values: listing, buyer"
                )))
            }
            None => None,
        };
        let closing_date = match clean(raw.closing_date) {
            Some(d) => Some(validate_date("closing_date", &d)?),
            None => None,
        };
        Ok(Self {
            deal: NewDeal {
                property_address,
                city: None,
                state: None,
                zip_code: None,
                client_name: clean(raw.client_name),
                client_email: clean(raw.client_email),
                client_phone: clean(raw.client_phone),
                deal_type,
                stage,
                list_price: coerce_price(&raw.list_price)?,
                closing_date,
                notes: clean(raw.notes),
            },
        })
    }
}

/// A sparse update. Only the fields present in the input are written.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDealInput {
    pub target: DealLookup,
    pub patch: DealPatch,
}

impl ToolInput for UpdateDealInput {
    fn from_value(input: &Value) -> Result<Self, InputError> {
        let mut map = as_object(input)?;
        let target = DealLookup {
            deal_id: map.remove("deal_id").and_then(|v| v.as_str().map(str::to_string)),
            address: map.remove("address").and_then(|v| v.as_str().map(str::to_string)),
        }
        .cleaned();
        if target.is_empty() {
            return Err("Provide deal_id or address".into());
        }

        let mut patch = DealPatch::new();
        for (key, value) in map {
            let field = DealField::parse(&key)
                .ok_or_else(|| InputError(format!("Unknown deal field: {key}")))?;
            let value = match (field, &value) {
                (DealField::Stage, Value::String(s)) => {
                    Value::String(validate_stage(s)?.as_str().to_string())
                }
                (DealField::Stage, other) => {
                    return Err(InputError(format!(
                        "Invalid stage '{other}'. Allowed values: {}",
                        DealStage::allowed_values()
                    )))
                }
                (f, v) if f.is_price() => match coerce_price(v)? {
                    Some(p) => serde_json::json!(p),
                    None => Value::Null,
                },
                (f, Value::String(s)) if hb_domain::crm::DEADLINE_FIELDS.contains(&f) => {
                    Value::String(validate_date(f.as_str(), s)?)
                }
                (_, v) => v.clone(),
            };
            patch.set(field, value);
        }
        if patch.is_empty() {
            return Err("No fields to update".into());
        }
        Ok(Self { target, patch })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contacts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq)]
pub struct SearchContactsInput {
    pub query: String,
    pub limit: usize,
}

#[derive(Deserialize)]
struct RawSearch {
    #[serde(default)]
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

impl ToolInput for SearchContactsInput {
    fn from_value(input: &Value) -> Result<Self, InputError> {
        let raw: RawSearch = decode(input)?;
        Ok(Self {
            query: raw.query.trim().to_string(),
            limit: raw.limit.unwrap_or(10).clamp(1, 50),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddContactInput {
    pub contact: NewContact,
}

#[derive(Deserialize)]
struct RawContact {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    contact_type: Option<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl ToolInput for AddContactInput {
    fn from_value(input: &Value) -> Result<Self, InputError> {
        let raw: RawContact = decode(input)?;
        let name = clean(raw.name).ok_or("Contact name is required")?;
        Ok(Self {
            contact: NewContact {
                name,
                email: clean(raw.email),
                phone: clean(raw.phone),
                contact_type: clean(raw.contact_type).map(|t| t.to_ascii_lowercase()),
                notes: clean(raw.notes),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateContactInput {
    pub contact_id: String,
    pub patch: ContactPatch,
}

#[derive(Deserialize)]
struct RawUpdateContact {
    #[serde(default)]
    contact_id: Option<String>,
    #[serde(flatten)]
    fields: RawContact,
}

impl ToolInput for UpdateContactInput {
    fn from_value(input: &Value) -> Result<Self, InputError> {
        let raw: RawUpdateContact = decode(input)?;
        let contact_id = clean(raw.contact_id).ok_or("contact_id is required")?;
        let patch = ContactPatch {
            name: clean(raw.fields.name),
            email: clean(raw.fields.email),
            phone: clean(raw.fields.phone),
            contact_type: clean(raw.fields.contact_type).map(|t| t.to_ascii_lowercase()),
            notes: clean(raw.fields.notes),
        };
        if patch.is_empty() {
            return Err("No fields to update".into());
        }
        Ok(Self { contact_id, patch })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Drafting, enrichment, files
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input of the three drafting tools. The deal is optional; everything
/// besides the lookup keys is passed back to the model as the request.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftInput {
    pub target: DealLookup,
    pub options: Map<String, Value>,
}

impl ToolInput for DraftInput {
    fn from_value(input: &Value) -> Result<Self, InputError> {
        let mut options = as_object(input)?;
        let target = DealLookup {
            deal_id: options.remove("deal_id").and_then(|v| v.as_str().map(str::to_string)),
            address: options.remove("address").and_then(|v| v.as_str().map(str::to_string)),
        }
        .cleaned();
        Ok(Self { target, options })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnrichInput {
    pub address: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub deal_id: Option<String>,
}

impl ToolInput for EnrichInput {
    fn from_value(input: &Value) -> Result<Self, InputError> {
        let raw: EnrichInput = decode(input)?;
        let address = raw.address.trim().to_string();
        if address.is_empty() {
            return Err("address is required".into());
        }
        Ok(Self {
            address,
            city: clean(raw.city),
            state: clean(raw.state).map(|s| s.to_ascii_uppercase()),
            deal_id: clean(raw.deal_id),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateFileInput {
    pub filename: String,
    pub content: String,
    pub format: String,
}

impl ToolInput for CreateFileInput {
    fn from_value(input: &Value) -> Result<Self, InputError> {
        let raw: CreateFileInput = decode(input)?;
        let filename = raw.filename.trim().to_string();
        if filename.is_empty() {
            return Err("filename is required".into());
        }
        let format = raw.format.trim().trim_start_matches('.').to_ascii_lowercase();
        if crate::files::mime_for(&format).is_none() {
            return Err(InputError(format!(
                "Unsupported format '{}'. Allowed values: {}",
                raw.format,
                crate::files::FORMATS.join(", ")
            )));
        }
        Ok(Self {
            filename,
            content: raw.content,
            format,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Todos
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub const MAX_TODOS: usize = 20;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TodoSpec {
    pub content: String,
    #[serde(default)]
    pub active_form: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateTodosInput {
    pub todos: Vec<TodoSpec>,
}

impl ToolInput for CreateTodosInput {
    fn from_value(input: &Value) -> Result<Self, InputError> {
        let raw: CreateTodosInput = decode(input)?;
        if raw.todos.is_empty() {
            return Err("todos must not be empty".into());
        }
        if raw.todos.len() > MAX_TODOS {
            return Err(InputError(format!("At most {MAX_TODOS} todos")));
        }
        let todos = raw
            .todos
            .into_iter()
            .map(|t| {
                let content = t.content.trim().to_string();
                let active_form = match t.active_form.trim() {
                    "" => content.clone(),
                    s => s.to_string(),
                };
                TodoSpec { content, active_form }
            })
            .collect::<Vec<_>>();
        if todos.iter().any(|t| t.content.is_empty()) {
            return Err("Every todo needs content".into());
        }
        Ok(Self { todos })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTodoInput {
    pub index: usize,
    pub status: TodoStatus,
}

#[derive(Deserialize)]
struct RawUpdateTodo {
    index: usize,
    status: String,
}

impl ToolInput for UpdateTodoInput {
    fn from_value(input: &Value) -> Result<Self, InputError> {
        let raw: RawUpdateTodo = decode(input)?;
        let status = TodoStatus::parse(raw.status.trim()).ok_or_else(|| {
            InputError(format!(
                "Invalid status '{}'. Allowed values: pending, in_progress, completed",
                raw.status
            ))
        })?;
        Ok(Self {
            index: raw.index,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prices_accept_common_spellings() {
        assert_eq!(coerce_price(&json!(450000)).unwrap(), Some(450000.0));
        assert_eq!(coerce_price(&json!("$450,000")).unwrap(), Some(450000.0));
        assert_eq!(coerce_price(&json!("450k")).unwrap(), Some(450000.0));
        assert_eq!(coerce_price(&json!("1.2M")).unwrap(), Some(1_200_000.0));
        assert_eq!(coerce_price(&Value::Null).unwrap(), None);
        assert!(coerce_price(&json!("call me")).is_err());
        assert!(coerce_price(&json!(-5)).is_err());
    }

    #[test]
    fn create_deal_requires_address_and_coerces_price() {
        let err = CreateDealInput::from_value(&json!({ "list_price": 1 })).unwrap_err();
        assert!(err.0.contains("property_address"));

        let ok = CreateDealInput::from_value(&json!({
            "property_address": " 123 Main St, Austin TX ",
            "list_price": "$450,000",
            "stage": "Active"
        }))
        .unwrap();
        assert_eq!(ok.deal.property_address, "123 Main St, Austin TX");
        assert_eq!(ok.deal.list_price, Some(450000.0));
        assert_eq!(ok.deal.stage, DealStage::Active);
    }

    #[test]
    fn update_deal_rejects_unknown_stage_with_allowed_list() {
        let err =
            UpdateDealInput::from_value(&json!({ "deal_id": "d1", "stage": "escrow" })).unwrap_err();
        assert!(err.0.starts_with("Invalid stage 'escrow'"));
        assert!(err.0.contains("under_contract"));
    }

    #[test]
    fn update_deal_builds_sparse_patch() {
        let input = UpdateDealInput::from_value(&json!({
            "deal_id": "d1",
            "stage": "under contract",
            "offer_price": "440k"
        }))
        .unwrap();
        assert_eq!(input.patch.fields().count(), 2);
        assert_eq!(input.patch.0[&DealField::Stage], json!("under_contract"));
        assert_eq!(input.patch.0[&DealField::OfferPrice], json!(440000.0));
    }

    #[test]
    fn update_deal_rejects_unknown_fields_and_empty_patches() {
        assert!(UpdateDealInput::from_value(&json!({ "deal_id": "d1", "owner_id": "x" })).is_err());
        assert!(UpdateDealInput::from_value(&json!({ "deal_id": "d1" })).is_err());
        assert!(UpdateDealInput::from_value(&json!({ "stage": "lead" })).is_err());
    }

    #[test]
    fn deadline_dates_must_be_iso() {
        let err = UpdateDealInput::from_value(&json!({
            "deal_id": "d1",
            "closing_date": "March 3"
        }))
        .unwrap_err();
        assert!(err.0.contains("YYYY-MM-DD"));
    }

    #[test]
    fn add_contact_requires_name() {
        assert!(AddContactInput::from_value(&json!({ "email": "a@b.co" })).is_err());
        assert!(AddContactInput::from_value(&json!({ "name": "   " })).is_err());
        let ok = AddContactInput::from_value(&json!({ "name": "Sam Lee", "contact_type": "Buyer" }))
            .unwrap();
        assert_eq!(ok.contact.contact_type.as_deref(), Some("buyer"));
    }

    #[test]
    fn draft_input_splits_lookup_from_options() {
        let d = DraftInput::from_value(&json!({
            "address": "123 Main",
            "platform": "instagram"
        }))
        .unwrap();
        assert_eq!(d.target.address.as_deref(), Some("123 Main"));
        assert_eq!(d.options["platform"], "instagram");
        assert!(!d.options.contains_key("address"));
    }

    #[test]
    fn todo_inputs_validate() {
        let t = CreateTodosInput::from_value(&json!({
            "todos": [{ "content": "Create the deal" }]
        }))
        .unwrap();
        assert_eq!(t.todos[0].active_form, "Create the deal");
        assert!(CreateTodosInput::from_value(&json!({ "todos": [] })).is_err());
        assert!(UpdateTodoInput::from_value(&json!({ "index": 0, "status": "done" })).is_err());
    }
}
