//! Reversal of the undo actions handed to the client after mutating tools.
//!
//! The client enforces the undo window; this service reverses whatever it
//! is asked to, scoped to the requesting owner.

use std::sync::Arc;

use hb_domain::crm::{DealPatch, NewTaskRecord, UndoKind};
use hb_domain::error::Error;
use hb_domain::trace::TraceEvent;
use hb_store::CrmStore;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::background::Dispatcher;

/// Body of an undo request. `type` stays a string so an unknown kind can
/// be reported by name.
#[derive(Debug, Clone, Deserialize)]
pub struct UndoRequest {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub previous_values: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UndoError {
    UnknownType(String),
    MissingEntity,
    MissingPreviousValues,
    InvalidPreviousValues(String),
    NotFound(String),
    Store(String),
}

impl UndoError {
    /// HTTP status the endpoint answers with.
    pub fn status(&self) -> u16 {
        match self {
            UndoError::NotFound(_) => 404,
            UndoError::Store(_) => 500,
            _ => 400,
        }
    }
}

impl std::fmt::Display for UndoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UndoError::UnknownType(t) => write!(f, "Unknown undo type: {t}"),
            UndoError::MissingEntity => f.write_str("entity_id is required"),
            UndoError::MissingPreviousValues => {
                f.write_str("previous_values is required for revert_deal")
            }
            UndoError::InvalidPreviousValues(m) => write!(f, "Invalid previous_values: {m}"),
            UndoError::NotFound(what) => write!(f, "{what} not found"),
            UndoError::Store(m) => write!(f, "Undo failed: {m}"),
        }
    }
}

pub struct UndoService {
    store: Arc<dyn CrmStore>,
    dispatcher: Dispatcher,
}

impl UndoService {
    pub fn new(store: Arc<dyn CrmStore>, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Validate and apply one reversal. Nothing is written unless every
    /// check passes. Returns the success message.
    pub async fn reverse(&self, owner: &str, req: &UndoRequest) -> Result<String, UndoError> {
        let kind = UndoKind::parse(req.kind.trim())
            .ok_or_else(|| UndoError::UnknownType(req.kind.clone()))?;
        let entity_id = req
            .entity_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(UndoError::MissingEntity)?;

        let message = match kind {
            UndoKind::DeleteDeal => {
                let deleted = self
                    .store
                    .delete_deal(owner, entity_id)
                    .await
                    .map_err(store_err)?;
                if !deleted {
                    return Err(UndoError::NotFound("Deal".into()));
                }
                "Deal removed".to_string()
            }
            UndoKind::DeleteContact => {
                let deleted = self
                    .store
                    .delete_contact(owner, entity_id)
                    .await
                    .map_err(store_err)?;
                if !deleted {
                    return Err(UndoError::NotFound("Contact".into()));
                }
                "Contact removed".to_string()
            }
            UndoKind::RevertDeal => {
                let map = match &req.previous_values {
                    Some(Value::Object(m)) if !m.is_empty() => m,
                    Some(Value::Object(_)) | None | Some(Value::Null) => {
                        return Err(UndoError::MissingPreviousValues)
                    }
                    Some(_) => {
                        return Err(UndoError::InvalidPreviousValues(
                            "expected an object".into(),
                        ))
                    }
                };
                let patch = DealPatch::from_map(map)
                    .map_err(|e| UndoError::InvalidPreviousValues(e.to_string()))?;
                self.store
                    .update_deal(owner, entity_id, &patch)
                    .await
                    .map_err(|e| match e {
                        Error::NotFound(_) => UndoError::NotFound("Deal".into()),
                        other => store_err(other),
                    })?;
                "Deal changes reverted".to_string()
            }
        };

        TraceEvent::UndoApplied {
            owner_id: owner.to_string(),
            kind: kind.as_str().to_string(),
            entity_id: entity_id.to_string(),
        }
        .emit();

        let store = self.store.clone();
        let owner = owner.to_string();
        let record = NewTaskRecord {
            task_type: "undo".into(),
            description: format!("Undid {}: {message}", kind.as_str()),
            metadata: json!({ "type": kind.as_str(), "entity_id": entity_id }),
        };
        self.dispatcher.spawn("audit", async move {
            store.insert_task_record(&owner, record).await.map(|_| ())
        });

        Ok(message)
    }
}

fn store_err(e: Error) -> UndoError {
    tracing::warn!(error = %e, "undo store call failed");
    UndoError::Store(e.to_string())
}
