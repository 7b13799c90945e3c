use async_trait::async_trait;
use hb_domain::crm::{Contact, UndoAction, UndoKind};
use serde_json::{json, Value};

use super::contact_view;
use crate::executor::{Handled, ToolContext, ToolEnv, ToolFailure, ToolHandler, Touched};
use crate::input::{AddContactInput, SearchContactsInput, ToolInput, UpdateContactInput};

fn touched(contact: &Contact) -> Touched {
    Touched {
        contact_id: Some(contact.id.clone()),
        contact_type: contact.contact_type.clone(),
        ..Default::default()
    }
}

pub struct SearchContacts;

#[async_trait]
impl ToolHandler for SearchContacts {
    async fn handle(
        &self,
        env: &ToolEnv,
        ctx: &ToolContext,
        input: &Value,
    ) -> Result<Handled, ToolFailure> {
        let q = SearchContactsInput::from_value(input)?;
        let contacts = env
            .store
            .search_contacts(&ctx.owner_id, &q.query, q.limit)
            .await?;
        let views: Vec<Value> = contacts.iter().map(contact_view).collect();
        let mut handled = Handled::new(
            json!({ "contacts": views, "count": contacts.len() }),
            format!("Searched contacts for \"{}\"", q.query),
        );
        if let [only] = contacts.as_slice() {
            handled.touched = touched(only);
        }
        Ok(handled)
    }
}

pub struct AddContact;

#[async_trait]
impl ToolHandler for AddContact {
    async fn handle(
        &self,
        env: &ToolEnv,
        ctx: &ToolContext,
        input: &Value,
    ) -> Result<Handled, ToolFailure> {
        let AddContactInput { contact } = AddContactInput::from_value(input)?;
        let created = env.store.insert_contact(&ctx.owner_id, contact).await?;
        let mut handled = Handled::new(
            json!({ "contact": contact_view(&created) }),
            format!("Added contact {}", created.name),
        );
        handled.undo = Some(UndoAction {
            kind: UndoKind::DeleteContact,
            entity_id: created.id.clone(),
            previous_values: None,
            label: format!("Undo add {}", created.name),
        });
        handled.touched = touched(&created);
        Ok(handled)
    }
}

/// Contact edits are not undoable; they are recorded in the task history.
pub struct UpdateContact;

#[async_trait]
impl ToolHandler for UpdateContact {
    async fn handle(
        &self,
        env: &ToolEnv,
        ctx: &ToolContext,
        input: &Value,
    ) -> Result<Handled, ToolFailure> {
        let UpdateContactInput { contact_id, patch } = UpdateContactInput::from_value(input)?;
        let updated = env
            .store
            .update_contact(&ctx.owner_id, &contact_id, &patch)
            .await?;
        let mut handled = Handled::new(
            json!({ "contact": contact_view(&updated) }),
            format!("Updated contact {}", updated.name),
        );
        handled.touched = touched(&updated);
        Ok(handled)
    }
}
