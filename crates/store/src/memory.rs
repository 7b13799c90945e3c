//! Process-local store. Used in dev mode and by the test suites; all data
//! is lost when the process exits.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hb_domain::crm::{
    BusinessProfile, Contact, ContactPatch, Conversation, Deal, DealPatch, MemoryFact,
    MessageMetadata, NewContact, NewDeal, NewMemoryFact, NewTaskRecord, StoredMessage,
    TaskHistoryRecord,
};
use hb_domain::error::{Error, Result};
use hb_domain::tool::Role;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::traits::{CrmStore, FileStore};

#[derive(Default)]
struct Tables {
    deals: Vec<Deal>,
    contacts: Vec<Contact>,
    conversations: Vec<Conversation>,
    messages: Vec<StoredMessage>,
    profiles: HashMap<String, BusinessProfile>,
    facts: Vec<MemoryFact>,
    tasks: Vec<TaskHistoryRecord>,
}

/// In-memory [`CrmStore`]. Rows keep insertion order, which stands in for
/// timestamp ordering when several rows share the same instant.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Inspection helpers (dev + tests) ───────────────────────────

    pub fn put_profile(&self, profile: BusinessProfile) {
        self.tables
            .write()
            .profiles
            .insert(profile.owner_id.clone(), profile);
    }

    pub fn deals(&self, owner: &str) -> Vec<Deal> {
        self.tables
            .read()
            .deals
            .iter()
            .filter(|d| d.owner_id == owner)
            .cloned()
            .collect()
    }

    pub fn contacts(&self, owner: &str) -> Vec<Contact> {
        self.tables
            .read()
            .contacts
            .iter()
            .filter(|c| c.owner_id == owner)
            .cloned()
            .collect()
    }

    pub fn memory_facts(&self, owner: &str) -> Vec<MemoryFact> {
        self.tables
            .read()
            .facts
            .iter()
            .filter(|f| f.owner_id == owner)
            .cloned()
            .collect()
    }

    pub fn task_records(&self, owner: &str) -> Vec<TaskHistoryRecord> {
        self.tables
            .read()
            .tasks
            .iter()
            .filter(|t| t.owner_id == owner)
            .cloned()
            .collect()
    }

    pub fn messages(&self, owner: &str, conversation_id: &str) -> Vec<StoredMessage> {
        self.tables
            .read()
            .messages
            .iter()
            .filter(|m| m.owner_id == owner && m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CrmStore for InMemoryStore {
    async fn list_active_deals(&self, owner: &str) -> Result<Vec<Deal>> {
        let t = self.tables.read();
        Ok(t.deals
            .iter()
            .rev()
            .filter(|d| d.owner_id == owner && d.stage.is_active())
            .cloned()
            .collect())
    }

    async fn get_deal(&self, owner: &str, deal_id: &str) -> Result<Option<Deal>> {
        let t = self.tables.read();
        Ok(t.deals
            .iter()
            .find(|d| d.owner_id == owner && d.id == deal_id)
            .cloned())
    }

    async fn find_deal_by_address(&self, owner: &str, fragment: &str) -> Result<Option<Deal>> {
        let needle = fragment.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }
        let t = self.tables.read();
        Ok(t.deals
            .iter()
            .filter(|d| d.owner_id == owner)
            .filter(|d| d.property_address.to_lowercase().contains(&needle))
            .max_by_key(|d| d.updated_at)
            .cloned())
    }

    async fn insert_deal(&self, owner: &str, deal: NewDeal) -> Result<Deal> {
        let now = Utc::now();
        let row = Deal {
            id: new_id(),
            owner_id: owner.to_string(),
            property_address: deal.property_address,
            city: deal.city,
            state: deal.state,
            zip_code: deal.zip_code,
            client_name: deal.client_name,
            client_email: deal.client_email,
            client_phone: deal.client_phone,
            deal_type: deal.deal_type,
            stage: deal.stage,
            list_price: deal.list_price,
            offer_price: None,
            sale_price: None,
            closing_date: deal.closing_date,
            inspection_deadline: None,
            appraisal_deadline: None,
            financing_deadline: None,
            notes: deal.notes,
            bedrooms: None,
            bathrooms: None,
            square_feet: None,
            year_built: None,
            lot_size: None,
            property_type: None,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().deals.push(row.clone());
        Ok(row)
    }

    async fn update_deal(&self, owner: &str, deal_id: &str, patch: &DealPatch) -> Result<Deal> {
        let mut t = self.tables.write();
        let slot = t
            .deals
            .iter_mut()
            .find(|d| d.owner_id == owner && d.id == deal_id)
            .ok_or_else(|| Error::NotFound(format!("deal {deal_id}")))?;
        let updated = patch.apply(slot, Utc::now())?;
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete_deal(&self, owner: &str, deal_id: &str) -> Result<bool> {
        let mut t = self.tables.write();
        let before = t.deals.len();
        t.deals.retain(|d| !(d.owner_id == owner && d.id == deal_id));
        Ok(t.deals.len() != before)
    }

    async fn search_contacts(&self, owner: &str, query: &str, limit: usize) -> Result<Vec<Contact>> {
        let needle = query.trim().to_lowercase();
        let matches = |c: &Contact| {
            needle.is_empty()
                || c.name.to_lowercase().contains(&needle)
                || c.email
                    .as_deref()
                    .is_some_and(|e| e.to_lowercase().contains(&needle))
                || c.phone.as_deref().is_some_and(|p| p.contains(&needle))
        };
        let t = self.tables.read();
        Ok(t.contacts
            .iter()
            .rev()
            .filter(|c| c.owner_id == owner && matches(c))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_contact(&self, owner: &str, contact: NewContact) -> Result<Contact> {
        let now = Utc::now();
        let row = Contact {
            id: new_id(),
            owner_id: owner.to_string(),
            name: contact.name,
            email: contact.email,
            phone: contact.phone,
            contact_type: contact.contact_type,
            notes: contact.notes,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().contacts.push(row.clone());
        Ok(row)
    }

    async fn update_contact(
        &self,
        owner: &str,
        contact_id: &str,
        patch: &ContactPatch,
    ) -> Result<Contact> {
        let mut t = self.tables.write();
        let slot = t
            .contacts
            .iter_mut()
            .find(|c| c.owner_id == owner && c.id == contact_id)
            .ok_or_else(|| Error::NotFound(format!("contact {contact_id}")))?;
        *slot = patch.apply(slot, Utc::now());
        Ok(slot.clone())
    }

    async fn delete_contact(&self, owner: &str, contact_id: &str) -> Result<bool> {
        let mut t = self.tables.write();
        let before = t.contacts.len();
        t.contacts
            .retain(|c| !(c.owner_id == owner && c.id == contact_id));
        Ok(t.contacts.len() != before)
    }

    async fn get_conversation(
        &self,
        owner: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        let t = self.tables.read();
        Ok(t.conversations
            .iter()
            .find(|c| c.owner_id == owner && c.id == conversation_id)
            .cloned())
    }

    async fn create_conversation(&self, owner: &str, conversation_id: &str) -> Result<Conversation> {
        let mut t = self.tables.write();
        if t.conversations.iter().any(|c| c.id == conversation_id) {
            return Err(Error::Store(format!(
                "conversation {conversation_id} already exists"
            )));
        }
        let now = Utc::now();
        let row = Conversation {
            id: conversation_id.to_string(),
            owner_id: owner.to_string(),
            title: None,
            created_at: now,
            updated_at: now,
        };
        t.conversations.push(row.clone());
        Ok(row)
    }

    async fn set_conversation_title(
        &self,
        owner: &str,
        conversation_id: &str,
        title: &str,
    ) -> Result<()> {
        let mut t = self.tables.write();
        let conv = t
            .conversations
            .iter_mut()
            .find(|c| c.owner_id == owner && c.id == conversation_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
        conv.title = Some(title.to_string());
        Ok(())
    }

    async fn latest_other_conversation(
        &self,
        owner: &str,
        exclude: &str,
    ) -> Result<Option<Conversation>> {
        let t = self.tables.read();
        Ok(t.conversations
            .iter()
            .filter(|c| c.owner_id == owner && c.id != exclude)
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    async fn insert_message(
        &self,
        owner: &str,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Option<MessageMetadata>,
    ) -> Result<StoredMessage> {
        let now = Utc::now();
        let mut t = self.tables.write();
        let conv = t
            .conversations
            .iter_mut()
            .find(|c| c.owner_id == owner && c.id == conversation_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;
        conv.updated_at = now;

        let row = StoredMessage {
            id: new_id(),
            conversation_id: conversation_id.to_string(),
            owner_id: owner.to_string(),
            role,
            content: content.to_string(),
            metadata,
            created_at: now,
        };
        t.messages.push(row.clone());
        Ok(row)
    }

    async fn list_messages(
        &self,
        owner: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let t = self.tables.read();
        let mut recent: Vec<StoredMessage> = t
            .messages
            .iter()
            .rev()
            .filter(|m| m.owner_id == owner && m.conversation_id == conversation_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn get_profile(&self, owner: &str) -> Result<Option<BusinessProfile>> {
        Ok(self.tables.read().profiles.get(owner).cloned())
    }

    async fn list_memory_facts(&self, owner: &str, limit: usize) -> Result<Vec<MemoryFact>> {
        let t = self.tables.read();
        Ok(t.facts
            .iter()
            .filter(|f| f.owner_id == owner)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_memory_fact(&self, owner: &str, fact: NewMemoryFact) -> Result<MemoryFact> {
        let row = MemoryFact {
            id: new_id(),
            owner_id: owner.to_string(),
            fact: fact.fact,
            category: fact.category,
            source_conversation_id: fact.source_conversation_id,
            created_at: Utc::now(),
        };
        self.tables.write().facts.push(row.clone());
        Ok(row)
    }

    async fn insert_task_record(
        &self,
        owner: &str,
        record: NewTaskRecord,
    ) -> Result<TaskHistoryRecord> {
        let row = TaskHistoryRecord {
            id: new_id(),
            owner_id: owner.to_string(),
            task_type: record.task_type,
            description: record.description,
            metadata: record.metadata,
            created_at: Utc::now(),
        };
        self.tables.write().tasks.push(row.clone());
        Ok(row)
    }

    async fn recent_task_records(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<TaskHistoryRecord>> {
        let t = self.tables.read();
        Ok(t.tasks
            .iter()
            .rev()
            .filter(|r| r.owner_id == owner)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Files
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory [`FileStore`]; signed URLs use a `memory://` scheme.
#[derive(Default)]
pub struct InMemoryFileStore {
    objects: RwLock<HashMap<String, (Vec<u8>, String)>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes and content type for `path`.
    pub fn get(&self, path: &str) -> Option<(Vec<u8>, String)> {
        self.objects.read().get(path).cloned()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.objects
            .write()
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String> {
        if !self.objects.read().contains_key(path) {
            return Err(Error::NotFound(format!("object {path}")));
        }
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!("memory://{path}?expires={expires}"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
