//! Store interfaces. Every method is scoped to one owner: implementations
//! must never return or touch rows belonging to anyone else.

use std::time::Duration;

use async_trait::async_trait;
use hb_domain::crm::{
    BusinessProfile, Contact, ContactPatch, Conversation, Deal, DealPatch, MemoryFact,
    MessageMetadata, NewContact, NewDeal, NewMemoryFact, NewTaskRecord, StoredMessage,
    TaskHistoryRecord,
};
use hb_domain::error::Result;
use hb_domain::tool::Role;

/// The hosted relational store holding deals, contacts, conversations,
/// messages, the business profile, memory facts and the audit log.
///
/// Implementations may talk to a PostgREST-style API or keep everything
/// in process for tests.
#[async_trait]
pub trait CrmStore: Send + Sync {
    // ── Deals ──────────────────────────────────────────────────────

    /// Deals whose stage is neither closed nor lost, newest first.
    async fn list_active_deals(&self, owner: &str) -> Result<Vec<Deal>>;

    async fn get_deal(&self, owner: &str, deal_id: &str) -> Result<Option<Deal>>;

    /// Most recently updated deal whose address contains `fragment`
    /// (case-insensitive).
    async fn find_deal_by_address(&self, owner: &str, fragment: &str) -> Result<Option<Deal>>;

    async fn insert_deal(&self, owner: &str, deal: NewDeal) -> Result<Deal>;

    /// Apply `patch` and return the updated row. `NotFound` if the deal
    /// does not exist for this owner.
    async fn update_deal(&self, owner: &str, deal_id: &str, patch: &DealPatch) -> Result<Deal>;

    /// Returns whether a row was deleted.
    async fn delete_deal(&self, owner: &str, deal_id: &str) -> Result<bool>;

    // ── Contacts ───────────────────────────────────────────────────

    /// Case-insensitive match on name, email or phone. An empty query
    /// lists the most recent contacts.
    async fn search_contacts(&self, owner: &str, query: &str, limit: usize) -> Result<Vec<Contact>>;

    async fn insert_contact(&self, owner: &str, contact: NewContact) -> Result<Contact>;

    async fn update_contact(
        &self,
        owner: &str,
        contact_id: &str,
        patch: &ContactPatch,
    ) -> Result<Contact>;

    async fn delete_contact(&self, owner: &str, contact_id: &str) -> Result<bool>;

    // ── Conversations & messages ───────────────────────────────────

    async fn get_conversation(&self, owner: &str, conversation_id: &str)
        -> Result<Option<Conversation>>;

    /// Create the conversation with the client-chosen id.
    async fn create_conversation(&self, owner: &str, conversation_id: &str) -> Result<Conversation>;

    async fn set_conversation_title(
        &self,
        owner: &str,
        conversation_id: &str,
        title: &str,
    ) -> Result<()>;

    /// The owner's most recently updated conversation other than `exclude`.
    async fn latest_other_conversation(
        &self,
        owner: &str,
        exclude: &str,
    ) -> Result<Option<Conversation>>;

    /// Append a message and bump the conversation's `updated_at`.
    async fn insert_message(
        &self,
        owner: &str,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Option<MessageMetadata>,
    ) -> Result<StoredMessage>;

    /// The most recent `limit` messages, returned oldest first.
    async fn list_messages(
        &self,
        owner: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>>;

    // ── Profile, memory, audit ─────────────────────────────────────

    async fn get_profile(&self, owner: &str) -> Result<Option<BusinessProfile>>;

    /// Facts ordered oldest first.
    async fn list_memory_facts(&self, owner: &str, limit: usize) -> Result<Vec<MemoryFact>>;

    async fn insert_memory_fact(&self, owner: &str, fact: NewMemoryFact) -> Result<MemoryFact>;

    async fn insert_task_record(&self, owner: &str, record: NewTaskRecord)
        -> Result<TaskHistoryRecord>;

    /// Newest first.
    async fn recent_task_records(&self, owner: &str, limit: usize)
        -> Result<Vec<TaskHistoryRecord>>;

    /// Cheap liveness probe for `/health`.
    async fn ping(&self) -> Result<()>;
}

/// Object storage for generated files.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// A URL granting read access to `path` for `ttl`.
    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String>;
}
