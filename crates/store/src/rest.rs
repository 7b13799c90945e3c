//! REST implementation of [`CrmStore`] and [`FileStore`] against a
//! PostgREST-style hosted database with an attached object-storage API.
//!
//! Every query carries an explicit `owner_id=eq.<owner>` filter in
//! addition to whatever row-level security the store enforces. Transient
//! failures (5xx / timeouts) are retried with exponential back-off.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use hb_domain::config::{FilesConfig, StoreConfig};
use hb_domain::crm::{
    BusinessProfile, Contact, ContactPatch, Conversation, Deal, DealPatch, MemoryFact,
    MessageMetadata, NewContact, NewDeal, NewMemoryFact, NewTaskRecord, StoredMessage,
    TaskHistoryRecord,
};
use hb_domain::error::{Error, Result};
use hb_domain::tool::Role;
use hb_domain::trace::TraceEvent;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::traits::{CrmStore, FileStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A REST client for the hosted store.
///
/// Created once and shared for the lifetime of the process; the
/// underlying `reqwest::Client` maintains a connection pool.
#[derive(Debug, Clone)]
pub struct RestStore {
    http: Client,
    base_url: String,
    service_key: String,
    max_retries: u32,
    bucket: String,
}

impl RestStore {
    /// Build a client from the `[store]` and `[files]` sections. The
    /// service key is read from the environment variable the config names.
    pub fn new(cfg: &StoreConfig, files: &FilesConfig) -> Result<Self> {
        let service_key = std::env::var(&cfg.service_key_env).map_err(|_| {
            Error::Config(format!(
                "store service key env var '{}' is not set",
                cfg.service_key_env
            ))
        })?;
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            service_key,
            max_retries: cfg.max_retries,
            bucket: files.bucket.clone(),
        })
    }

    // ── request helpers ──────────────────────────────────────────────

    fn decorate(&self, rb: RequestBuilder) -> RequestBuilder {
        rb.header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("X-Client-Info", "homebase")
    }

    fn table(&self, name: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, name)
    }

    fn storage(&self, path: &str) -> String {
        format!("{}/storage/v1{}", self.base_url, path)
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Execute a request with retry + exponential back-off on transient errors.
    ///
    /// * Retries on 5xx status codes and on transport errors.
    /// * Does **not** retry on 4xx (client errors are permanent).
    /// * Emits a `TraceEvent::StoreCall` after every attempt.
    async fn execute_with_retry(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            let start = Instant::now();
            let result = self.decorate(build_request()).send().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    TraceEvent::StoreCall {
                        endpoint: endpoint.to_owned(),
                        status,
                        duration_ms,
                    }
                    .emit();

                    if resp.status().is_server_error() {
                        let body = resp.text().await.unwrap_or_default();
                        last_err = Some(Error::Store(format!(
                            "{endpoint} returned {status}: {body}"
                        )));
                        continue;
                    }

                    if resp.status().is_client_error() {
                        let resp_status = resp.status();
                        let body = resp.text().await.unwrap_or_default();
                        if resp_status == StatusCode::UNAUTHORIZED
                            || resp_status == StatusCode::FORBIDDEN
                        {
                            return Err(Error::Auth(format!(
                                "{endpoint} auth failed ({status}): {body}"
                            )));
                        }
                        return Err(Error::Store(format!(
                            "{endpoint} returned {status}: {body}"
                        )));
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    let status = e.status().map(|s| s.as_u16()).unwrap_or(0);
                    TraceEvent::StoreCall {
                        endpoint: endpoint.to_owned(),
                        status,
                        duration_ms,
                    }
                    .emit();
                    last_err = Some(from_reqwest(e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Store(format!("{endpoint}: all retries exhausted"))))
    }

    async fn rows<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Vec<T>> {
        let resp = self.execute_with_retry(endpoint, build_request).await?;
        let body = resp.text().await.map_err(from_reqwest)?;
        serde_json::from_str(&body)
            .map_err(|e| Error::Store(format!("failed to parse {endpoint} response: {e}: {body}")))
    }

    async fn first_row<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Option<T>> {
        Ok(self.rows(endpoint, build_request).await?.into_iter().next())
    }

    /// Insert one row and return its stored representation.
    async fn insert_row<T: DeserializeOwned>(&self, table: &str, row: Value) -> Result<T> {
        let url = self.table(table);
        let endpoint = format!("POST {table}");
        self.first_row(&endpoint, || {
            self.http
                .post(&url)
                .header("Prefer", "return=representation")
                .json(&row)
        })
        .await?
        .ok_or_else(|| Error::Store(format!("{endpoint}: no row returned")))
    }
}

fn eq(v: &str) -> String {
    format!("eq.{v}")
}

/// Strip characters with meaning inside a PostgREST filter expression.
fn filter_literal(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '%' | '"' | '\\'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn with_owner(owner: &str, body: Value) -> Value {
    let mut body = body;
    if let Value::Object(obj) = &mut body {
        obj.insert("owner_id".into(), Value::String(owner.to_string()));
    }
    body
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl CrmStore for RestStore {
    async fn list_active_deals(&self, owner: &str) -> Result<Vec<Deal>> {
        let url = self.table("deals");
        self.rows("GET deals", || {
            self.http.get(&url).query(&[
                ("owner_id", eq(owner)),
                ("stage", "not.in.(closed,lost)".to_string()),
                ("order", "updated_at.desc".to_string()),
            ])
        })
        .await
    }

    async fn get_deal(&self, owner: &str, deal_id: &str) -> Result<Option<Deal>> {
        let url = self.table("deals");
        self.first_row("GET deals", || {
            self.http
                .get(&url)
                .query(&[("owner_id", eq(owner)), ("id", eq(deal_id))])
        })
        .await
    }

    async fn find_deal_by_address(&self, owner: &str, fragment: &str) -> Result<Option<Deal>> {
        let needle = filter_literal(fragment);
        if needle.is_empty() {
            return Ok(None);
        }
        let url = self.table("deals");
        self.first_row("GET deals", || {
            self.http.get(&url).query(&[
                ("owner_id", eq(owner)),
                ("property_address", format!("ilike.*{needle}*")),
                ("order", "updated_at.desc".to_string()),
                ("limit", "1".to_string()),
            ])
        })
        .await
    }

    async fn insert_deal(&self, owner: &str, deal: NewDeal) -> Result<Deal> {
        self.insert_row("deals", with_owner(owner, serde_json::to_value(deal)?))
            .await
    }

    async fn update_deal(&self, owner: &str, deal_id: &str, patch: &DealPatch) -> Result<Deal> {
        let url = self.table("deals");
        let mut body = serde_json::to_value(patch)?;
        if let Value::Object(obj) = &mut body {
            obj.insert("updated_at".into(), json!(Utc::now()));
        }
        self.first_row("PATCH deals", || {
            self.http
                .patch(&url)
                .query(&[("owner_id", eq(owner)), ("id", eq(deal_id))])
                .header("Prefer", "return=representation")
                .json(&body)
        })
        .await?
        .ok_or_else(|| Error::NotFound(format!("deal {deal_id}")))
    }

    async fn delete_deal(&self, owner: &str, deal_id: &str) -> Result<bool> {
        let url = self.table("deals");
        let rows: Vec<Value> = self
            .rows("DELETE deals", || {
                self.http
                    .delete(&url)
                    .query(&[("owner_id", eq(owner)), ("id", eq(deal_id))])
                    .header("Prefer", "return=representation")
            })
            .await?;
        Ok(!rows.is_empty())
    }

    async fn search_contacts(&self, owner: &str, query: &str, limit: usize) -> Result<Vec<Contact>> {
        let url = self.table("contacts");
        let needle = filter_literal(query);
        let limit = limit.to_string();
        self.rows("GET contacts", || {
            let mut params = vec![
                ("owner_id", eq(owner)),
                ("order", "updated_at.desc".to_string()),
                ("limit", limit.clone()),
            ];
            if !needle.is_empty() {
                params.push((
                    "or",
                    format!(
                        "(name.ilike.*{needle}*,email.ilike.*{needle}*,phone.ilike.*{needle}*)"
                    ),
                ));
            }
            self.http.get(&url).query(&params)
        })
        .await
    }

    async fn insert_contact(&self, owner: &str, contact: NewContact) -> Result<Contact> {
        self.insert_row("contacts", with_owner(owner, serde_json::to_value(contact)?))
            .await
    }

    async fn update_contact(
        &self,
        owner: &str,
        contact_id: &str,
        patch: &ContactPatch,
    ) -> Result<Contact> {
        let url = self.table("contacts");
        let mut body = serde_json::to_value(patch)?;
        if let Value::Object(obj) = &mut body {
            obj.insert("updated_at".into(), json!(Utc::now()));
        }
        self.first_row("PATCH contacts", || {
            self.http
                .patch(&url)
                .query(&[("owner_id", eq(owner)), ("id", eq(contact_id))])
                .header("Prefer", "return=representation")
                .json(&body)
        })
        .await?
        .ok_or_else(|| Error::NotFound(format!("contact {contact_id}")))
    }

    async fn delete_contact(&self, owner: &str, contact_id: &str) -> Result<bool> {
        let url = self.table("contacts");
        let rows: Vec<Value> = self
            .rows("DELETE contacts", || {
                self.http
                    .delete(&url)
                    .query(&[("owner_id", eq(owner)), ("id", eq(contact_id))])
                    .header("Prefer", "return=representation")
            })
            .await?;
        Ok(!rows.is_empty())
    }

    async fn get_conversation(
        &self,
        owner: &str,
        conversation_id: &str,
    ) -> Result<Option<Conversation>> {
        let url = self.table("conversations");
        self.first_row("GET conversations", || {
            self.http
                .get(&url)
                .query(&[("owner_id", eq(owner)), ("id", eq(conversation_id))])
        })
        .await
    }

    async fn create_conversation(&self, owner: &str, conversation_id: &str) -> Result<Conversation> {
        self.insert_row(
            "conversations",
            json!({ "id": conversation_id, "owner_id": owner }),
        )
        .await
    }

    async fn set_conversation_title(
        &self,
        owner: &str,
        conversation_id: &str,
        title: &str,
    ) -> Result<()> {
        let url = self.table("conversations");
        let body = json!({ "title": title });
        self.execute_with_retry("PATCH conversations", || {
            self.http
                .patch(&url)
                .query(&[("owner_id", eq(owner)), ("id", eq(conversation_id))])
                .json(&body)
        })
        .await?;
        Ok(())
    }

    async fn latest_other_conversation(
        &self,
        owner: &str,
        exclude: &str,
    ) -> Result<Option<Conversation>> {
        let url = self.table("conversations");
        self.first_row("GET conversations", || {
            self.http.get(&url).query(&[
                ("owner_id", eq(owner)),
                ("id", format!("neq.{exclude}")),
                ("order", "updated_at.desc".to_string()),
                ("limit", "1".to_string()),
            ])
        })
        .await
    }

    async fn insert_message(
        &self,
        owner: &str,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Option<MessageMetadata>,
    ) -> Result<StoredMessage> {
        let row: StoredMessage = self
            .insert_row(
                "messages",
                json!({
                    "conversation_id": conversation_id,
                    "owner_id": owner,
                    "role": role,
                    "content": content,
                    "metadata": metadata,
                }),
            )
            .await?;

        let url = self.table("conversations");
        let touch = json!({ "updated_at": Utc::now() });
        if let Err(e) = self
            .execute_with_retry("PATCH conversations", || {
                self.http
                    .patch(&url)
                    .query(&[("owner_id", eq(owner)), ("id", eq(conversation_id))])
                    .json(&touch)
            })
            .await
        {
            tracing::warn!(error = %e, conversation_id, "failed to bump conversation updated_at");
        }
        Ok(row)
    }

    async fn list_messages(
        &self,
        owner: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let url = self.table("messages");
        let limit = limit.to_string();
        let mut rows: Vec<StoredMessage> = self
            .rows("GET messages", || {
                self.http.get(&url).query(&[
                    ("owner_id", eq(owner)),
                    ("conversation_id", eq(conversation_id)),
                    ("order", "created_at.desc".to_string()),
                    ("limit", limit.clone()),
                ])
            })
            .await?;
        rows.reverse();
        Ok(rows)
    }

    async fn get_profile(&self, owner: &str) -> Result<Option<BusinessProfile>> {
        let url = self.table("profiles");
        self.first_row("GET profiles", || {
            self.http.get(&url).query(&[("owner_id", eq(owner))])
        })
        .await
    }

    async fn list_memory_facts(&self, owner: &str, limit: usize) -> Result<Vec<MemoryFact>> {
        let url = self.table("memory_facts");
        let limit = limit.to_string();
        self.rows("GET memory_facts", || {
            self.http.get(&url).query(&[
                ("owner_id", eq(owner)),
                ("order", "created_at.asc".to_string()),
                ("limit", limit.clone()),
            ])
        })
        .await
    }

    async fn insert_memory_fact(&self, owner: &str, fact: NewMemoryFact) -> Result<MemoryFact> {
        self.insert_row("memory_facts", with_owner(owner, serde_json::to_value(fact)?))
            .await
    }

    async fn insert_task_record(
        &self,
        owner: &str,
        record: NewTaskRecord,
    ) -> Result<TaskHistoryRecord> {
        self.insert_row("task_history", with_owner(owner, serde_json::to_value(record)?))
            .await
    }

    async fn recent_task_records(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<TaskHistoryRecord>> {
        let url = self.table("task_history");
        let limit = limit.to_string();
        self.rows("GET task_history", || {
            self.http.get(&url).query(&[
                ("owner_id", eq(owner)),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.clone()),
            ])
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        let url = self.table("profiles");
        self.execute_with_retry("GET profiles", || {
            self.http.get(&url).query(&[("limit", "0")])
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FileStore for RestStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = self.storage(&format!("/object/{}/{}", self.bucket, path));
        self.execute_with_retry("POST storage/object", || {
            self.http
                .post(&url)
                .header("Content-Type", content_type)
                .header("x-upsert", "true")
                .body(bytes.clone())
        })
        .await?;
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String> {
        let url = self.storage(&format!("/object/sign/{}/{}", self.bucket, path));
        let body = json!({ "expiresIn": ttl.as_secs() });
        let resp = self
            .execute_with_retry("POST storage/sign", || self.http.post(&url).json(&body))
            .await?;
        let v: Value = resp.json().await.map_err(from_reqwest)?;
        let signed = v
            .get("signedURL")
            .and_then(|s| s.as_str())
            .ok_or_else(|| Error::Store("sign response missing signedURL".into()))?;
        Ok(self.storage(signed))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error conversion helper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Convert a `reqwest::Error` into a domain `Error`.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}
