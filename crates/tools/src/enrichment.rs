//! Property enrichment: an external property-data API plus the service that
//! composes a lookup with persisting the result onto a deal.
//!
//! `create_deal` calls [`Enricher::enrich`] directly after inserting the
//! deal, and `enrich_property` exposes the same service to the model. In
//! both cases a lookup failure is reported, never raised.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hb_domain::config::EnrichmentConfig;
use hb_domain::crm::{Deal, DealField, DealPatch};
use hb_domain::error::{Error, Result};
use hb_domain::trace::TraceEvent;
use hb_store::CrmStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Public record data for one property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub square_footage: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_built: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
}

impl PropertyRecord {
    /// Deal fields this record can fill in.
    pub fn to_patch(&self) -> DealPatch {
        let mut patch = DealPatch::new();
        if let Some(v) = self.bedrooms {
            patch.set(DealField::Bedrooms, json!(v));
        }
        if let Some(v) = self.bathrooms {
            patch.set(DealField::Bathrooms, json!(v));
        }
        if let Some(v) = self.square_footage {
            patch.set(DealField::SquareFeet, json!(v));
        }
        if let Some(v) = self.year_built {
            patch.set(DealField::YearBuilt, json!(v));
        }
        if let Some(v) = self.lot_size {
            patch.set(DealField::LotSize, json!(v));
        }
        if let Some(v) = &self.property_type {
            patch.set(DealField::PropertyType, json!(v));
        }
        patch
    }
}

/// Source of public property data.
#[async_trait]
pub trait PropertyDataSource: Send + Sync {
    /// `Ok(None)` when the source has no record for the address.
    async fn lookup(
        &self,
        address: &str,
        city: Option<&str>,
        state: Option<&str>,
    ) -> Result<Option<PropertyRecord>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RentCast client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// RentCast `/properties` lookup. Without an API key every lookup fails
/// with a non-fatal enrichment error.
#[derive(Debug, Clone)]
pub struct RentCastSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RentCastSource {
    pub fn from_config(cfg: &EnrichmentConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(
                env = %cfg.api_key_env,
                "property data API key not set; enrichment disabled"
            );
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            api_key,
        })
    }
}

#[async_trait]
impl PropertyDataSource for RentCastSource {
    async fn lookup(
        &self,
        address: &str,
        city: Option<&str>,
        state: Option<&str>,
    ) -> Result<Option<PropertyRecord>> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Enrichment("property data API key not configured".into()))?;

        let full = match (city, state) {
            (Some(c), Some(s)) if !address.contains(c) => format!("{address}, {c}, {s}"),
            _ => address.to_string(),
        };
        let resp = self
            .http
            .get(format!("{}/properties", self.base_url))
            .header("X-Api-Key", key)
            .header("Accept", "application/json")
            .query(&[("address", full.as_str()), ("limit", "1")])
            .send()
            .await
            .map_err(|e| Error::Enrichment(format!("request failed: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Enrichment(format!(
                "upstream returned {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let records: Vec<PropertyRecord> = resp
            .json()
            .await
            .map_err(|e| Error::Enrichment(format!("unreadable response: {e}")))?;
        Ok(records.into_iter().next())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of one enrichment attempt, serialized into tool results as the
/// `enrichment` object.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome {
    Found {
        property: PropertyRecord,
        /// The deal after the record was saved onto it.
        deal: Option<Deal>,
    },
    NotFound,
    Failed(String),
}

impl EnrichmentOutcome {
    pub fn to_json(&self) -> Value {
        match self {
            EnrichmentOutcome::Found { property, deal } => json!({
                "property": property,
                "saved_to_deal": deal.is_some(),
            }),
            EnrichmentOutcome::NotFound => json!({
                "property": null,
                "message": "No public record found for this address",
            }),
            EnrichmentOutcome::Failed(msg) => json!({
                "property": null,
                "error": msg,
            }),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, EnrichmentOutcome::Found { .. })
    }
}

/// Looks a property up and, when a deal is named, saves the record on it.
pub struct Enricher {
    source: Arc<dyn PropertyDataSource>,
    store: Arc<dyn CrmStore>,
}

impl Enricher {
    pub fn new(source: Arc<dyn PropertyDataSource>, store: Arc<dyn CrmStore>) -> Self {
        Self { source, store }
    }

    pub async fn enrich(
        &self,
        owner: &str,
        address: &str,
        city: Option<&str>,
        state: Option<&str>,
        deal_id: Option<&str>,
    ) -> EnrichmentOutcome {
        let start = Instant::now();
        let lookup = self.source.lookup(address, city, state).await;
        TraceEvent::EnrichmentLookup {
            address: address.to_string(),
            found: matches!(lookup, Ok(Some(_))),
            duration_ms: start.elapsed().as_millis() as u64,
        }
        .emit();

        let property = match lookup {
            Ok(Some(p)) => p,
            Ok(None) => return EnrichmentOutcome::NotFound,
            Err(e) => {
                tracing::warn!(address, error = %e, "property enrichment failed");
                return EnrichmentOutcome::Failed(e.to_string());
            }
        };

        let deal = match deal_id {
            Some(id) => {
                let patch = property.to_patch();
                if patch.is_empty() {
                    None
                } else {
                    match self.store.update_deal(owner, id, &patch).await {
                        Ok(d) => Some(d),
                        Err(e) => {
                            tracing::warn!(deal_id = id, error = %e, "saving enrichment onto deal failed");
                            None
                        }
                    }
                }
            }
            None => None,
        };
        EnrichmentOutcome::Found { property, deal }
    }
}
