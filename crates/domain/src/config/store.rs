use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Relational store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local maps. Data is lost on restart; for dev and tests.
    #[default]
    Memory,
    /// PostgREST-style hosted store.
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub base_url: String,
    /// Env var holding the elevated (service-level) key.
    #[serde(default = "d_service_key_env")]
    pub service_key_env: String,
    /// Env var holding the public / user-scoped key.
    #[serde(default = "d_anon_key_env")]
    pub anon_key_env: String,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries for 5xx / transport failures.
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            base_url: String::new(),
            service_key_env: d_service_key_env(),
            anon_key_env: d_anon_key_env(),
            timeout_ms: d_timeout_ms(),
            max_retries: d_max_retries(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Object storage for generated files
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "d_bucket")]
    pub bucket: String,
    /// Lifetime of signed download URLs.
    #[serde(default = "d_signed_url_ttl_secs")]
    pub signed_url_ttl_secs: u64,
    /// Largest payload `create_file` accepts.
    #[serde(default = "d_max_file_bytes")]
    pub max_file_bytes: usize,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            bucket: d_bucket(),
            signed_url_ttl_secs: d_signed_url_ttl_secs(),
            max_file_bytes: d_max_file_bytes(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Property enrichment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "d_enrichment_base_url")]
    pub base_url: String,
    /// Env var holding the property-data API key. When unset, enrichment
    /// degrades to a non-fatal error payload.
    #[serde(default = "d_enrichment_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_enrichment_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            base_url: d_enrichment_base_url(),
            api_key_env: d_enrichment_key_env(),
            timeout_ms: d_enrichment_timeout_ms(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_service_key_env() -> String {
    "HB_STORE_SERVICE_KEY".into()
}
fn d_anon_key_env() -> String {
    "HB_STORE_ANON_KEY".into()
}
fn d_timeout_ms() -> u64 {
    10_000
}
fn d_max_retries() -> u32 {
    2
}
fn d_bucket() -> String {
    "generated-files".into()
}
fn d_signed_url_ttl_secs() -> u64 {
    3600
}
fn d_max_file_bytes() -> usize {
    5 * 1024 * 1024
}
fn d_enrichment_base_url() -> String {
    "https://api.rentcast.io/v1".into()
}
fn d_enrichment_key_env() -> String {
    "RENTCAST_API_KEY".into()
}
fn d_enrichment_timeout_ms() -> u64 {
    8_000
}
