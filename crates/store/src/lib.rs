//! `hb-store` — persistence interfaces for Homebase.
//!
//! [`CrmStore`] covers the relational tables (deals, contacts,
//! conversations, messages, profile, memory facts, task history) and
//! [`FileStore`] the object storage for generated files. Two backends:
//!
//! | Backend  | Implementation                         | Best for          |
//! |----------|----------------------------------------|-------------------|
//! | `memory` | [`InMemoryStore`] / [`InMemoryFileStore`] | dev, tests     |
//! | `rest`   | [`RestStore`]                          | hosted deployments |

pub mod memory;
pub mod rest;
pub mod traits;

pub use memory::{InMemoryFileStore, InMemoryStore};
pub use rest::RestStore;
pub use traits::{CrmStore, FileStore};

use std::sync::Arc;

use hb_domain::config::{FilesConfig, StoreBackend, StoreConfig};
use hb_domain::error::Result;

/// Build the configured store pair.
pub fn create_store(
    cfg: &StoreConfig,
    files: &FilesConfig,
) -> Result<(Arc<dyn CrmStore>, Arc<dyn FileStore>)> {
    match cfg.backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; data will not survive a restart");
            Ok((Arc::new(InMemoryStore::new()), Arc::new(InMemoryFileStore::new())))
        }
        StoreBackend::Rest => {
            let client = Arc::new(RestStore::new(cfg, files)?);
            tracing::info!(base_url = %cfg.base_url, "using REST store");
            Ok((client.clone(), client))
        }
    }
}
