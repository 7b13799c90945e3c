//! `hb-domain` — types shared by every Homebase crate.
//!
//! Nothing in here performs I/O: the crate defines the provider-agnostic
//! message model, stream events, CRM entities, the config tree, the shared
//! error type, and structured trace events.

pub mod config;
pub mod crm;
pub mod error;
pub mod stream;
pub mod tool;
pub mod trace;
