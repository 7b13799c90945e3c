//! `hb-gateway` — the Homebase HTTP server.
//!
//! Hosts the conversation engine: the chat endpoint streams one turn of
//! the orchestrator as server-sent events, the undo endpoint reverses a
//! tool's write, and the CLI wraps server start-up and config checks.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
