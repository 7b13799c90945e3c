//! `hb-context` — per-turn prompt assembly.
//!
//! Produces a three-tier system prompt (static instructions and the
//! business profile, both cacheable, then a volatile per-turn block) and
//! the rebuilt message history of the active conversation.

pub mod assembler;
pub mod history;
pub mod injection;
pub mod report;
pub mod truncation;

pub use assembler::{AssembledContext, AssemblerLimits, ContextAssembler};
pub use history::{rebuild_history, tool_marker, truncate_window};
pub use report::ContextReport;
