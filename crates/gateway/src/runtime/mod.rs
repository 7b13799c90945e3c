//! Core runtime: the orchestrator that ties context assembly, LLM
//! streaming, tool dispatch, and persistence into one bounded loop.
//!
//! Entry point: [`prepare_turn`] followed by [`spawn_turn`], which returns
//! a stream of [`ClientEvent`]s suitable for SSE.

pub mod cancel;
pub mod cooldown;
pub mod events;
pub mod finalize;
pub mod memory_extract;
pub mod round;
pub mod session_lock;
pub mod title;
pub mod turn;

pub use cancel::{CancelOnDrop, CancelToken};
pub use cooldown::{Clock, CooldownLimiter, SystemClock};
pub use events::{ChipContext, ClientEvent, DonePayload, ToolUsed};
pub use memory_extract::MemoryExtractor;
pub use session_lock::{ConversationBusy, ConversationLocks};
pub use turn::{prepare_turn, run_turn, spawn_turn, PreparedTurn, TurnInput, TurnReport};
