//! Turn cancellation.
//!
//! Each streaming turn gets a `CancelToken`. The chat endpoint cancels it
//! when the client goes away (the response body is dropped); the turn loop
//! checks it at round boundaries and stops issuing inference calls and
//! tool batches. Work already in flight is allowed to finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation flag shared between the HTTP layer and the turn task.
#[derive(Clone, Debug)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// A guard that cancels this token when dropped.
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels its token on drop. Held by the SSE body so a client disconnect
/// reaches the turn loop.
pub struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if !self.0.is_cancelled() {
            tracing::debug!("client stream dropped, cancelling turn");
        }
        self.0.cancel();
    }
}
