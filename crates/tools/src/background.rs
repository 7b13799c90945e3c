//! Fire-and-forget job dispatcher.
//!
//! Audit writes, conversation titling and memory extraction run here so
//! that a slow or failing job can never block or crash a turn. Failures
//! and panics are logged; nothing is retried.

use std::future::Future;
use std::sync::Arc;

use hb_domain::error::Result;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::Instrument;

#[derive(Clone, Default)]
pub struct Dispatcher {
    jobs: Arc<Mutex<JoinSet<()>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` in the background under a `bg.job` span.
    pub fn spawn<F>(&self, name: &'static str, job: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let span = tracing::info_span!("bg.job", job = name);
        let mut jobs = self.jobs.lock();
        // Reap finished jobs so the set does not grow without bound.
        while let Some(done) = jobs.try_join_next() {
            log_join(done);
        }
        jobs.spawn(
            async move {
                if let Err(e) = job.await {
                    tracing::warn!(job = name, error = %e, "background job failed");
                }
            }
            .instrument(span),
        );
    }

    /// Number of jobs not yet reaped.
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Wait for every job spawned so far. Used at shutdown and in tests.
    pub async fn flush(&self) {
        let mut jobs = std::mem::take(&mut *self.jobs.lock());
        while let Some(done) = jobs.join_next().await {
            log_join(done);
        }
    }
}

fn log_join(done: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        if e.is_panic() {
            tracing::error!(error = %e, "background job panicked");
        }
    }
}
