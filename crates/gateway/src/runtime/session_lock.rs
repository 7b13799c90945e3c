//! Per-conversation concurrency control.
//!
//! Only one turn runs per conversation at a time. A second message for the
//! same conversation waits until the running turn releases its permit, so
//! history reads and message writes of two turns never interleave.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Idle entries are pruned once the map grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Maps `owner:conversation` keys to a `Semaphore(1)`.
pub struct ConversationLocks {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for ConversationLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for the run lock of one conversation. The permit releases on
    /// drop; hold it for the whole turn.
    pub async fn acquire(
        &self,
        owner: &str,
        conversation_id: &str,
    ) -> Result<OwnedSemaphorePermit, ConversationBusy> {
        let key = format!("{owner}:{conversation_id}");
        let sem = {
            let mut locks = self.locks.lock();
            if locks.len() > PRUNE_THRESHOLD {
                // An entry is idle only when no turn holds its permit and no
                // other caller has cloned it on the way to acquiring.
                locks.retain(|_, sem| Arc::strong_count(sem) > 1 || sem.available_permits() == 0);
            }
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        if let Ok(permit) = sem.clone().try_acquire_owned() {
            return Ok(permit);
        }
        tracing::debug!(conversation_id, "turn already running, waiting for it to finish");
        sem.acquire_owned().await.map_err(|_| ConversationBusy)
    }

    /// Number of tracked conversations.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The lock's semaphore was closed. Not expected in practice.
#[derive(Debug, thiserror::Error)]
#[error("conversation is busy")]
pub struct ConversationBusy;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn different_conversations_run_concurrently() {
        let locks = ConversationLocks::new();
        let a = locks.acquire("o", "c1").await.unwrap();
        let b = locks.acquire("o", "c2").await.unwrap();
        assert_eq!(locks.len(), 2);
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn owners_do_not_share_locks() {
        let locks = ConversationLocks::new();
        let _a = locks.acquire("o1", "c").await.unwrap();
        let _b = locks.acquire("o2", "c").await.unwrap();
    }

    #[tokio::test]
    async fn same_conversation_waits() {
        let locks = Arc::new(ConversationLocks::new());
        let first = locks.acquire("o", "c").await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _p = locks.acquire("o", "c").await.unwrap();
                42
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(first);
        assert_eq!(waiter.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn pruning_keeps_semaphores_still_referenced() {
        let locks = ConversationLocks::new();
        for i in 0..=PRUNE_THRESHOLD {
            drop(locks.acquire("o", &format!("c{i}")).await.unwrap());
        }
        assert_eq!(locks.len(), PRUNE_THRESHOLD + 1);

        // A caller that looked up c0 but has not taken the permit yet.
        let pending = locks.locks.lock().get("o:c0").cloned().unwrap();

        let _other = locks.acquire("o", "next").await.unwrap();
        assert_eq!(locks.len(), 2);

        let permit = locks.acquire("o", "c0").await.unwrap();
        assert_eq!(pending.available_permits(), 0);
        assert!(pending.try_acquire().is_err());
        drop(permit);
        assert_eq!(pending.available_permits(), 1);
    }
}
