//! Per-chat async locks.
//!
//! `ChatLocks` hands out one `tokio::sync::Mutex` per chat id so that two
//! exchanges on the same chat never interleave their load/modify/save cycle.
//! Guards are cloned out of the `DashMap` before awaiting the mutex, so no
//! map shard is held across `.await`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock table keyed by chat id.
#[derive(Debug, Clone, Default)]
pub struct ChatLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `chat_id`.
    pub async fn acquire(&self, chat_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .inner
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Drop table entries nobody is holding or waiting on.
    pub fn prune(&self) {
        self.inner.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of chat ids with a lock entry.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
