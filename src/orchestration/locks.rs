//! Per-series serialization.
//!
//! Mutations on one (security, account) series are serialized by a coarse
//! async mutex; mutations on different series proceed in parallel. Lock
//! handles are created lazily and never removed; the map grows with the
//! number of distinct series, which is bounded by the portfolio.

use crate::domain::{AccountId, SecurityId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub type SeriesKey = (SecurityId, AccountId);

#[derive(Debug, Default)]
pub struct SeriesLocks {
    inner: StdMutex<HashMap<SeriesKey, Arc<AsyncMutex<()>>>>,
}

impl SeriesLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: SeriesKey) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(key).or_default().clone()
    }

    /// Acquire several series locks in a canonical order to avoid deadlock.
    /// Keys are deduplicated and sorted before locking.
    pub async fn acquire(&self, mut keys: Vec<SeriesKey>) -> Vec<OwnedMutexGuard<()>> {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.handle(key).lock_owned().await);
        }
        guards
    }
}
