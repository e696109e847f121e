//! Time-to-live cache with single-flight loading.
//!
//! One cache instance is shared (behind an `Arc`) by every reader that
//! memoizes remote chain state. Values of different types live side by side;
//! callers scope entries by composing keys such as `GF_FEE_STREAM-0xabc..`.
//!
//! Concurrent misses on the same key share one in-flight load. A failed load
//! is never stored, so the next call retries the loader. Invalidation
//! ([`TtlCache::delete`], [`TtlCache::clean`]) also detaches loads that are
//! still running: their results are handed to the callers already waiting but
//! never written back.

use crate::error::{FeeError, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

type CachedValue = Arc<dyn Any + Send + Sync>;
type PendingLoad = Shared<BoxFuture<'static, Result<CachedValue>>>;

enum Slot {
    Ready {
        value: CachedValue,
        expires_at: Instant,
    },
    Loading {
        id: u64,
        load: PendingLoad,
    },
}

#[derive(Default)]
struct Slots {
    entries: HashMap<String, Slot>,
    next_load_id: u64,
}

/// Key/value store whose entries expire after a per-entry TTL.
#[derive(Default)]
pub struct TtlCache {
    slots: Mutex<Slots>,
}

impl TtlCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live value under `key`, or runs `loader` and stores its
    /// result for `ttl`.
    ///
    /// Callers that arrive while a load for `key` is in flight await that
    /// load instead of starting their own.
    pub async fn get_or_load<V, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<V>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let (load_id, load) = {
            let mut slots = self.lock();
            match slots.entries.get(key) {
                Some(Slot::Ready { value, expires_at }) if *expires_at > Instant::now() => {
                    debug!(key, "cache hit");
                    return downcast::<V>(key, value);
                }
                Some(Slot::Loading { id, load }) => {
                    debug!(key, "joining in-flight load");
                    (*id, load.clone())
                }
                _ => {
                    debug!(key, "cache miss");
                    slots.next_load_id += 1;
                    let id = slots.next_load_id;
                    // The loader runs on first poll, after the lock is released.
                    let load = async move { loader().await }
                        .map(|res| res.map(|value| Arc::new(value) as CachedValue))
                        .boxed()
                        .shared();
                    slots.entries.insert(
                        key.to_string(),
                        Slot::Loading {
                            id,
                            load: load.clone(),
                        },
                    );
                    (id, load)
                }
            }
        };

        let outcome = load.await;

        {
            let mut slots = self.lock();
            let still_current = matches!(
                slots.entries.get(key),
                Some(Slot::Loading { id, .. }) if *id == load_id
            );
            if still_current {
                match &outcome {
                    Ok(value) => {
                        slots.entries.insert(
                            key.to_string(),
                            Slot::Ready {
                                value: value.clone(),
                                expires_at: Instant::now() + ttl,
                            },
                        );
                    }
                    Err(err) => {
                        debug!(key, error = %err, "load failed, entry dropped");
                        slots.entries.remove(key);
                    }
                }
            }
        }

        downcast::<V>(key, &outcome?)
    }

    /// Returns the live value under `key` without loading.
    pub fn get<V: Clone + 'static>(&self, key: &str) -> Option<V> {
        let slots = self.lock();
        match slots.entries.get(key) {
            Some(Slot::Ready { value, expires_at }) if *expires_at > Instant::now() => {
                value.downcast_ref::<V>().cloned()
            }
            _ => None,
        }
    }

    /// Stores `value` under `key` for `ttl`, replacing any entry or load.
    pub fn set<V: Send + Sync + 'static>(&self, key: &str, value: V, ttl: Duration) {
        let mut slots = self.lock();
        slots.entries.insert(
            key.to_string(),
            Slot::Ready {
                value: Arc::new(value),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Removes a single entry.
    pub fn delete(&self, key: &str) -> &Self {
        self.lock().entries.remove(key);
        self
    }

    /// Removes every entry. Used after a state-changing action so that all
    /// pricing and balance reads are fetched again.
    pub fn clean(&self) {
        let mut slots = self.lock();
        debug!(entries = slots.entries.len(), "cache cleaned");
        slots.entries.clear();
    }

    /// Number of stored entries, including expired and in-flight ones.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // A panic while holding the lock leaves the map itself consistent.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn downcast<V: Clone + 'static>(key: &str, value: &CachedValue) -> Result<V> {
    value
        .downcast_ref::<V>()
        .cloned()
        .ok_or_else(|| FeeError::CacheType {
            key: key.to_string(),
        })
}
