//! Batched, deduplicating relationship loading.
//!
//! A [`BatchLoader`] coalesces the load requests raised during one
//! evaluation pass: sibling owners asking for the same relationship enqueue
//! their keys, and a single [`FetchSource::fetch_batch`] call resolves the
//! whole set. A pass-scoped cache guarantees at most one underlying fetch
//! per distinct key, across levels as well as siblings.
//!
//! Loaders are created per evaluation pass — pending-request state never
//! leaks between passes, so concurrent passes stay independent.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::error::{SideloadError, SideloadResult};
use crate::record::{KeyValue, SharedRecord};

/// The outcome delivered to a pending load request: the resolved records for
/// its key, or the shared failure of the fetch that covered it.
pub type LoadResolution = Result<Vec<SharedRecord>, Arc<SideloadError>>;

type Callback = Box<dyn FnOnce(LoadResolution) + Send>;

/// The external fetch mechanism behind a relationship.
///
/// Implementations receive the deduplicated key set of one flush and return
/// the matching records grouped per key. Keys with no matches may simply be
/// omitted from the result. Per-key record order must be stable for a given
/// fetch — it determines the order of the wrappers built from it.
///
/// A failed fetch must return an error; it is then delivered to every
/// request pending on that flush. Sources must never leave a request
/// unresolved — a timing-out source returns a timeout error.
#[async_trait]
pub trait FetchSource: Send + Sync + fmt::Debug {
    /// Source name used in logs and error messages.
    fn name(&self) -> &str {
        "fetch-source"
    }

    /// Fetch the records for a deduplicated set of load keys.
    async fn fetch_batch(
        &self,
        keys: &[KeyValue],
    ) -> SideloadResult<IndexMap<KeyValue, Vec<SharedRecord>>>;
}

/// When load requests are resolved relative to the `load` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheduling {
    /// Resolve each request inside `load`, before it returns. No
    /// cross-owner batching, but the per-pass cache still deduplicates.
    Eager,
    /// Accumulate requests and resolve them together on `flush`. This is the
    /// shape that batches across owners and branches.
    #[default]
    Deferred,
}

impl Scheduling {
    /// Check if requests resolve inside `load`.
    pub fn is_eager(&self) -> bool {
        matches!(self, Self::Eager)
    }

    /// Check if requests resolve on `flush`.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred)
    }
}

/// Load progress for one key within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No request for this key yet.
    Unloaded,
    /// A request is pending, waiting for a flush.
    Loading,
    /// The key resolved to records (possibly none).
    Resolved,
    /// The fetch covering this key failed.
    Failed,
}

struct Pending {
    key: KeyValue,
    callback: Callback,
}

struct LoaderInner {
    pending: Vec<Pending>,
    cache: HashMap<KeyValue, LoadResolution>,
    fetches: usize,
}

/// A pass-scoped, deduplicating batch resolver for one fetch source.
pub struct BatchLoader {
    source: Arc<dyn FetchSource>,
    scheduling: Scheduling,
    inner: Mutex<LoaderInner>,
}

impl fmt::Debug for BatchLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("BatchLoader")
            .field("source", &self.source.name())
            .field("scheduling", &self.scheduling)
            .field("pending", &inner.pending.len())
            .field("cached_keys", &inner.cache.len())
            .field("fetches", &inner.fetches)
            .finish()
    }
}

impl BatchLoader {
    /// Create a loader over the given source.
    pub fn new(source: Arc<dyn FetchSource>, scheduling: Scheduling) -> Self {
        Self {
            source,
            scheduling,
            inner: Mutex::new(LoaderInner {
                pending: Vec::new(),
                cache: HashMap::new(),
                fetches: 0,
            }),
        }
    }

    /// The scheduling shape of this loader.
    pub fn scheduling(&self) -> Scheduling {
        self.scheduling
    }

    /// Register a load request for `key`.
    ///
    /// `on_resolved` is invoked exactly once with the records for `key` or
    /// with the failure of the fetch covering it. A null key resolves empty
    /// immediately — an absent foreign key has nothing to fetch. A key
    /// already resolved in this pass is answered from the cache without a
    /// new fetch.
    pub async fn load(
        &self,
        key: KeyValue,
        on_resolved: impl FnOnce(LoadResolution) + Send + 'static,
    ) {
        if key.is_null() {
            trace!(source = %self.source.name(), "null load key, resolving empty");
            on_resolved(Ok(Vec::new()));
            return;
        }

        if let Some(hit) = self.inner.lock().cache.get(&key).cloned() {
            trace!(source = %self.source.name(), %key, "load key served from pass cache");
            on_resolved(hit);
            return;
        }

        self.inner.lock().pending.push(Pending {
            key,
            callback: Box::new(on_resolved),
        });

        if self.scheduling.is_eager() {
            self.flush().await;
        }
    }

    /// Resolve every pending request.
    ///
    /// Distinct uncached keys are fetched in a single `fetch_batch` call;
    /// each pending callback is then invoked exactly once. On fetch failure,
    /// every request pending on this flush receives the failure.
    pub async fn flush(&self) {
        let pending = {
            let mut inner = self.inner.lock();
            std::mem::take(&mut inner.pending)
        };
        if pending.is_empty() {
            return;
        }

        let keys: SmallVec<[KeyValue; 8]> = {
            let inner = self.inner.lock();
            let mut keys = SmallVec::new();
            for request in &pending {
                if !inner.cache.contains_key(&request.key) && !keys.contains(&request.key) {
                    keys.push(request.key.clone());
                }
            }
            keys
        };

        if keys.is_empty() {
            // Everything pending was resolved by an earlier flush.
            let inner = self.inner.lock();
            let resolutions: Vec<LoadResolution> = pending
                .iter()
                .map(|request| {
                    inner
                        .cache
                        .get(&request.key)
                        .cloned()
                        .unwrap_or_else(|| Ok(Vec::new()))
                })
                .collect();
            drop(inner);
            for (request, resolution) in pending.into_iter().zip(resolutions) {
                (request.callback)(resolution);
            }
            return;
        }

        debug!(
            source = %self.source.name(),
            requests = pending.len(),
            keys = keys.len(),
            "flushing batch"
        );
        self.inner.lock().fetches += 1;

        match self.source.fetch_batch(&keys).await {
            Ok(mut resolved) => {
                {
                    let mut inner = self.inner.lock();
                    for key in &keys {
                        let records = resolved.shift_remove(key).unwrap_or_default();
                        inner.cache.insert(key.clone(), Ok(records));
                    }
                }
                let inner = self.inner.lock();
                let resolutions: Vec<LoadResolution> = pending
                    .iter()
                    .map(|request| {
                        inner
                            .cache
                            .get(&request.key)
                            .cloned()
                            .unwrap_or_else(|| Ok(Vec::new()))
                    })
                    .collect();
                drop(inner);
                for (request, resolution) in pending.into_iter().zip(resolutions) {
                    (request.callback)(resolution);
                }
            }
            Err(error) => {
                debug!(source = %self.source.name(), %error, "batch fetch failed");
                let shared = Arc::new(error);
                {
                    let mut inner = self.inner.lock();
                    for key in &keys {
                        inner.cache.insert(key.clone(), Err(shared.clone()));
                    }
                }
                for request in pending {
                    (request.callback)(Err(shared.clone()));
                }
            }
        }
    }

    /// Load progress for `key` within this pass.
    pub fn state(&self, key: &KeyValue) -> LoadState {
        let inner = self.inner.lock();
        match inner.cache.get(key) {
            Some(Ok(_)) => LoadState::Resolved,
            Some(Err(_)) => LoadState::Failed,
            None if inner.pending.iter().any(|p| &p.key == key) => LoadState::Loading,
            None => LoadState::Unloaded,
        }
    }

    /// Number of requests waiting for a flush.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Number of underlying `fetch_batch` calls made so far.
    pub fn fetch_count(&self) -> usize {
        self.inner.lock().fetches
    }
}
