//! Bounded, idle-expiring score store with a best-effort write path.
//!
//! Reads go straight to a moka cache and never wait on writers. Writes are
//! queued as whole batches onto a bounded channel drained by a fixed pool
//! of worker tasks. When the queue is full the batch is dropped, counted and
//! logged; the caller never blocks and never sees an error. Overload costs
//! cache freshness (more backend fall-through), never request latency.
//!
//! Entries expire after going unread for [`StoreConfig::idle`] and the
//! least recently used entries are evicted once
//! [`StoreConfig::max_entries`] is reached. Both are enforced by moka.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::key::CacheKey;
use crate::telemetry;

/// Configuration for the score store.
///
/// ```rust
/// # use recsys_proxy_cache::cache::StoreConfig;
/// # use std::time::Duration;
/// let config = StoreConfig::new()
///     .max_entries(1_000_000)
///     .idle(Duration::from_secs(120))
///     .write_queue_capacity(512)
///     .write_workers(2);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of cached scores. Default: 200,000,000.
    pub max_entries: u64,
    /// Entries unread for this long are evicted. Default: 5 minutes.
    pub idle: Duration,
    /// Pending write batches allowed before new ones are dropped. Default: 10,000.
    pub write_queue_capacity: usize,
    /// Worker tasks applying queued writes. Default: 3.
    pub write_workers: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_entries: 200_000_000,
            idle: Duration::from_secs(300),
            write_queue_capacity: 10_000,
            write_workers: 3,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    pub fn idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    pub fn write_queue_capacity(mut self, n: usize) -> Self {
        self.write_queue_capacity = n;
        self
    }

    pub fn write_workers(mut self, n: usize) -> Self {
        self.write_workers = n;
        self
    }
}

type WriteBatch = HashMap<CacheKey, f64>;

/// Shared score store. Construct with [`ScoreStore::start`], release with
/// [`ScoreStore::shutdown`].
pub struct ScoreStore {
    entries: Cache<CacheKey, f64>,
    writer: RwLock<Option<mpsc::Sender<WriteBatch>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ScoreStore {
    /// Build the cache and spawn the write workers.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &StoreConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_idle(config.idle)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        let (tx, rx) = mpsc::channel(config.write_queue_capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let workers = (0..config.write_workers.max(1))
            .map(|id| tokio::spawn(write_worker(id, Arc::clone(&rx), entries.clone())))
            .collect();

        Self {
            entries,
            writer: RwLock::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Look up many keys at once, returning only present, unexpired entries.
    ///
    /// Lock-free on the caller's side; safe from any number of tasks.
    pub fn get_many<'a, I>(&self, keys: I) -> HashMap<CacheKey, f64>
    where
        I: IntoIterator<Item = &'a CacheKey>,
    {
        keys.into_iter()
            .filter_map(|key| self.entries.get(key).map(|score| (*key, score)))
            .collect()
    }

    /// Queue scores for insertion. Never blocks, never fails.
    ///
    /// The batch is silently dropped (and counted) when the write queue is
    /// full or the store has been shut down. Visibility to later
    /// [`get_many`](Self::get_many) calls is eventual.
    pub fn set_many(&self, entries: HashMap<CacheKey, f64>) {
        if entries.is_empty() {
            return;
        }
        let result = match self.writer.read() {
            Ok(guard) => match guard.as_ref() {
                Some(tx) => tx.try_send(entries),
                None => Err(TrySendError::Closed(entries)),
            },
            Err(_) => Err(TrySendError::Closed(entries)),
        };

        match result {
            Ok(()) => {
                metrics::counter!(telemetry::CACHE_WRITES_ENQUEUED_TOTAL).increment(1);
            }
            Err(TrySendError::Full(batch)) => {
                metrics::counter!(telemetry::CACHE_WRITES_DROPPED_TOTAL).increment(1);
                warn!(
                    scores = batch.len(),
                    "cache insert queue full, dropping cache update"
                );
            }
            Err(TrySendError::Closed(batch)) => {
                metrics::counter!(telemetry::CACHE_WRITES_DROPPED_TOTAL).increment(1);
                debug!(scores = batch.len(), "cache is shut down, dropping cache update");
            }
        }
    }

    /// Stop accepting writes, discard queued batches and stop the workers.
    ///
    /// Cached entries stay readable. Idempotent.
    pub fn shutdown(&self) {
        let was_running = self
            .writer
            .write()
            .map(|mut writer| writer.take().is_some())
            .unwrap_or(false);
        if was_running {
            warn!("shutting down score cache");
        }
        if let Ok(mut workers) = self.workers.lock() {
            for worker in workers.drain(..) {
                worker.abort();
            }
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.writer.read().map(|w| w.is_none()).unwrap_or(true)
    }

    /// Approximate number of cached scores.
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Apply moka's pending eviction and expiration bookkeeping now.
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }
}

impl Drop for ScoreStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn write_worker(
    id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<WriteBatch>>>,
    entries: Cache<CacheKey, f64>,
) {
    loop {
        let batch = { queue.lock().await.recv().await };
        let Some(batch) = batch else {
            debug!(worker = id, "cache write queue closed");
            return;
        };
        for (key, score) in batch {
            entries.insert(key, score);
        }
    }
}
