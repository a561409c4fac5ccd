//! The score proxy: cache lookup, backend fall-through, write-back.
//!
//! For each request:
//!
//! 1. reject empty item lists before touching cache or backend;
//! 2. deduplicate items and fingerprint `(model, context)` once;
//! 3. read every key from the [`ScoreStore`] in one pass;
//! 4. send only the misses to the [`ScoringFacade`];
//! 5. re-expand scores to the caller's item order (duplicates included);
//!    any item left without a score fails the whole request;
//! 6. hand the newly computed scores to the store's queued write path.
//!
//! Step 6 is a non-blocking enqueue issued after the response is fully
//! assembled, so cache population never adds to caller latency. No
//! ordering holds between one request's write-back and another request's
//! read.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error};

use crate::cache::{CacheKey, KeyBuilder, ScoreStore};
use crate::resolver::LookasideResolver;
use crate::scoring::ScoringFacade;
use crate::types::ScoreRequest;
use crate::{ProxyCacheError, Result, telemetry};

/// Long-lived service object shared by all request handlers.
pub struct ScoreProxy {
    keys: KeyBuilder,
    store: Arc<ScoreStore>,
    scoring: ScoringFacade,
    resolver: Option<Arc<LookasideResolver>>,
}

impl ScoreProxy {
    pub fn new(keys: KeyBuilder, store: Arc<ScoreStore>, scoring: ScoringFacade) -> Self {
        Self {
            keys,
            store,
            scoring,
            resolver: None,
        }
    }

    /// Tie a resolver's lifetime to this proxy so [`shutdown`](Self::shutdown) stops it.
    pub fn with_resolver(mut self, resolver: Arc<LookasideResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn store(&self) -> &ScoreStore {
        &self.store
    }

    /// Score `request.items`, aligned with their input order.
    pub async fn score(&self, request: &ScoreRequest) -> Result<Vec<f64>> {
        request.validate()?;
        let model = request.model_name.as_str();
        let unique = request.unique_items();

        let fingerprint = self.keys.fingerprint(model, &request.context);
        let keyed: Vec<(i64, CacheKey)> = unique
            .iter()
            .map(|item| (*item, fingerprint.key_for(*item)))
            .collect();

        let cached = self.store.get_many(keyed.iter().map(|(_, key)| key));
        let mut scores: HashMap<i64, f64> = HashMap::with_capacity(unique.len());
        let mut misses = Vec::new();
        for (item, key) in &keyed {
            match cached.get(key) {
                Some(score) => {
                    scores.insert(*item, *score);
                }
                None => misses.push(*item),
            }
        }
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "model" => model.to_string())
            .increment(cached.len() as u64);
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "model" => model.to_string())
            .increment(misses.len() as u64);
        debug!(%model, hits = cached.len(), misses = misses.len(), "cache lookup");

        let mut fresh = HashMap::new();
        if !misses.is_empty() {
            let computed = self
                .scoring
                .score(model, &misses, &request.context)
                .await?;
            for item in &misses {
                if let Some(score) = computed.get(item) {
                    scores.insert(*item, *score);
                    fresh.insert(fingerprint.key_for(*item), *score);
                }
            }
        }

        let mut missing = 0;
        let mut ordered = Vec::with_capacity(request.items.len());
        for item in &request.items {
            match scores.get(item) {
                Some(score) => ordered.push(*score),
                None => {
                    missing += 1;
                }
            }
        }

        if missing > 0 {
            metrics::counter!(telemetry::INTEGRITY_FAILURES_TOTAL).increment(1);
            let err = ProxyCacheError::Integrity {
                items: request.items.clone(),
                scores: ordered,
                missing,
            };
            error!(%model, error = %err, "score integrity check failed");
            return Err(err);
        }

        self.store.set_many(fresh);
        Ok(ordered)
    }

    /// Release store workers and stop the resolver.
    pub fn shutdown(&self) {
        self.store.shutdown();
        if let Some(resolver) = &self.resolver {
            resolver.shutdown();
        }
    }
}
