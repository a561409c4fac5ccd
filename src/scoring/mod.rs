//! Scoring facade over the model-serving backend.
//!
//! The proxy only needs `score(items, context) -> item → score`. The
//! [`Scorer`] trait is that seam; [`ScoringFacade`] picks a strategy once
//! per request from the model name and enforces the backend time budget.
//!
//! The `"random"` model is a development stand-in and must be switched on
//! explicitly with [`ScoringFacade::with_random_model`].

mod random;
mod tf_serving;

pub use random::RandomScorer;
pub use tf_serving::{EndpointSource, TfServingScorer};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use crate::types::Context;
use crate::{ProxyCacheError, Result, telemetry};

/// Model name routed to [`RandomScorer`] when enabled.
pub const RANDOM_MODEL: &str = "random";

/// Default hard budget for one backend call.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_millis(150);

/// Something that can score items for a model.
///
/// Implementations should return exactly one score per requested item.
/// Anything less is reported by the proxy as an integrity failure.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Wait until the scorer has somewhere to send requests.
    ///
    /// Awaited by the facade before the backend budget starts, so a slow
    /// first endpoint resolution is bounded by its own wait instead.
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn score(
        &self,
        model: &str,
        items: &[i64],
        context: &Context,
    ) -> Result<HashMap<i64, f64>>;
}

/// Strategy chosen for a single request.
pub enum ScoringStrategy<'a> {
    Random(&'a RandomScorer),
    Backend(&'a dyn Scorer),
}

impl ScoringStrategy<'_> {
    fn scorer(&self) -> &dyn Scorer {
        match self {
            ScoringStrategy::Random(scorer) => *scorer,
            ScoringStrategy::Backend(scorer) => *scorer,
        }
    }
}

/// Routes scoring calls and bounds them with a timeout. No retries.
pub struct ScoringFacade {
    backend: Arc<dyn Scorer>,
    random: Option<RandomScorer>,
    timeout: Duration,
}

impl ScoringFacade {
    pub fn new(backend: Arc<dyn Scorer>) -> Self {
        Self {
            backend,
            random: None,
            timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    /// Route the `"random"` model (any case) to [`RandomScorer`].
    pub fn with_random_model(mut self) -> Self {
        self.random = Some(RandomScorer);
        self
    }

    /// Hard budget for each backend call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend_timeout(&self) -> Duration {
        self.timeout
    }

    /// Select the strategy for `model`.
    pub fn strategy(&self, model: &str) -> ScoringStrategy<'_> {
        match &self.random {
            Some(random) if model.eq_ignore_ascii_case(RANDOM_MODEL) => {
                ScoringStrategy::Random(random)
            }
            _ => ScoringStrategy::Backend(self.backend.as_ref()),
        }
    }

    /// Score `items`, failing with [`ProxyCacheError::BackendTimeout`]
    /// when the budget runs out.
    pub async fn score(
        &self,
        model: &str,
        items: &[i64],
        context: &Context,
    ) -> Result<HashMap<i64, f64>> {
        let strategy = self.strategy(model);
        let scorer = strategy.scorer();
        if let Err(e) = scorer.ready().await {
            metrics::counter!(telemetry::BACKEND_REQUESTS_TOTAL, "status" => "unavailable")
                .increment(1);
            warn!(backend = scorer.name(), %model, error = %e, "scoring backend not ready");
            return Err(e);
        }
        let start = Instant::now();
        let result =
            tokio::time::timeout(self.timeout, scorer.score(model, items, context)).await;
        metrics::histogram!(telemetry::BACKEND_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(Ok(scores)) => {
                metrics::counter!(telemetry::BACKEND_REQUESTS_TOTAL, "status" => "ok").increment(1);
                Ok(scores)
            }
            Ok(Err(e)) => {
                metrics::counter!(telemetry::BACKEND_REQUESTS_TOTAL, "status" => "error")
                    .increment(1);
                warn!(backend = scorer.name(), %model, error = %e, "scoring backend failed");
                Err(e)
            }
            Err(_) => {
                metrics::counter!(telemetry::BACKEND_REQUESTS_TOTAL, "status" => "timeout")
                    .increment(1);
                warn!(backend = scorer.name(), %model, budget = ?self.timeout, "scoring backend timed out");
                Err(ProxyCacheError::BackendTimeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl Scorer for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn score(
            &self,
            _model: &str,
            items: &[i64],
            _context: &Context,
        ) -> Result<HashMap<i64, f64>> {
            Ok(items.iter().map(|i| (*i, 0.5)).collect())
        }
    }

    struct Slow;

    #[async_trait]
    impl Scorer for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn score(
            &self,
            _model: &str,
            _items: &[i64],
            _context: &Context,
        ) -> Result<HashMap<i64, f64>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(HashMap::new())
        }
    }

    /// Takes a second to find its backend, then answers instantly.
    struct SlowToStart {
        fail: bool,
    }

    #[async_trait]
    impl Scorer for SlowToStart {
        fn name(&self) -> &str {
            "slow-to-start"
        }

        async fn ready(&self) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if self.fail {
                return Err(ProxyCacheError::NoEndpoints(Duration::from_secs(1)));
            }
            Ok(())
        }

        async fn score(
            &self,
            _model: &str,
            items: &[i64],
            _context: &Context,
        ) -> Result<HashMap<i64, f64>> {
            Ok(items.iter().map(|i| (*i, 0.25)).collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_wait_is_outside_backend_budget() {
        let facade = ScoringFacade::new(Arc::new(SlowToStart { fail: false }))
            .timeout(Duration::from_millis(150));
        let scores = facade.score("m", &[1], &Context::new()).await.unwrap();
        assert_eq!(scores, HashMap::from([(1, 0.25)]));
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_failure_is_returned_as_is() {
        let facade = ScoringFacade::new(Arc::new(SlowToStart { fail: true }))
            .timeout(Duration::from_millis(150));
        let err = facade.score("m", &[1], &Context::new()).await.unwrap_err();
        assert!(matches!(err, ProxyCacheError::NoEndpoints(_)));
    }

    #[test]
    fn random_requires_opt_in() {
        let facade = ScoringFacade::new(Arc::new(Fixed));
        assert!(matches!(facade.strategy("random"), ScoringStrategy::Backend(_)));

        let facade = facade.with_random_model();
        assert!(matches!(facade.strategy("RANDOM"), ScoringStrategy::Random(_)));
        assert!(matches!(facade.strategy("recsys"), ScoringStrategy::Backend(_)));
    }

    #[tokio::test]
    async fn backend_scores_pass_through() {
        let facade = ScoringFacade::new(Arc::new(Fixed));
        let scores = facade.score("m", &[1, 2], &Context::new()).await.unwrap();
        assert_eq!(scores, HashMap::from([(1, 0.5), (2, 0.5)]));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out() {
        let facade = ScoringFacade::new(Arc::new(Slow)).timeout(Duration::from_millis(150));
        let err = facade.score("m", &[1], &Context::new()).await.unwrap_err();
        assert!(matches!(err, ProxyCacheError::BackendTimeout(d) if d == Duration::from_millis(150)));
    }
}
