//! Telemetry metric name constants.
//!
//! Centralised metric names for the proxy cache. The daemon (or an
//! embedding application) installs its own `metrics` recorder; without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `recsys_proxy_cache_`. Counters end in
//! `_total`, histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `model`: model name from the request
//! - `status`: outcome, e.g. "ok", "error" or "timeout"

/// Items served from the score store.
///
/// Labels: `model`.
pub const CACHE_HITS_TOTAL: &str = "recsys_proxy_cache_cache_hits_total";

/// Items not found in the score store.
///
/// Labels: `model`.
pub const CACHE_MISSES_TOTAL: &str = "recsys_proxy_cache_cache_misses_total";

/// Write batches accepted onto the background write queue.
pub const CACHE_WRITES_ENQUEUED_TOTAL: &str = "recsys_proxy_cache_cache_writes_enqueued_total";

/// Write batches dropped because the queue was full or closed.
pub const CACHE_WRITES_DROPPED_TOTAL: &str = "recsys_proxy_cache_cache_writes_dropped_total";

/// Calls made to the scoring backend.
///
/// Labels: `status` ("ok" | "error" | "timeout").
pub const BACKEND_REQUESTS_TOTAL: &str = "recsys_proxy_cache_backend_requests_total";

/// Scoring backend call duration in seconds.
pub const BACKEND_DURATION_SECONDS: &str = "recsys_proxy_cache_backend_duration_seconds";

/// Requests failed because cache and backend produced too few scores.
pub const INTEGRITY_FAILURES_TOTAL: &str = "recsys_proxy_cache_integrity_failures_total";

/// Discovery endpoint polls.
///
/// Labels: `status` ("ok" | "empty" | "error").
pub const DISCOVERY_POLLS_TOTAL: &str = "recsys_proxy_cache_discovery_polls_total";

/// Number of backend endpoints currently known to the resolver.
pub const RESOLVED_ENDPOINTS: &str = "recsys_proxy_cache_resolved_endpoints";
