//! recsys-proxy-cache - caching proxy for recommendation scores
//!
//! Sits between callers asking for relevance scores of candidate items and
//! a model-serving backend. Scores are served from a node-local cache when
//! possible; only misses reach the backend, and fresh scores are written
//! back asynchronously.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use recsys_proxy_cache::cache::{HighCardinalityField, HighCardinalityKeys, KeyBuilder, ScoreStore, StoreConfig};
//! use recsys_proxy_cache::scoring::{EndpointSource, ScoringFacade, TfServingScorer};
//! use recsys_proxy_cache::{Context, ScoreProxy, ScoreRequest};
//!
//! #[tokio::main]
//! async fn main() -> recsys_proxy_cache::Result<()> {
//!     let high_cardinality = HighCardinalityKeys::from_fields([
//!         HighCardinalityField::new("session", "xxh64").buckets(10),
//!     ])?;
//!     let store = Arc::new(ScoreStore::start(&StoreConfig::default()));
//!     let backend = TfServingScorer::new(
//!         EndpointSource::Static("http://tfserving:8501".into()),
//!         Duration::from_millis(500),
//!     )?;
//!     let proxy = ScoreProxy::new(
//!         KeyBuilder::new(Arc::new(high_cardinality)),
//!         store,
//!         ScoringFacade::new(Arc::new(backend)),
//!     );
//!
//!     let request = ScoreRequest::new(
//!         "recsys",
//!         Context::new().with_field("session", ["3f2a"]),
//!         vec![11, 12, 13],
//!     );
//!     let scores = proxy.score(&request).await?;
//!     println!("{scores:?}");
//!
//!     proxy.shutdown();
//!     Ok(())
//! }
//! ```

pub mod cache;
#[cfg(feature = "client")]
pub mod client;
pub mod error;
pub mod proxy;
pub mod resolver;
pub mod scoring;
#[cfg(any(feature = "server", feature = "client"))]
pub mod server;
pub mod telemetry;
pub mod types;
mod version;

// Re-export main types at crate root
pub use error::{ProxyCacheError, Result};
pub use proxy::ScoreProxy;
pub use types::{Context, ScoreRequest};
pub use version::{GIT_BRANCH, GIT_SHA, PKG_VERSION, version_string};
