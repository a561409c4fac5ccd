//! Score cache engine.
//!
//! - [`canonical`]: order-independent context serialization.
//! - [`high_cardinality`]: bucket reduction for per-request unique fields.
//! - [`key`]: context fingerprint and per-item [`CacheKey`]s.
//! - [`store`]: the shared [`ScoreStore`] with its queued write path.
//!
//! The store is node-local; nothing here replicates or shares entries
//! across proxy instances.

pub mod canonical;
pub mod high_cardinality;
pub mod key;
pub mod store;

pub use canonical::canonicalize;
pub use high_cardinality::{FieldReducer, HashFunction, HighCardinalityField, HighCardinalityKeys};
pub use key::{CacheKey, ContextFingerprint, KeyBuilder, build_key};
pub use store::{ScoreStore, StoreConfig};
