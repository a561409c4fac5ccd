//! Cache key construction.
//!
//! A [`CacheKey`] is 16 bytes:
//!
//! ```text
//! bytes 0..8   context fingerprint, u64 big-endian
//! bytes 8..16  item id, i64 big-endian (two's complement)
//! ```
//!
//! The context fingerprint is `xxh64(seed = 0)` over
//!
//! ```text
//! u32 model name length (big-endian) | model name bytes (UTF-8) | canonical context bytes
//! ```
//!
//! where the canonical context bytes are produced by
//! [`canonicalize`](super::canonical::canonicalize). The fingerprint is
//! computed once per request and shared by every item in it; appending the
//! raw item id keeps keys for different items of the same request distinct
//! without hashing again.

use std::fmt;
use std::sync::Arc;

use xxhash_rust::xxh64::Xxh64;

use super::canonical::canonicalize;
use super::high_cardinality::HighCardinalityKeys;
use crate::types::Context;

/// Length in bytes of a [`CacheKey`].
pub const KEY_LEN: usize = 16;

/// Fixed-size fingerprint of `(model, canonical context, item)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; KEY_LEN]);

impl CacheKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// The context half of the key.
    pub fn context_fingerprint(&self) -> ContextFingerprint {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[..8]);
        ContextFingerprint(u64::from_be_bytes(buf))
    }

    /// The item half of the key.
    pub fn item(&self) -> i64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[8..]);
        i64::from_be_bytes(buf)
    }
}

impl From<[u8; KEY_LEN]> for CacheKey {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({:016x}:{})", self.context_fingerprint().0, self.item())
    }
}

/// Hash of model name and canonical context, shared by all items of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextFingerprint(u64);

impl ContextFingerprint {
    /// Fingerprint a model name and already-canonicalized context bytes.
    pub fn compute(model_name: &str, canonical_context: &[u8]) -> Self {
        let mut hasher = Xxh64::new(0);
        hasher.update(&(model_name.len() as u32).to_be_bytes());
        hasher.update(model_name.as_bytes());
        hasher.update(canonical_context);
        Self(hasher.digest())
    }

    /// The cache key for one item under this context.
    pub fn key_for(&self, item: i64) -> CacheKey {
        let mut bytes = [0u8; KEY_LEN];
        bytes[..8].copy_from_slice(&self.0.to_be_bytes());
        bytes[8..].copy_from_slice(&item.to_be_bytes());
        CacheKey(bytes)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Build a single key from its three inputs.
pub fn build_key(model_name: &str, canonical_context: &[u8], item: i64) -> CacheKey {
    ContextFingerprint::compute(model_name, canonical_context).key_for(item)
}

/// Turns requests into cache keys using the configured high-cardinality fields.
#[derive(Debug, Clone, Default)]
pub struct KeyBuilder {
    high_cardinality: Arc<HighCardinalityKeys>,
}

impl KeyBuilder {
    pub fn new(high_cardinality: Arc<HighCardinalityKeys>) -> Self {
        Self { high_cardinality }
    }

    /// Canonicalize `context` and fingerprint it with `model_name`.
    pub fn fingerprint(&self, model_name: &str, context: &Context) -> ContextFingerprint {
        let canonical = canonicalize(context, &self.high_cardinality);
        ContextFingerprint::compute(model_name, &canonical)
    }

    pub fn high_cardinality(&self) -> &HighCardinalityKeys {
        &self.high_cardinality
    }
}
