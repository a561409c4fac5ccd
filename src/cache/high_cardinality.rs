//! High-cardinality context field reduction.
//!
//! Some context fields (a per-visit `session` token is the usual culprit)
//! are unique on every request. Hashed verbatim into the cache key they
//! push the hit rate to roughly zero. Fields registered here have each raw
//! value replaced by `hash(value) % buckets` before the key is built, so
//! requests whose values land in the same bucket share cache entries.
//!
//! The bucket count is the operator's knob: fewer buckets raise the hit
//! rate and the chance that unrelated values collide.
//!
//! # Configuration format
//!
//! Loaded once at startup from a JSON array (or the daemon's TOML config):
//!
//! ```json
//! [
//!   {"key": "session", "hashFunction": "farmfingerprint64", "buckets": 10},
//!   {"key": "visitor", "hashFunction": "xxh3"}
//! ]
//! ```
//!
//! `buckets` is optional; without it the raw 64-bit hash is used. An
//! unknown `hashFunction` fails the load, never a request.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{info, warn};
use xxhash_rust::xxh3::xxh3_64;
use xxhash_rust::xxh64::xxh64;

use crate::{ProxyCacheError, Result};

/// Hash functions available for reducing high-cardinality values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashFunction {
    /// FarmHash `Fingerprint64`, stable across platforms and releases.
    FarmFingerprint64,
    /// xxHash64 with seed 0.
    Xxh64,
    /// XXH3 64-bit with the default secret.
    Xxh3,
}

impl HashFunction {
    /// Hash raw value bytes to an unsigned 64-bit integer.
    pub fn hash(self, bytes: &[u8]) -> u64 {
        match self {
            HashFunction::FarmFingerprint64 => farmhash::fingerprint64(bytes),
            HashFunction::Xxh64 => xxh64(bytes, 0),
            HashFunction::Xxh3 => xxh3_64(bytes),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HashFunction::FarmFingerprint64 => "farmfingerprint64",
            HashFunction::Xxh64 => "xxh64",
            HashFunction::Xxh3 => "xxh3",
        }
    }
}

impl FromStr for HashFunction {
    type Err = ProxyCacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "farmfingerprint64" | "farm_fingerprint64" => Ok(HashFunction::FarmFingerprint64),
            "xxh64" | "xxhash64" => Ok(HashFunction::Xxh64),
            "xxh3" | "xxh3_64" => Ok(HashFunction::Xxh3),
            _ => Err(ProxyCacheError::UnknownHashFunction(s.to_string())),
        }
    }
}

impl fmt::Display for HashFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured high-cardinality field, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HighCardinalityField {
    /// Context field name.
    pub key: String,
    /// Hash function identifier, e.g. `"farmfingerprint64"` or `"xxh64"`.
    #[serde(rename = "hashFunction", alias = "hash_function")]
    pub hash_function: String,
    /// Optional bucket count the hash is reduced modulo.
    #[serde(default)]
    pub buckets: Option<u64>,
}

impl HighCardinalityField {
    pub fn new(key: impl Into<String>, hash_function: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            hash_function: hash_function.into(),
            buckets: None,
        }
    }

    pub fn buckets(mut self, buckets: u64) -> Self {
        self.buckets = Some(buckets);
        self
    }
}

/// Reduces the values of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldReducer {
    hash: HashFunction,
    buckets: Option<NonZeroU64>,
}

impl FieldReducer {
    pub fn new(hash: HashFunction, buckets: Option<NonZeroU64>) -> Self {
        Self { hash, buckets }
    }

    /// `hash(value)`, reduced modulo the bucket count when one is set.
    ///
    /// Both operands are unsigned 64-bit; the result is in `[0, buckets)`.
    pub fn reduce(&self, value: &[u8]) -> u64 {
        let hashed = self.hash.hash(value);
        match self.buckets {
            Some(buckets) => hashed % buckets.get(),
            None => hashed,
        }
    }

    pub fn hash_function(&self) -> HashFunction {
        self.hash
    }

    pub fn bucket_count(&self) -> Option<u64> {
        self.buckets.map(NonZeroU64::get)
    }
}

/// The process-wide set of high-cardinality fields.
///
/// Read-only after construction; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct HighCardinalityKeys {
    reducers: HashMap<String, FieldReducer>,
}

impl HighCardinalityKeys {
    /// No high-cardinality fields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate configured fields into reducers.
    ///
    /// Fails on an unknown hash function or a zero bucket count.
    pub fn from_fields(fields: impl IntoIterator<Item = HighCardinalityField>) -> Result<Self> {
        let mut reducers = HashMap::new();
        for field in fields {
            let hash: HashFunction = field.hash_function.parse().inspect_err(|_| {
                warn!(
                    key = %field.key,
                    hash_function = %field.hash_function,
                    "unknown hash function for high cardinality key"
                );
            })?;
            let buckets = match field.buckets {
                None => None,
                Some(n) => Some(NonZeroU64::new(n).ok_or_else(|| {
                    ProxyCacheError::Configuration(format!(
                        "high cardinality key '{}' has zero buckets",
                        field.key
                    ))
                })?),
            };
            info!(key = %field.key, %hash, buckets = ?field.buckets, "registered high cardinality key");
            if reducers
                .insert(field.key.clone(), FieldReducer::new(hash, buckets))
                .is_some()
            {
                warn!(key = %field.key, "duplicate high cardinality key, last entry wins");
            }
        }
        Ok(Self { reducers })
    }

    /// Parse the JSON array format described in the module docs.
    pub fn from_json(json: &str) -> Result<Self> {
        let fields: Vec<HighCardinalityField> = serde_json::from_str(json)?;
        Self::from_fields(fields)
    }

    /// Load the JSON array format from a file.
    pub fn load(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "loading high cardinality key configuration");
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyCacheError::Configuration(format!(
                "failed to read high cardinality keys {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Combine two configurations; entries in `other` win on conflict.
    pub fn merge(mut self, other: HighCardinalityKeys) -> Self {
        self.reducers.extend(other.reducers);
        self
    }

    pub fn is_high_cardinality(&self, field: &str) -> bool {
        self.reducers.contains_key(field)
    }

    pub fn reducer(&self, field: &str) -> Option<&FieldReducer> {
        self.reducers.get(field)
    }

    /// Reduce `value` if `field` is registered, `None` otherwise.
    pub fn reduce(&self, field: &str, value: &[u8]) -> Option<u64> {
        self.reducers.get(field).map(|r| r.reduce(value))
    }

    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }
}
