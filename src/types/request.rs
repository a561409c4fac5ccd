//! Inbound scoring request.

use serde::{Deserialize, Serialize};

use super::context::Context;
use crate::{ProxyCacheError, Result};

/// A request to score `items` for `model_name` under `context`.
///
/// `items` may contain duplicates; scores come back aligned with this
/// exact sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub model_name: String,
    #[serde(default)]
    pub context: Context,
    pub items: Vec<i64>,
}

impl ScoreRequest {
    pub fn new(model_name: impl Into<String>, context: Context, items: Vec<i64>) -> Self {
        Self {
            model_name: model_name.into(),
            context,
            items,
        }
    }

    /// Reject requests that must not touch the cache or the backend.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(ProxyCacheError::InvalidInput(
                "must provide at least 1 item for scoring. Received 0 items".to_string(),
            ));
        }
        Ok(())
    }

    /// Items with duplicates removed, keeping first occurrence order.
    pub fn unique_items(&self) -> Vec<i64> {
        let mut seen = std::collections::HashSet::with_capacity(self.items.len());
        self.items
            .iter()
            .copied()
            .filter(|item| seen.insert(*item))
            .collect()
    }
}
