//! Uniform random scores for development and load testing.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::Rng;

use super::Scorer;
use crate::Result;
use crate::types::Context;

/// Scores every item with a uniform random value in `[0, 1)`.
///
/// Not a production path; repeat requests only agree once the first
/// answer has been cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomScorer;

#[async_trait]
impl Scorer for RandomScorer {
    fn name(&self) -> &str {
        "random"
    }

    async fn score(
        &self,
        _model: &str,
        items: &[i64],
        _context: &Context,
    ) -> Result<HashMap<i64, f64>> {
        let mut rng = rand::thread_rng();
        Ok(items.iter().map(|item| (*item, rng.r#gen::<f64>())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_score_per_item_in_unit_range() {
        let scores = RandomScorer
            .score("random", &[1, 2, 3], &Context::new())
            .await
            .unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.values().all(|s| (0.0..1.0).contains(s)));
    }
}
