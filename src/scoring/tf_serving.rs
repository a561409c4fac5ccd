//! TensorFlow Serving REST backend.
//!
//! Calls `POST {base}/v1/models/{model}:predict` with the columnar
//! `inputs` format:
//!
//! ```json
//! {"inputs": {"item_id": [[11, 12, 13]], "country": ["US"], "session": ["ab12"]}}
//! ```
//!
//! `item_id` is an int64 tensor of shape `[1, n]` and every context field
//! becomes a string tensor of its values. Every served model is expected
//! to accept `item_id` and to produce a `scores` output aligned with it.
//! Scores are read from `outputs.scores` (or a bare `outputs` array),
//! flattened, and zipped with the requested items in order. Any count
//! mismatch fails the call.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::Scorer;
use crate::resolver::LookasideResolver;
use crate::types::Context;
use crate::{ProxyCacheError, Result, telemetry, version};

/// Where the backend lives.
pub enum EndpointSource {
    /// Fixed base URL, e.g. `http://tfserving:8501`.
    Static(String),
    /// Addresses from the lookaside resolver, used round-robin over `scheme`.
    Lookaside {
        resolver: Arc<LookasideResolver>,
        scheme: String,
    },
}

/// REST client for a TensorFlow Serving style predict API.
pub struct TfServingScorer {
    http: Client,
    source: EndpointSource,
    next: AtomicUsize,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    inputs: HashMap<&'a str, Value>,
}

impl TfServingScorer {
    /// Create a client. `request_timeout` bounds the raw HTTP exchange; the
    /// facade's budget is applied on top.
    pub fn new(source: EndpointSource, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent(version::user_agent())
            .build()
            .map_err(|e| {
                ProxyCacheError::Configuration(format!("failed to build backend client: {e}"))
            })?;
        Ok(Self {
            http,
            source,
            next: AtomicUsize::new(0),
        })
    }

    async fn base_url(&self) -> Result<String> {
        match &self.source {
            EndpointSource::Static(url) => Ok(url.trim_end_matches('/').to_string()),
            EndpointSource::Lookaside { resolver, scheme } => {
                let set = resolver.endpoints().await?;
                let n = self.next.fetch_add(1, Ordering::Relaxed);
                let endpoint = set
                    .nth_wrapping(n)
                    .ok_or_else(|| ProxyCacheError::Discovery("resolved set is empty".into()))?;
                Ok(endpoint.base_url(scheme))
            }
        }
    }

    fn on_connect_error(&self) {
        if let EndpointSource::Lookaside { resolver, .. } = &self.source {
            resolver.refresh();
        }
    }
}

#[async_trait]
impl Scorer for TfServingScorer {
    fn name(&self) -> &str {
        "tfserving"
    }

    async fn ready(&self) -> Result<()> {
        match &self.source {
            EndpointSource::Static(_) => Ok(()),
            EndpointSource::Lookaside { resolver, .. } => resolver.endpoints().await.map(|_| ()),
        }
    }

    async fn score(
        &self,
        model: &str,
        items: &[i64],
        context: &Context,
    ) -> Result<HashMap<i64, f64>> {
        let url = format!("{}/v1/models/{model}:predict", self.base_url().await?);
        let body = predict_request(items, context);
        debug!(%url, items = items.len(), "sending predict request");

        let response = match self.http.post(&url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                if e.is_connect() {
                    warn!(%url, error = %e, "backend connection failed, requesting re-resolution");
                    self.on_connect_error();
                }
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProxyCacheError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response.json().await?;
        let scores = extract_scores(&payload)?;
        if scores.len() != items.len() {
            warn!(
                %model,
                requested = items.len(),
                returned = scores.len(),
                "backend returned a different number of scores than items"
            );
            metrics::counter!(telemetry::INTEGRITY_FAILURES_TOTAL).increment(1);
            return Err(ProxyCacheError::Integrity {
                items: items.to_vec(),
                missing: items.len().saturating_sub(scores.len()),
                scores,
            });
        }
        Ok(items.iter().copied().zip(scores).collect())
    }
}

fn predict_request<'a>(items: &[i64], context: &'a Context) -> PredictRequest<'a> {
    let mut inputs: HashMap<&str, Value> = context
        .fields
        .iter()
        .map(|(name, values)| (name.as_str(), Value::from(values.clone())))
        .collect();
    // The item tensor wins over a context field of the same name.
    inputs.insert("item_id", Value::from(vec![Value::from(items.to_vec())]));
    PredictRequest { inputs }
}

fn extract_scores(payload: &Value) -> Result<Vec<f64>> {
    let outputs = payload
        .get("outputs")
        .ok_or_else(|| ProxyCacheError::Backend {
            status: 200,
            message: "predict response has no outputs".to_string(),
        })?;
    let tensor = match outputs {
        Value::Object(named) => named.get("scores").ok_or_else(|| ProxyCacheError::Backend {
            status: 200,
            message: "predict response has no scores output".to_string(),
        })?,
        other => other,
    };

    let mut scores = Vec::new();
    flatten_numbers(tensor, &mut scores)?;
    Ok(scores)
}

fn flatten_numbers(value: &Value, out: &mut Vec<f64>) -> Result<()> {
    match value {
        Value::Array(values) => values.iter().try_for_each(|v| flatten_numbers(v, out)),
        Value::Number(n) => {
            out.push(n.as_f64().unwrap_or(f64::NAN));
            Ok(())
        }
        other => Err(ProxyCacheError::Backend {
            status: 200,
            message: format!("non-numeric score in predict response: {other}"),
        }),
    }
}
