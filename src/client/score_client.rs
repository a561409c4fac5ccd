//! gRPC client for recsys-proxyd.
//!
//! Proto ↔ native conversions are shared with the server through
//! [`crate::server::convert`].

use tonic::transport::Channel;

use crate::server::proto;
use crate::server::proto::recsys_proxy_cache_client::RecsysProxyCacheClient;
use crate::{ProxyCacheError, Result, ScoreRequest};

/// Connection to a running recsys-proxyd.
///
/// Cloning is cheap; clones share the underlying channel.
#[derive(Clone)]
pub struct ScoreClient {
    inner: RecsysProxyCacheClient<Channel>,
}

impl ScoreClient {
    /// Connect to a daemon at the given address.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = ScoreClient::connect("http://127.0.0.1:50051").await?;
    /// ```
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let inner = RecsysProxyCacheClient::connect(addr.clone())
            .await
            .map_err(|e| ProxyCacheError::Http(format!("failed to connect to {addr}: {e}")))?;
        Ok(Self { inner })
    }

    /// Score `request.items`; the result is aligned with the request order.
    pub async fn get_scores(&self, request: &ScoreRequest) -> Result<Vec<f64>> {
        let response = self
            .inner
            .clone()
            .get_scores(proto::ScoreRequest::from(request))
            .await
            .map_err(from_status)?;
        Ok(response.into_inner().scores)
    }
}

/// Convert [`tonic::Status`] to [`ProxyCacheError`].
fn from_status(status: tonic::Status) -> ProxyCacheError {
    match status.code() {
        tonic::Code::InvalidArgument => ProxyCacheError::InvalidInput(status.message().to_string()),
        tonic::Code::Unavailable => ProxyCacheError::Http(status.message().to_string()),
        tonic::Code::DeadlineExceeded => ProxyCacheError::Backend {
            status: 504,
            message: status.message().to_string(),
        },
        _ => ProxyCacheError::Http(format!("{}: {}", status.code(), status.message())),
    }
}
