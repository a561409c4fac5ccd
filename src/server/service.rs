//! gRPC service implementation.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::warn;

use crate::{ProxyCacheError, ScoreProxy};

use super::proto;
use super::proto::recsys_proxy_cache_server::RecsysProxyCache;

/// gRPC service that wraps a shared [`ScoreProxy`].
pub struct RecsysProxyService {
    proxy: Arc<ScoreProxy>,
}

impl RecsysProxyService {
    pub fn new(proxy: Arc<ScoreProxy>) -> Self {
        Self { proxy }
    }
}

#[tonic::async_trait]
impl RecsysProxyCache for RecsysProxyService {
    async fn get_scores(
        &self,
        request: Request<proto::ScoreRequest>,
    ) -> Result<Response<proto::ScoreResponse>, Status> {
        let request = request.into_inner().into();
        let scores = self.proxy.score(&request).await.map_err(to_status)?;
        Ok(Response::new(proto::ScoreResponse { scores }))
    }
}

/// Map a [`ProxyCacheError`] to the gRPC status returned to callers.
pub fn to_status(err: ProxyCacheError) -> Status {
    match &err {
        ProxyCacheError::InvalidInput(msg) => Status::invalid_argument(msg.clone()),
        ProxyCacheError::BackendTimeout(_) => Status::deadline_exceeded(err.to_string()),
        ProxyCacheError::Http(_)
        | ProxyCacheError::Backend { .. }
        | ProxyCacheError::NoEndpoints(_)
        | ProxyCacheError::Discovery(_)
        | ProxyCacheError::Shutdown => Status::unavailable(err.to_string()),
        _ => {
            warn!(error = %err, "request failed");
            Status::internal(err.to_string())
        }
    }
}
