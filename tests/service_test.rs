//! Integration tests for gRPC service mode.
//!
//! Starts an in-process recsys-proxyd service and connects with a
//! [`ScoreClient`], validating the full round-trip through proto conversions.

#![cfg(all(feature = "server", feature = "client"))]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tonic::transport::Server;

use recsys_proxy_cache::cache::{HighCardinalityKeys, KeyBuilder, ScoreStore, StoreConfig};
use recsys_proxy_cache::client::ScoreClient;
use recsys_proxy_cache::scoring::{Scorer, ScoringFacade};
use recsys_proxy_cache::server::RecsysProxyService;
use recsys_proxy_cache::server::proto::recsys_proxy_cache_server::RecsysProxyCacheServer;
use recsys_proxy_cache::{Context, ProxyCacheError, Result, ScoreProxy, ScoreRequest};

/// Scores an item by the number of values of its `boost` context field.
struct BoostScorer;

#[async_trait]
impl Scorer for BoostScorer {
    fn name(&self) -> &str {
        "boost"
    }

    async fn score(
        &self,
        _model: &str,
        items: &[i64],
        context: &Context,
    ) -> Result<HashMap<i64, f64>> {
        let boost = context.get("boost").map_or(0, <[String]>::len) as f64;
        Ok(items.iter().map(|i| (*i, *i as f64 + boost)).collect())
    }
}

/// Find an available port for testing.
async fn find_available_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start a test server on a random port and return the address string.
async fn start_test_server() -> String {
    let addr = find_available_port().await;
    let addr_str = format!("http://{addr}");

    let proxy = ScoreProxy::new(
        KeyBuilder::new(Arc::new(HighCardinalityKeys::empty())),
        Arc::new(ScoreStore::start(&StoreConfig::new().max_entries(1_000))),
        ScoringFacade::new(Arc::new(BoostScorer)),
    );
    let service = RecsysProxyService::new(Arc::new(proxy));
    let server = RecsysProxyCacheServer::new(service);

    tokio::spawn(async move {
        Server::builder()
            .add_service(server)
            .serve(addr)
            .await
            .unwrap();
    });

    // Give the server a moment to bind.
    tokio::time::sleep(Duration::from_millis(100)).await;

    addr_str
}

#[tokio::test]
async fn test_client_connect() {
    let addr = start_test_server().await;
    let client = ScoreClient::connect(&addr).await;
    assert!(client.is_ok(), "failed to connect: {:?}", client.err());
}

#[tokio::test]
async fn test_get_scores_round_trip() {
    let addr = start_test_server().await;
    let client = ScoreClient::connect(&addr).await.unwrap();

    let request = ScoreRequest::new(
        "ranker",
        Context::new().with_field("boost", ["a", "b"]),
        vec![3, 1, 3],
    );
    let scores = client.get_scores(&request).await.unwrap();
    assert_eq!(scores, vec![5.0, 3.0, 5.0]);
}

#[tokio::test]
async fn test_empty_items_is_invalid_argument() {
    let addr = start_test_server().await;
    let client = ScoreClient::connect(&addr).await.unwrap();

    let request = ScoreRequest::new("ranker", Context::new(), vec![]);
    let err = client.get_scores(&request).await.unwrap_err();
    assert!(
        matches!(err, ProxyCacheError::InvalidInput(ref msg) if msg.contains("at least 1 item")),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_connect_to_nothing_fails() {
    let addr = find_available_port().await;
    let result = ScoreClient::connect(format!("http://{addr}")).await;
    assert!(result.is_err());
}
