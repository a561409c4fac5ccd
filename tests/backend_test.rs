//! Integration tests for the TensorFlow Serving backend and the scoring
//! facade, using wiremock in place of the model server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use recsys_proxy_cache::resolver::{DiscoveryFormat, LookasideResolver, ResolverConfig};
use recsys_proxy_cache::scoring::{EndpointSource, Scorer, ScoringFacade, TfServingScorer};
use recsys_proxy_cache::{Context, ProxyCacheError};

fn static_scorer(server: &MockServer) -> TfServingScorer {
    TfServingScorer::new(
        EndpointSource::Static(server.uri()),
        Duration::from_secs(2),
    )
    .unwrap()
}

fn scores(values: &[f64]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "outputs": { "scores": [values] } }))
}

// =============================================================================
// Static backend
// =============================================================================

#[tokio::test]
async fn predict_request_carries_items_and_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/models/ranker:predict"))
        .and(body_partial_json(json!({
            "inputs": { "item_id": [[11, 12]], "country": ["US"] }
        })))
        .respond_with(scores(&[0.7, 0.2]))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = Context::new().with_field("country", ["US"]);
    let result = static_scorer(&server)
        .score("ranker", &[11, 12], &ctx)
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result[&11], 0.7);
    assert_eq!(result[&12], 0.2);
}

#[tokio::test]
async fn short_answer_is_an_integrity_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/models/ranker:predict"))
        .respond_with(scores(&[0.7]))
        .mount(&server)
        .await;

    let err = static_scorer(&server)
        .score("ranker", &[11, 12], &Context::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyCacheError::Integrity { missing: 1, .. }));
}

#[tokio::test]
async fn extra_scores_are_an_integrity_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/models/ranker:predict"))
        .respond_with(scores(&[0.7, 0.2, 0.9]))
        .mount(&server)
        .await;

    let err = static_scorer(&server)
        .score("ranker", &[11, 12], &Context::new())
        .await
        .unwrap_err();
    match err {
        ProxyCacheError::Integrity {
            items,
            scores,
            missing,
        } => {
            assert_eq!(items, vec![11, 12]);
            assert_eq!(scores.len(), 3);
            assert_eq!(missing, 0);
        }
        other => panic!("expected integrity error, got {other:?}"),
    }
}

#[tokio::test]
async fn http_error_status_is_a_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Servable not found"))
        .mount(&server)
        .await;

    let err = static_scorer(&server)
        .score("missing", &[1], &Context::new())
        .await
        .unwrap_err();
    match err {
        ProxyCacheError::Backend { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("Servable not found"));
        }
        other => panic!("expected backend error, got {other:?}"),
    }
}

// =============================================================================
// Facade
// =============================================================================

#[tokio::test]
async fn facade_times_out_slow_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(scores(&[0.1]).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let facade = ScoringFacade::new(Arc::new(static_scorer(&server)))
        .timeout(Duration::from_millis(50));
    let err = facade.score("ranker", &[1], &Context::new()).await.unwrap_err();
    assert!(matches!(err, ProxyCacheError::BackendTimeout(_)));
}

#[tokio::test]
async fn random_model_never_reaches_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(scores(&[0.1]))
        .expect(0)
        .mount(&server)
        .await;

    let facade = ScoringFacade::new(Arc::new(static_scorer(&server))).with_random_model();
    let result = facade.score("random", &[1, 2, 3], &Context::new()).await.unwrap();
    assert_eq!(result.len(), 3);
}

// =============================================================================
// Lookaside backend
// =============================================================================

fn address(server: &MockServer) -> String {
    server.address().to_string()
}

#[tokio::test]
async fn resolved_backends_are_used_round_robin() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    for server in [&first, &second] {
        Mock::given(method("POST"))
            .and(path("/v1/models/ranker:predict"))
            .respond_with(scores(&[0.5]))
            .expect(1)
            .mount(server)
            .await;
    }

    let discovery = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("{}\n{}\n", address(&first), address(&second))),
        )
        .mount(&discovery)
        .await;

    let resolver = Arc::new(
        LookasideResolver::start(
            ResolverConfig::new(format!("{}/targets", discovery.uri())),
            DiscoveryFormat::Lines.parser(),
        )
        .unwrap(),
    );
    let scorer = TfServingScorer::new(
        EndpointSource::Lookaside {
            resolver,
            scheme: "http".into(),
        },
        Duration::from_secs(2),
    )
    .unwrap();

    for _ in 0..2 {
        scorer.score("ranker", &[1], &Context::new()).await.unwrap();
    }
    // Each server's `expect(1)` is verified on drop.
}

#[tokio::test]
async fn connection_failure_requests_re_resolution() {
    // Reserve a port and release it so nothing is listening there.
    let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let discovery = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(ResponseTemplate::new(200).set_body_string(dead_addr.to_string()))
        .mount(&discovery)
        .await;

    let resolver = Arc::new(
        LookasideResolver::start(
            ResolverConfig::new(format!("{}/targets", discovery.uri()))
                .refresh_interval(Duration::from_secs(60)),
            DiscoveryFormat::Lines.parser(),
        )
        .unwrap(),
    );
    let scorer = TfServingScorer::new(
        EndpointSource::Lookaside {
            resolver: Arc::clone(&resolver),
            scheme: "http".into(),
        },
        Duration::from_secs(2),
    )
    .unwrap();

    let err = scorer.score("ranker", &[1], &Context::new()).await.unwrap_err();
    assert!(matches!(err, ProxyCacheError::Http(_)));

    let mut polls = 0;
    for _ in 0..100 {
        polls = discovery.received_requests().await.unwrap().len();
        if polls >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(polls >= 2, "expected a forced re-resolution, saw {polls} polls");
}

#[tokio::test]
async fn unresolved_backend_fails_fast() {
    let discovery = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&discovery)
        .await;

    let resolver = Arc::new(
        LookasideResolver::start(
            ResolverConfig::new(format!("{}/targets", discovery.uri()))
                .max_wait_for_first_resolution(Duration::from_millis(100)),
            DiscoveryFormat::Lines.parser(),
        )
        .unwrap(),
    );
    let scorer = TfServingScorer::new(
        EndpointSource::Lookaside {
            resolver,
            scheme: "http".into(),
        },
        Duration::from_secs(2),
    )
    .unwrap();

    let err = scorer.score("ranker", &[1], &Context::new()).await.unwrap_err();
    assert!(matches!(err, ProxyCacheError::NoEndpoints(_)));
}

// =============================================================================
// Facade over a lookaside backend
// =============================================================================

fn lookaside_facade(discovery: &MockServer, first_wait: Duration) -> ScoringFacade {
    let resolver = Arc::new(
        LookasideResolver::start(
            ResolverConfig::new(format!("{}/targets", discovery.uri()))
                .max_wait_for_first_resolution(first_wait),
            DiscoveryFormat::Lines.parser(),
        )
        .unwrap(),
    );
    let scorer = TfServingScorer::new(
        EndpointSource::Lookaside {
            resolver,
            scheme: "http".into(),
        },
        Duration::from_secs(2),
    )
    .unwrap();
    // Default 150ms budget.
    ScoringFacade::new(Arc::new(scorer))
}

#[tokio::test]
async fn slow_first_resolution_does_not_consume_backend_budget() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/models/ranker:predict"))
        .respond_with(scores(&[0.4]))
        .expect(1)
        .mount(&backend)
        .await;

    let discovery = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(address(&backend))
                .set_delay(Duration::from_millis(600)),
        )
        .mount(&discovery)
        .await;

    let facade = lookaside_facade(&discovery, Duration::from_secs(2));
    let result = facade.score("ranker", &[1], &Context::new()).await.unwrap();
    assert_eq!(result[&1], 0.4);
}

#[tokio::test]
async fn first_resolution_wait_reports_no_endpoints() {
    let discovery = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/targets"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("10.0.0.1:8501")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&discovery)
        .await;

    let facade = lookaside_facade(&discovery, Duration::from_millis(300));
    let err = facade.score("ranker", &[1], &Context::new()).await.unwrap_err();
    assert!(
        matches!(err, ProxyCacheError::NoEndpoints(wait) if wait == Duration::from_millis(300)),
        "unexpected error: {err:?}"
    );
}
