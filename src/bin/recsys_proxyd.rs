//! recsys-proxyd: recommendation score caching proxy daemon.
//!
//! Serves `GetScores` over gRPC, answering from the node-local score cache
//! and falling through to the model-serving backend for misses.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tonic::transport::Server;
use tracing::{info, warn};

use recsys_proxy_cache::cache::{KeyBuilder, ScoreStore};
use recsys_proxy_cache::resolver::{LookasideResolver, ResolverConfig};
use recsys_proxy_cache::scoring::{
    EndpointSource, RandomScorer, Scorer, ScoringFacade, TfServingScorer,
};
use recsys_proxy_cache::server::RecsysProxyService;
use recsys_proxy_cache::server::config::Config;
use recsys_proxy_cache::server::proto::recsys_proxy_cache_server::RecsysProxyCacheServer;
use recsys_proxy_cache::{ProxyCacheError, ScoreProxy};

/// Caching proxy in front of a model-serving backend.
#[derive(Parser)]
#[command(name = "recsys-proxyd")]
#[command(version = recsys_proxy_cache::PKG_VERSION)]
#[command(about = "Recommendation score caching proxy daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "RECSYS_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Static backend URL; replaces backend.url and backend.discovery from the file.
    #[arg(long, env = "RECSYS_TARGET")]
    backend_url: Option<String>,

    /// Override server.address from the file.
    #[arg(long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(url) = args.backend_url {
        config.backend.url = Some(url);
        config.backend.discovery = None;
    }
    if let Some(address) = args.address {
        config.server.address = address;
    }

    let addr: SocketAddr = config
        .server
        .address
        .parse()
        .map_err(|e| ProxyCacheError::Configuration(format!("Invalid address: {e}")))?;

    let proxy = Arc::new(build_proxy(&config)?);

    info!(version = recsys_proxy_cache::version_string(), %addr, "recsys-proxyd starting");

    let service = RecsysProxyService::new(Arc::clone(&proxy));
    let server = RecsysProxyCacheServer::new(service);

    Server::builder()
        .add_service(server)
        .serve_with_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await?;

    proxy.shutdown();
    info!("recsys-proxyd stopped");
    Ok(())
}

/// Assemble the proxy from configuration.
///
/// A malformed high-cardinality configuration is fatal here rather than
/// silently caching under unbounded keys.
fn build_proxy(config: &Config) -> Result<ScoreProxy, ProxyCacheError> {
    let high_cardinality = config.cache.high_cardinality_keys()?;
    info!(
        fields = high_cardinality.len(),
        "loaded high-cardinality context keys"
    );

    let backend_config = &config.backend;
    let mut resolver = None;
    let backend: Arc<dyn Scorer> = if let Some(url) = &backend_config.url {
        info!(%url, "using static backend");
        Arc::new(TfServingScorer::new(
            EndpointSource::Static(url.clone()),
            backend_config.request_timeout(),
        )?)
    } else if let Some(discovery) = &backend_config.discovery {
        info!(url = %discovery.url, "using lookaside discovery");
        let lookaside = Arc::new(LookasideResolver::start(
            ResolverConfig::from(discovery),
            discovery.format.parser(),
        )?);
        resolver = Some(Arc::clone(&lookaside));
        Arc::new(TfServingScorer::new(
            EndpointSource::Lookaside {
                resolver: lookaside,
                scheme: discovery.scheme.clone(),
            },
            backend_config.request_timeout(),
        )?)
    } else {
        warn!("no backend configured, every model is scored randomly");
        Arc::new(RandomScorer)
    };

    let mut scoring = ScoringFacade::new(backend).timeout(backend_config.timeout());
    if backend_config.enable_random_model {
        scoring = scoring.with_random_model();
    }

    let store = Arc::new(ScoreStore::start(&config.cache.store_config()));
    let proxy = ScoreProxy::new(KeyBuilder::new(Arc::new(high_cardinality)), store, scoring);
    Ok(match resolver {
        Some(resolver) => proxy.with_resolver(resolver),
        None => proxy,
    })
}
