//! Lookaside endpoint resolver.
//!
//! Client-side, pull-based service discovery: a background task polls a
//! plain HTTP endpoint for the current backend addresses and keeps the last
//! good answer. Discovery latency is bounded by the refresh interval.
//!
//! # States
//!
//! | State        | Meaning                                                        |
//! |--------------|----------------------------------------------------------------|
//! | `Unresolved` | no poll has ever produced addresses                            |
//! | `Resolved`   | addresses known and younger than the refresh interval          |
//! | `Stale`      | addresses known, but older than the interval or invalidated    |
//!
//! A poll is attempted immediately on start, then whenever a tick finds
//! the data at least one refresh interval old, whenever nothing has been
//! resolved and `2 × max_wait_for_first_resolution` passed since the last
//! attempt, and whenever [`LookasideResolver::refresh`] is called. The
//! timer restarts after every attempt, so ticks land one period after it.
//!
//! Failed, empty or unparseable polls never discard known addresses; the
//! resolver always prefers stale data to none. A forced refresh that fails
//! marks the data `Stale`.
//!
//! Consumers call [`LookasideResolver::endpoints`]. While `Unresolved` it
//! waits up to `max_wait_for_first_resolution` for the first poll and then
//! fails with [`ProxyCacheError::NoEndpoints`]; zero addresses are never
//! handed out. [`LookasideResolver::subscribe`] offers the same data as a
//! `watch` channel for connection managers that react to changes.
//!
//! No lock is held across the HTTP call.

mod endpoint;
mod parser;

pub use endpoint::{Endpoint, ResolvedEndpointSet};
pub use parser::{DiscoveryFormat, ResponseParser, parse_json, parse_lines};

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{ProxyCacheError, Result, telemetry, version};

/// Configuration for the lookaside resolver.
///
/// ```rust
/// # use recsys_proxy_cache::resolver::ResolverConfig;
/// # use std::time::Duration;
/// let config = ResolverConfig::new("http://discovery.internal/tfserving")
///     .refresh_interval(Duration::from_secs(10))
///     .http_timeout(Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// URL polled with `GET` for the address list.
    pub discovery_url: String,
    /// Data older than this is refreshed; zero disables periodic polling.
    /// Default: 30s.
    pub refresh_interval: Duration,
    /// Timeout for each discovery request. Default: 2s.
    pub http_timeout: Duration,
    /// How long consumers wait for the very first resolution. Default: 2s.
    pub max_wait_for_first_resolution: Duration,
}

impl ResolverConfig {
    pub fn new(discovery_url: impl Into<String>) -> Self {
        Self {
            discovery_url: discovery_url.into(),
            refresh_interval: Duration::from_secs(30),
            http_timeout: Duration::from_secs(2),
            max_wait_for_first_resolution: Duration::from_secs(2),
        }
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn max_wait_for_first_resolution(mut self, wait: Duration) -> Self {
        self.max_wait_for_first_resolution = wait;
        self
    }

    /// Period of the scheduling timer, `None` when periodic polling is off.
    fn tick_period(&self) -> Option<Duration> {
        if self.refresh_interval.is_zero() {
            return None;
        }
        let retry_unresolved = self.max_wait_for_first_resolution * 2;
        let period = if retry_unresolved.is_zero() {
            self.refresh_interval
        } else {
            self.refresh_interval.min(retry_unresolved)
        };
        Some(period)
    }
}

/// Freshness of the resolver's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Unresolved,
    Resolved,
    Stale,
}

type Published = Option<Arc<ResolvedEndpointSet>>;

#[derive(Debug, Default)]
struct Schedule {
    last_attempt: Option<Instant>,
    forced: bool,
    invalidated: bool,
}

struct Inner {
    config: ResolverConfig,
    parser: ResponseParser,
    http: reqwest::Client,
    published: watch::Sender<Published>,
    schedule: Mutex<Schedule>,
    refresh_requested: Notify,
    shutdown: watch::Sender<bool>,
}

/// Polls a discovery endpoint and serves the last known backend addresses.
pub struct LookasideResolver {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LookasideResolver {
    /// Start polling. The first attempt is made immediately.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: ResolverConfig, parser: ResponseParser) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(config.http_timeout)
            .user_agent(version::user_agent())
            .build()
            .map_err(|e| {
                ProxyCacheError::Configuration(format!("failed to build discovery client: {e}"))
            })?;

        info!(url = %config.discovery_url, refresh = ?config.refresh_interval, "starting lookaside resolver");

        let inner = Arc::new(Inner {
            config,
            parser,
            http,
            published: watch::channel(None).0,
            schedule: Mutex::new(Schedule::default()),
            refresh_requested: Notify::new(),
            shutdown: watch::channel(false).0,
        });
        let task = tokio::spawn(run(Arc::clone(&inner)));

        Ok(Self {
            inner,
            task: Mutex::new(Some(task)),
        })
    }

    /// Current state, derived from the published data and schedule flags.
    pub fn state(&self) -> ResolverState {
        let Some(current) = self.current() else {
            return ResolverState::Unresolved;
        };
        let invalidated = self
            .inner
            .schedule
            .lock()
            .map(|s| s.invalidated)
            .unwrap_or(false);
        let interval = self.inner.config.refresh_interval;
        if invalidated || (!interval.is_zero() && current.age() > interval) {
            ResolverState::Stale
        } else {
            ResolverState::Resolved
        }
    }

    /// Last resolved set without waiting.
    pub fn current(&self) -> Published {
        self.inner.published.borrow().clone()
    }

    /// Endpoints to connect to.
    ///
    /// Returns immediately once anything has ever been resolved, stale or
    /// not. Before that, waits up to `max_wait_for_first_resolution`.
    pub async fn endpoints(&self) -> Result<Arc<ResolvedEndpointSet>> {
        if let Some(set) = self.current() {
            return Ok(set);
        }

        let wait = self.inner.config.max_wait_for_first_resolution;
        let mut published = self.inner.published.subscribe();
        let mut shutdown = self.inner.shutdown.subscribe();
        let first = tokio::time::timeout(wait, async {
            tokio::select! {
                resolved = published.wait_for(Option::is_some) => {
                    resolved.ok().and_then(|set| (*set).clone())
                }
                _ = shutdown.wait_for(|stopped| *stopped) => None,
            }
        })
        .await;

        match first {
            Ok(Some(set)) => Ok(set),
            Ok(None) => Err(ProxyCacheError::Shutdown),
            Err(_) => {
                error!(waited = ?wait, url = %self.inner.config.discovery_url, "known targets not populated yet");
                Err(ProxyCacheError::NoEndpoints(wait))
            }
        }
    }

    /// Watch the published set; `None` until the first successful poll.
    pub fn subscribe(&self) -> watch::Receiver<Published> {
        self.inner.published.subscribe()
    }

    /// Request an immediate poll, e.g. after a connection failure.
    ///
    /// If that poll fails the known data is marked stale.
    pub fn refresh(&self) {
        if let Ok(mut schedule) = self.inner.schedule.lock() {
            schedule.forced = true;
        }
        self.inner.refresh_requested.notify_one();
    }

    /// `host[:port]` of the discovery URL.
    pub fn authority(&self) -> Option<String> {
        let url = reqwest::Url::parse(&self.inner.config.discovery_url).ok()?;
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// Stop polling and fail pending first-resolution waits.
    ///
    /// Already published addresses remain readable. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        if let Some(task) = self.task.lock().ok().and_then(|mut t| t.take()) {
            info!(url = %self.inner.config.discovery_url, "stopping lookaside resolver");
            task.abort();
        }
    }
}

impl Drop for LookasideResolver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run(inner: Arc<Inner>) {
    let mut shutdown = inner.shutdown.subscribe();
    let mut ticker = inner.config.tick_period().map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });

    loop {
        if inner.should_attempt(Instant::now()) {
            inner.resolve().await;
            if let Some(ticker) = ticker.as_mut() {
                ticker.reset();
            }
        }
        tokio::select! {
            _ = shutdown.wait_for(|stopped| *stopped) => break,
            _ = inner.refresh_requested.notified() => {}
            _ = next_tick(&mut ticker) => {}
        }
    }
    debug!("lookaside resolver loop exited");
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Inner {
    fn should_attempt(&self, now: Instant) -> bool {
        let Ok(schedule) = self.schedule.lock() else {
            return true;
        };
        if schedule.forced {
            return true;
        }
        let Some(last_attempt) = schedule.last_attempt else {
            return true;
        };

        let interval = self.config.refresh_interval;
        match self.published.borrow().as_ref() {
            Some(set) => {
                let resolved_at = Instant::from_std(set.resolved_at());
                !interval.is_zero() && now.duration_since(resolved_at) >= interval
            }
            None => {
                let since = now.duration_since(last_attempt);
                let retry_unresolved = self.config.max_wait_for_first_resolution * 2;
                (!retry_unresolved.is_zero() && since >= retry_unresolved)
                    || (!interval.is_zero() && since >= interval)
            }
        }
    }

    async fn resolve(&self) {
        let forced = match self.schedule.lock() {
            Ok(mut schedule) => {
                schedule.last_attempt = Some(Instant::now());
                std::mem::take(&mut schedule.forced)
            }
            Err(_) => false,
        };
        debug!(url = %self.config.discovery_url, forced, "resolve triggered");

        match self.fetch().await {
            Ok(endpoints) if !endpoints.is_empty() => {
                let count = endpoints.len();
                let set = ResolvedEndpointSet::new(endpoints, Instant::now().into_std());
                info!(count, endpoints = ?set.endpoints().map(ToString::to_string).collect::<Vec<_>>(), "resolve successful");
                self.published.send_replace(Some(Arc::new(set)));
                if let Ok(mut schedule) = self.schedule.lock() {
                    schedule.invalidated = false;
                }
                metrics::counter!(telemetry::DISCOVERY_POLLS_TOTAL, "status" => "ok").increment(1);
                metrics::gauge!(telemetry::RESOLVED_ENDPOINTS).set(count as f64);
            }
            Ok(_) => {
                warn!(url = %self.config.discovery_url, "discovery returned no endpoints, keeping previous");
                self.mark_failed(forced);
                metrics::counter!(telemetry::DISCOVERY_POLLS_TOTAL, "status" => "empty")
                    .increment(1);
            }
            Err(e) => {
                warn!(url = %self.config.discovery_url, error = %e, "discovery poll failed, keeping previous");
                self.mark_failed(forced);
                metrics::counter!(telemetry::DISCOVERY_POLLS_TOTAL, "status" => "error")
                    .increment(1);
            }
        }
    }

    fn mark_failed(&self, forced: bool) {
        if !forced {
            return;
        }
        if let Ok(mut schedule) = self.schedule.lock() {
            schedule.invalidated = true;
        }
    }

    async fn fetch(&self) -> Result<BTreeSet<Endpoint>> {
        let response = self.http.get(&self.config.discovery_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProxyCacheError::Discovery(format!(
                "discovery endpoint returned HTTP {status}"
            )));
        }
        let body = response.text().await?;

        (self.parser)(&body)?
            .iter()
            .map(|target| target.parse::<Endpoint>())
            .collect()
    }
}
