//! Backend addresses and the resolved set.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::{ProxyCacheError, Result};

/// A `host:port` backend address.
///
/// Hosts containing `:` (IPv6 literals) must be bracketed: `[::1]:8501`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `scheme://host:port` with no trailing slash.
    pub fn base_url(&self, scheme: &str) -> String {
        format!("{scheme}://{self}")
    }
}

impl FromStr for Endpoint {
    type Err = ProxyCacheError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || ProxyCacheError::MalformedEndpoint(s.to_string());
        let trimmed = s.trim();
        let (host, port) = trimmed.rsplit_once(':').ok_or_else(malformed)?;

        let host = match host.strip_prefix('[') {
            Some(rest) => rest.strip_suffix(']').ok_or_else(malformed)?,
            None if host.contains(':') => return Err(malformed()),
            None => host,
        };
        if host.is_empty() {
            return Err(malformed());
        }
        let port: u16 = port.parse().map_err(|_| malformed())?;

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// The last successfully resolved endpoints and when they were resolved.
///
/// Immutable; the resolver publishes a new set on every successful poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpointSet {
    endpoints: BTreeSet<Endpoint>,
    resolved_at: Instant,
}

impl ResolvedEndpointSet {
    pub fn new(endpoints: BTreeSet<Endpoint>, resolved_at: Instant) -> Self {
        Self {
            endpoints,
            resolved_at,
        }
    }

    /// Endpoints in a stable (sorted) order.
    pub fn endpoints(&self) -> impl ExactSizeIterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.endpoints.contains(endpoint)
    }

    /// The `n`th endpoint, wrapping around. `None` only when empty.
    pub fn nth_wrapping(&self, n: usize) -> Option<&Endpoint> {
        if self.endpoints.is_empty() {
            return None;
        }
        self.endpoints.iter().nth(n % self.endpoints.len())
    }

    pub fn resolved_at(&self) -> Instant {
        self.resolved_at
    }

    pub fn age(&self) -> Duration {
        self.resolved_at.elapsed()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let ep: Endpoint = "tfserving-0.internal:8501".parse().unwrap();
        assert_eq!(ep.host(), "tfserving-0.internal");
        assert_eq!(ep.port(), 8501);
        assert_eq!(ep.to_string(), "tfserving-0.internal:8501");
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let ep: Endpoint = "[::1]:8501".parse().unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.base_url("http"), "http://[::1]:8501");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["nohost", ":8080", "host:", "host:notaport", "host:70000", "::1:80", "[::1:80"] {
            let err = bad.parse::<Endpoint>().unwrap_err();
            assert!(
                matches!(err, ProxyCacheError::MalformedEndpoint(_)),
                "{bad} should be malformed"
            );
        }
    }

    #[test]
    fn nth_wrapping_cycles_in_sorted_order() {
        let set = ResolvedEndpointSet::new(
            ["b:2", "a:1"].iter().map(|s| s.parse().unwrap()).collect(),
            Instant::now(),
        );
        assert_eq!(set.nth_wrapping(0).unwrap().to_string(), "a:1");
        assert_eq!(set.nth_wrapping(1).unwrap().to_string(), "b:2");
        assert_eq!(set.nth_wrapping(2).unwrap().to_string(), "a:1");
    }
}
