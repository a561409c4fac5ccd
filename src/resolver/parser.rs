//! Discovery response body parsers.
//!
//! The resolver does not mandate a body format. A parser turns the body
//! into a set of `host:port` strings; the resolver validates each one.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;

use crate::Result;

/// Pluggable discovery body parser.
pub type ResponseParser = Arc<dyn Fn(&str) -> Result<HashSet<String>> + Send + Sync>;

/// Built-in body formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryFormat {
    /// Whitespace or newline separated addresses; `#` starts a comment line.
    #[default]
    Lines,
    /// `["host:port", ...]` or `{"targets": ["host:port", ...]}`.
    Json,
}

impl DiscoveryFormat {
    pub fn parser(self) -> ResponseParser {
        match self {
            DiscoveryFormat::Lines => Arc::new(parse_lines),
            DiscoveryFormat::Json => Arc::new(parse_json),
        }
    }
}

/// Parse whitespace separated addresses.
pub fn parse_lines(body: &str) -> Result<HashSet<String>> {
    Ok(body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .flat_map(str::split_whitespace)
        .map(str::to_string)
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonTargets {
    Bare(Vec<String>),
    Wrapped { targets: Vec<String> },
}

/// Parse a JSON array of addresses, bare or under a `targets` key.
pub fn parse_json(body: &str) -> Result<HashSet<String>> {
    let targets = match serde_json::from_str::<JsonTargets>(body)? {
        JsonTargets::Bare(targets) | JsonTargets::Wrapped { targets } => targets,
    };
    Ok(targets.into_iter().collect())
}
