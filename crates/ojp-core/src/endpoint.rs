//! Proxy endpoint identity and cluster-health snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// One proxy server node, identified by `host:port`.
///
/// An optional logical datasource name may ride along; it does not
/// participate in identity. Health state is tracked by the endpoint
/// registry, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: u16,
    /// Logical datasource served by this node, if configured.
    pub datasource: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint with no datasource name.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            datasource: None,
        }
    }

    /// Attaches a logical datasource name.
    pub fn with_datasource(mut self, datasource: impl Into<String>) -> Self {
        self.datasource = Some(datasource.into());
        self
    }

    /// Host component.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port component.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` rendering, the canonical address form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parses a `host:port` address.
    pub fn parse(address: &str) -> Result<Self, EndpointParseError> {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError::MissingPort(address.to_string()))?;
        if host.is_empty() {
            return Err(EndpointParseError::MissingHost(address.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| EndpointParseError::InvalidPort(address.to_string()))?;
        Ok(Self::new(host, port))
    }
}

// Identity is (host, port); the datasource label is advisory.
impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Errors from [`Endpoint::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointParseError {
    /// The address had no `:port` suffix.
    #[error("endpoint address '{0}' is missing a port")]
    MissingPort(String),
    /// The address had no host before the colon.
    #[error("endpoint address '{0}' is missing a host")]
    MissingHost(String),
    /// The port was not a valid u16.
    #[error("endpoint address '{0}' has an invalid port")]
    InvalidPort(String),
}

/// Renders the outbound cluster-health field:
/// `host1:port1(UP);host2:port2(DOWN)`.
pub fn format_cluster_health<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a Endpoint, bool)>,
{
    let mut out = String::new();
    for (endpoint, healthy) in entries {
        if !out.is_empty() {
            out.push(';');
        }
        out.push_str(&endpoint.address());
        out.push_str(if healthy { "(UP)" } else { "(DOWN)" });
    }
    out
}

/// Parses a cluster-health field. Malformed entries are skipped.
pub fn parse_cluster_health(value: &str) -> Vec<(Endpoint, bool)> {
    value
        .split(';')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let (address, state) = entry.strip_suffix(')')?.rsplit_once('(')?;
            let healthy = match state {
                "UP" => true,
                "DOWN" => false,
                _ => return None,
            };
            Endpoint::parse(address).ok().map(|e| (e, healthy))
        })
        .collect()
}
