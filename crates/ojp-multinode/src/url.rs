//! Multinode connection-string parsing.
//!
//! Connection strings have the shape
//! `<scheme>[<host:port>,<host:port>,...]_<underlying-url>`. A list with
//! more than one endpoint enables multinode mode; the underlying URL is
//! forwarded to the backend adapter unchanged.

use ojp_core::{Endpoint, EndpointParseError};

/// A parsed multinode connection string.
#[derive(Debug, Clone, PartialEq)]
pub struct MultinodeUrl {
    /// The scheme prefix before the bracket list.
    pub scheme: String,
    /// Proxy endpoints, in the order listed.
    pub endpoints: Vec<Endpoint>,
    /// The backend URL, forwarded unchanged.
    pub underlying_url: String,
}

impl MultinodeUrl {
    /// Parses a connection string.
    pub fn parse(url: &str) -> Result<Self, UrlParseError> {
        let open = url
            .find('[')
            .ok_or_else(|| UrlParseError::MissingEndpointList(url.to_string()))?;
        let close = url[open..]
            .find(']')
            .map(|i| open + i)
            .ok_or_else(|| UrlParseError::UnterminatedEndpointList(url.to_string()))?;

        let scheme = url[..open].to_string();
        if scheme.is_empty() {
            return Err(UrlParseError::MissingScheme(url.to_string()));
        }

        let list = &url[open + 1..close];
        if list.trim().is_empty() {
            return Err(UrlParseError::EmptyEndpointList(url.to_string()));
        }
        let endpoints = list
            .split(',')
            .map(|entry| Endpoint::parse(entry.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        let rest = &url[close + 1..];
        let underlying_url = rest
            .strip_prefix('_')
            .ok_or_else(|| UrlParseError::MissingUnderlyingUrl(url.to_string()))?;
        if underlying_url.is_empty() {
            return Err(UrlParseError::MissingUnderlyingUrl(url.to_string()));
        }

        Ok(Self {
            scheme,
            endpoints,
            underlying_url: underlying_url.to_string(),
        })
    }

    /// Whether the endpoint list enables multinode mode.
    pub fn is_multinode(&self) -> bool {
        self.endpoints.len() > 1
    }

    /// Applies per-endpoint datasource names positionally. Extra names are
    /// ignored; missing names leave endpoints unlabelled.
    pub fn with_datasources<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        for (endpoint, name) in self.endpoints.iter_mut().zip(names) {
            *endpoint = endpoint.clone().with_datasource(name.as_ref());
        }
        self
    }
}

/// Errors from [`MultinodeUrl::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlParseError {
    /// No `[...]` endpoint list.
    #[error("connection string '{0}' has no [host:port,...] endpoint list")]
    MissingEndpointList(String),
    /// A `[` with no matching `]`.
    #[error("connection string '{0}' has an unterminated endpoint list")]
    UnterminatedEndpointList(String),
    /// Nothing before the bracket.
    #[error("connection string '{0}' has no scheme before the endpoint list")]
    MissingScheme(String),
    /// `[]` with no endpoints.
    #[error("connection string '{0}' has an empty endpoint list")]
    EmptyEndpointList(String),
    /// An entry in the list failed to parse.
    #[error(transparent)]
    BadEndpoint(#[from] EndpointParseError),
    /// No `_<underlying-url>` after the list.
    #[error("connection string '{0}' has no underlying URL after the endpoint list")]
    MissingUnderlyingUrl(String),
}
