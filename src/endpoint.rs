//! Endpoint identity and per-session configuration.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// The scheme of an [`Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plaintext HTTP.
    Http,
    /// TLS-wrapped HTTP.
    Https,
}

impl Scheme {
    /// The default port for this scheme.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    fn from_url(url: &Url) -> Result<Self, Error> {
        match url.scheme() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(Error::other(format!("unsupported scheme: {other}"))),
        }
    }
}

/// The identity a [`Pool`](crate::pool::Pool) keys connections on: scheme,
/// host, port and (for TLS) the SNI name presented during the handshake.
///
/// Two requests share a pool slot, and therefore may reuse the same
/// connection, only if their endpoints compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Derives the endpoint a URL would be dialed on.
    pub fn from_url(url: &Url) -> Result<Self, Error> {
        let scheme = Scheme::from_url(url)?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::other("url has no host"))?
            .to_owned();
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        Ok(Self { scheme, host, port })
    }

    /// The connection scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The hostname or IP literal to dial.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The TCP port to dial.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The name presented as SNI / used for certificate verification.
    /// For this crate that is always the dial host.
    pub fn sni(&self) -> &str {
        &self.host
    }

    pub(crate) fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = match self.scheme {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

/// Governs whether a redirect response is followed at all, scoped by how far
/// the target may drift from the endpoint that produced the redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectPolicy {
    /// Never follow redirects; callers see the 3xx response directly.
    None,
    /// Follow only when scheme, host and port are all unchanged.
    SameEndpoint,
    /// Follow when the host is unchanged, scheme or port may differ.
    SameHost,
    /// Follow when the port is unchanged, scheme or host may differ.
    SamePort,
    /// Follow when the scheme is unchanged, host or port may differ.
    SameScheme,
    /// Follow to any absolute URL the server names.
    #[default]
    Any,
}

impl RedirectPolicy {
    pub(crate) fn allows(&self, from: &Endpoint, to: &Endpoint) -> bool {
        match self {
            Self::None => false,
            Self::SameEndpoint => from == to,
            Self::SameHost => from.host == to.host,
            Self::SamePort => from.port == to.port,
            Self::SameScheme => from.scheme == to.scheme,
            Self::Any => true,
        }
    }
}

/// Per-session configuration: redirect behavior, TLS strictness, per-endpoint
/// pool sizing and the handful of timeouts this crate enforces itself
/// (hyper and tokio own the wire-level ones).
#[derive(Debug, Clone)]
pub struct Options {
    /// Reject plaintext `http://` endpoints outright. Defaults to `false`.
    pub enforce_tls: bool,
    /// Maximum number of redirects followed before giving up with
    /// [`Error::TooManyRedirects`]. Defaults to `5`.
    pub max_redirects: u32,
    /// Which redirects are permitted at all. Defaults to
    /// [`RedirectPolicy::Any`].
    pub redirect_policy: RedirectPolicy,
    /// Maximum number of connections held open (idle or in use) per
    /// endpoint. Defaults to `32`.
    pub max_connections_per_endpoint: usize,
    /// Maximum number of callers allowed to queue behind an endpoint whose
    /// pool is already at capacity before further acquisitions fail
    /// immediately instead of waiting. `None` means unbounded. Defaults to
    /// `None`.
    pub max_pending_per_endpoint: Option<usize>,
    /// Time budget for establishing a new connection (TCP connect plus TLS
    /// handshake). Defaults to 10 seconds.
    pub connect_timeout: Duration,
    /// Time budget for a single request/response exchange on an already
    /// established connection, not counting body streaming. Defaults to 30
    /// seconds.
    pub request_timeout: Duration,
    /// `User-Agent` header synthesized for requests that don't set one.
    pub user_agent: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enforce_tls: false,
            max_redirects: 5,
            redirect_policy: RedirectPolicy::default(),
            max_connections_per_endpoint: 32,
            max_pending_per_endpoint: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("fetcha/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl Options {
    /// Rejects plaintext `http://` endpoints outright.
    pub fn with_enforce_tls(mut self, enforce_tls: bool) -> Self {
        self.enforce_tls = enforce_tls;
        self
    }

    /// Sets the maximum number of redirects followed before giving up.
    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Sets which redirects are permitted at all.
    pub fn with_redirect_policy(mut self, policy: RedirectPolicy) -> Self {
        self.redirect_policy = policy;
        self
    }

    /// Sets the maximum number of connections held open per endpoint.
    pub fn with_max_connections_per_endpoint(mut self, max: usize) -> Self {
        self.max_connections_per_endpoint = max;
        self
    }

    /// Sets the time budget for establishing a new connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the time budget for a single request/response exchange.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the `User-Agent` header synthesized for requests without one.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_from_url_defaults_port() {
        let url = Url::parse("https://example.com/path").unwrap();
        let ep = Endpoint::from_url(&url).unwrap();
        assert_eq!(ep.port(), 443);
        assert_eq!(ep.host(), "example.com");
        assert_eq!(ep.scheme(), Scheme::Https);
    }

    #[test]
    fn endpoint_from_url_explicit_port() {
        let url = Url::parse("http://example.com:8080/path").unwrap();
        let ep = Endpoint::from_url(&url).unwrap();
        assert_eq!(ep.port(), 8080);
    }

    #[test]
    fn redirect_policy_same_host_ignores_scheme_and_port() {
        let a = Endpoint::from_url(&Url::parse("http://example.com:8080/").unwrap()).unwrap();
        let b = Endpoint::from_url(&Url::parse("https://example.com/").unwrap()).unwrap();
        assert!(RedirectPolicy::SameHost.allows(&a, &b));
        assert!(!RedirectPolicy::SameEndpoint.allows(&a, &b));
    }

    #[test]
    fn redirect_policy_none_never_allows() {
        let a = Endpoint::from_url(&Url::parse("http://example.com/").unwrap()).unwrap();
        assert!(!RedirectPolicy::None.allows(&a, &a));
    }
}
