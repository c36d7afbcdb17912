//! Error types returned by this crate.

use std::io;

use thiserror::Error;

/// A boxed error type used for opaque body-source failures.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// The error type returned by every fallible operation in this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Connecting to the endpoint failed.
    #[error("failed to connect to {endpoint}: {source}")]
    ConnectFailed {
        /// The endpoint that could not be reached.
        endpoint: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The TLS handshake failed.
    #[error("tls handshake with {endpoint} failed: {source}")]
    TlsError {
        /// The endpoint whose handshake failed.
        endpoint: String,
        /// The underlying TLS error.
        #[source]
        source: BoxedError,
    },

    /// A request or stream operation was attempted on a connection that is
    /// not currently connected (e.g. a [`Stream`](crate::stream::Stream) used
    /// after release, or a handle pulled from a closed slot).
    #[error("not connected")]
    NotConnected,

    /// The peer closed the connection before the expected number of body
    /// bytes were received.
    #[error("unexpected end of file while reading response body")]
    Eof,

    /// The underlying HTTP engine (hyper) reported a protocol violation.
    #[error("invalid response: {0}")]
    InvalidResponse(#[source] BoxedError),

    /// A redirect response exceeded `Options::max_redirects`. Carries the
    /// history accumulated so far so callers can inspect the chain that led
    /// here even though no final response was delivered.
    #[error("too many redirects (limit is {limit})")]
    TooManyRedirects {
        /// The configured limit that was exceeded.
        limit: u32,
        /// The redirect hops followed before giving up.
        history: Vec<crate::response::RedirectHop>,
    },

    /// A redirect response pointed somewhere the configured
    /// [`RedirectPolicy`](crate::endpoint::RedirectPolicy) forbids.
    #[error("redirect to {location} forbidden by redirect policy")]
    ForbiddenRedirect {
        /// The `Location` the server asked us to follow.
        location: String,
    },

    /// A redirect required replaying the request body but the body source
    /// could not be reset (e.g. it's a one-shot stream).
    #[error("cannot replay request body for redirect")]
    CannotReplayBody,

    /// A blocking-style operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The operation was canceled, typically because the owning `Session`
    /// or `Pool` was dropped while the call was in flight.
    #[error("operation canceled")]
    Canceled,

    /// A URL could not be parsed or resolved against a base.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A header name or value was not valid for transmission.
    #[error(transparent)]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// A header name was not valid for transmission.
    #[error(transparent)]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// A request URI could not be constructed.
    #[error(transparent)]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// JSON encoding or decoding of a request/response body failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Percent/form encoding of a request body failed.
    #[error("form encoding error: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),

    /// A low-level I/O error not covered by a more specific variant.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Any other error, used for body-source failures and similar
    /// escape hatches.
    #[error(transparent)]
    Other(#[from] BoxedError),
}

impl Error {
    /// Wraps an arbitrary error as [`Error::Other`].
    pub fn other(error: impl Into<BoxedError>) -> Self {
        Self::Other(error.into())
    }

    /// True if retrying this exact exchange on a fresh connection might
    /// succeed: connect failures and `not_connected`/`eof` surprises from a
    /// stale pooled connection, never failures that happened after bytes of
    /// the request were already written.
    pub fn is_retryable_before_send(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. } | Self::NotConnected | Self::Eof
        )
    }
}

impl Error {
    /// The redirect history accumulated when this error is
    /// [`Error::TooManyRedirects`]; `None` otherwise.
    pub fn redirect_history(&self) -> Option<&[crate::response::RedirectHop]> {
        match self {
            Self::TooManyRedirects { history, .. } => Some(history),
            _ => None,
        }
    }
}

impl From<hyper::Error> for Error {
    fn from(e: hyper::Error) -> Self {
        Self::InvalidResponse(Box::new(e))
    }
}

impl From<hyper::http::Error> for Error {
    fn from(e: hyper::http::Error) -> Self {
        Self::InvalidResponse(Box::new(e))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_from_url_parse() {
        let err: Error = "not a url".parse::<url::Url>().unwrap_err().into();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn retryable_classification() {
        assert!(Error::NotConnected.is_retryable_before_send());
        assert!(Error::Eof.is_retryable_before_send());
        assert!(!Error::CannotReplayBody.is_retryable_before_send());
        assert!(!Error::TooManyRedirects { limit: 5, history: Vec::new() }.is_retryable_before_send());
    }

    #[test]
    fn other_wraps_arbitrary_error() {
        let io_err = io::Error::other("boom");
        let err = Error::other(io_err);
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.to_string(), "boom");
    }
}
