//! Inbound response representation.

use http::{HeaderMap, StatusCode, Version};
use url::Url;

use crate::stream::Stream;

/// One intermediate hop of a redirect chain: the 3xx response's own headers
/// (so callers can inspect `Location`, `Set-Cookie`, etc. for that hop) and
/// the absolute URL its `Location` resolved to.
#[derive(Debug, Clone)]
pub struct RedirectHop {
    status: StatusCode,
    headers: HeaderMap,
    location: Url,
}

impl RedirectHop {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, location: Url) -> Self {
        Self { status, headers, location }
    }

    /// The 3xx status of this intermediate response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The intermediate response's own headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The `Location` header, resolved to an absolute URL.
    pub fn location(&self) -> &Url {
        &self.location
    }
}

/// The result of sending a [`Request`](crate::request::Request): the final
/// status and headers, the history of hops a redirect chain passed through
/// on the way here, and a still-attached [`Stream`] for the body.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    version: Version,
    url: Url,
    history: Vec<RedirectHop>,
    body: Stream,
}

impl Response {
    pub(crate) fn new(
        status: StatusCode,
        headers: HeaderMap,
        version: Version,
        url: Url,
        history: Vec<RedirectHop>,
        body: Stream,
    ) -> Self {
        Self {
            status,
            headers,
            version,
            url,
            history,
            body,
        }
    }

    /// The final response status, after any redirects were followed.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The final response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The HTTP version the final response was received over.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The URL the final response actually came from.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Every redirect hop followed before the final response, oldest first;
    /// empty if no redirect occurred.
    pub fn history(&self) -> &[RedirectHop] {
        &self.history
    }

    /// The response body, still attached to its connection.
    pub fn body_mut(&mut self) -> &mut Stream {
        &mut self.body
    }

    /// Consumes the response, returning its body stream.
    pub fn into_body(self) -> Stream {
        self.body
    }

    /// Reads the entire body as bytes. Shorthand for
    /// `self.body_mut().read().await`.
    pub async fn bytes(&mut self) -> Result<bytes::Bytes, crate::error::Error> {
        self.body.read().await
    }

    /// Reads and deserializes the body as JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(&mut self) -> Result<T, crate::error::Error> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("history_len", &self.history.len())
            .finish()
    }
}
