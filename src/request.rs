//! Outbound request construction.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::body::{BodySource, Empty};
use crate::error::Error;

/// A single outbound HTTP request, not yet sent.
///
/// Requests are built with the fluent `header`/`body` methods and handed to
/// [`Session::request`](crate::session::Session::request) or one of its verb
/// shortcuts. A `Request` can be sent more than once (for redirect replay)
/// as long as its body source's [`reset`](BodySource::reset) succeeds.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Box<dyn BodySource>,
}

impl Request {
    /// Starts building a request for `method` against `url`.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Box::new(Empty),
        }
    }

    /// Shorthand for `Request::new(Method::GET, url)`.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Shorthand for `Request::new(Method::HEAD, url)`.
    pub fn head(url: Url) -> Self {
        Self::new(Method::HEAD, url)
    }

    /// Shorthand for `Request::new(Method::POST, url)`.
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Shorthand for `Request::new(Method::PUT, url)`.
    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Shorthand for `Request::new(Method::PATCH, url)`.
    pub fn patch(url: Url) -> Self {
        Self::new(Method::PATCH, url)
    }

    /// Shorthand for `Request::new(Method::DELETE, url)`.
    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Shorthand for `Request::new(Method::OPTIONS, url)`.
    pub fn options(url: Url) -> Self {
        Self::new(Method::OPTIONS, url)
    }

    /// Shorthand for `Request::new(Method::TRACE, url)`.
    pub fn trace(url: Url) -> Self {
        Self::new(Method::TRACE, url)
    }

    /// Shorthand for `Request::new(Method::CONNECT, url)`.
    pub fn connect(url: Url) -> Self {
        Self::new(Method::CONNECT, url)
    }

    /// Sets the request body source, replacing the default empty body.
    pub fn body(mut self, source: impl BodySource) -> Self {
        self.body = Box::new(source);
        self
    }

    /// Adds a header, parsing `name` and `value` in the process. Adding the
    /// same name more than once appends rather than replaces, preserving
    /// multiplicities the way e.g. repeated `Set-Cookie` or `Accept`
    /// headers require.
    pub fn header(
        mut self,
        name: impl TryInto<HeaderName, Error = http::header::InvalidHeaderName>,
        value: impl TryInto<HeaderValue, Error = http::header::InvalidHeaderValue>,
    ) -> Result<Self, Error> {
        self.headers.append(name.try_into()?, value.try_into()?);
        Ok(self)
    }

    /// The method this request will be sent with.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The URL this request targets.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The headers set on this request so far.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_shortcuts_set_method() {
        let url = Url::parse("http://example.com/").unwrap();
        assert_eq!(Request::get(url.clone()).method(), Method::GET);
        assert_eq!(Request::post(url.clone()).method(), Method::POST);
        assert_eq!(Request::connect(url).method(), Method::CONNECT);
    }

    #[test]
    fn header_parses_and_inserts() {
        let url = Url::parse("http://example.com/").unwrap();
        let req = Request::get(url).header("x-trace-id", "abc123").unwrap();
        assert_eq!(req.headers().get("x-trace-id").unwrap(), "abc123");
    }
}
