//! A synchronous façade over [`Session`] for callers outside an async
//! runtime.

use url::Url;

use crate::endpoint::Options;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::session::Session as AsyncSession;

/// A blocking HTTP client.
///
/// Wraps the async [`Session`](crate::session::Session) with a dedicated,
/// single-threaded Tokio runtime and drives every call to completion with
/// `block_on`. Cheap to keep around for the lifetime of a thread; expensive
/// to construct per-request, since each one spins up its own runtime.
///
/// The response returned still streams its body lazily, same as the async
/// API, but reading from it also blocks the calling thread rather than
/// requiring an executor.
pub struct Session {
    runtime: tokio::runtime::Runtime,
    inner: AsyncSession,
}

impl Session {
    /// Builds a blocking session governed by `options`, on its own
    /// current-thread runtime.
    pub fn new(options: Options) -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::from)?;
        let inner = runtime.block_on(async { AsyncSession::new(options) })?;
        Ok(Self { runtime, inner })
    }

    /// Sends `request` to completion on this session's runtime.
    pub fn request(&self, request: Request) -> Result<Response, Error> {
        self.runtime.block_on(self.inner.request(request))
    }

    /// Shorthand for `self.request(Request::get(url))`.
    pub fn get(&self, url: Url) -> Result<Response, Error> {
        self.request(Request::get(url))
    }

    /// Shorthand for `self.request(Request::post(url).body(body))`.
    pub fn post(&self, url: Url, body: impl crate::body::BodySource) -> Result<Response, Error> {
        self.request(Request::post(url).body(body))
    }

    /// Shorthand for `self.request(Request::put(url).body(body))`.
    pub fn put(&self, url: Url, body: impl crate::body::BodySource) -> Result<Response, Error> {
        self.request(Request::put(url).body(body))
    }

    /// Shorthand for `self.request(Request::delete(url))`.
    pub fn delete(&self, url: Url) -> Result<Response, Error> {
        self.request(Request::delete(url))
    }

    /// The cookie jar shared by every request this session makes.
    pub fn cookies(&self) -> &crate::cookie_jar::CookieJar {
        self.inner.cookies()
    }

    /// Reads the whole response body into memory on this session's runtime.
    /// A thin convenience over `Response::bytes`, which itself is async.
    pub fn read_body(&self, response: &mut Response) -> Result<bytes::Bytes, Error> {
        self.runtime.block_on(response.bytes())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("blocking::Session").finish()
    }
}
