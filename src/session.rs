//! Multi-endpoint request routing: redirects, cookies, connection reuse.

use std::sync::Arc;

use http::{HeaderMap, Method, StatusCode};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;
use url::Url;

use crate::body::{self, Empty, SharedSource, SourceBody};
use crate::cookie_jar::CookieJar;
use crate::endpoint::{Endpoint, Options, Scheme};
use crate::error::Error;
use crate::pool::Pool;
use crate::request::Request;
use crate::response::{RedirectHop, Response};
use crate::stream::Stream;

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Headers that describe the framing or content of a request body. Stripped
/// when a 303 response turns a redirect into a fresh bodyless `GET`, since
/// carrying them forward would describe a body that's no longer being sent.
fn strip_body_framing_headers(headers: &mut HeaderMap) {
    for name in [
        http::header::CONTENT_LENGTH,
        http::header::TRANSFER_ENCODING,
        http::header::CONTENT_TYPE,
        http::header::CONTENT_ENCODING,
    ] {
        headers.remove(name);
    }
}

/// Has no body of its own regardless of status/headers, per RFC 7230 §3.3.3.
fn response_has_no_body(method: &Method, status: StatusCode) -> bool {
    *method == Method::HEAD
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
        || status.is_informational()
}

/// A multi-endpoint HTTP client: owns a connection [`Pool`] and a
/// [`CookieJar`] shared across every request, and implements the redirect
/// loop that turns a single [`Request`] into a chain of exchanges.
pub struct Session {
    pool: Pool,
    cookies: CookieJar,
}

impl Session {
    /// Builds a session governed by `options`.
    pub fn new(options: Options) -> Result<Self, Error> {
        Ok(Self {
            pool: Pool::new(options)?,
            cookies: CookieJar::new(),
        })
    }

    /// The cookie jar shared by every request this session makes.
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// The connection pool backing this session.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Sends `request`, following redirects and attaching/ingesting cookies
    /// along the way, and returns the final response with its body still
    /// attached for streaming.
    pub async fn request(&self, request: Request) -> Result<Response, Error> {
        let options = self.pool.options().clone();
        let mut history = Vec::new();
        let mut method = request.method.clone();
        let mut url = request.url.clone();
        let mut headers = request.headers;
        let mut source: SharedSource = Arc::new(AsyncMutex::new(request.body));
        let mut needs_reset = false;

        loop {
            let endpoint = Endpoint::from_url(&url)?;
            let mut handle = self.pool.acquire(endpoint.clone()).await?;

            if needs_reset {
                body::reset_shared(&source).await?;
            }

            let secure = endpoint.scheme() == Scheme::Https;
            let cookie_header = self.cookies.header_value(url.host_str().unwrap_or_default(), url.path(), secure);

            let hyper_request = build_hyper_request(&method, &url, &headers, cookie_header, &options, source.clone())?;
            let response = handle.send(hyper_request).await?;

            let status = response.status();
            let response_headers = response.headers().clone();
            let version = response.version();

            self.cookies.ingest(
                response_headers.get_all(http::header::SET_COOKIE).iter(),
                url.host_str().unwrap_or_default(),
                url.path(),
            );

            if is_redirect(status) {
                let location = response_headers.get(http::header::LOCATION).and_then(|v| v.to_str().ok());
                if let Some(location) = location {
                    let next_url = url.join(location).map_err(Error::from)?;
                    let next_endpoint = Endpoint::from_url(&next_url)?;

                    let mut stream = Stream::new(response.into_body(), handle, options.request_timeout);
                    stream.dump().await?;
                    drop(stream);

                    if history.len() as u32 >= options.max_redirects {
                        return Err(Error::TooManyRedirects {
                            limit: options.max_redirects,
                            history,
                        });
                    }
                    if !options.redirect_policy.allows(&endpoint, &next_endpoint) {
                        return Err(Error::ForbiddenRedirect {
                            location: next_url.to_string(),
                        });
                    }

                    debug!(from = %url, to = %next_url, status = %status, "following redirect");
                    history.push(RedirectHop::new(status, response_headers.clone(), next_url.clone()));

                    let downgrades_to_get = matches!(
                        status,
                        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
                    ) && method != Method::HEAD;
                    if downgrades_to_get {
                        method = Method::GET;
                        source = Arc::new(AsyncMutex::new(Box::new(Empty)));
                        strip_body_framing_headers(&mut headers);
                        needs_reset = false;
                    } else {
                        // 307/308 (and HEAD under any redirect status) replay
                        // the original method and body verbatim.
                        needs_reset = true;
                    }
                    url = next_url;
                    continue;
                }
            }

            let body_stream = if response_has_no_body(&method, status) {
                let mut stream = Stream::new(response.into_body(), handle, options.request_timeout);
                stream.dump().await.ok();
                Stream::empty()
            } else {
                Stream::new(response.into_body(), handle, options.request_timeout)
            };

            return Ok(Response::new(status, response_headers, version, url, history, body_stream));
        }
    }

    /// Shorthand for `self.request(Request::get(url))`.
    pub async fn get(&self, url: Url) -> Result<Response, Error> {
        self.request(Request::get(url)).await
    }

    /// Shorthand for `self.request(Request::head(url))`.
    pub async fn head(&self, url: Url) -> Result<Response, Error> {
        self.request(Request::head(url)).await
    }

    /// Shorthand for `self.request(Request::post(url).body(body))`.
    pub async fn post(&self, url: Url, body: impl crate::body::BodySource) -> Result<Response, Error> {
        self.request(Request::post(url).body(body)).await
    }

    /// Shorthand for `self.request(Request::put(url).body(body))`.
    pub async fn put(&self, url: Url, body: impl crate::body::BodySource) -> Result<Response, Error> {
        self.request(Request::put(url).body(body)).await
    }

    /// Shorthand for `self.request(Request::patch(url).body(body))`.
    pub async fn patch(&self, url: Url, body: impl crate::body::BodySource) -> Result<Response, Error> {
        self.request(Request::patch(url).body(body)).await
    }

    /// Shorthand for `self.request(Request::delete(url))`.
    pub async fn delete(&self, url: Url) -> Result<Response, Error> {
        self.request(Request::delete(url)).await
    }

    /// Shorthand for `self.request(Request::options(url))`.
    pub async fn options(&self, url: Url) -> Result<Response, Error> {
        self.request(Request::options(url)).await
    }

    /// Shorthand for `self.request(Request::trace(url))`.
    pub async fn trace(&self, url: Url) -> Result<Response, Error> {
        self.request(Request::trace(url)).await
    }

    /// Shorthand for `self.request(Request::connect(url))`.
    pub async fn connect(&self, url: Url) -> Result<Response, Error> {
        self.request(Request::connect(url)).await
    }
}

fn build_hyper_request(
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    cookie_header: Option<http::HeaderValue>,
    options: &Options,
    source: SharedSource,
) -> Result<http::Request<SourceBody>, Error> {
    let authority = match url.port() {
        Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
        None => url.host_str().unwrap_or_default().to_owned(),
    };
    let path_and_query = &url[url::Position::AfterPort..];
    let uri: http::Uri = path_and_query.parse().map_err(Error::from)?;

    let source_body = SourceBody::from_shared(source);
    let content_type = source_body.content_type();

    let mut builder = http::Request::builder().method(method.clone()).uri(uri);
    {
        let request_headers = builder.headers_mut().expect("builder has no error yet");
        request_headers.extend(headers.clone());
        request_headers
            .entry(http::header::HOST)
            .or_insert_with(|| http::HeaderValue::from_str(&authority).expect("authority is valid header value"));
        request_headers
            .entry(http::header::USER_AGENT)
            .or_insert_with(|| http::HeaderValue::from_str(&options.user_agent).expect("user agent is valid header value"));
        request_headers
            .entry(http::header::ACCEPT_ENCODING)
            .or_insert_with(|| http::HeaderValue::from_static("identity"));
        if let Some(cookie) = cookie_header {
            request_headers.insert(http::header::COOKIE, cookie);
        }
        if !request_headers.contains_key(http::header::CONTENT_TYPE) {
            if let Some(content_type) = content_type {
                if let Ok(value) = http::HeaderValue::from_str(content_type.as_ref()) {
                    request_headers.insert(http::header::CONTENT_TYPE, value);
                }
            }
        }
    }

    builder.body(source_body).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_request_head(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[tokio::test]
    async fn follows_a_redirect_and_records_history() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request_head(&mut socket).await;
            let redirect =
                format!("HTTP/1.1 302 Found\r\nLocation: http://{addr}/get\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            socket.write_all(redirect.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            let (mut socket, _) = listener.accept().await.unwrap();
            read_request_head(&mut socket).await;
            let ok = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";
            socket.write_all(ok).await.unwrap();
            socket.shutdown().await.ok();
        });

        let session = Session::new(Options::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}/redirect")).unwrap();
        let mut response = session.get(url).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.history().len(), 1);
        assert_eq!(response.history()[0].status(), StatusCode::FOUND);
        assert_eq!(response.history()[0].location().path(), "/get");
        assert_eq!(&response.bytes().await.unwrap()[..], b"ok");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn too_many_redirects_reports_accumulated_history() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            for _ in 0..3 {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request_head(&mut socket).await;
                let redirect = format!(
                    "HTTP/1.1 302 Found\r\nLocation: http://{addr}/next\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                socket.write_all(redirect.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        let mut options = Options::default();
        options.max_redirects = 2;
        let session = Session::new(options).unwrap();
        let url = Url::parse(&format!("http://{addr}/start")).unwrap();
        let err = session.get(url).await.unwrap_err();
        match err {
            Error::TooManyRedirects { limit, history } => {
                assert_eq!(limit, 2);
                assert_eq!(history.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        server.await.unwrap();
    }

    #[tokio::test]
    async fn ingests_and_replays_cookies_across_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request_head(&mut socket).await;
            let set_cookie =
                b"HTTP/1.1 200 OK\r\nSet-Cookie: session=abc123; Path=/\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
            socket.write_all(set_cookie).await.unwrap();
            socket.shutdown().await.ok();

            let (mut socket, _) = listener.accept().await.unwrap();
            let head = read_request_head(&mut socket).await;
            assert!(head.to_ascii_lowercase().contains("cookie: session=abc123"));
            let ok = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
            socket.write_all(ok).await.unwrap();
            socket.shutdown().await.ok();
        });

        let session = Session::new(Options::default()).unwrap();
        session
            .get(Url::parse(&format!("http://{addr}/login")).unwrap())
            .await
            .unwrap();
        session
            .get(Url::parse(&format!("http://{addr}/dashboard")).unwrap())
            .await
            .unwrap();

        server.await.unwrap();
    }

    #[tokio::test]
    async fn see_other_redirect_downgrades_method_and_drops_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let head = read_request_head(&mut socket).await;
            assert!(head.starts_with("POST"));
            let redirect =
                format!("HTTP/1.1 303 See Other\r\nLocation: http://{addr}/done\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            socket.write_all(redirect.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();

            let (mut socket, _) = listener.accept().await.unwrap();
            let head = read_request_head(&mut socket).await;
            assert!(head.starts_with("GET"));
            let ok = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
            socket.write_all(ok).await.unwrap();
            socket.shutdown().await.ok();
        });

        let session = Session::new(Options::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}/submit")).unwrap();
        let response = session
            .request(Request::post(url).body(crate::body::BytesBody::new(Bytes::from_static(b"x=1"), None)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        server.await.unwrap();
    }
}
