//! Dialing and driving a single HTTP/1.1 connection.

#[cfg(feature = "rustls")]
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{HeaderMap, HeaderValue};
use hyper::body::Incoming;
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::body::SourceBody;
use crate::endpoint::{Endpoint, Options, Scheme};
use crate::error::Error;

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// What a connection learned about its own lifetime from the most recent
/// response's `Connection`/`Keep-Alive` headers.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct KeepAlive {
    pub(crate) expires_at: Option<Instant>,
    pub(crate) max_remaining: Option<u32>,
}

/// One dialed HTTP/1.1 connection, exclusively owned by whoever holds its
/// [`ConnectionHandle`](crate::handle::ConnectionHandle) at any given time.
/// Deliberately carries no internal locking: exclusivity is the pool's job,
/// not this type's.
pub struct Connection {
    send_request: SendRequest<SourceBody>,
    driver: JoinHandle<()>,
    pub(crate) keep_alive: KeepAlive,
    pub(crate) must_close: bool,
    request_timeout: Duration,
}

impl Connection {
    /// Sends a request over this connection and returns the response head;
    /// the body is left for the caller to stream via [`Stream`](crate::stream::Stream).
    ///
    /// Inspects the response's `Connection` and `Keep-Alive` headers
    /// afterward to update `must_close` and the remaining keep-alive budget,
    /// mirroring the interpretation a browser or `curl` would apply.
    pub(crate) async fn send(
        &mut self,
        request: http::Request<SourceBody>,
    ) -> Result<http::Response<Incoming>, Error> {
        if self.send_request.ready().await.is_err() {
            self.must_close = true;
            return Err(Error::NotConnected);
        }
        let response = match tokio::time::timeout(self.request_timeout, self.send_request.send_request(request)).await
        {
            Ok(result) => result?,
            Err(_) => {
                self.must_close = true;
                return Err(Error::Timeout);
            }
        };
        self.interpret_keep_alive(response.headers(), response.version());
        Ok(response)
    }

    fn interpret_keep_alive(&mut self, headers: &HeaderMap, version: http::Version) {
        let connection_header = headers
            .get(http::header::CONNECTION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let explicit_close = connection_header
            .split(',')
            .any(|tok| tok.trim() == "close");
        let explicit_keep_alive = connection_header
            .split(',')
            .any(|tok| tok.trim() == "keep-alive");

        // HTTP/1.0 defaults to close unless the server opts in; HTTP/1.1
        // defaults to keep-alive unless the server opts out.
        self.must_close = if version == http::Version::HTTP_10 {
            !explicit_keep_alive
        } else {
            explicit_close
        };

        if let Some(value) = headers.get(http::header::HeaderName::from_static("keep-alive")) {
            self.parse_keep_alive_header(value);
        }
    }

    fn parse_keep_alive_header(&mut self, value: &HeaderValue) {
        let Ok(value) = value.to_str() else { return };
        for part in value.split(',') {
            let part = part.trim();
            if let Some(secs) = part.strip_prefix("timeout=") {
                if let Ok(secs) = secs.trim().parse::<u64>() {
                    self.keep_alive.expires_at = Some(Instant::now() + Duration::from_secs(secs));
                }
            } else if let Some(max) = part.strip_prefix("max=") {
                if let Ok(max) = max.trim().parse::<u32>() {
                    self.keep_alive.max_remaining = Some(max);
                }
            }
        }
    }

    /// True if this connection should be closed rather than returned to the
    /// pool: the server asked for it, the background driver task has
    /// already died, or the keep-alive budget the server advertised ran out.
    pub(crate) fn should_close(&self) -> bool {
        if self.must_close || self.driver.is_finished() {
            return true;
        }
        if let Some(expires_at) = self.keep_alive.expires_at {
            if Instant::now() >= expires_at {
                return true;
            }
        }
        if self.keep_alive.max_remaining == Some(0) {
            return true;
        }
        false
    }

    /// Called once per exchange completed on this connection, to account
    /// against a server-advertised `Keep-Alive: max=N`.
    pub(crate) fn note_exchange_complete(&mut self) {
        if let Some(max) = self.keep_alive.max_remaining.as_mut() {
            *max = max.saturating_sub(1);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("must_close", &self.must_close)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Builds TLS configuration once and dials new connections on demand.
///
/// `rustls` is preferred when both TLS features are enabled, matching the
/// common convention in the wider `hyper`/`tokio` ecosystem; `native-tls`
/// is used only when `rustls` is disabled.
pub(crate) struct Connector {
    #[cfg(feature = "rustls")]
    tls: Arc<tokio_rustls::rustls::ClientConfig>,
    #[cfg(all(feature = "native-tls", not(feature = "rustls")))]
    tls: tokio_native_tls::TlsConnector,
}

impl Connector {
    pub(crate) fn new() -> Result<Self, Error> {
        #[cfg(feature = "rustls")]
        {
            let mut roots = tokio_rustls::rustls::RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            let config = tokio_rustls::rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();
            Ok(Self { tls: Arc::new(config) })
        }
        #[cfg(all(feature = "native-tls", not(feature = "rustls")))]
        {
            let connector = tokio_native_tls::native_tls::TlsConnector::new().map_err(|e| Error::TlsError {
                endpoint: "<connector init>".to_owned(),
                source: Box::new(e),
            })?;
            Ok(Self { tls: tokio_native_tls::TlsConnector::from(connector) })
        }
        #[cfg(not(any(feature = "rustls", feature = "native-tls")))]
        {
            Ok(Self {})
        }
    }

    pub(crate) async fn dial(&self, endpoint: &Endpoint, options: &Options) -> Result<Connection, Error> {
        if options.enforce_tls && endpoint.scheme() != Scheme::Https {
            return Err(Error::other(format!(
                "plaintext endpoint {endpoint} rejected by enforce_tls"
            )));
        }

        debug!(%endpoint, "dialing connection");
        let tcp = tokio::time::timeout(options.connect_timeout, TcpStream::connect(endpoint.authority()))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|source| Error::ConnectFailed {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let _ = tcp.set_nodelay(true);

        let io: Box<dyn AsyncStream> = match endpoint.scheme() {
            Scheme::Https => self.dial_tls(endpoint, tcp).await?,
            Scheme::Http => Box::new(tcp),
        };

        let (send_request, conn) = tokio::time::timeout(
            options.connect_timeout,
            hyper::client::conn::http1::handshake(TokioIo::new(io)),
        )
        .await
        .map_err(|_| Error::Timeout)??;

        let driver = tokio::spawn(async move {
            if let Err(err) = conn.await {
                debug!(error = %err, "connection driver task ended");
            }
        });

        Ok(Connection {
            send_request,
            driver,
            keep_alive: KeepAlive::default(),
            must_close: false,
            request_timeout: options.request_timeout,
        })
    }

    #[cfg(feature = "rustls")]
    async fn dial_tls(&self, endpoint: &Endpoint, tcp: TcpStream) -> Result<Box<dyn AsyncStream>, Error> {
        let connector = tokio_rustls::TlsConnector::from(self.tls.clone());
        let server_name = tokio_rustls::rustls::pki_types::ServerName::try_from(endpoint.sni().to_owned())
            .map_err(|e| Error::TlsError {
                endpoint: endpoint.to_string(),
                source: Box::new(e),
            })?;
        let stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::TlsError {
                endpoint: endpoint.to_string(),
                source: Box::new(e),
            })?;
        Ok(Box::new(stream))
    }

    #[cfg(all(feature = "native-tls", not(feature = "rustls")))]
    async fn dial_tls(&self, endpoint: &Endpoint, tcp: TcpStream) -> Result<Box<dyn AsyncStream>, Error> {
        let stream = self
            .tls
            .connect(endpoint.sni(), tcp)
            .await
            .map_err(|e| Error::TlsError {
                endpoint: endpoint.to_string(),
                source: Box::new(e),
            })?;
        Ok(Box::new(stream))
    }

    #[cfg(not(any(feature = "rustls", feature = "native-tls")))]
    async fn dial_tls(&self, endpoint: &Endpoint, _tcp: TcpStream) -> Result<Box<dyn AsyncStream>, Error> {
        Err(Error::other(format!(
            "endpoint {endpoint} requires TLS but no TLS backend feature is enabled"
        )))
    }
}
