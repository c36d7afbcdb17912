//! An HTTP/1.1 client with connection pooling, redirect following and a
//! cookie jar.
//!
//! `fetcha_core` uses a set of [feature flags] to reduce the amount of
//! compiled and optional dependencies.
//!
//! # Feature flags
//!
//! | Feature | Description | Default? |
//! | --- | --- | :---: |
//! | `rustls` | TLS built on [`rustls`](https://crates.io/crates/rustls) | ✔️ |
//! | `native-tls` | TLS built on [`native-tls`](https://crates.io/crates/native-tls) | ❌ |
//! | `blocking` | The synchronous [`blocking::Session`] façade | ❌ |
//!
//! # Overview
//!
//! A [`Session`](session::Session) is the entry point: it owns a connection
//! [`Pool`](pool::Pool) and a [`CookieJar`](cookie_jar::CookieJar), and
//! turns a [`Request`](request::Request) into a [`Response`](response::Response)
//! by dialing (or reusing) a connection to the request's [`Endpoint`](endpoint::Endpoint),
//! sending it, and following any redirects the response describes.
//!
//! ```ignore
//! use fetcha_core::endpoint::Options;
//! use fetcha_core::request::Request;
//! use fetcha_core::session::Session;
//! use url::Url;
//!
//! # async fn run() -> Result<(), fetcha_core::Error> {
//! let session = Session::new(Options::default())?;
//! let mut response = session.get(Url::parse("https://example.com/").unwrap()).await?;
//! let body = response.bytes().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "blocking")]
pub mod blocking;
pub mod body;
pub mod conn;
pub mod cookie_jar;
pub mod endpoint;
mod error;
pub mod handle;
pub mod pool;
pub mod request;
pub mod response;
pub mod session;
pub mod stream;

pub use cookie_jar::CookieJar;
pub use endpoint::{Endpoint, Options, RedirectPolicy};
pub use error::{BoxedError, Error};
pub use pool::Pool;
pub use request::Request;
pub use response::{RedirectHop, Response};
pub use session::Session;
pub use stream::Stream;

/// Result type which has [`Error`] as its error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A list of things commonly imported together when using this crate.
pub mod prelude {
    pub use crate::body::{BodySource, BytesBody, Empty, FileBody, FormBody, JsonBody};
    pub use crate::endpoint::{Endpoint, Options, RedirectPolicy};
    pub use crate::request::Request;
    pub use crate::response::Response;
    pub use crate::session::Session;
    pub use crate::{Error, Result};
}
