//! Pluggable request body sources.
//!
//! A [`BodySource`] is a pull-based producer of body bytes: the connection
//! asks for the next chunk, writes it to the wire, and asks again until the
//! source reports it is exhausted. Redirects that change nothing about the
//! method replay the same source from the start via [`BodySource::reset`];
//! sources that cannot rewind (e.g. a one-shot stream) return
//! [`Error::CannotReplayBody`] and the redirect fails instead of replaying
//! garbage.

mod empty;
mod file;
mod form;
mod json;
mod owned;

pub use empty::Empty;
pub use file::FileBody;
pub use form::FormBody;
pub use json::JsonBody;
pub use owned::BytesBody;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use hyper::body::{Body, Frame, SizeHint};
use mime::Mime;

use crate::error::Error;

/// A pull-based producer of request body bytes.
///
/// Implementors should prefer reporting an exact [`size_hint`](Self::size_hint)
/// whenever the total length is known ahead of time; the connection uses it
/// to synthesize a `Content-Length` header rather than falling back to
/// chunked transfer encoding.
#[async_trait]
pub trait BodySource: Send + Sync + 'static {
    /// The `Content-Type` this source implies, if any. A request that
    /// already carries an explicit header wins over this value.
    fn content_type(&self) -> Option<Mime> {
        None
    }

    /// The exact total length of the body, if known up front.
    fn size_hint(&self) -> Option<u64> {
        None
    }

    /// Pulls the next chunk, or `Ok(None)` once exhausted.
    async fn read(&mut self) -> Result<Option<Bytes>, Error>;

    /// Rewinds the source so it can be read again from the start, for
    /// replaying a request after a redirect. The default implementation
    /// refuses: most sources that need this override it (see
    /// [`BytesBody`], [`FormBody`], [`JsonBody`]); sources backed by
    /// genuinely one-shot streams should leave the default in place.
    async fn reset(&mut self) -> Result<(), Error> {
        Err(Error::CannotReplayBody)
    }
}

use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

/// A [`BodySource`] shared between the [`SourceBody`] a connection drains
/// and the [`Session`](crate::session::Session) that may need to replay it
/// for a redirect. `send_request` consumes the `http::Request<SourceBody>`
/// it's given, so the source itself has to live somewhere outside of that
/// request in order to survive past the send — this is that somewhere.
pub type SharedSource = Arc<AsyncMutex<Box<dyn BodySource>>>;

type ReadFuture = Pin<Box<dyn Future<Output = Result<Option<Bytes>, Error>> + Send>>;

/// Adapts a [`BodySource`] into a [`hyper::body::Body`] the connection can
/// hand to `SendRequest::send_request`.
pub struct SourceBody {
    source: SharedSource,
    pending: Option<ReadFuture>,
    size_hint: Option<u64>,
    content_type: Option<Mime>,
}

impl SourceBody {
    /// Wraps a freshly boxed source for a one-shot send.
    pub fn new(source: Box<dyn BodySource>) -> Self {
        Self::from_shared(Arc::new(AsyncMutex::new(source)))
    }

    /// Wraps a source that may outlive this particular send, for requests
    /// that might be replayed after a redirect.
    pub fn from_shared(source: SharedSource) -> Self {
        let (size_hint, content_type) = {
            // `try_lock` always succeeds here: a `SourceBody` is only ever
            // constructed between sends, never while a read is in flight.
            let guard = source.try_lock().expect("source not in use while constructing SourceBody");
            (guard.size_hint(), guard.content_type())
        };
        Self {
            source,
            pending: None,
            size_hint,
            content_type,
        }
    }

    /// The `Content-Type` implied by the wrapped source.
    pub fn content_type(&self) -> Option<Mime> {
        self.content_type.clone()
    }
}

impl Body for SourceBody {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, Error>>> {
        if self.pending.is_none() {
            let source = self.source.clone();
            self.pending = Some(Box::pin(async move {
                let mut guard = source.lock().await;
                guard.read().await
            }));
        }
        let fut = self.pending.as_mut().expect("just populated above");
        match fut.as_mut().poll(cx) {
            Poll::Ready(result) => {
                self.pending = None;
                Poll::Ready(match result {
                    Ok(Some(bytes)) => Some(Ok(Frame::data(bytes))),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                })
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        false
    }

    fn size_hint(&self) -> SizeHint {
        match self.size_hint {
            Some(len) => SizeHint::with_exact(len),
            None => SizeHint::default(),
        }
    }
}

/// Rewinds a shared source for a redirect replay.
pub async fn reset_shared(source: &SharedSource) -> Result<(), Error> {
    source.lock().await.reset().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn source_body_drains_bytes_body_in_order() {
        let src = BytesBody::new(Bytes::from_static(b"hello world"), None);
        let mut body = SourceBody::new(Box::new(src));
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"hello world");
    }

    #[tokio::test]
    async fn source_body_reports_exact_size_hint() {
        let src = BytesBody::new(Bytes::from_static(b"1234567890"), None);
        let body = SourceBody::new(Box::new(src));
        assert_eq!(Body::size_hint(&body).exact(), Some(10));
    }

    #[tokio::test]
    async fn source_body_empty_ends_immediately() {
        let mut body = SourceBody::new(Box::new(Empty));
        let collected = body.collect().await.unwrap().to_bytes();
        assert!(collected.is_empty());
    }
}
