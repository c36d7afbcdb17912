//! Streaming response bodies.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::body::{Body, Incoming};
use tokio::runtime::Handle as RuntimeHandle;
use tracing::debug;

use crate::error::Error;
use crate::handle::ConnectionHandle;

/// Bytes a dropped-while-`Active` [`Stream`] will still attempt to discard
/// on a best-effort background task before giving up and closing the
/// connection outright. Keeps a caller who drops a half-read response from
/// either blocking the drop or silently poisoning the connection for the
/// next borrower.
const DROP_DRAIN_BUDGET: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Body has not been fully read or explicitly dumped yet.
    Active,
    /// A drain (explicit or drop-triggered) is in progress.
    Draining,
    /// The body reached its end and the connection has been released or
    /// closed; no further reads are possible.
    Released,
}

/// A response body still attached to the connection it arrived on.
///
/// `Stream` is the one type in this crate that enforces the "read it or
/// explicitly dump it" discipline a pooled connection depends on: the
/// underlying connection cannot be reused for another request until its
/// body has been fully consumed, because HTTP/1.1 has no way to abandon a
/// response mid-stream without either reading past it or closing the
/// socket.
pub struct Stream {
    state: State,
    incoming: Option<Incoming>,
    handle: Option<ConnectionHandle>,
    remaining_hint: Option<u64>,
    read_timeout: Duration,
}

impl Stream {
    pub(crate) fn new(incoming: Incoming, handle: ConnectionHandle, read_timeout: Duration) -> Self {
        let remaining_hint = Body::size_hint(&incoming).exact();
        Self {
            state: State::Active,
            incoming: Some(incoming),
            handle: Some(handle),
            remaining_hint,
            read_timeout,
        }
    }

    /// An empty, already-released stream, for responses with no body
    /// (e.g. HEAD, 204, 304).
    pub(crate) fn empty() -> Self {
        Self {
            state: State::Released,
            incoming: None,
            handle: None,
            remaining_hint: Some(0),
            read_timeout: Duration::from_secs(30),
        }
    }

    /// The exact remaining byte count, if the server sent `Content-Length`
    /// and nothing has invalidated it (chunked bodies never report one).
    pub fn remaining_hint(&self) -> Option<u64> {
        self.remaining_hint
    }

    /// True once the body has been fully consumed and the connection
    /// released or closed.
    pub fn is_released(&self) -> bool {
        self.state == State::Released
    }

    /// Reads the next chunk as the peer framed it, or `None` at end of
    /// body. Never forced to fetch more than the one underlying frame.
    pub async fn read_some(&mut self) -> Result<Option<Bytes>, Error> {
        if self.state == State::Released {
            return Ok(None);
        }
        let read_timeout = self.read_timeout;
        let incoming = self.incoming.as_mut().ok_or(Error::NotConnected)?;
        loop {
            let frame = match tokio::time::timeout(read_timeout, incoming.frame()).await {
                Ok(frame) => frame,
                Err(_) => {
                    self.fail();
                    return Err(Error::Timeout);
                }
            };
            match frame {
                Some(Ok(frame)) => match frame.into_data() {
                    Ok(data) => {
                        if let Some(remaining) = self.remaining_hint.as_mut() {
                            *remaining = remaining.saturating_sub(data.len() as u64);
                        }
                        return Ok(Some(data));
                    }
                    // Trailers frame; keep polling for the real end.
                    Err(_) => continue,
                },
                Some(Err(err)) => {
                    self.fail();
                    return Err(err.into());
                }
                None => {
                    self.finish();
                    return Ok(None);
                }
            }
        }
    }

    /// Reads the entire body into one buffer, sized using the remaining
    /// `Content-Length` hint when available and falling back to growing a
    /// buffer chunk by chunk for chunked bodies.
    pub async fn read(&mut self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::with_capacity(self.remaining_hint.unwrap_or(8 * 1024) as usize);
        while let Some(chunk) = self.read_some().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Discards the rest of the body without returning it, releasing the
    /// connection back to its pool once finished. Used after an
    /// uninteresting response (e.g. a redirect) so the connection can be
    /// reused for the next hop.
    pub async fn dump(&mut self) -> Result<(), Error> {
        if self.state == State::Released {
            return Ok(());
        }
        self.state = State::Draining;
        while self.read_some().await?.is_some() {}
        Ok(())
    }

    fn finish(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.note_exchange_complete();
        }
        self.incoming = None;
        self.state = State::Released;
    }

    fn fail(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.force_close();
        }
        self.incoming = None;
        self.state = State::Released;
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("state", &self.state)
            .field("remaining_hint", &self.remaining_hint)
            .finish()
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if self.state != State::Active {
            return;
        }
        let Some(incoming) = self.incoming.take() else {
            return;
        };
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        match RuntimeHandle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    if drain_bounded(incoming, DROP_DRAIN_BUDGET).await.is_err() {
                        handle.force_close();
                    } else {
                        handle.note_exchange_complete();
                    }
                    drop(handle);
                });
            }
            Err(_) => {
                // No runtime to spawn a background drain on; the only safe
                // option is to close rather than hand a half-read body to
                // the next borrower.
                handle.force_close();
                drop(handle);
            }
        }
    }
}

async fn drain_bounded(mut incoming: Incoming, budget: u64) -> Result<(), Error> {
    let mut drained: u64 = 0;
    loop {
        if drained >= budget {
            debug!(budget, "drop-time drain exceeded budget, closing connection");
            return Err(Error::Eof);
        }
        match incoming.frame().await {
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    drained += data.len() as u64;
                }
            }
            Some(Err(err)) => return Err(err.into()),
            None => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stream_is_released_with_zero_remaining() {
        let stream = Stream::empty();
        assert!(stream.is_released());
        assert_eq!(stream.remaining_hint(), Some(0));
    }
}
