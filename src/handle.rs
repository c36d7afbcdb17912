//! Exclusive, pool-owned access to a single [`Connection`].

use hyper::body::Incoming;

use crate::body::SourceBody;
use crate::conn::Connection;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::pool::Pool;

/// A connection checked out of a [`Pool`] for the duration of one exchange.
///
/// Holding a `ConnectionHandle` is what makes a connection exclusive: the
/// pool will not hand the same [`Connection`] to two callers at once.
/// Dropping the handle returns the connection to the idle stack, or closes
/// it, depending on what [`Connection::should_close`](crate::conn::Connection)
/// reports at that moment.
pub struct ConnectionHandle {
    pool: Pool,
    endpoint: Endpoint,
    conn: Option<Connection>,
}

impl ConnectionHandle {
    pub(crate) fn new(pool: Pool, endpoint: Endpoint, conn: Connection) -> Self {
        Self {
            pool,
            endpoint,
            conn: Some(conn),
        }
    }

    /// Sends a request over the held connection.
    pub(crate) async fn send(
        &mut self,
        request: http::Request<SourceBody>,
    ) -> Result<http::Response<Incoming>, Error> {
        let conn = self.conn.as_mut().ok_or(Error::NotConnected)?;
        conn.send(request).await
    }

    /// Marks the held connection so it will be closed rather than returned
    /// to the pool when this handle is dropped, e.g. after a stream's drop
    /// policy decides it can't be safely drained.
    pub(crate) fn force_close(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            conn.must_close = true;
        }
    }

    pub(crate) fn note_exchange_complete(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            conn.note_exchange_complete();
        }
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        let conn = self.conn.take();
        let returned = conn.and_then(|conn| if conn.should_close() { None } else { Some(conn) });
        self.pool.release(&self.endpoint, returned);
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
