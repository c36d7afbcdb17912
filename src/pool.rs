//! Per-endpoint connection pooling.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::conn::{Connection, Connector};
use crate::endpoint::{Endpoint, Options};
use crate::error::Error;
use crate::handle::ConnectionHandle;

#[derive(Default)]
struct EndpointState {
    /// Idle connections, most-recently-released last (LIFO reuse keeps the
    /// working set small and warm rather than round-robining through every
    /// connection ever opened).
    idle: Vec<Connection>,
    in_use: usize,
    opening: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl EndpointState {
    fn wake_one_waiter(&mut self) {
        while let Some(tx) = self.waiters.pop_front() {
            if tx.send(()).is_ok() {
                return;
            }
        }
    }
}

/// Reserves a dial slot (`state.opening += 1`) for the lifetime of this
/// guard. If the future driving a dial is dropped before the guard is
/// explicitly [`disarm`](Self::disarm)ed — e.g. the caller's `acquire()` is
/// cancelled while suspended on the dial `.await` — the reservation is
/// released on `Drop` instead of leaking forever.
struct OpeningSlot {
    pool: Pool,
    endpoint: Endpoint,
    armed: bool,
}

impl OpeningSlot {
    fn new(pool: Pool, endpoint: Endpoint) -> Self {
        Self {
            pool,
            endpoint,
            armed: true,
        }
    }

    /// Call once the reservation has been resolved (dial succeeded or
    /// failed) and `opening` has been decremented by the caller directly.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for OpeningSlot {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut endpoints = self.pool.inner.endpoints.lock();
        if let Some(state) = endpoints.get_mut(&self.endpoint) {
            state.opening = state.opening.saturating_sub(1);
            // The dial never happened (or never finished), so the capacity
            // it reserved is free again for the next waiter.
            state.wake_one_waiter();
        }
    }
}

struct PoolInner {
    options: Options,
    connector: Connector,
    endpoints: Mutex<HashMap<Endpoint, EndpointState>>,
}

/// A pool of HTTP/1.1 connections, keyed by [`Endpoint`]. Cheap to clone: it
/// is a thin handle around shared state, the way a [`Session`](crate::session::Session)
/// hands one out to every request it makes.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Creates a pool governed by `options`.
    pub fn new(options: Options) -> Result<Self, Error> {
        Ok(Self {
            inner: Arc::new(PoolInner {
                options,
                connector: Connector::new()?,
                endpoints: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// The options this pool was built with.
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Checks out a connection for `endpoint`, reusing an idle one,
    /// dialing a fresh one if the endpoint has spare capacity, or waiting
    /// in FIFO order for one to free up otherwise.
    pub async fn acquire(&self, endpoint: Endpoint) -> Result<ConnectionHandle, Error> {
        loop {
            enum Action {
                Use(Connection),
                Dial,
                Wait(oneshot::Receiver<()>),
            }

            let action = {
                let mut endpoints = self.inner.endpoints.lock();
                let state = endpoints.entry(endpoint.clone()).or_default();
                // Stale connections (past their keep-alive window, or closed
                // by the peer since they were idled) are discarded here
                // rather than handed back to the caller.
                let mut fresh = None;
                while let Some(conn) = state.idle.pop() {
                    if conn.should_close() {
                        debug!(%endpoint, "discarding stale idle connection at acquisition");
                        continue;
                    }
                    fresh = Some(conn);
                    break;
                }
                if let Some(conn) = fresh {
                    state.in_use += 1;
                    Action::Use(conn)
                } else if state.in_use + state.opening < self.inner.options.max_connections_per_endpoint {
                    state.opening += 1;
                    Action::Dial
                } else {
                    if let Some(max_pending) = self.inner.options.max_pending_per_endpoint {
                        if state.waiters.len() >= max_pending {
                            return Err(Error::other(format!(
                                "pool pending queue for {endpoint} is full"
                            )));
                        }
                    }
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    Action::Wait(rx)
                }
            };

            match action {
                Action::Use(conn) => {
                    debug!(%endpoint, "reusing idle connection");
                    return Ok(ConnectionHandle::new(self.clone(), endpoint, conn));
                }
                Action::Dial => {
                    let guard = OpeningSlot::new(self.clone(), endpoint.clone());
                    let result = self.inner.connector.dial(&endpoint, &self.inner.options).await;
                    guard.disarm();

                    let mut endpoints = self.inner.endpoints.lock();
                    let state = endpoints.entry(endpoint.clone()).or_default();
                    state.opening = state.opening.saturating_sub(1);
                    match result {
                        Ok(conn) => {
                            state.in_use += 1;
                            return Ok(ConnectionHandle::new(self.clone(), endpoint, conn));
                        }
                        Err(err) => {
                            // Capacity we reserved for this dial is free again;
                            // let a waiter retry in our place.
                            state.wake_one_waiter();
                            return Err(err);
                        }
                    }
                }
                Action::Wait(rx) => {
                    rx.await.map_err(|_| Error::Canceled)?;
                    // Loop back around and retry the fast path.
                }
            }
        }
    }

    pub(crate) fn release(&self, endpoint: &Endpoint, conn: Option<Connection>) {
        let mut endpoints = self.inner.endpoints.lock();
        if let Some(state) = endpoints.get_mut(endpoint) {
            state.in_use = state.in_use.saturating_sub(1);
            if let Some(conn) = conn {
                state.idle.push(conn);
            }
            state.wake_one_waiter();
        }
    }

    /// Counts of idle and in-use connections for `endpoint`, for tests and
    /// diagnostics.
    pub fn stats(&self, endpoint: &Endpoint) -> (usize, usize) {
        let endpoints = self.inner.endpoints.lock();
        match endpoints.get(endpoint) {
            Some(state) => (state.idle.len(), state.in_use),
            None => (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn acquire_fails_fast_when_dial_fails_and_pending_full() {
        let mut options = Options::default();
        options.max_connections_per_endpoint = 1;
        options.max_pending_per_endpoint = Some(0);
        let pool = Pool::new(options).unwrap();
        let endpoint = Endpoint::from_url(&Url::parse("http://127.0.0.1:1").unwrap()).unwrap();

        // First dial attempt consumes the single slot and fails (nothing
        // listens on port 1), freeing the slot again on error.
        let first = pool.acquire(endpoint.clone()).await;
        assert!(first.is_err());

        let (idle, in_use) = pool.stats(&endpoint);
        assert_eq!((idle, in_use), (0, 0));
    }

    #[tokio::test]
    async fn opening_slot_dropped_without_disarm_releases_the_reservation() {
        let pool = Pool::new(Options::default()).unwrap();
        let endpoint = Endpoint::from_url(&Url::parse("http://127.0.0.1:1").unwrap()).unwrap();

        {
            let mut endpoints = pool.inner.endpoints.lock();
            let state = endpoints.entry(endpoint.clone()).or_default();
            state.opening += 1;
        }

        // Simulates `acquire()`'s dial future being dropped mid-`.await`
        // (cancellation): the guard was never `disarm`ed, so its `Drop`
        // must undo the reservation it made.
        let guard = OpeningSlot::new(pool.clone(), endpoint.clone());
        drop(guard);

        let endpoints = pool.inner.endpoints.lock();
        assert_eq!(endpoints.get(&endpoint).unwrap().opening, 0);
    }
}
