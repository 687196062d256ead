//! Outbound connection to one registered service.
//!
//! A [`Connection`] wraps a single push socket. Sends are serialised: the
//! socket lock is held for the whole of one encode-and-write, so frames from
//! concurrent callers never interleave. Each send runs on its own task and
//! reports back over a oneshot channel. A caller whose context is cancelled
//! stops waiting at once, but the task finishes the write and still decides
//! what happens to the connection.
//!
//! A connection moves `Idle → Open → Closed` and never reopens. Close
//! subscribers hear about the `Open → Closed` transition exactly once: with
//! `None` for a requested close, or with the send failure that broke the
//! link.

use std::{
    fmt,
    mem,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use tokio::{
    select,
    sync::{Mutex, OwnedMutexGuard, oneshot},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    codec,
    config::ConfigError,
    error::ProcessError,
    message::Message,
    metrics,
    registry::{Registry, Subscription},
    transport::{DialOptions, OutboundSocket, Transport, TransportError, TransportUrl, default_transport},
};

mod config;
#[cfg(test)]
mod tests;

pub use config::ConnectionConfig;

/// Callback run when a connection closes.
pub type CloseCallback = dyn Fn(Option<&ProcessError>) + Send + Sync;

/// Process-unique identity of a [`Connection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ConnectionId({})", self.0) }
}

enum SocketState {
    Idle,
    Open(Box<dyn OutboundSocket>),
    Closed,
}

struct ConnectionInner {
    id: ConnectionId,
    url: TransportUrl,
    options: DialOptions,
    transport: Arc<dyn Transport>,
    socket: Arc<Mutex<SocketState>>,
    on_close: Registry<CloseCallback>,
}

/// Cloneable handle to one outbound connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Validate `config` and build an idle connection on the default
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a missing or malformed URL or a zero
    /// maximum frame length.
    pub fn new(config: ConnectionConfig) -> Result<Self, ConfigError> {
        Self::with_transport(config, default_transport())
    }

    /// Like [`Connection::new`] but dialing through `transport`.
    ///
    /// # Errors
    ///
    /// See [`Connection::new`].
    pub fn with_transport(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let (url, options) = config.validate()?;
        Ok(Self {
            inner: Arc::new(ConnectionInner {
                id: ConnectionId::next(),
                url,
                options,
                transport,
                socket: Arc::new(Mutex::new(SocketState::Idle)),
                on_close: Registry::new(),
            }),
        })
    }

    /// Process-unique identity of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.inner.id }

    /// Validated target URL.
    #[must_use]
    pub fn url(&self) -> &TransportUrl { &self.inner.url }

    /// Whether the connection currently holds an open socket. Waits for any
    /// in-flight send to finish first.
    pub async fn is_open(&self) -> bool {
        matches!(*self.inner.socket.lock().await, SocketState::Open(_))
    }

    /// Register `callback` to run when the connection closes.
    pub fn on_close(
        &self,
        callback: impl Fn(Option<&ProcessError>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.on_close.add(Arc::new(callback))
    }

    /// Open the push socket. Idempotent while open.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::ConnectionClosed`] once the connection has
    /// been closed, or [`ProcessError::Transport`] when dialing fails, in
    /// which case the connection stays idle.
    pub async fn dial(&self) -> Result<(), ProcessError> {
        let mut state = self.inner.socket.lock().await;
        match *state {
            SocketState::Open(_) => return Ok(()),
            SocketState::Closed => return Err(ProcessError::ConnectionClosed),
            SocketState::Idle => {}
        }
        let socket = self
            .inner
            .transport
            .dial(&self.inner.url, &self.inner.options)
            .await?;
        *state = SocketState::Open(socket);
        metrics::inc_connections();
        info!(id = %self.inner.id, url = %self.inner.url, "connection dialed");
        Ok(())
    }

    /// Encode `msg` and write it to the peer.
    ///
    /// Cancelling `ctx` returns [`ProcessError::Cancelled`] immediately; a
    /// write already under way still completes in the background.
    ///
    /// # Errors
    ///
    /// - [`ProcessError::Codec`] if the message cannot be encoded.
    /// - [`ProcessError::ConnectionClosed`] if the connection is not open.
    /// - [`ProcessError::Transport`] wrapping a timeout; the connection stays
    ///   open.
    /// - [`ProcessError::SendFailed`] for any other transport failure; the
    ///   connection is closed and close subscribers are notified.
    /// - [`ProcessError::Cancelled`] if `ctx` was cancelled.
    pub async fn send(&self, ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        let frame = codec::encode(msg)?;
        let guard = select! {
            biased;
            () = ctx.cancelled() => return Err(ProcessError::Cancelled),
            guard = Arc::clone(&self.inner.socket).lock_owned() => guard,
        };
        if !matches!(*guard, SocketState::Open(_)) {
            return Err(ProcessError::ConnectionClosed);
        }

        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let task_ctx = ctx.clone();
        tokio::spawn(async move {
            let outcome = inner.write_locked(guard, frame, &task_ctx).await;
            let _ = tx.send(outcome);
        });

        select! {
            biased;
            () = ctx.cancelled() => Err(ProcessError::Cancelled),
            outcome = rx => outcome.unwrap_or(Err(ProcessError::ConnectionClosed)),
        }
    }

    /// Close the socket if open and mark the connection closed for good.
    ///
    /// # Errors
    ///
    /// Returns the transport error raised while closing an open socket. The
    /// connection is closed and subscribers notified regardless.
    pub async fn close(&self) -> Result<(), ProcessError> {
        let mut state = self.inner.socket.lock().await;
        let SocketState::Open(mut socket) = mem::replace(&mut *state, SocketState::Closed) else {
            return Ok(());
        };
        let closed = socket.close().await;
        drop(state);
        metrics::dec_connections();
        info!(id = %self.inner.id, url = %self.inner.url, "connection closed");
        self.inner.notify_closed(None);
        closed.map_err(ProcessError::from)
    }
}

impl ConnectionInner {
    async fn write_locked(
        &self,
        mut guard: OwnedMutexGuard<SocketState>,
        frame: Bytes,
        ctx: &CancellationToken,
    ) -> Result<(), ProcessError> {
        let SocketState::Open(socket) = &mut *guard else {
            return Err(ProcessError::ConnectionClosed);
        };
        match socket.send(frame).await {
            Ok(()) => {
                metrics::inc_frames(metrics::Direction::Outbound);
                if ctx.is_cancelled() {
                    Err(ProcessError::Cancelled)
                } else {
                    Ok(())
                }
            }
            Err(TransportError::Timeout) => {
                metrics::inc_errors();
                debug!(id = %self.id, url = %self.url, "send timed out");
                Err(ProcessError::Transport(TransportError::Timeout))
            }
            Err(err) => {
                metrics::inc_errors();
                if let SocketState::Open(mut socket) = mem::replace(&mut *guard, SocketState::Closed) {
                    if let Err(e) = socket.close().await {
                        debug!(id = %self.id, error = %e, "error closing failed socket");
                    }
                }
                drop(guard);
                metrics::dec_connections();
                warn!(id = %self.id, url = %self.url, error = %err, "send failed; connection closed");
                let failure = ProcessError::SendFailed(err);
                self.notify_closed(Some(&failure));
                Err(failure)
            }
        }
    }

    fn notify_closed(&self, reason: Option<&ProcessError>) {
        self.on_close.visit(|callback| callback(reason));
    }
}
