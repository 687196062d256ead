//! Service-name routing table.
//!
//! The [`Router`] maps each registered service name to the live
//! [`Connection`] serving it. Unicast messages are routed on the service
//! component of their destination locator; liveness announcements go to
//! every entry. An entry removes itself when its connection fails, but only
//! while the table still holds that same connection, so a stale failure can
//! never evict a newer registration.
//!
//! The table lock is a synchronous `RwLock` and is never held across an
//! `.await`: every send, dial and close happens on a snapshot or on an entry
//! already taken out of the table.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    connection::{Connection, ConnectionConfig, ConnectionId},
    error::ProcessError,
    locator::Locator,
    message::{Message, MessageType},
    processor::Processor,
    transport::{Transport, default_transport},
};


/// Status carried by the authorization handshake.
pub const AUTHORIZATION_STATUS_OK: i64 = 200;

/// Longest `upsert` waits for the authorization handshake to be written.
/// The write itself carries on in the background past this point.
pub const HANDSHAKE_WAIT: Duration = Duration::from_secs(5);

struct RouterInner {
    table: RwLock<HashMap<String, Connection>>,
    transport: Arc<dyn Transport>,
}

impl RouterInner {
    fn remove_if_current(&self, name: &str, id: ConnectionId) -> bool {
        let mut table = self.table.write();
        if table.get(name).is_some_and(|conn| conn.id() == id) {
            table.remove(name);
            true
        } else {
            false
        }
    }
}

/// Cloneable handle to the routing table.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").field("names", &self.names()).finish()
    }
}

impl Router {
    /// Empty router dialing through the default transport.
    #[must_use]
    pub fn new() -> Self { Self::with_transport(default_transport()) }

    /// Empty router dialing through `transport`.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                table: RwLock::new(HashMap::new()),
                transport,
            }),
        }
    }

    /// Route `msg` to its destination.
    ///
    /// Liveness announcements are broadcast to every entry and always
    /// succeed; individual failures are logged. Anything else goes to the
    /// connection named by the destination's service component.
    ///
    /// # Errors
    ///
    /// - [`ProcessError::InvalidLocator`] if the destination does not parse
    ///   or names no service.
    /// - [`ProcessError::NotHandled`] if no connection serves that name.
    /// - Otherwise whatever [`Connection::send`] returns.
    pub async fn dispatch(&self, ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        if msg.msg_type == MessageType::SERVICE_ALIVE {
            self.broadcast(ctx, msg).await;
            return Ok(());
        }
        let locator = Locator::parse_routable(msg.destination())?;
        let conn = self.inner.table.read().get(&locator.service).cloned();
        match conn {
            Some(conn) => conn.send(ctx, msg).await,
            None => Err(ProcessError::NotHandled),
        }
    }

    async fn broadcast(&self, ctx: &CancellationToken, msg: &Message) {
        let targets: Vec<(String, Connection)> = self
            .inner
            .table
            .read()
            .iter()
            .map(|(name, conn)| (name.clone(), conn.clone()))
            .collect();
        for (name, conn) in targets {
            if let Err(e) = conn.send(ctx, msg).await {
                debug!(service = %name, msg_type = %msg.msg_type, error = %e, "broadcast send failed");
            }
        }
    }

    /// Register or replace the connection serving `name`.
    ///
    /// The new connection is dialed before it enters the table; a replaced
    /// connection is closed afterwards. Once installed, the connection is
    /// sent an authorization handshake whose failure is only logged. At most
    /// [`HANDSHAKE_WAIT`] is spent waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Config`] for an unusable URL or the dial
    /// error. The table is left untouched in both cases.
    pub async fn upsert(&self, name: &str, config: ConnectionConfig) -> Result<(), ProcessError> {
        let conn = Connection::with_transport(config, Arc::clone(&self.inner.transport))?;

        let router: Weak<RouterInner> = Arc::downgrade(&self.inner);
        let entry = name.to_owned();
        let id = conn.id();
        let _prune = conn.on_close(move |reason| {
            let Some(router) = router.upgrade() else { return };
            if router.remove_if_current(&entry, id) {
                match reason {
                    Some(e) => warn!(service = %entry, %id, error = %e, "connection failed; route removed"),
                    None => debug!(service = %entry, %id, "connection closed; route removed"),
                }
            }
        });

        if let Err(e) = conn.dial().await {
            let _ = conn.close().await;
            return Err(e);
        }

        let previous = self.inner.table.write().insert(name.to_owned(), conn.clone());
        if let Some(previous) = previous {
            debug!(service = %name, old = %previous.id(), new = %id, "replacing route");
            if let Err(e) = previous.close().await {
                debug!(service = %name, error = %e, "error closing replaced connection");
            }
        }
        info!(service = %name, url = %conn.url(), %id, "route registered");

        let handshake = Message::authorization(AUTHORIZATION_STATUS_OK);
        match timeout(HANDSHAKE_WAIT, conn.send(&CancellationToken::new(), &handshake)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(service = %name, error = %e, "authorization handshake failed"),
            Err(_) => {
                warn!(service = %name, wait = ?HANDSHAKE_WAIT, "authorization handshake still pending");
            }
        }
        Ok(())
    }

    /// Remove and close the connection serving `name`, if any.
    pub async fn remove(&self, name: &str) {
        let removed = self.inner.table.write().remove(name);
        if let Some(conn) = removed {
            info!(service = %name, id = %conn.id(), "route removed");
            if let Err(e) = conn.close().await {
                debug!(service = %name, error = %e, "error closing removed connection");
            }
        }
    }

    /// Remove and close every connection. The router stays usable.
    pub async fn close(&self) {
        let drained: Vec<(String, Connection)> = self.inner.table.write().drain().collect();
        for (name, conn) in drained {
            if let Err(e) = conn.close().await {
                debug!(service = %name, error = %e, "error closing connection");
            }
        }
    }

    /// Whether a connection serves `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool { self.inner.table.read().contains_key(name) }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize { self.inner.table.read().len() }

    /// Whether no service is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.inner.table.read().is_empty() }

    /// Registered service names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.table.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Connection currently serving `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Connection> { self.inner.table.read().get(name).cloned() }
}

#[async_trait]
impl Processor for Router {
    async fn process(&self, ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        self.dispatch(ctx, msg).await
    }
}
