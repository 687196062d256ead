//! Builder for [`Bridge`].

use std::{sync::Arc, time::Duration};

use super::{Bridge, BridgeInner, Egress, registration::RegistrationHandler};
use crate::{
    codec::DEFAULT_MAX_FRAME_LENGTH,
    config::ConfigError,
    filters::{LocalOnlyFilter, UnsupportedTypeFilter},
    listener::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS, Listener, ListenerConfig},
    processor::{Modifier, Observer, Observers, ProcessorChain},
    registry::Registry,
    router::Router,
    transport::{Transport, default_transport},
};

/// Interval between liveness announcements unless configured otherwise.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Collects bridge settings and hooks; [`BridgeBuilder::build`] validates
/// them.
#[must_use]
pub struct BridgeBuilder {
    listen_url: String,
    recv_timeout: Duration,
    send_timeout: Duration,
    heartbeat_interval: Duration,
    workers: usize,
    queue_capacity: usize,
    max_frame_length: usize,
    rx_observers: Vec<Arc<dyn Observer>>,
    tx_observers: Vec<Arc<dyn Observer>>,
    egress_modifiers: Vec<Arc<dyn Modifier>>,
    transport: Option<Arc<dyn Transport>>,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self {
            listen_url: String::new(),
            recv_timeout: Duration::ZERO,
            send_timeout: Duration::ZERO,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            rx_observers: Vec::new(),
            tx_observers: Vec::new(),
            egress_modifiers: Vec::new(),
            transport: None,
        }
    }
}

impl BridgeBuilder {
    /// URL the inbound socket binds to. Required.
    pub fn listen_url(mut self, url: impl Into<String>) -> Self {
        self.listen_url = url.into();
        self
    }

    /// Deadline for a single receive. Zero disables it.
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Deadline for dialing and sending to registered services. Zero
    /// disables it.
    ///
    /// Without a deadline a service that stops reading holds its
    /// connection's in-flight write, and so its route, until the peer goes
    /// away; [`Bridge::stop`](crate::Bridge::stop) waits for that write when
    /// closing the route. Registration only waits
    /// [`HANDSHAKE_WAIT`](crate::router::HANDSHAKE_WAIT) for the
    /// handshake, so listener workers are never held by it.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Interval between liveness announcements. Must be non-zero.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Number of inbound dispatch workers.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Capacity of the inbound dispatch queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Largest frame accepted or written, in bytes.
    pub fn max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = len;
        self
    }

    /// Observe every inbound message before filtering.
    pub fn rx_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.rx_observers.push(Arc::new(observer));
        self
    }

    /// Observe every outbound message that passes the filters, including
    /// liveness announcements.
    pub fn tx_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.tx_observers.push(Arc::new(observer));
        self
    }

    /// Hand every inbound message that survives the pipeline to `modifier`.
    pub fn egress_modifier(mut self, modifier: impl Modifier + 'static) -> Self {
        self.egress_modifiers.push(Arc::new(modifier));
        self
    }

    /// Use `transport` instead of [`DefaultTransport`](crate::transport::DefaultTransport).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the settings and assemble the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a missing or malformed listen URL, a
    /// zero heartbeat interval, or an invalid listener setting.
    pub fn build(self) -> Result<Bridge, ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeatInterval);
        }
        let transport = self.transport.unwrap_or_else(default_transport);
        let listener = Listener::with_transport(
            ListenerConfig::new(self.listen_url)
                .recv_timeout(self.recv_timeout)
                .workers(self.workers)
                .queue_capacity(self.queue_capacity)
                .max_frame_length(self.max_frame_length),
            Arc::clone(&transport),
        )?;
        let router = Router::with_transport(transport);

        let rx_observers = registry_of(self.rx_observers);
        let tx_observers = registry_of(self.tx_observers);
        let egress = registry_of(self.egress_modifiers);

        let inbound = ProcessorChain::default()
            .then(Observers::new(rx_observers.clone()))
            .then(UnsupportedTypeFilter)
            .then(RegistrationHandler::new(
                router.clone(),
                self.send_timeout,
                self.max_frame_length,
            ))
            .then(LocalOnlyFilter)
            .then(Egress::new(egress.clone()));
        let outbound = ProcessorChain::default()
            .then(UnsupportedTypeFilter)
            .then(LocalOnlyFilter)
            .then(Observers::new(tx_observers.clone()))
            .then(router.clone());

        let _inbound = listener.on_message(Arc::new(inbound.clone()));

        Ok(Bridge {
            inner: Arc::new(BridgeInner {
                listener,
                router,
                heartbeat_interval: self.heartbeat_interval,
                rx_observers,
                tx_observers,
                egress,
                inbound,
                outbound,
                heartbeat: tokio::sync::Mutex::new(None),
            }),
        })
    }
}

fn registry_of<T: ?Sized + Send + Sync + 'static>(items: Vec<Arc<T>>) -> Registry<T> {
    let registry = Registry::new();
    for item in items {
        let _kept = registry.add(item);
    }
    registry
}
