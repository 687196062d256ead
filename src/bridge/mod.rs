//! The bridge orchestrator.
//!
//! A [`Bridge`] ties one [`Listener`] to one [`Router`] through two
//! processor chains:
//!
//! - inbound, fed by the listener: rx observers, [`UnsupportedTypeFilter`],
//!   service registration, [`LocalOnlyFilter`], then the egress modifiers
//!   that hand messages to the outside world;
//! - outbound, fed by [`Bridge::process`]: [`UnsupportedTypeFilter`],
//!   [`LocalOnlyFilter`], tx observers, then the router.
//!
//! While started, the bridge also broadcasts a liveness announcement to
//! every registered service on a fixed interval.
//!
//! [`UnsupportedTypeFilter`]: crate::filters::UnsupportedTypeFilter
//! [`LocalOnlyFilter`]: crate::filters::LocalOnlyFilter

use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::ProcessError,
    listener::Listener,
    message::Message,
    processor::{Modifier, Observer, Observers, Processor, ProcessorChain},
    registry::{Registry, Subscription},
    router::Router,
    transport::TransportError,
};

mod builder;
mod heartbeat;
mod registration;

pub use builder::{BridgeBuilder, DEFAULT_HEARTBEAT_INTERVAL};
use heartbeat::Heartbeat;

/// Last inbound stage: runs every egress modifier and claims the message.
struct Egress {
    modifiers: Registry<dyn Modifier>,
}

impl Egress {
    fn new(modifiers: Registry<dyn Modifier>) -> Self { Self { modifiers } }
}

#[async_trait]
impl Processor for Egress {
    async fn process(&self, ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        for modifier in self.modifiers.snapshot() {
            if let Err(e) = modifier.modify(ctx, msg).await {
                debug!(msg_type = %msg.msg_type, error = %e, "egress modifier failed");
            }
        }
        Ok(())
    }
}

struct BridgeInner {
    listener: Listener,
    router: Router,
    heartbeat_interval: Duration,
    rx_observers: Registry<dyn Observer>,
    tx_observers: Registry<dyn Observer>,
    egress: Registry<dyn Modifier>,
    inbound: ProcessorChain,
    outbound: ProcessorChain,
    heartbeat: Mutex<Option<Heartbeat>>,
}

/// Cloneable handle to a bridge.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("listener", &self.inner.listener)
            .field("router", &self.inner.router)
            .field("heartbeat_interval", &self.inner.heartbeat_interval)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Start configuring a bridge.
    pub fn builder() -> BridgeBuilder { BridgeBuilder::default() }

    /// Start the liveness emitter, if not already running, and the listener.
    ///
    /// # Errors
    ///
    /// Returns the error raised while binding the listen socket. The
    /// emitter keeps running, and calling `start` again retries the bind.
    pub async fn start(&self) -> Result<(), TransportError> {
        let mut heartbeat = self.inner.heartbeat.lock().await;
        if heartbeat.is_none() {
            *heartbeat = Some(Heartbeat::spawn(
                self.inner.heartbeat_interval,
                Observers::new(self.inner.tx_observers.clone()),
                self.inner.router.clone(),
            ));
            info!(interval = ?self.inner.heartbeat_interval, "bridge started");
        }
        self.inner.listener.listen().await
    }

    /// Stop the emitter and the listener, and close every route. A no-op
    /// when stopped.
    ///
    /// # Errors
    ///
    /// Returns the transport error that had already stopped the listener,
    /// if any.
    pub async fn stop(&self) -> Result<(), TransportError> {
        let mut heartbeat = self.inner.heartbeat.lock().await;
        let Some(emitter) = heartbeat.take() else {
            return Ok(());
        };
        emitter.cancel();
        let closed = self.inner.listener.close().await;
        self.inner.router.close().await;
        emitter.join().await;
        info!("bridge stopped");
        closed
    }

    /// Run `msg` through the outbound chain towards a registered service.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::UnsupportedType`] or
    /// [`ProcessError::LocalDisallowed`] for filtered types, and otherwise
    /// the router's result, [`ProcessError::NotHandled`] included.
    pub async fn process(&self, ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        self.inner.outbound.process(ctx, msg).await
    }

    /// Run `msg` through the inbound chain as if it had been received.
    ///
    /// # Errors
    ///
    /// Returns the filter rejections, registration failures and
    /// cancellation; messages reaching egress always succeed.
    pub async fn process_inbound(
        &self,
        ctx: &CancellationToken,
        msg: &Message,
    ) -> Result<(), ProcessError> {
        self.inner.inbound.process(ctx, msg).await
    }

    /// Register an egress modifier after construction.
    pub fn add_egress_modifier(&self, modifier: Arc<dyn Modifier>) -> Subscription {
        self.inner.egress.add(modifier)
    }

    /// Register an inbound observer after construction.
    pub fn add_rx_observer(&self, observer: Arc<dyn Observer>) -> Subscription {
        self.inner.rx_observers.add(observer)
    }

    /// Register an outbound observer after construction.
    pub fn add_tx_observer(&self, observer: Arc<dyn Observer>) -> Subscription {
        self.inner.tx_observers.add(observer)
    }

    #[must_use]
    pub fn router(&self) -> &Router { &self.inner.router }

    /// Address of the listen socket while started.
    pub async fn local_addr(&self) -> Option<SocketAddr> { self.inner.listener.local_addr().await }

    /// Whether the liveness emitter is running.
    pub async fn is_started(&self) -> bool { self.inner.heartbeat.lock().await.is_some() }
}

#[async_trait]
impl Processor for Bridge {
    async fn process(&self, ctx: &CancellationToken, msg: &Message) -> Result<(), ProcessError> {
        Bridge::process(self, ctx, msg).await
    }
}
