//! Inbound endpoint of the bridge.
//!
//! A [`Listener`] owns one pull socket. While running, a supervisor task
//! drives the receive loop: it races cancellation against `recv`, skips
//! receive timeouts, decodes each frame and pushes the message onto a
//! bounded queue. A fixed pool of workers drains the queue and hands every
//! message to the registered subscribers. When the loop ends, the
//! supervisor closes the socket, lets the workers drain what is queued and
//! only then tells the close subscribers why the listener stopped.

use std::{io, net::SocketAddr, sync::Arc};

use tokio::{
    select,
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, warn};

use crate::{
    codec,
    config::ConfigError,
    message::Message,
    metrics,
    processor::Processor,
    registry::{Registry, Subscription},
    transport::{InboundSocket, ListenOptions, Transport, TransportError, TransportUrl, default_transport},
};

mod config;

pub use config::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS, ListenerConfig};

/// Callback run when the receive loop stops. `None` means it was asked to.
pub type ListenerCloseCallback = dyn Fn(Option<&TransportError>) + Send + Sync;

struct Running {
    shutdown: CancellationToken,
    supervisor: JoinHandle<Option<TransportError>>,
    local_addr: Option<SocketAddr>,
}

struct ListenerInner {
    url: TransportUrl,
    options: ListenOptions,
    workers: usize,
    queue_capacity: usize,
    transport: Arc<dyn Transport>,
    on_message: Registry<dyn Processor>,
    on_close: Registry<ListenerCloseCallback>,
    state: Mutex<Option<Running>>,
}

/// Cloneable handle to the inbound endpoint.
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("url", &self.inner.url)
            .field("workers", &self.inner.workers)
            .field("queue_capacity", &self.inner.queue_capacity)
            .finish_non_exhaustive()
    }
}

impl Listener {
    /// Validate `config` and build a stopped listener on the default
    /// transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a missing or malformed URL, zero workers,
    /// a zero queue capacity or a zero maximum frame length.
    pub fn new(config: ListenerConfig) -> Result<Self, ConfigError> {
        Self::with_transport(config, default_transport())
    }

    /// Like [`Listener::new`] but binding through `transport`.
    ///
    /// # Errors
    ///
    /// See [`Listener::new`].
    pub fn with_transport(
        config: ListenerConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        let valid = config.validate()?;
        Ok(Self {
            inner: Arc::new(ListenerInner {
                url: valid.url,
                options: valid.options,
                workers: valid.workers,
                queue_capacity: valid.queue_capacity,
                transport,
                on_message: Registry::new(),
                on_close: Registry::new(),
                state: Mutex::new(None),
            }),
        })
    }

    /// Validated listen URL.
    #[must_use]
    pub fn url(&self) -> &TransportUrl { &self.inner.url }

    /// Register a processor for every received message.
    pub fn on_message(&self, processor: Arc<dyn Processor>) -> Subscription {
        self.inner.on_message.add(processor)
    }

    /// Register `callback` to run when the receive loop stops.
    pub fn on_close(
        &self,
        callback: impl Fn(Option<&TransportError>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.on_close.add(Arc::new(callback))
    }

    /// Bind the socket and start receiving. A no-op while running; a
    /// listener whose loop died from a transport failure may listen again.
    ///
    /// # Errors
    ///
    /// Returns the [`TransportError`] raised while binding. Nothing is
    /// started in that case.
    pub async fn listen(&self) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock().await;
        if let Some(running) = state.as_ref()
            && !running.supervisor.is_finished()
        {
            return Ok(());
        }
        if let Some(stale) = state.take() {
            let _ = stale.supervisor.await;
        }

        let socket = self
            .inner
            .transport
            .listen(&self.inner.url, &self.inner.options)
            .await?;
        let local_addr = socket.local_addr();
        let shutdown = CancellationToken::new();
        let supervisor = tokio::spawn(Arc::clone(&self.inner).supervise(socket, shutdown.clone()));
        *state = Some(Running {
            shutdown,
            supervisor,
            local_addr,
        });
        info!(url = %self.inner.url, ?local_addr, workers = self.inner.workers, "listener started");
        Ok(())
    }

    /// Stop receiving and wait for the loop, the queue and every worker to
    /// finish. A no-op when not running.
    ///
    /// # Errors
    ///
    /// Returns the transport error that ended the loop, if it ended on its
    /// own before being cancelled.
    pub async fn close(&self) -> Result<(), TransportError> {
        let Some(running) = self.inner.state.lock().await.take() else {
            return Ok(());
        };
        running.shutdown.cancel();
        match running.supervisor.await {
            Ok(None) => Ok(()),
            Ok(Some(err)) => Err(err),
            Err(join) => Err(TransportError::Io(io::Error::other(join))),
        }
    }

    /// Whether the receive loop is alive.
    pub async fn is_running(&self) -> bool {
        self.inner
            .state
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.supervisor.is_finished())
    }

    /// Address the socket is bound to while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .state
            .lock()
            .await
            .as_ref()
            .and_then(|running| running.local_addr)
    }
}

impl ListenerInner {
    async fn supervise(
        self: Arc<Self>,
        mut socket: Box<dyn InboundSocket>,
        shutdown: CancellationToken,
    ) -> Option<TransportError> {
        let (queue, rx) = mpsc::channel(self.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let workers = TaskTracker::new();
        for worker in 0..self.workers {
            workers.spawn(Arc::clone(&self).dispatch(Arc::clone(&rx), worker));
        }
        workers.close();

        let failure = self.receive(socket.as_mut(), &queue, &shutdown).await;
        if let Err(e) = socket.close().await {
            debug!(url = %self.url, error = %e, "error closing listen socket");
        }
        drop(queue);
        workers.wait().await;

        match &failure {
            Some(err) => warn!(url = %self.url, error = %err, "listener stopped on transport failure"),
            None => info!(url = %self.url, "listener stopped"),
        }
        self.on_close.visit(|callback| callback(failure.as_ref()));
        failure
    }

    async fn receive(
        &self,
        socket: &mut dyn InboundSocket,
        queue: &mpsc::Sender<Message>,
        shutdown: &CancellationToken,
    ) -> Option<TransportError> {
        loop {
            let received = select! {
                biased;
                () = shutdown.cancelled() => return None,
                res = socket.recv() => res,
            };
            let frame = match received {
                Ok(frame) => frame,
                Err(e) if e.is_timeout() => continue,
                Err(e) => {
                    metrics::inc_errors();
                    return Some(e);
                }
            };
            let msg = match codec::decode_limited(&frame, self.options.max_frame_length) {
                Ok(msg) => msg,
                Err(e) => {
                    metrics::inc_errors();
                    debug!(url = %self.url, len = frame.len(), error = %e, "discarding undecodable frame");
                    continue;
                }
            };
            metrics::inc_frames(metrics::Direction::Inbound);
            select! {
                biased;
                () = shutdown.cancelled() => return None,
                res = queue.send(msg) => if res.is_err() {
                    return None;
                },
            }
        }
    }

    async fn dispatch(self: Arc<Self>, queue: Arc<Mutex<mpsc::Receiver<Message>>>, worker: usize) {
        loop {
            let next = queue.lock().await.recv().await;
            let Some(msg) = next else { break };
            let ctx = CancellationToken::new();
            for processor in self.on_message.snapshot() {
                if let Err(e) = processor.process(&ctx, &msg).await {
                    debug!(worker, msg_type = %msg.msg_type, error = %e, "message subscriber declined");
                }
            }
        }
    }
}
