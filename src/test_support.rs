//! In-memory transport for exercising the bridge without sockets.
//!
//! Outbound peers are keyed by URL and record every frame written to them;
//! individual peers can be told to fail, time out or stall. The inbound side
//! is fed directly by the test through [`FakeTransport::inject`].

use std::{
    collections::{HashMap, HashSet},
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::{sync::mpsc, time::timeout};

use crate::{
    codec,
    message::Message,
    transport::{
        DialOptions,
        InboundSocket,
        ListenOptions,
        OutboundSocket,
        Transport,
        TransportError,
        TransportUrl,
    },
};

type Inbound = Result<Bytes, TransportError>;

#[derive(Default)]
struct State {
    peers: HashMap<String, Arc<FakePeer>>,
    refused: HashSet<String>,
    refuse_listen: bool,
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
}

/// Shared, cloneable fake transport.
#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    state: Arc<Mutex<State>>,
    listens: Arc<AtomicUsize>,
    inbound_closes: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self { Self::default() }

    pub(crate) fn shared(&self) -> Arc<dyn Transport> { Arc::new(self.clone()) }

    /// Peer reachable at `url`, created on first use.
    pub(crate) fn peer(&self, url: &str) -> Arc<FakePeer> {
        Arc::clone(self.state.lock().peers.entry(url.to_owned()).or_default())
    }

    /// Make dials to `url` fail with connection refused.
    pub(crate) fn refuse(&self, url: &str) { self.state.lock().refused.insert(url.to_owned()); }

    /// Make every subsequent `listen` fail.
    pub(crate) fn refuse_listen(&self) { self.state.lock().refuse_listen = true; }

    /// Feed a frame to the most recently opened inbound socket.
    pub(crate) fn inject(&self, frame: Bytes) -> bool { self.push_inbound(Ok(frame)) }

    /// Feed an encoded message to the most recently opened inbound socket.
    pub(crate) fn inject_message(&self, msg: &Message) -> bool {
        self.inject(codec::encode(msg).expect("encode"))
    }

    /// Make the next `recv` on the inbound socket fail with `err`.
    pub(crate) fn inject_error(&self, err: TransportError) -> bool { self.push_inbound(Err(err)) }

    fn push_inbound(&self, item: Inbound) -> bool {
        self.state
            .lock()
            .inbound
            .as_ref()
            .is_some_and(|tx| tx.send(item).is_ok())
    }

    pub(crate) fn listens(&self) -> usize { self.listens.load(Ordering::SeqCst) }

    pub(crate) fn inbound_closes(&self) -> usize { self.inbound_closes.load(Ordering::SeqCst) }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn listen(
        &self,
        _url: &TransportUrl,
        options: &ListenOptions,
    ) -> Result<Box<dyn InboundSocket>, TransportError> {
        let mut state = self.state.lock();
        if state.refuse_listen {
            return Err(io::Error::from(io::ErrorKind::AddrInUse).into());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.inbound = Some(tx);
        self.listens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeInbound {
            frames: rx,
            recv_timeout: options.recv_timeout,
            closes: Arc::clone(&self.inbound_closes),
        }))
    }

    async fn dial(
        &self,
        url: &TransportUrl,
        _options: &DialOptions,
    ) -> Result<Box<dyn OutboundSocket>, TransportError> {
        let key = url.to_string();
        if self.state.lock().refused.contains(&key) {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        let peer = self.peer(&key);
        peer.dials.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeOutbound { peer }))
    }
}

struct FakeInbound {
    frames: mpsc::UnboundedReceiver<Inbound>,
    recv_timeout: Option<Duration>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl InboundSocket for FakeInbound {
    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let next = match self.recv_timeout {
            Some(limit) => timeout(limit, self.frames.recv())
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => self.frames.recv().await,
        };
        next.unwrap_or(Err(TransportError::Closed))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.frames.close();
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Remote end of a fake outbound socket.
#[derive(Default)]
pub(crate) struct FakePeer {
    frames: Mutex<Vec<Bytes>>,
    fail_sends: AtomicBool,
    time_out_sends: AtomicBool,
    send_delay: Mutex<Option<Duration>>,
    dials: AtomicUsize,
    closes: AtomicUsize,
}

impl FakePeer {
    /// Make every subsequent send fail with a broken pipe.
    pub(crate) fn fail_sends(&self) { self.fail_sends.store(true, Ordering::SeqCst); }

    /// Make every subsequent send report a deadline expiry.
    pub(crate) fn time_out_sends(&self) { self.time_out_sends.store(true, Ordering::SeqCst); }

    /// Stall every subsequent send by `delay` before it completes.
    pub(crate) fn delay_sends(&self, delay: Duration) { *self.send_delay.lock() = Some(delay); }

    pub(crate) fn messages(&self) -> Vec<Message> {
        self.frames
            .lock()
            .iter()
            .map(|frame| codec::decode(frame).expect("peer received a valid frame"))
            .collect()
    }

    pub(crate) fn dials(&self) -> usize { self.dials.load(Ordering::SeqCst) }

    pub(crate) fn closes(&self) -> usize { self.closes.load(Ordering::SeqCst) }
}

struct FakeOutbound {
    peer: Arc<FakePeer>,
}

#[async_trait]
impl OutboundSocket for FakeOutbound {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let delay = *self.peer.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.peer.time_out_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Timeout);
        }
        if self.peer.fail_sends.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
        }
        self.peer.frames.lock().push(frame);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.peer.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
