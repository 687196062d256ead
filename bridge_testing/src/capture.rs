//! A fake registered service that records what the bridge sends it.

use std::{
    io,
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::StreamExt;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tokio_util::{
    codec::{FramedRead, LengthDelimitedCodec},
    sync::CancellationToken,
};
use wrp_bridge::{Message, codec};

use crate::wait::eventually;

#[derive(Default)]
struct Captured {
    messages: Mutex<Vec<Message>>,
    accepted: AtomicUsize,
    disconnected: AtomicUsize,
}

/// Pull socket on an ephemeral loopback port that decodes and keeps every
/// message it receives. Stops when dropped.
pub struct CaptureServer {
    addr: SocketAddr,
    captured: Arc<Captured>,
    shutdown: CancellationToken,
}

impl CaptureServer {
    /// Bind `127.0.0.1:0` and start accepting.
    ///
    /// # Errors
    ///
    /// Returns the bind error.
    pub async fn start() -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let captured = Arc::new(Captured::default());
        let shutdown = CancellationToken::new();
        tokio::spawn(accept(listener, Arc::clone(&captured), shutdown.clone()));
        Ok(Self {
            addr,
            captured,
            shutdown,
        })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Transport URL a service would register with.
    #[must_use]
    pub fn url(&self) -> String { format!("tcp://{}", self.addr) }

    /// Messages received so far, in arrival order.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.captured
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of connections the bridge has opened to this service.
    #[must_use]
    pub fn accepted(&self) -> usize { self.captured.accepted.load(Ordering::SeqCst) }

    /// Number of those connections that have since been closed.
    #[must_use]
    pub fn disconnected(&self) -> usize { self.captured.disconnected.load(Ordering::SeqCst) }

    /// Wait until at least `count` messages satisfy `filter`, then return
    /// every message received.
    ///
    /// # Panics
    ///
    /// Panics if that does not happen within `within`.
    pub async fn wait_for(
        &self,
        count: usize,
        within: Duration,
        filter: impl Fn(&Message) -> bool,
    ) -> Vec<Message> {
        eventually(within, || self.messages().iter().filter(|m| filter(m)).count() >= count).await;
        self.messages()
    }
}

impl Drop for CaptureServer {
    fn drop(&mut self) { self.shutdown.cancel(); }
}

async fn accept(listener: TcpListener, captured: Arc<Captured>, shutdown: CancellationToken) {
    loop {
        let accepted = select! {
            biased;
            () = shutdown.cancelled() => return,
            res = listener.accept() => res,
        };
        if let Ok((stream, _)) = accepted {
            captured.accepted.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(read(stream, Arc::clone(&captured), shutdown.clone()));
        }
    }
}

async fn read(stream: TcpStream, captured: Arc<Captured>, shutdown: CancellationToken) {
    let mut frames = FramedRead::new(stream, LengthDelimitedCodec::new());
    loop {
        let next = select! {
            biased;
            () = shutdown.cancelled() => return,
            next = frames.next() => next,
        };
        match next {
            Some(Ok(frame)) => {
                if let Ok(msg) = codec::decode(&frame) {
                    captured
                        .messages
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(msg);
                }
            }
            Some(Err(_)) | None => break,
        }
    }
    captured.disconnected.fetch_add(1, Ordering::SeqCst);
}
