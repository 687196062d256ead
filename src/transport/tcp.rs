//! Length-prefixed TCP sockets.
//!
//! Every frame travels with a four-byte big-endian length prefix. The pull
//! side fans in frames from every accepted peer; the push side writes to a
//! single peer and flushes each frame before reporting success.

use std::{future::Future, io, net::SocketAddr, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::mpsc,
    time::{sleep, timeout},
};
use tokio_util::{
    codec::{FramedRead, FramedWrite, LengthDelimitedCodec},
    sync::CancellationToken,
    task::TaskTracker,
};

use super::{DialOptions, InboundSocket, ListenOptions, OutboundSocket, TransportError, TransportUrl};

/// Frames buffered between the peer readers and `recv`.
const PULL_QUEUE_CAPACITY: usize = 128;
const INITIAL_ACCEPT_DELAY: Duration = Duration::from_millis(10);
const MAX_ACCEPT_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Copy)]
enum Side {
    Listen,
    Dial,
}

/// Resolve `tcp://host:port` to a socket address string. An empty or `*`
/// host means every interface when listening and loopback when dialing.
fn socket_addr(url: &TransportUrl, side: Side) -> Result<String, TransportError> {
    let invalid = |reason| TransportError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    let (host, port) = url
        .address()
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port"))?;
    let port: u16 = port.parse().map_err(|_| invalid("invalid port"))?;
    let host = match (host, side) {
        ("" | "*", Side::Listen) => "0.0.0.0",
        ("" | "*", Side::Dial) => "127.0.0.1",
        (host, _) => host,
    };
    Ok(format!("{host}:{port}"))
}

fn codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_length)
        .new_codec()
}

async fn with_deadline<T>(
    deadline: Option<Duration>,
    fut: impl Future<Output = io::Result<T>>,
) -> Result<T, TransportError> {
    match deadline {
        Some(limit) => timeout(limit, fut)
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(TransportError::from),
        None => fut.await.map_err(TransportError::from),
    }
}

pub(super) async fn listen(
    url: &TransportUrl,
    options: &ListenOptions,
) -> Result<Box<dyn InboundSocket>, TransportError> {
    let listener = TcpListener::bind(socket_addr(url, Side::Listen)?).await?;
    let local_addr = listener.local_addr()?;
    let (frames_tx, frames) = mpsc::channel(PULL_QUEUE_CAPACITY);
    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();

    tracker.spawn(accept_loop(
        listener,
        frames_tx,
        options.max_frame_length,
        shutdown.clone(),
        tracker.clone(),
    ));
    debug!("tcp pull socket bound: local_addr={local_addr}");

    Ok(Box::new(PullSocket {
        frames,
        recv_timeout: options.recv_timeout,
        shutdown,
        tracker,
        local_addr,
    }))
}

/// Accept peers until `shutdown` fires, backing off exponentially on
/// accept errors.
async fn accept_loop(
    listener: TcpListener,
    frames: mpsc::Sender<Bytes>,
    max_frame_length: usize,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    let mut delay = INITIAL_ACCEPT_DELAY;
    loop {
        select! {
            biased;

            () = shutdown.cancelled() => break,

            res = listener.accept() => match res {
                Ok((stream, peer)) => {
                    delay = INITIAL_ACCEPT_DELAY;
                    tracker.spawn(read_peer(
                        stream,
                        peer,
                        frames.clone(),
                        max_frame_length,
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    let local_addr = listener.local_addr().ok();
                    warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                    sleep(delay).await;
                    delay = (delay * 2).min(MAX_ACCEPT_DELAY);
                }
            },
        }
    }
}

async fn read_peer(
    stream: TcpStream,
    peer: SocketAddr,
    frames: mpsc::Sender<Bytes>,
    max_frame_length: usize,
    shutdown: CancellationToken,
) {
    let mut reader = FramedRead::new(stream, codec(max_frame_length));
    loop {
        let next = select! {
            biased;
            () = shutdown.cancelled() => break,
            next = reader.next() => next,
        };
        match next {
            Some(Ok(frame)) => {
                let delivered = select! {
                    biased;
                    () = shutdown.cancelled() => false,
                    res = frames.send(frame.freeze()) => res.is_ok(),
                };
                if !delivered {
                    break;
                }
            }
            Some(Err(e)) => {
                debug!("dropping peer after read error: peer={peer}, error={e}");
                break;
            }
            None => {
                debug!("peer disconnected: peer={peer}");
                break;
            }
        }
    }
}

struct PullSocket {
    frames: mpsc::Receiver<Bytes>,
    recv_timeout: Option<Duration>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    local_addr: SocketAddr,
}

#[async_trait]
impl InboundSocket for PullSocket {
    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let next = match self.recv_timeout {
            Some(limit) => timeout(limit, self.frames.recv())
                .await
                .map_err(|_| TransportError::Timeout)?,
            None => self.frames.recv().await,
        };
        next.ok_or(TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.frames.close();
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> { Some(self.local_addr) }
}

impl Drop for PullSocket {
    fn drop(&mut self) { self.shutdown.cancel(); }
}

pub(super) async fn dial(
    url: &TransportUrl,
    options: &DialOptions,
) -> Result<Box<dyn OutboundSocket>, TransportError> {
    let addr = socket_addr(url, Side::Dial)?;
    let stream = with_deadline(options.send_timeout, TcpStream::connect(addr)).await?;
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    debug!("tcp push socket connected: peer={peer}");
    Ok(Box::new(PushSocket {
        framed: Some(FramedWrite::new(stream, codec(options.max_frame_length))),
        send_timeout: options.send_timeout,
    }))
}

struct PushSocket {
    framed: Option<FramedWrite<TcpStream, LengthDelimitedCodec>>,
    send_timeout: Option<Duration>,
}

#[async_trait]
impl OutboundSocket for PushSocket {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let framed = self.framed.as_mut().ok_or(TransportError::Closed)?;
        with_deadline(self.send_timeout, framed.send(frame)).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.framed.take() {
            Some(mut framed) => {
                with_deadline(self.send_timeout, SinkExt::<Bytes>::close(&mut framed)).await
            }
            None => Ok(()),
        }
    }
}
