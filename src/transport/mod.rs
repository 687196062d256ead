//! Point-to-point socket transport.
//!
//! The bridge talks to the network through three small capabilities: a
//! [`Transport`] that opens sockets for a URL, an [`InboundSocket`] that
//! yields whole frames (the *pull* side) and an [`OutboundSocket`] that
//! writes whole frames (the *push* side). Receive and send deadlines are fixed
//! when a socket is opened; exceeding one surfaces as
//! [`TransportError::Timeout`].
//!
//! [`DefaultTransport`] selects an implementation from the URL scheme.
//! Only `tcp://host:port` is built in.

use std::{fmt, io, net::SocketAddr, str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::codec::DEFAULT_MAX_FRAME_LENGTH;

mod tcp;

/// Errors raised by transport operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configured send or receive deadline elapsed.
    #[error("operation timed out")]
    Timeout,
    /// The socket has been closed.
    #[error("socket closed")]
    Closed,
    /// No transport is registered for the URL scheme.
    #[error("unsupported transport scheme `{0}`")]
    UnsupportedScheme(String),
    /// The URL is not of the form `scheme://address`.
    #[error("invalid transport url `{url}`: {reason}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// Underlying socket failure.
    #[error("transport i/o error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether the error is a deadline expiry rather than a broken link.
    #[must_use]
    pub fn is_timeout(&self) -> bool { matches!(self, Self::Timeout) }
}

/// A parsed `scheme://address` transport URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransportUrl {
    scheme: String,
    address: String,
}

impl TransportUrl {
    /// Lowercase scheme, for example `tcp`.
    #[must_use]
    pub fn scheme(&self) -> &str { &self.scheme }

    /// Everything after `://`.
    #[must_use]
    pub fn address(&self) -> &str { &self.address }
}

impl FromStr for TransportUrl {
    type Err = TransportError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| TransportError::InvalidUrl {
            url: raw.to_owned(),
            reason,
        };
        let (scheme, address) = raw.split_once("://").ok_or_else(|| invalid("missing `://`"))?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
            return Err(invalid("malformed scheme"));
        }
        if address.is_empty() {
            return Err(invalid("missing address"));
        }
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            address: address.to_owned(),
        })
    }
}

impl fmt::Display for TransportUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.address)
    }
}

/// Settings fixed when an inbound socket is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenOptions {
    /// Deadline for a single `recv`; `None` waits indefinitely.
    pub recv_timeout: Option<Duration>,
    /// Largest frame accepted from a peer.
    pub max_frame_length: usize,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            recv_timeout: None,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

/// Settings fixed when an outbound socket is dialed.
///
/// Outbound sockets hold at most one frame in flight: `send` returns only
/// once the frame has been flushed, so a broken peer surfaces on the send
/// that hit it rather than on some later one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DialOptions {
    /// Deadline for connecting and for a single `send`; `None` waits
    /// indefinitely.
    pub send_timeout: Option<Duration>,
    /// Largest frame the socket will write.
    pub max_frame_length: usize,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            send_timeout: None,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

/// Receiving half of the transport.
///
/// `recv` must be cancellation-safe: dropping a pending call loses no frame.
#[async_trait]
pub trait InboundSocket: Send {
    /// Wait for the next frame from any connected peer.
    async fn recv(&mut self) -> Result<Bytes, TransportError>;

    /// Stop accepting peers and release the endpoint.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Address the socket is bound to, when it has one.
    fn local_addr(&self) -> Option<SocketAddr> { None }
}

/// Sending half of the transport.
#[async_trait]
pub trait OutboundSocket: Send {
    /// Write one frame to the peer.
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Flush and release the endpoint.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Factory for sockets, keyed by URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Bind an inbound socket at `url`.
    async fn listen(
        &self,
        url: &TransportUrl,
        options: &ListenOptions,
    ) -> Result<Box<dyn InboundSocket>, TransportError>;

    /// Connect an outbound socket to `url`.
    async fn dial(
        &self,
        url: &TransportUrl,
        options: &DialOptions,
    ) -> Result<Box<dyn OutboundSocket>, TransportError>;
}

/// Transport that dispatches on the URL scheme.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTransport;

#[async_trait]
impl Transport for DefaultTransport {
    async fn listen(
        &self,
        url: &TransportUrl,
        options: &ListenOptions,
    ) -> Result<Box<dyn InboundSocket>, TransportError> {
        match url.scheme() {
            "tcp" => tcp::listen(url, options).await,
            other => Err(TransportError::UnsupportedScheme(other.to_owned())),
        }
    }

    async fn dial(
        &self,
        url: &TransportUrl,
        options: &DialOptions,
    ) -> Result<Box<dyn OutboundSocket>, TransportError> {
        match url.scheme() {
            "tcp" => tcp::dial(url, options).await,
            other => Err(TransportError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Shared handle to the [`DefaultTransport`].
#[must_use]
pub fn default_transport() -> Arc<dyn Transport> { Arc::new(DefaultTransport) }
