//! A network peer that pushes frames at a bridge's listen socket.

use std::{io, net::SocketAddr};

use bytes::Bytes;
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedWrite, LengthDelimitedCodec};
use wrp_bridge::{Message, codec};

/// Pushing TCP peer speaking the bridge's length-prefixed framing.
pub struct TestPeer {
    framed: FramedWrite<TcpStream, LengthDelimitedCodec>,
}

impl TestPeer {
    /// Connect to `addr`.
    ///
    /// # Errors
    ///
    /// Returns the connect error.
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            framed: FramedWrite::new(stream, LengthDelimitedCodec::new()),
        })
    }

    /// Send raw frame bytes, bypassing the message codec.
    ///
    /// # Errors
    ///
    /// Returns the write error.
    pub async fn send_frame(&mut self, frame: impl Into<Bytes>) -> io::Result<()> {
        let frame: Bytes = frame.into();
        self.framed.send(frame).await
    }

    /// Encode and send `msg`.
    ///
    /// # Errors
    ///
    /// Returns the encode or write error.
    pub async fn send_message(&mut self, msg: &Message) -> io::Result<()> {
        let frame = codec::encode(msg).map_err(io::Error::other)?;
        self.send_frame(frame).await
    }

    /// Flush and shut the connection down.
    ///
    /// # Errors
    ///
    /// Returns the flush or shutdown error.
    pub async fn close(mut self) -> io::Result<()> {
        SinkExt::<Bytes>::close(&mut self.framed).await
    }
}
