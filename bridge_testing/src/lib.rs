//! Utilities for exercising a [`Bridge`](wrp_bridge::Bridge) over real
//! loopback sockets during tests.
//!
//! [`TestPeer`] plays a device pushing frames at the bridge's listen socket;
//! [`CaptureServer`] plays a registered service and records everything the
//! bridge sends it.
//!
//! ```rust,no_run
//! use wrp_bridge::Message;
//! use wrp_bridge_testing::{CaptureServer, TestPeer};
//!
//! # async fn example(bridge_addr: std::net::SocketAddr) -> std::io::Result<()> {
//! let service = CaptureServer::start().await?;
//! let mut peer = TestPeer::connect(bridge_addr).await?;
//! peer.send_message(&Message::registration("config", service.url()))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod capture;
mod logging;
mod peer;
mod wait;

pub use capture::CaptureServer;
pub use logging::{LoggerHandle, logger};
pub use peer::TestPeer;
pub use wait::{eventually, eventually_async};

/// Find a free loopback port by binding to port 0 and releasing it.
///
/// Useful for a URL nothing listens on.
///
/// # Panics
///
/// Panics if no ephemeral port can be bound.
#[must_use]
pub fn unused_loopback_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("tcp://{addr}")
}
