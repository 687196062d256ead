//! Metric helpers for `wrp-bridge`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate. With the
//! `metrics` feature disabled every helper compiles to nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open outbound connections.
pub const CONNECTIONS_ACTIVE: &str = "wrp_bridge_connections_active";
/// Name of the counter tracking frames moved through the bridge.
pub const FRAMES_TOTAL: &str = "wrp_bridge_frames_total";
/// Name of the counter tracking transport and decode failures.
pub const ERRORS_TOTAL: &str = "wrp_bridge_errors_total";

/// Direction of a frame relative to the bridge.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames decoded from the listen socket.
    Inbound,
    /// Frames written to a registered service.
    Outbound,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the open connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the open connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a failure.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}
