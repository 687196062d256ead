//! Configuration validation shared by the listener, connection and bridge
//! builders.
//!
//! Every component validates its settings once, at construction, and
//! refuses to exist in a partially valid state.

use std::time::Duration;

use thiserror::Error;

use crate::transport::{TransportError, TransportUrl};

/// Errors returned when a configuration cannot be accepted.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required URL was not supplied.
    #[error("{component} url is required")]
    MissingUrl {
        /// Component the URL belongs to.
        component: &'static str,
    },
    /// The URL did not parse as a transport address.
    #[error("invalid {component} url: {source}")]
    InvalidUrl {
        /// Component the URL belongs to.
        component: &'static str,
        /// Parse failure.
        #[source]
        source: TransportError,
    },
    /// The dispatch worker pool would be empty.
    #[error("listener requires at least one dispatch worker")]
    ZeroWorkers,
    /// The dispatch queue would never accept a message.
    #[error("listener dispatch queue capacity must be >= 1")]
    ZeroQueueCapacity,
    /// No frame could ever be received.
    #[error("maximum frame length must be >= 1")]
    ZeroFrameLength,
    /// A zero heartbeat interval would spin.
    #[error("heartbeat interval must be non-zero")]
    ZeroHeartbeatInterval,
}

/// Parse `raw` as the URL of `component`.
pub(crate) fn require_url(component: &'static str, raw: &str) -> Result<TransportUrl, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::MissingUrl { component });
    }
    raw.parse()
        .map_err(|source| ConfigError::InvalidUrl { component, source })
}

/// Treat a zero duration as "no deadline".
pub(crate) fn deadline(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_is_missing() {
        let err = require_url("listener", "").expect_err("empty url");
        assert!(matches!(err, ConfigError::MissingUrl { component: "listener" }));
    }

    #[test]
    fn malformed_url_is_invalid() {
        let err = require_url("connection", "not a url").expect_err("bad url");
        assert!(matches!(err, ConfigError::InvalidUrl { component: "connection", .. }));
    }

    #[test]
    fn zero_means_no_deadline() {
        assert_eq!(deadline(Duration::ZERO), None);
        assert_eq!(deadline(Duration::from_millis(5)), Some(Duration::from_millis(5)));
    }
}
