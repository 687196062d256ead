//! Settings for a single outbound connection.

use std::time::Duration;

use crate::{
    codec::{DEFAULT_MAX_FRAME_LENGTH, MAX_FRAME_LENGTH_CEILING},
    config::{ConfigError, deadline, require_url},
    transport::{DialOptions, TransportUrl},
};

/// Unvalidated connection settings. Validation happens in
/// [`Connection::new`](super::Connection::new).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    url: String,
    send_timeout: Duration,
    max_frame_length: usize,
}

impl ConnectionConfig {
    /// Settings for a connection to `url` with no send deadline.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            send_timeout: Duration::ZERO,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }

    /// Deadline for dialing and for each send. Zero disables it.
    #[must_use]
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Largest frame the connection will write, capped at
    /// [`MAX_FRAME_LENGTH_CEILING`].
    #[must_use]
    pub fn max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = len.min(MAX_FRAME_LENGTH_CEILING);
        self
    }

    /// Target URL as given.
    #[must_use]
    pub fn url(&self) -> &str { &self.url }

    pub(super) fn validate(&self) -> Result<(TransportUrl, DialOptions), ConfigError> {
        let url = require_url("connection", &self.url)?;
        if self.max_frame_length == 0 {
            return Err(ConfigError::ZeroFrameLength);
        }
        Ok((
            url,
            DialOptions {
                send_timeout: deadline(self.send_timeout),
                max_frame_length: self.max_frame_length,
            },
        ))
    }
}
