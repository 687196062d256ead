//! Settings for the inbound listener.

use std::time::Duration;

use crate::{
    codec::{DEFAULT_MAX_FRAME_LENGTH, MAX_FRAME_LENGTH_CEILING},
    config::{ConfigError, deadline, require_url},
    transport::{ListenOptions, TransportUrl},
};

/// Dispatch workers started per running listener by default.
pub const DEFAULT_WORKERS: usize = 4;
/// Decoded messages buffered between the receive loop and the workers by
/// default.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Unvalidated listener settings. Validation happens in
/// [`Listener::new`](super::Listener::new).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerConfig {
    url: String,
    recv_timeout: Duration,
    workers: usize,
    queue_capacity: usize,
    max_frame_length: usize,
}

impl ListenerConfig {
    /// Settings for a listener bound at `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            recv_timeout: Duration::ZERO,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }

    /// Deadline for a single receive. Zero disables it.
    #[must_use]
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Number of dispatch workers.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Capacity of the dispatch queue.
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Largest accepted frame, capped at [`MAX_FRAME_LENGTH_CEILING`].
    #[must_use]
    pub fn max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = len.min(MAX_FRAME_LENGTH_CEILING);
        self
    }

    pub(super) fn validate(&self) -> Result<ValidConfig, ConfigError> {
        let url = require_url("listener", &self.url)?;
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.max_frame_length == 0 {
            return Err(ConfigError::ZeroFrameLength);
        }
        Ok(ValidConfig {
            url,
            options: ListenOptions {
                recv_timeout: deadline(self.recv_timeout),
                max_frame_length: self.max_frame_length,
            },
            workers: self.workers,
            queue_capacity: self.queue_capacity,
        })
    }
}

pub(super) struct ValidConfig {
    pub url: TransportUrl,
    pub options: ListenOptions,
    pub workers: usize,
    pub queue_capacity: usize,
}
