//! Error taxonomy shared by every message handler.
//!
//! [`ProcessError`] doubles as the control-flow signal of a
//! [`ProcessorChain`](crate::processor::ProcessorChain):
//! [`ProcessError::NotHandled`] means "not my message, try the next
//! handler", every other variant stops the chain.

use thiserror::Error;

use crate::{
    codec::CodecError,
    config::ConfigError,
    locator::LocatorError,
    message::MessageType,
    transport::TransportError,
};

/// Outcome of processing a message, other than success.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The handler does not apply to this message.
    #[error("message not handled")]
    NotHandled,
    /// The caller's context was cancelled before the work finished.
    #[error("operation cancelled")]
    Cancelled,
    /// The message type is outside the known range or reserved.
    #[error("unsupported message type: invalid message type: {}", .0.as_i64())]
    UnsupportedType(MessageType),
    /// A bridge-internal type tried to cross an external boundary.
    #[error("local message types are not allowed: {0}")]
    LocalDisallowed(MessageType),
    /// The message is missing fields its type requires.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),
    /// The destination could not be parsed into a routable locator.
    #[error("invalid locator: {0}")]
    InvalidLocator(#[from] LocatorError),
    /// The connection is not open.
    #[error("connection closed")]
    ConnectionClosed,
    /// The transport failed mid-send and the connection was torn down.
    #[error("failed to send message: {0}")]
    SendFailed(#[source] TransportError),
    /// A transport operation failed without tearing anything down.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The message could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A connection could not be built from the supplied settings.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ProcessError {
    /// Whether this is the pass-through sentinel.
    #[must_use]
    pub fn is_not_handled(&self) -> bool { matches!(self, Self::NotHandled) }

    /// Whether the operation was abandoned rather than failed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool { matches!(self, Self::Cancelled) }
}
