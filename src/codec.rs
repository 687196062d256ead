//! Wire encoding of [`Message`] values.
//!
//! Both directions of the bridge share one fixed binary format: bincode 2
//! with its standard configuration. Decoding enforces a size limit so a
//! hostile length field inside a frame cannot trigger unbounded allocation.

use bincode::{
    config::{self, Configuration, Limit},
    error::{DecodeError, EncodeError},
};
use bytes::Bytes;
use thiserror::Error;

use crate::message::Message;

/// Default upper bound on a single encoded message, in bytes.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Hard ceiling on any configured frame length. Also bounds every allocation
/// bincode makes while decoding.
pub const MAX_FRAME_LENGTH_CEILING: usize = 16 * 1024 * 1024;

/// Errors raised while converting messages to and from bytes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] EncodeError),
    /// The frame did not contain a valid message.
    #[error("failed to decode message: {0}")]
    Decode(#[from] DecodeError),
    /// A message decoded cleanly but bytes were left over.
    #[error("frame has {remaining} trailing bytes after the message")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        remaining: usize,
    },
}

/// Encode `msg` into a frame payload.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if bincode rejects the value.
pub fn encode(msg: &Message) -> Result<Bytes, CodecError> {
    let bytes = bincode::encode_to_vec(msg, config::standard())?;
    Ok(Bytes::from(bytes))
}

/// Decode a frame payload produced by [`encode`].
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed input or input larger than
/// [`DEFAULT_MAX_FRAME_LENGTH`], and [`CodecError::TrailingBytes`] when the
/// frame holds more than one message.
pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    decode_limited(bytes, DEFAULT_MAX_FRAME_LENGTH)
}

type LimitedConfig =
    Configuration<config::LittleEndian, config::Varint, Limit<MAX_FRAME_LENGTH_CEILING>>;

/// Decode a frame no longer than `limit` bytes.
///
/// The bincode limit is a compile-time parameter, so the runtime `limit` is
/// checked against the frame length up front and
/// [`MAX_FRAME_LENGTH_CEILING`] guards nested allocations.
///
/// # Errors
///
/// See [`decode`].
pub fn decode_limited(bytes: &[u8], limit: usize) -> Result<Message, CodecError> {
    if bytes.len() > limit {
        return Err(CodecError::Decode(DecodeError::LimitExceeded));
    }
    let config: LimitedConfig = config::standard().with_limit::<MAX_FRAME_LENGTH_CEILING>();
    let (msg, consumed): (Message, usize) = bincode::decode_from_slice(bytes, config)?;
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes {
            remaining: bytes.len() - consumed,
        });
    }
    Ok(msg)
}
