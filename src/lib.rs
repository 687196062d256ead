#![doc(html_root_url = "https://docs.rs/wrp-bridge/latest")]
//! Public API for the `wrp-bridge` library.
//!
//! This crate bridges WRP routing messages onto point-to-point sockets: a
//! [`Listener`] pulls frames from network peers, a [`Router`] pushes
//! messages to services that registered themselves at runtime, and a
//! [`Bridge`] wires both together through ordered processor chains.

pub mod bridge;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod filters;
pub mod listener;
pub mod locator;
pub mod message;
pub mod metrics;
pub mod processor;
pub mod registry;
pub mod router;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use bridge::{Bridge, BridgeBuilder};
pub use config::ConfigError;
pub use connection::{Connection, ConnectionConfig, ConnectionId};
pub use error::ProcessError;
pub use filters::{LocalOnlyFilter, UnsupportedTypeFilter};
pub use listener::{Listener, ListenerConfig};
pub use locator::{Locator, LocatorError};
pub use message::{Message, MessageType};
pub use processor::{Modifier, ModifierFn, Observer, Observers, Processor, ProcessorChain, ProcessorFn};
pub use registry::{Registry, Subscription};
pub use router::Router;
pub use transport::{DefaultTransport, Transport, TransportError, TransportUrl};
