//! WRP message model.
//!
//! [`Message`] is a plain value type. The bridge only ever inspects its
//! [`MessageType`], its destination locator and, for registrations, the
//! service name and connect URL; every other field is carried through
//! untouched.

use std::{collections::BTreeMap, fmt};

use bincode::{Decode, Encode};

/// Numeric WRP message type.
///
/// Any `i64` is representable so decoding never fails on a type this crate
/// does not know about; [`crate::filters::UnsupportedTypeFilter`] rejects
/// such messages instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct MessageType(i64);

impl MessageType {
    /// Reserved, never valid on the wire.
    pub const INVALID0: Self = Self(0);
    /// Reserved, never valid on the wire.
    pub const INVALID1: Self = Self(1);
    /// Authorization handshake sent to a freshly registered service.
    pub const AUTHORIZATION: Self = Self(2);
    /// Request expecting a response.
    pub const SIMPLE_REQUEST_RESPONSE: Self = Self(3);
    /// Fire-and-forget event.
    pub const SIMPLE_EVENT: Self = Self(4);
    /// CRUD create.
    pub const CREATE: Self = Self(5);
    /// CRUD retrieve.
    pub const RETRIEVE: Self = Self(6);
    /// CRUD update.
    pub const UPDATE: Self = Self(7);
    /// CRUD delete.
    pub const DELETE: Self = Self(8);
    /// A service announcing its name and connect URL.
    pub const SERVICE_REGISTRATION: Self = Self(9);
    /// Periodic liveness announcement.
    pub const SERVICE_ALIVE: Self = Self(10);
    /// Explicitly unknown message.
    pub const UNKNOWN: Self = Self(11);
    /// Exclusive upper bound of the known types.
    pub const LAST: Self = Self(12);

    /// Wrap a raw numeric type.
    #[must_use]
    pub const fn new(value: i64) -> Self { Self(value) }

    /// Return the raw numeric value.
    #[must_use]
    pub const fn as_i64(self) -> i64 { self.0 }

    /// Whether the type lies inside the known range and outside the reserved
    /// invalid values.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        self.0 >= 0 && self.0 < Self::LAST.0 && self.0 != Self::INVALID0.0 && self.0 != Self::INVALID1.0
    }

    /// Whether the type is bookkeeping that only has meaning inside the
    /// bridge: registration, liveness and the authorization handshake.
    #[must_use]
    pub const fn is_local(self) -> bool {
        matches!(
            self,
            Self::AUTHORIZATION | Self::SERVICE_REGISTRATION | Self::SERVICE_ALIVE
        )
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::INVALID0 => "Invalid0",
            Self::INVALID1 => "Invalid1",
            Self::AUTHORIZATION => "Authorization",
            Self::SIMPLE_REQUEST_RESPONSE => "SimpleRequestResponse",
            Self::SIMPLE_EVENT => "SimpleEvent",
            Self::CREATE => "Create",
            Self::RETRIEVE => "Retrieve",
            Self::UPDATE => "Update",
            Self::DELETE => "Delete",
            Self::SERVICE_REGISTRATION => "ServiceRegistration",
            Self::SERVICE_ALIVE => "ServiceAlive",
            Self::UNKNOWN => "Unknown",
            _ => return None,
        })
    }
}

impl From<i64> for MessageType {
    fn from(value: i64) -> Self { Self(value) }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}({})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A WRP message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct Message {
    /// Kind of message.
    pub msg_type: MessageType,
    /// Locator of the sender.
    pub source: String,
    /// Locator of the recipient; its service component picks the route.
    pub destination: String,
    /// Correlates a request with its response.
    pub transaction_uuid: String,
    /// MIME type of `payload`.
    pub content_type: String,
    /// MIME types acceptable in a response.
    pub accept: String,
    /// Status code, as carried by authorization messages.
    pub status: Option<i64>,
    /// Whether the sender wants a delivery receipt.
    pub request_delivery_response: Option<i64>,
    /// Free-form header lines.
    pub headers: Vec<String>,
    /// Key-value annotations, kept in key order.
    pub metadata: BTreeMap<String, String>,
    /// Resource path for CRUD messages.
    pub path: String,
    /// Opaque body.
    pub payload: Vec<u8>,
    /// Name a registering service wants to be routed by.
    pub service_name: String,
    /// Transport URL a registering service listens on.
    pub url: String,
    /// Partners the message belongs to.
    pub partner_ids: Vec<String>,
    /// Session of the originating device.
    pub session_id: String,
}

impl Message {
    /// Create an otherwise empty message of the given type.
    #[must_use]
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            ..Self::default()
        }
    }

    /// Build a service registration announcing `service_name` at `url`.
    #[must_use]
    pub fn registration(service_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::SERVICE_REGISTRATION,
            service_name: service_name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Build a liveness announcement.
    #[must_use]
    pub fn service_alive() -> Self { Self::new(MessageType::SERVICE_ALIVE) }

    /// Build the authorization handshake carrying `status`.
    #[must_use]
    pub fn authorization(status: i64) -> Self {
        Self {
            msg_type: MessageType::AUTHORIZATION,
            status: Some(status),
            ..Self::default()
        }
    }

    /// Build an event from `source` to `destination` carrying `payload`.
    #[must_use]
    pub fn event(
        source: impl Into<String>,
        destination: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            msg_type: MessageType::SIMPLE_EVENT,
            source: source.into(),
            destination: destination.into(),
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Destination locator string used for routing.
    #[must_use]
    pub fn destination(&self) -> &str { &self.destination }
}
