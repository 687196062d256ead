//! Parsing of WRP destination locators.
//!
//! A locator has the shape `scheme:authority[/service[/ignored]]`, for
//! example `mac:112233445566/config/some/path`. The service component is the
//! key the [`crate::router::Router`] routes on.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Errors produced by [`Locator::from_str`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LocatorError {
    /// The locator string was empty.
    #[error("locator is empty")]
    Empty,
    /// No `scheme:` prefix was present.
    #[error("locator `{0}` has no scheme")]
    MissingScheme(String),
    /// The scheme is not one WRP defines.
    #[error("unknown locator scheme `{0}`")]
    UnknownScheme(String),
    /// The scheme requires an authority and none was given.
    #[error("locator `{0}` has no authority")]
    MissingAuthority(String),
    /// A `mac:` authority was not twelve hex digits.
    #[error("invalid mac address `{0}`")]
    InvalidMac(String),
    /// The locator has no service component to route on.
    #[error("locator `{0}` has no service")]
    MissingService(String),
}

/// Locator scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `mac:`, a normalised 12-digit hardware address.
    Mac,
    /// `uuid:`
    Uuid,
    /// `dns:`
    Dns,
    /// `serial:`
    Serial,
    /// `event:`, an event name in place of a device.
    Event,
    /// `self:`, the local device; the authority may be empty.
    SelfRef,
}

impl Scheme {
    fn parse(raw: &str) -> Option<Self> {
        Some(match raw.to_ascii_lowercase().as_str() {
            "mac" => Self::Mac,
            "uuid" => Self::Uuid,
            "dns" => Self::Dns,
            "serial" => Self::Serial,
            "event" => Self::Event,
            "self" => Self::SelfRef,
            _ => return None,
        })
    }

    /// Canonical lowercase spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mac => "mac",
            Self::Uuid => "uuid",
            Self::Dns => "dns",
            Self::Serial => "serial",
            Self::Event => "event",
            Self::SelfRef => "self",
        }
    }
}

/// Structured view of a destination string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Locator {
    /// Addressing scheme.
    pub scheme: Scheme,
    /// Device or event identifier after the scheme.
    pub authority: String,
    /// Routing key; may be empty unless parsed with
    /// [`Locator::parse_routable`].
    pub service: String,
    /// Everything after the service, including its leading `/`.
    pub ignored: String,
}

impl Locator {
    /// Parse `raw` and insist on a non-empty service component.
    ///
    /// # Errors
    ///
    /// Returns any [`LocatorError`] from parsing, or
    /// [`LocatorError::MissingService`] when the service is empty.
    pub fn parse_routable(raw: &str) -> Result<Self, LocatorError> {
        let locator: Self = raw.parse()?;
        if locator.service.is_empty() {
            return Err(LocatorError::MissingService(raw.to_owned()));
        }
        Ok(locator)
    }
}

fn normalize_mac(raw: &str) -> Result<String, LocatorError> {
    let mac: String = raw
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.' | ','))
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if mac.len() != 12 || !mac.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LocatorError::InvalidMac(raw.to_owned()));
    }
    Ok(mac)
}

impl FromStr for Locator {
    type Err = LocatorError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Err(LocatorError::Empty);
        }
        let (scheme, rest) = raw
            .split_once(':')
            .ok_or_else(|| LocatorError::MissingScheme(raw.to_owned()))?;
        let scheme = Scheme::parse(scheme).ok_or_else(|| LocatorError::UnknownScheme(scheme.to_owned()))?;

        let (authority, tail) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };
        if authority.is_empty() && scheme != Scheme::SelfRef {
            return Err(LocatorError::MissingAuthority(raw.to_owned()));
        }
        let authority = match scheme {
            Scheme::Mac => normalize_mac(authority)?,
            _ => authority.to_owned(),
        };

        let tail = tail.strip_prefix('/').unwrap_or(tail);
        let (service, ignored) = match tail.find('/') {
            Some(idx) => tail.split_at(idx),
            None => (tail, ""),
        };

        Ok(Self {
            scheme,
            authority,
            service: service.to_owned(),
            ignored: ignored.to_owned(),
        })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme.as_str(), self.authority)?;
        if !self.service.is_empty() {
            write!(f, "/{}", self.service)?;
        }
        f.write_str(&self.ignored)
    }
}
