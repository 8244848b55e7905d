//! Shared types and OpenAPI schemas.
//!
//! This module contains the vocabulary shared by the directory, the session
//! controller and the HTTP surface: peer identities, connection states and
//! the two commands a peer understands.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::PilinkError;

/// Opaque, stable address of a BLE peer.
///
/// On Linux this is the MAC address reported by BlueZ, but nothing in the
/// crate depends on that format: two peers are the same peer iff their
/// addresses compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "B8:27:EB:12:34:56")]
pub struct PeerAddress(String);

impl PeerAddress {
    /// Wrap a platform address.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The address as reported by the platform.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for PeerAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// A discovered peer. Immutable once created by the scan stream.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "address": "B8:27:EB:12:34:56",
    "name": "raspberrypi",
    "first_seen_utc": "2025-01-15T03:30:00Z"
}))]
pub struct PeerIdentity {
    /// Stable unique key of the peer.
    pub address: PeerAddress,

    /// Advertised name, if the peer broadcasts one.
    #[schema(example = "raspberrypi")]
    pub name: Option<String>,

    /// When the scan stream first reported this peer.
    pub first_seen_utc: DateTime<Utc>,
}

impl PeerIdentity {
    /// Create an identity first seen now.
    pub fn new(address: impl Into<PeerAddress>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
            first_seen_utc: Utc::now(),
        }
    }

    /// Name to show in a list, falling back to the address.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.address.as_str())
    }
}

/// Connection state of the controller's single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session, or the last session ended.
    #[default]
    Disconnected,
    /// A connection attempt has been started and not yet resolved.
    Connecting,
    /// The peer is connected and commands can be sent.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// A command understood by the peer.
///
/// The controller knows nothing about what the peer does with it; it only
/// writes the command name as UTF-8 into the command characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Drop the current Wi-Fi association and start broadcasting an access point.
    Emit,
    /// Stop broadcasting and rejoin the configured Wi-Fi network.
    Wifi,
}

impl Command {
    /// The literal command name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Emit => "emit",
            Self::Wifi => "wifi",
        }
    }

    /// Bytes written to the characteristic.
    #[must_use]
    pub const fn payload(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = PilinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emit" => Ok(Self::Emit),
            "wifi" => Ok(Self::Wifi),
            other => Err(PilinkError::UnknownCommand(other.to_string())),
        }
    }
}
