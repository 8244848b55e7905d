//! # pilink-core
//!
//! Core logic for controlling a Raspberry Pi over Bluetooth Low Energy.
//!
//! This crate provides:
//! - Discovery of nearby peers into a deduplicated, observable directory
//! - A session controller holding at most one connection at a time
//! - Writing the `emit` / `wifi` commands to the Pi's GATT characteristic
//! - Configuration loading, saving, and validation
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`directory`] - Insertion-ordered peer directory with change notifications
//! - [`scan`] - Scanner seam and the task feeding the directory
//! - [`session`] - Connection lifecycle and command writes
//! - [`transport`] - Traits a Bluetooth backend implements
//! - [`bluetooth`] - BlueZ backend (feature `bluetooth`)
//! - [`mock`] - In-memory backend for tests and stackless builds
//! - [`config`] - Application configuration
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

#[cfg(feature = "bluetooth")]
pub mod bluetooth;
pub mod config;
pub mod directory;
pub mod error;
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub mod mock;
pub mod scan;
pub mod session;
pub mod transport;
pub mod types;

// Re-export primary types for convenience
#[cfg(feature = "bluetooth")]
pub use bluetooth::{open_adapter, BluerScanner, BluerTransport};
pub use config::{
    default_config_path, is_valid_adapter_name, BluetoothConfig, Config, ConfigError,
    ConfigResult, LoggingConfig, ServerConfig, DEFAULT_CHARACTERISTIC_UUID, DEFAULT_PORT,
    DEFAULT_SERVICE_UUID,
};
pub use directory::{DeviceDirectory, SharedDirectory};
pub use error::{PilinkError, Result};
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use mock::{MockCall, MockPeer, MockScanner, MockTransport};
pub use scan::{ingest, ScanEvent, ScanHandle, Scanner, SCAN_CHANNEL_CAPACITY};
pub use session::{CommandTarget, SessionController};
pub use transport::{
    ConnectionEvent, EventSink, GattCharacteristic, GattService, Link, LinkEvent,
    PendingTeardown, SessionId, Transport,
};
pub use types::{Command, ConnectionState, PeerAddress, PeerIdentity};
