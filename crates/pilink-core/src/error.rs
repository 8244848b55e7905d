//! Unified error types for the pilink core library.
//!
//! [`PilinkError`] covers every failure mode of discovery, selection,
//! connection and command delivery. Configuration loading has its own
//! [`ConfigError`](crate::config::ConfigError) which converts into it.
//!
//! Every error is terminal for the action that triggered it. Nothing in the
//! crate retries; the user re-triggers the action.
//!
//! # Example
//!
//! ```rust
//! use pilink_core::error::{PilinkError, Result};
//!
//! fn require_selection(selected: Option<usize>) -> Result<usize> {
//!     selected.ok_or(PilinkError::NoSelection)
//! }
//! ```

use thiserror::Error;
use uuid::Uuid;

/// The unified error type for all pilink operations.
#[derive(Debug, Error)]
pub enum PilinkError {
    // =========================================================================
    // PLATFORM ERRORS
    // =========================================================================
    /// Bluetooth LE is missing or switched off. The user has to fix this
    /// outside the application.
    #[error("Bluetooth LE is not available: {0}")]
    PlatformUnavailable(String),

    /// The platform reported that scanning failed.
    #[error("Bluetooth scan failed: {0}")]
    ScanFailed(String),

    // =========================================================================
    // SELECTION & SESSION ERRORS
    // =========================================================================
    /// A directory index outside the current list was requested.
    #[error("Peer index {index} is out of range (directory holds {len} peers)")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Number of peers in the directory.
        len: usize,
    },

    /// Connect was requested without selecting a peer first.
    #[error("No peer selected")]
    NoSelection,

    /// An action needing a connected peer was requested with no active session.
    #[error("No peer is connected")]
    NoConnection,

    /// The platform declined to start a connection.
    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed {
        /// Address of the peer.
        address: String,
        /// Platform-provided reason.
        reason: String,
    },

    // =========================================================================
    // GATT ERRORS
    // =========================================================================
    /// The connected peer does not expose the command service.
    #[error("Service {0} not found on the connected peer")]
    ServiceNotFound(Uuid),

    /// The command service exists but lacks the command characteristic.
    #[error("Characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound {
        /// Service that was searched.
        service: Uuid,
        /// Characteristic that was missing.
        characteristic: Uuid,
    },

    /// The platform refused to submit the write request.
    #[error("Write request rejected: {0}")]
    WriteSubmissionFailed(String),

    /// A command name other than `emit` or `wifi` was requested.
    #[error("Unknown command '{0}'. Expected 'emit' or 'wifi'")]
    UnknownCommand(String),

    // =========================================================================
    // CONFIGURATION & I/O ERRORS
    // =========================================================================
    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for pilink operations.
pub type Result<T> = std::result::Result<T, PilinkError>;

impl PilinkError {
    /// Returns `true` if the peer was reached but its GATT layout or the
    /// write request was not what we expected.
    #[inline]
    #[must_use]
    pub const fn is_gatt_error(&self) -> bool {
        matches!(
            self,
            Self::ServiceNotFound(_)
                | Self::CharacteristicNotFound { .. }
                | Self::WriteSubmissionFailed(_)
        )
    }

    /// Returns `true` if the error was caused by what the user asked for
    /// rather than by the platform or the peer.
    #[inline]
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange { .. } | Self::NoSelection | Self::NoConnection | Self::UnknownCommand(_)
        )
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - malformed input
            Self::OutOfRange { .. } | Self::UnknownCommand(_) => 400,

            // 409 Conflict - valid request in the wrong state
            Self::NoSelection | Self::NoConnection => 409,

            // 500 Internal Server Error - the server's own files
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) | Self::IoError(_) => 500,

            // 502 Bad Gateway - the peer did not behave as expected
            Self::ConnectFailed { .. }
            | Self::ServiceNotFound(_)
            | Self::CharacteristicNotFound { .. }
            | Self::WriteSubmissionFailed(_) => 502,

            // 503 Service Unavailable - Bluetooth hardware issues
            Self::PlatformUnavailable(_) | Self::ScanFailed(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::PlatformUnavailable(_) => "PLATFORM_UNAVAILABLE",
            Self::ScanFailed(_) => "SCAN_FAILED",
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::NoSelection => "NO_SELECTION",
            Self::NoConnection => "NO_CONNECTION",
            Self::ConnectFailed { .. } => "CONNECT_FAILED",
            Self::ServiceNotFound(_) => "SERVICE_NOT_FOUND",
            Self::CharacteristicNotFound { .. } => "CHARACTERISTIC_NOT_FOUND",
            Self::WriteSubmissionFailed(_) => "WRITE_SUBMISSION_FAILED",
            Self::UnknownCommand(_) => "UNKNOWN_COMMAND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }

    /// Short notification text shown to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::PlatformUnavailable(_) => {
                "Bluetooth LE is not available on this device at this moment.".to_string()
            }
            Self::ScanFailed(_) => "Failed to look for devices".to_string(),
            Self::OutOfRange { .. } | Self::NoSelection => {
                "Please select a device to connect first".to_string()
            }
            Self::NoConnection => {
                "None of the devices is connected. Please pair the Pi with your device and try again"
                    .to_string()
            }
            Self::ConnectFailed { .. } => "Unable to connect to device selected".to_string(),
            Self::ServiceNotFound(_)
            | Self::CharacteristicNotFound { .. }
            | Self::WriteSubmissionFailed(_) => "Unable to send command to the device".to_string(),
            Self::UnknownCommand(name) => format!("Unknown command '{name}'"),
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) | Self::IoError(_) => {
                self.to_string()
            }
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for PilinkError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::WriteError { path, source } => Self::IoError(std::io::Error::new(
                source.kind(),
                format!("Failed to write {}: {}", path.display(), source),
            )),
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
