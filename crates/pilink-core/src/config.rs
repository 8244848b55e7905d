//! Application configuration management.
//!
//! Handles loading, saving, and validating pilink configuration:
//! - Bluetooth adapter and the GATT service/characteristic that receive commands
//! - HTTP bind address for the user surface
//! - Logging level and mode
//!
//! Values are layered: built-in defaults, then the TOML file, then
//! `PILINK__<SECTION>__<KEY>` environment variables.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use config::{Environment, File, FileFormat};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Service exposed by the Pi for command delivery.
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0xffff_ffff_ffff_ffff_ffff_ffff_ffff_fff0);

/// Characteristic inside [`DEFAULT_SERVICE_UUID`] that accepts command strings.
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xffff_ffff_ffff_ffff_ffff_ffff_ffff_fff1);

/// Default port of the HTTP user surface.
pub const DEFAULT_PORT: u16 = 3000;

const ENV_PREFIX: &str = "PILINK";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

static ADAPTER_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^hci[0-9]{1,3}$").expect("adapter name regex is valid"));

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// File that was written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The layered sources could not be merged or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// The configuration could not be serialized back to TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an invalid value.
    #[error("Invalid {field}: {message}")]
    ValidationError {
        /// Dotted path of the field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// More than one field is invalid.
    #[error("{} configuration fields are invalid", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth adapter and GATT layout.
    pub bluetooth: BluetoothConfig,

    /// HTTP user surface.
    pub server: ServerConfig,

    /// Logging output.
    pub logging: LoggingConfig,
}

/// Bluetooth configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Adapter to use, e.g. `hci0`. The system default adapter when unset.
    pub adapter: Option<String>,

    /// GATT service that holds the command characteristic.
    pub service_uuid: Uuid,

    /// Characteristic the command strings are written to.
    pub characteristic_uuid: Uuid,

    /// Only report peers advertising `service_uuid`.
    /// Off by default: many Pi images do not put the service in their
    /// advertisement.
    pub filter_by_service: bool,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            service_uuid: DEFAULT_SERVICE_UUID,
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,
            filter_by_service: false,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind_address: IpAddr,

    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set.
    pub level: String,

    /// JSON file logs plus compact stdout instead of pretty stdout.
    pub production: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            production: false,
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults for a
    /// missing file or missing keys, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the merged values
    /// fail validation.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Save configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be serialized or written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns a single `ValidationError` or `MultipleValidationErrors`.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if let Some(adapter) = &self.bluetooth.adapter {
            if !is_valid_adapter_name(adapter) {
                errors.push(ConfigError::ValidationError {
                    field: "bluetooth.adapter",
                    message: format!("'{adapter}' is not an adapter name like 'hci0'"),
                });
            }
        }

        if self.bluetooth.service_uuid.is_nil() {
            errors.push(ConfigError::ValidationError {
                field: "bluetooth.service_uuid",
                message: "must not be the nil UUID".to_string(),
            });
        }

        if self.bluetooth.characteristic_uuid == self.bluetooth.service_uuid {
            errors.push(ConfigError::ValidationError {
                field: "bluetooth.characteristic_uuid",
                message: "must differ from the service UUID".to_string(),
            });
        }

        if self.server.port == 0 {
            errors.push(ConfigError::ValidationError {
                field: "server.port",
                message: "must be between 1 and 65535".to_string(),
            });
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            errors.push(ConfigError::ValidationError {
                field: "logging.level",
                message: format!(
                    "'{}' is not one of {}",
                    self.logging.level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Returns `true` if `name` looks like a BlueZ adapter name.
#[must_use]
pub fn is_valid_adapter_name(name: &str) -> bool {
    ADAPTER_NAME_RE.is_match(name)
}

/// Default configuration file path.
///
/// On Linux: `/etc/pilink/config.toml`.
/// Elsewhere: the platform config directory.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/pilink/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "pilink").map_or_else(
            || PathBuf::from("config.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}
