//! Application configuration management.
//!
//! Handles loading and validating rollcall configuration including:
//! - HTTP bind address and logging mode
//! - Position request timeout and cache allowance
//! - Attendance timezone and late threshold
//! - Optional course registry file
//!
//! Sources are layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then `ROLLCALL__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::attendance::LatePolicy;
use crate::locator::PositionOptions;
use crate::registry::{CourseRegistry, RegistryResult};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "ROLLCALL_CONFIG";

/// Prefix for per-key environment overrides (`ROLLCALL__SERVER__PORT`).
pub const ENV_PREFIX: &str = "ROLLCALL";

const MAX_TIMEOUT_SECS: u64 = 300;
const MAX_MAXIMUM_AGE_SECS: u64 = 24 * 60 * 60;
const MAX_LATE_AFTER_MINUTES: u32 = 240;
const MAX_ATTEMPT_TTL_SECS: u64 = 24 * 60 * 60;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration source could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    SourceError(#[from] ::config::ConfigError),

    /// A single field failed validation.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted path of the field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("{} configuration errors: {}", .0.len(), .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Position request settings.
    pub geolocation: GeolocationConfig,
    /// Attendance classification settings.
    pub attendance: AttendanceConfig,
    /// Course registry source.
    pub registry: RegistryConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Use production logging (JSON files + compact stdout).
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            production: false,
        }
    }
}

/// Position request settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    /// Ask the device for its most accurate fix.
    pub high_accuracy: bool,
    /// Seconds to wait for a position before timing out.
    pub timeout_secs: u64,
    /// Seconds an earlier position stays reusable.
    pub maximum_age_secs: u64,
    /// Seconds an unconfirmed check-in attempt is kept before eviction.
    pub attempt_ttl_secs: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_secs: 10,
            maximum_age_secs: 60,
            attempt_ttl_secs: 60 * 60,
        }
    }
}

/// Attendance classification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    /// IANA timezone that session times are expressed in.
    pub timezone: String,
    /// Minutes after session start before a check-in counts as late.
    pub late_after_minutes: u32,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            late_after_minutes: 10,
        }
    }
}

/// Course registry source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// TOML registry file. The bundled registry is used when unset.
    pub path: Option<PathBuf>,
}

/// Whether `timezone` is a known IANA timezone name.
#[must_use]
pub fn is_valid_timezone_format(timezone: &str) -> bool {
    timezone.parse::<Tz>().is_ok()
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the result is invalid.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&default_config_path())
    }

    /// Load configuration from `path` (if it exists) plus the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the result is invalid.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        Self::build(path, None)
    }

    fn build(path: &Path, env: Option<::config::Map<String, String>>) -> ConfigResult<Self> {
        debug!(path = %path.display(), "Loading configuration");

        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        info!(
            path = %path.display(),
            port = config.server.port,
            timezone = %config.attendance.timezone,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Validate every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single problem or
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::ValidationError {
                field: "server.port",
                message: "port must be non-zero".to_string(),
            });
        }
        if self.geolocation.timeout_secs == 0 || self.geolocation.timeout_secs > MAX_TIMEOUT_SECS {
            errors.push(ConfigError::ValidationError {
                field: "geolocation.timeout_secs",
                message: format!("must be between 1 and {MAX_TIMEOUT_SECS} seconds"),
            });
        }
        if self.geolocation.maximum_age_secs > MAX_MAXIMUM_AGE_SECS {
            errors.push(ConfigError::ValidationError {
                field: "geolocation.maximum_age_secs",
                message: format!("must be at most {MAX_MAXIMUM_AGE_SECS} seconds"),
            });
        }
        if self.geolocation.attempt_ttl_secs < self.geolocation.timeout_secs
            || self.geolocation.attempt_ttl_secs > MAX_ATTEMPT_TTL_SECS
        {
            errors.push(ConfigError::ValidationError {
                field: "geolocation.attempt_ttl_secs",
                message: format!(
                    "must be between timeout_secs ({}) and {MAX_ATTEMPT_TTL_SECS} seconds",
                    self.geolocation.timeout_secs
                ),
            });
        }
        if !is_valid_timezone_format(&self.attendance.timezone) {
            errors.push(ConfigError::ValidationError {
                field: "attendance.timezone",
                message: format!(
                    "unknown timezone '{}'; use an IANA name such as 'America/New_York'",
                    self.attendance.timezone
                ),
            });
        }
        if self.attendance.late_after_minutes > MAX_LATE_AFTER_MINUTES {
            errors.push(ConfigError::ValidationError {
                field: "attendance.late_after_minutes",
                message: format!("must be at most {MAX_LATE_AFTER_MINUTES} minutes"),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Position request options derived from `[geolocation]`.
    #[must_use]
    pub fn position_options(&self) -> PositionOptions {
        PositionOptions::from(&self.geolocation)
    }

    /// Lateness policy derived from `[attendance]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if the timezone is unknown.
    pub fn late_policy(&self) -> ConfigResult<LatePolicy> {
        LatePolicy::try_from(&self.attendance).map_err(|message| ConfigError::ValidationError {
            field: "attendance.timezone",
            message,
        })
    }

    /// The configured course registry, or the bundled one.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry file cannot be loaded.
    pub fn course_registry(&self) -> RegistryResult<CourseRegistry> {
        match &self.registry.path {
            Some(path) => CourseRegistry::load(path),
            None => CourseRegistry::builtin(),
        }
    }
}

/// The configuration file path.
///
/// `ROLLCALL_CONFIG` wins; otherwise `/etc/rollcall/config.toml` on Linux and
/// the platform config directory elsewhere.
#[must_use]
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }

    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/rollcall/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "rollcall").map_or_else(
            || PathBuf::from("rollcall.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}
