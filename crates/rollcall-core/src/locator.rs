//! Device position acquisition.
//!
//! This module defines the seam between rollcall and the platform location
//! service:
//! - [`PositionProvider`] answers a single position request asynchronously
//! - [`PositionOptions`] carries the request timeout and cache allowance
//! - [`LocationFailure`] distinguishes why a position could not be produced
//!
//! Nothing here retries. A failed acquisition is reported once and any retry
//! is the user's decision.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::config::GeolocationConfig;
use crate::geo::GeoCoordinate;

/// Default time allowed for one position request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default age under which a previously acquired position is reused.
pub const DEFAULT_MAXIMUM_AGE: Duration = Duration::from_secs(60);

/// Why the platform could not supply a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LocationFailure {
    /// The user (or platform policy) refused location access.
    #[error("Location permission denied. Please enable location access.")]
    PermissionDenied,

    /// The platform has no position fix available.
    #[error("Location information is unavailable.")]
    PositionUnavailable,

    /// The request did not complete within the allowed time.
    #[error("Location request timed out.")]
    Timeout,
}

impl LocationFailure {
    /// Stable wire name of this failure.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::PositionUnavailable => "position_unavailable",
            Self::Timeout => "timeout",
        }
    }

    /// Whether the user has to change a setting before retrying helps.
    #[must_use]
    pub const fn requires_user_action(self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

/// A position reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DevicePosition {
    /// Reported coordinate.
    pub coordinate: GeoCoordinate,
    /// Reported horizontal accuracy, in meters, when the platform supplies it.
    pub accuracy_meters: Option<f64>,
    /// When the platform took the fix.
    pub timestamp: DateTime<Utc>,
}

impl DevicePosition {
    /// Create a position report stamped with `timestamp`.
    #[must_use]
    pub const fn new(coordinate: GeoCoordinate, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            accuracy_meters: None,
            timestamp,
        }
    }

    /// Attach a reported accuracy.
    #[must_use]
    pub const fn with_accuracy(mut self, accuracy_meters: f64) -> Self {
        self.accuracy_meters = Some(accuracy_meters);
        self
    }
}

/// Options for a single position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// Ask the platform for its most accurate fix.
    pub high_accuracy: bool,
    /// How long to wait for the platform before failing with `Timeout`.
    pub timeout: Duration,
    /// How old an earlier fix may be and still be reused without a request.
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: DEFAULT_TIMEOUT,
            maximum_age: DEFAULT_MAXIMUM_AGE,
        }
    }
}

impl From<&GeolocationConfig> for PositionOptions {
    fn from(config: &GeolocationConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout: Duration::from_secs(config.timeout_secs),
            maximum_age: Duration::from_secs(config.maximum_age_secs),
        }
    }
}

/// A source of device positions.
///
/// Each call is one request to the platform. Implementations should not
/// retry internally.
pub trait PositionProvider: Send + Sync {
    /// Request the current device position.
    fn current_position(
        &self,
        options: &PositionOptions,
    ) -> impl Future<Output = Result<DevicePosition, LocationFailure>> + Send;
}

/// Perform exactly one position request, bounded by `options.timeout`.
///
/// # Errors
///
/// Returns the provider's [`LocationFailure`], or
/// [`LocationFailure::Timeout`] if the provider does not answer in time.
pub async fn acquire_position<P: PositionProvider>(
    provider: &P,
    options: &PositionOptions,
) -> Result<DevicePosition, LocationFailure> {
    debug!(
        timeout_ms = options.timeout.as_millis(),
        high_accuracy = options.high_accuracy,
        "Requesting device position"
    );

    if let Ok(outcome) = tokio::time::timeout(options.timeout, provider.current_position(options)).await {
        if let Err(failure) = &outcome {
            warn!(reason = failure.as_str(), "Position request failed");
        }
        outcome
    } else {
        warn!(
            timeout_ms = options.timeout.as_millis(),
            "Position request timed out"
        );
        Err(LocationFailure::Timeout)
    }
}

/// A provider that always answers with the same outcome.
///
/// Useful for local demos and tests where no platform location service
/// exists.
#[derive(Debug, Clone)]
pub struct FixedPositionProvider {
    outcome: Result<DevicePosition, LocationFailure>,
    delay: Option<Duration>,
}

impl FixedPositionProvider {
    /// Always answer with `position`.
    #[must_use]
    pub const fn position(position: DevicePosition) -> Self {
        Self {
            outcome: Ok(position),
            delay: None,
        }
    }

    /// Always fail with `failure`.
    #[must_use]
    pub const fn failing(failure: LocationFailure) -> Self {
        Self {
            outcome: Err(failure),
            delay: None,
        }
    }

    /// Wait `delay` before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl PositionProvider for FixedPositionProvider {
    async fn current_position(
        &self,
        _options: &PositionOptions,
    ) -> Result<DevicePosition, LocationFailure> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome
    }
}
