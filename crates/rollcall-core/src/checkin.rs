//! Check-in attempt state machine.
//!
//! A [`CheckInSession`] tracks one student's attempt to check in to one
//! classroom:
//!
//! ```text
//! Idle ──request──▶ AcquiringPosition ──resolve──▶ Verified
//!                          │                    ├─▶ NotInRange ──retry──┐
//!                          │                    └─▶ AcquisitionFailed ──┤
//!                          ◀────────────────────────────────────────────┘
//! ```
//!
//! At most one position request is outstanding at a time. Each request is
//! identified by a [`PositionTicket`]; an answer carrying any other ticket
//! (a superseded request, or one issued before the attempt was dismissed) is
//! ignored. Nothing here polls or retries on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::geo::{self, ClassroomLocation, GeoResult, ProximityResult};
use crate::locator::{DevicePosition, LocationFailure, PositionOptions};

/// Observable status of a check-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum CheckInStatus {
    /// No position has been requested yet.
    Idle,
    /// A position request is outstanding.
    AcquiringPosition,
    /// The last evaluation placed the device inside the perimeter.
    Verified,
    /// The last evaluation placed the device outside the perimeter.
    NotInRange,
    /// The platform could not supply a position.
    AcquisitionFailed(LocationFailure),
}

impl CheckInStatus {
    /// Stable snake_case name of the state, without the failure reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AcquiringPosition => "acquiring_position",
            Self::Verified => "verified",
            Self::NotInRange => "not_in_range",
            Self::AcquisitionFailed(_) => "acquisition_failed",
        }
    }

    /// The failure reason, if acquisition failed.
    #[must_use]
    pub const fn failure(self) -> Option<LocationFailure> {
        match self {
            Self::AcquisitionFailed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Whether a check-in would be accepted in this state.
    #[must_use]
    pub const fn can_check_in(self) -> bool {
        matches!(self, Self::Verified)
    }

    /// Whether the user may explicitly retry from this state.
    #[must_use]
    pub const fn can_retry(self) -> bool {
        matches!(self, Self::NotInRange | Self::AcquisitionFailed(_))
    }
}

/// Identifies one outstanding position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionTicket(u64);

impl PositionTicket {
    /// Rebuild a ticket from the number handed to a client.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The ticket number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Errors returned by state machine transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckInError {
    /// A position request is already outstanding for this attempt.
    #[error("A location request is already in progress for this check-in")]
    RequestPending,

    /// The action is not available from the current state.
    #[error("Cannot {action} while check-in is {state}")]
    InvalidTransition {
        /// The attempted action.
        action: &'static str,
        /// The state the attempt was in.
        state: &'static str,
    },

    /// Check-in was refused because the device is outside the perimeter.
    #[error("You are not within the classroom's check-in area. Move closer and refresh your location.")]
    NotInRange,

    /// Check-in was refused because no successful verification exists.
    #[error("Location has not been verified for this check-in")]
    NotVerified,
}

/// Result type for check-in transitions.
pub type CheckInResult<T> = std::result::Result<T, CheckInError>;

/// What `request_position` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// A new request was issued; answer it with this ticket.
    Pending(PositionTicket),
    /// A recent position was reused and evaluated immediately.
    Cached(CheckInStatus),
}

/// What `resolve` did with an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The answer completed the outstanding request.
    Applied(CheckInStatus),
    /// The answer did not match the outstanding request and was dropped.
    Ignored,
}

/// The outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    /// Ticket that must accompany the answer.
    pub ticket: PositionTicket,
    /// When the request was issued.
    pub issued_at: DateTime<Utc>,
    /// After this instant the request has timed out.
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct CachedPosition {
    position: DevicePosition,
    acquired_at: DateTime<Utc>,
}

/// Point-in-time view of an attempt for rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckInSnapshot {
    /// Current status.
    pub status: CheckInStatus,
    /// Result of the last successful evaluation, if it still applies.
    pub last_result: Option<ProximityResult>,
    /// The position behind `last_result`.
    pub last_position: Option<DevicePosition>,
    /// The outstanding request, if any.
    pub pending: Option<PendingRequest>,
}

/// One check-in attempt against one classroom.
#[derive(Debug, Clone)]
pub struct CheckInSession {
    classroom: ClassroomLocation,
    options: PositionOptions,
    status: CheckInStatus,
    pending: Option<PendingRequest>,
    next_ticket: u64,
    last_result: Option<ProximityResult>,
    cached: Option<CachedPosition>,
}

impl CheckInSession {
    /// Start an idle attempt.
    ///
    /// # Errors
    ///
    /// Returns a [`geo::GeoError`] if the classroom location is invalid.
    pub fn new(classroom: ClassroomLocation, options: PositionOptions) -> GeoResult<Self> {
        classroom.validate()?;
        Ok(Self {
            classroom,
            options,
            status: CheckInStatus::Idle,
            pending: None,
            next_ticket: 1,
            last_result: None,
            cached: None,
        })
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> CheckInStatus {
        self.status
    }

    /// The classroom this attempt targets.
    #[must_use]
    pub const fn classroom(&self) -> ClassroomLocation {
        self.classroom
    }

    /// Observable status plus the last result.
    #[must_use]
    pub fn snapshot(&self) -> CheckInSnapshot {
        CheckInSnapshot {
            status: self.status,
            last_result: self.last_result,
            last_position: self
                .last_result
                .and(self.cached.map(|cached| cached.position)),
            pending: self.pending,
        }
    }

    /// Request a position on entering the check-in view.
    ///
    /// A position acquired within `maximum_age` of `now` is re-evaluated
    /// instead of issuing a new request.
    ///
    /// # Errors
    ///
    /// Returns [`CheckInError::RequestPending`] if a request is outstanding.
    pub fn request_position(&mut self, now: DateTime<Utc>) -> CheckInResult<Acquisition> {
        self.expire(now);
        if self.pending.is_some() {
            return Err(CheckInError::RequestPending);
        }

        if let Some(cached) = self.fresh_cached(now) {
            debug!(
                age_ms = (now - cached.acquired_at).num_milliseconds(),
                "Reusing recent device position"
            );
            let status = self.apply_position(cached.position, cached.acquired_at);
            return Ok(Acquisition::Cached(status));
        }

        Ok(Acquisition::Pending(self.issue(now)))
    }

    /// Explicit user retry after `NotInRange` or `AcquisitionFailed`.
    ///
    /// Always issues a fresh request.
    ///
    /// # Errors
    ///
    /// Returns [`CheckInError::RequestPending`] if a request is outstanding,
    /// or [`CheckInError::InvalidTransition`] from any other state.
    pub fn retry(&mut self, now: DateTime<Utc>) -> CheckInResult<PositionTicket> {
        self.expire(now);
        match self.status {
            CheckInStatus::AcquiringPosition => Err(CheckInError::RequestPending),
            status if status.can_retry() => {
                self.cached = None;
                Ok(self.issue(now))
            }
            status => Err(CheckInError::InvalidTransition {
                action: "retry",
                state: status.as_str(),
            }),
        }
    }

    /// Complete the outstanding request identified by `ticket`.
    ///
    /// Answers for any other ticket are ignored. An answer arriving after the
    /// deadline ends the attempt in `AcquisitionFailed(Timeout)`. A position
    /// with out-of-range coordinates is treated as `PositionUnavailable`.
    pub fn resolve(
        &mut self,
        ticket: PositionTicket,
        outcome: Result<DevicePosition, LocationFailure>,
        now: DateTime<Utc>,
    ) -> Resolution {
        let Some(pending) = self.pending.filter(|pending| pending.ticket == ticket) else {
            debug!(ticket = ticket.get(), "Ignoring answer for stale position request");
            return Resolution::Ignored;
        };
        self.pending = None;

        if now > pending.deadline {
            warn!(ticket = ticket.get(), "Position answer arrived after the deadline");
            return Resolution::Applied(self.fail(LocationFailure::Timeout));
        }

        let status = match outcome {
            Ok(position) => self.apply_position(position, now),
            Err(failure) => self.fail(failure),
        };
        Resolution::Applied(status)
    }

    /// Time out the outstanding request if its deadline has passed.
    ///
    /// Returns `true` if the attempt moved to `AcquisitionFailed(Timeout)`.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        match self.pending {
            Some(pending) if now > pending.deadline => {
                info!(ticket = pending.ticket.get(), "Position request expired");
                self.pending = None;
                self.fail(LocationFailure::Timeout);
                true
            }
            _ => false,
        }
    }

    /// Accept a check-in, returning the position that was verified.
    ///
    /// # Errors
    ///
    /// Returns [`CheckInError::NotInRange`] from `NotInRange` and
    /// [`CheckInError::NotVerified`] from every other state except `Verified`.
    pub fn check_in(&self) -> CheckInResult<DevicePosition> {
        match self.status {
            CheckInStatus::Verified => self
                .cached
                .map(|cached| cached.position)
                .ok_or(CheckInError::NotVerified),
            CheckInStatus::NotInRange => Err(CheckInError::NotInRange),
            _ => Err(CheckInError::NotVerified),
        }
    }

    /// Abandon the attempt. Any outstanding answer will be ignored.
    pub fn dismiss(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(ticket = pending.ticket.get(), "Dropping outstanding position request");
        }
        self.status = CheckInStatus::Idle;
        self.last_result = None;
    }

    fn issue(&mut self, now: DateTime<Utc>) -> PositionTicket {
        let ticket = PositionTicket(self.next_ticket);
        self.next_ticket += 1;

        let timeout = chrono::Duration::from_std(self.options.timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(10));
        self.pending = Some(PendingRequest {
            ticket,
            issued_at: now,
            deadline: now + timeout,
        });
        self.status = CheckInStatus::AcquiringPosition;
        self.last_result = None;

        info!(ticket = ticket.get(), "Requested device position");
        ticket
    }

    fn fresh_cached(&self, now: DateTime<Utc>) -> Option<CachedPosition> {
        let maximum_age = chrono::Duration::from_std(self.options.maximum_age).ok()?;
        self.cached
            .filter(|cached| now - cached.acquired_at <= maximum_age)
    }

    fn apply_position(&mut self, position: DevicePosition, acquired_at: DateTime<Utc>) -> CheckInStatus {
        match geo::evaluate(position.coordinate, self.classroom) {
            Ok(result) => {
                self.last_result = Some(result);
                self.cached = Some(CachedPosition {
                    position,
                    acquired_at,
                });
                self.status = if result.within_range {
                    CheckInStatus::Verified
                } else {
                    CheckInStatus::NotInRange
                };
                info!(
                    status = self.status.as_str(),
                    distance_meters = result.distance_meters,
                    "Evaluated check-in position"
                );
                self.status
            }
            Err(err) => {
                warn!(error = %err, "Rejected malformed device position");
                self.fail(LocationFailure::PositionUnavailable)
            }
        }
    }

    fn fail(&mut self, failure: LocationFailure) -> CheckInStatus {
        self.last_result = None;
        self.status = CheckInStatus::AcquisitionFailed(failure);
        info!(reason = failure.as_str(), "Position acquisition failed");
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{destination_point, GeoCoordinate};
    use chrono::Duration;
    use proptest::prelude::*;
    use tokio_test::{assert_err, assert_ok};

    fn center() -> GeoCoordinate {
        GeoCoordinate::new(40.7128, -74.0060).unwrap()
    }

    fn session() -> CheckInSession {
        let classroom = ClassroomLocation::new(center(), 50.0).unwrap();
        CheckInSession::new(classroom, PositionOptions::default()).unwrap()
    }

    fn at(meters: f64, now: DateTime<Utc>) -> DevicePosition {
        DevicePosition::new(destination_point(center(), 0.0, meters), now)
    }

    fn pending_ticket(acquisition: Acquisition) -> PositionTicket {
        match acquisition {
            Acquisition::Pending(ticket) => ticket,
            Acquisition::Cached(status) => panic!("expected a new request, got {status:?}"),
        }
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = session();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.status, CheckInStatus::Idle);
        assert!(snapshot.last_result.is_none());
        assert!(snapshot.pending.is_none());
    }

    #[test]
    fn test_invalid_classroom_is_rejected() {
        let classroom = ClassroomLocation {
            center: center(),
            radius_meters: -1.0,
        };
        assert!(CheckInSession::new(classroom, PositionOptions::default()).is_err());
    }

    #[test]
    fn test_in_range_position_verifies() {
        let now = Utc::now();
        let mut session = session();
        let ticket = pending_ticket(session.request_position(now).unwrap());
        assert_eq!(session.status(), CheckInStatus::AcquiringPosition);

        let resolution = session.resolve(ticket, Ok(at(10.0, now)), now);
        assert_eq!(resolution, Resolution::Applied(CheckInStatus::Verified));

        let snapshot = session.snapshot();
        assert!(snapshot.last_result.unwrap().within_range);
        assert!(snapshot.last_position.is_some());
        assert_ok!(session.check_in());
    }

    #[test]
    fn test_out_of_range_position_rejects_check_in() {
        let now = Utc::now();
        let mut session = session();
        let ticket = pending_ticket(session.request_position(now).unwrap());

        session.resolve(ticket, Ok(at(56.0, now)), now);
        assert_eq!(session.status(), CheckInStatus::NotInRange);
        assert_eq!(session.check_in(), Err(CheckInError::NotInRange));
    }

    #[test]
    fn test_failure_reason_is_reported() {
        let now = Utc::now();
        let mut session = session();
        let ticket = pending_ticket(session.request_position(now).unwrap());

        session.resolve(ticket, Err(LocationFailure::PermissionDenied), now);
        let status = session.status();
        assert_eq!(status.failure(), Some(LocationFailure::PermissionDenied));
        assert_eq!(session.check_in(), Err(CheckInError::NotVerified));
    }

    #[test]
    fn test_duplicate_request_is_rejected() {
        let now = Utc::now();
        let mut session = session();
        assert_ok!(session.request_position(now));
        assert_eq!(
            session.request_position(now),
            Err(CheckInError::RequestPending)
        );
        assert_eq!(session.retry(now), Err(CheckInError::RequestPending));
    }

    #[test]
    fn test_recent_position_is_reused_without_request() {
        let now = Utc::now();
        let mut session = session();
        let ticket = pending_ticket(session.request_position(now).unwrap());
        session.resolve(ticket, Ok(at(10.0, now)), now);
        session.dismiss();

        let later = now + Duration::seconds(59);
        assert_eq!(
            session.request_position(later),
            Ok(Acquisition::Cached(CheckInStatus::Verified))
        );
        assert!(session.snapshot().pending.is_none());
    }

    #[test]
    fn test_stale_position_triggers_new_request() {
        let now = Utc::now();
        let mut session = session();
        let ticket = pending_ticket(session.request_position(now).unwrap());
        session.resolve(ticket, Ok(at(10.0, now)), now);
        session.dismiss();

        let later = now + Duration::seconds(61);
        let acquisition = session.request_position(later).unwrap();
        assert!(matches!(acquisition, Acquisition::Pending(_)));
        assert_eq!(session.status(), CheckInStatus::AcquiringPosition);
    }

    #[test]
    fn test_retry_only_from_terminal_failure_states() {
        let now = Utc::now();
        let mut session = session();
        assert_eq!(
            session.retry(now),
            Err(CheckInError::InvalidTransition {
                action: "retry",
                state: "idle",
            })
        );

        let ticket = pending_ticket(session.request_position(now).unwrap());
        session.resolve(ticket, Ok(at(10.0, now)), now);
        assert!(matches!(
            session.retry(now),
            Err(CheckInError::InvalidTransition { state: "verified", .. })
        ));
    }

    #[test]
    fn test_retry_skips_cache() {
        let now = Utc::now();
        let mut session = session();
        let first = pending_ticket(session.request_position(now).unwrap());
        session.resolve(first, Ok(at(80.0, now)), now);
        assert_eq!(session.status(), CheckInStatus::NotInRange);

        let second = assert_ok!(session.retry(now + Duration::seconds(1)));
        assert_ne!(first, second);
        assert_eq!(session.status(), CheckInStatus::AcquiringPosition);

        session.resolve(second, Ok(at(5.0, now)), now + Duration::seconds(2));
        assert_eq!(session.status(), CheckInStatus::Verified);
    }

    #[test]
    fn test_answer_after_dismiss_is_ignored() {
        let now = Utc::now();
        let mut session = session();
        let ticket = pending_ticket(session.request_position(now).unwrap());
        session.dismiss();

        let resolution = session.resolve(ticket, Ok(at(10.0, now)), now);
        assert_eq!(resolution, Resolution::Ignored);
        assert_eq!(session.status(), CheckInStatus::Idle);
        assert!(session.snapshot().last_result.is_none());
    }

    #[test]
    fn test_superseded_ticket_is_ignored() {
        let now = Utc::now();
        let mut session = session();
        let first = pending_ticket(session.request_position(now).unwrap());
        session.resolve(first, Err(LocationFailure::PositionUnavailable), now);
        let second = assert_ok!(session.retry(now));

        assert_eq!(
            session.resolve(first, Ok(at(10.0, now)), now),
            Resolution::Ignored
        );
        assert_eq!(session.status(), CheckInStatus::AcquiringPosition);
        assert!(matches!(
            session.resolve(second, Ok(at(10.0, now)), now),
            Resolution::Applied(CheckInStatus::Verified)
        ));
    }

    #[test]
    fn test_late_answer_times_out() {
        let now = Utc::now();
        let mut session = session();
        let ticket = pending_ticket(session.request_position(now).unwrap());

        let late = now + Duration::seconds(11);
        let resolution = session.resolve(ticket, Ok(at(10.0, now)), late);
        assert_eq!(
            resolution,
            Resolution::Applied(CheckInStatus::AcquisitionFailed(LocationFailure::Timeout))
        );
    }

    #[test]
    fn test_expire_moves_silent_request_to_timeout() {
        let now = Utc::now();
        let mut session = session();
        assert_ok!(session.request_position(now));

        assert!(!session.expire(now + Duration::seconds(10)));
        assert!(session.expire(now + Duration::seconds(11)));
        assert_eq!(
            session.status().failure(),
            Some(LocationFailure::Timeout)
        );
        assert_ok!(session.retry(now + Duration::seconds(12)));
    }

    #[test]
    fn test_malformed_device_position_is_unavailable() {
        let now = Utc::now();
        let mut session = session();
        let ticket = pending_ticket(session.request_position(now).unwrap());
        let bogus = DevicePosition::new(
            GeoCoordinate {
                latitude: f64::NAN,
                longitude: 0.0,
            },
            now,
        );

        session.resolve(ticket, Ok(bogus), now);
        assert_eq!(
            session.status().failure(),
            Some(LocationFailure::PositionUnavailable)
        );
        assert_err!(session.check_in());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&CheckInStatus::AcquisitionFailed(LocationFailure::Timeout))
            .unwrap();
        assert_eq!(json, r#"{"state":"acquisition_failed","reason":"timeout"}"#);
        let json = serde_json::to_string(&CheckInStatus::Verified).unwrap();
        assert_eq!(json, r#"{"state":"verified"}"#);
    }

    proptest! {
        #[test]
        fn prop_foreign_ticket_leaves_session_unchanged(
            offset in 1..u64::MAX,
            meters in 0.0..500.0_f64,
        ) {
            let now = Utc::now();
            let mut session = session();
            let ticket = pending_ticket(session.request_position(now).unwrap());
            let before = session.snapshot();

            let foreign = PositionTicket::from_raw(ticket.get().wrapping_add(offset));
            let resolution = session.resolve(foreign, Ok(at(meters, now)), now);
            prop_assert_eq!(resolution, Resolution::Ignored);
            prop_assert_eq!(session.snapshot(), before);
        }

        #[test]
        fn prop_answer_before_deadline_matches_distance(meters in 0.0..200.0_f64) {
            prop_assume!((meters - 50.0).abs() > 1e-3);
            let now = Utc::now();
            let mut session = session();
            let ticket = pending_ticket(session.request_position(now).unwrap());

            let expected = if meters <= 50.0 {
                CheckInStatus::Verified
            } else {
                CheckInStatus::NotInRange
            };
            prop_assert_eq!(
                session.resolve(ticket, Ok(at(meters, now)), now),
                Resolution::Applied(expected)
            );
        }
    }
}
