//! Error types for the pump coordination core.
//!
//! Every fallible internal operation returns one of the enums below. The
//! command engine converts all of them into an
//! [`EnactResult`](crate::app::result::EnactResult) at its boundary, so a
//! dosing call never unwinds with the delivery outcome unknown.
//! All variants are `Copy` so they can be latched and re-reported without
//! allocation.

use core::fmt;

use chrono::{DateTime, Utc};

use crate::connection::ConnectionState;

// ---------------------------------------------------------------------------
// Driver errors
// ---------------------------------------------------------------------------

/// Failure reported by a concrete driver's physical action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The radio / transport link dropped mid-command.
    CommunicationFailed,
    /// The pump did not answer within the driver's own timeout.
    Timeout,
    /// The pump refused the command; the tag names the pump-side reason.
    Rejected(&'static str),
    /// Delivery stopped on an occlusion alarm.
    Occlusion,
    /// Not enough insulin left to perform the delivery.
    ReservoirEmpty,
    /// The physical channel could not be acquired.
    ChannelUnavailable,
    /// The driver does not implement this action.
    Unsupported,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommunicationFailed => write!(f, "communication with pump failed"),
            Self::Timeout => write!(f, "pump did not respond in time"),
            Self::Rejected(reason) => write!(f, "pump rejected command: {reason}"),
            Self::Occlusion => write!(f, "occlusion detected"),
            Self::ReservoirEmpty => write!(f, "reservoir empty"),
            Self::ChannelUnavailable => write!(f, "pump channel unavailable"),
            Self::Unsupported => write!(f, "not supported by pump driver"),
        }
    }
}

// ---------------------------------------------------------------------------
// Protocol violations
// ---------------------------------------------------------------------------

/// A driver reported a connection transition the state machine forbids.
///
/// Fatal to the session: the machine latches it until the driver is
/// re-initialized, and the engine refuses every command meanwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolViolation {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "illegal connection transition {} -> {}",
            self.from.name(),
            self.to.name()
        )
    }
}

// ---------------------------------------------------------------------------
// Reconciler errors
// ---------------------------------------------------------------------------

/// Rejected writes to the expected-state reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileError {
    /// The new record starts before the latest instant already on the
    /// timeline (the previous record's start or its termination).
    Retroactive {
        recorded_until: DateTime<Utc>,
        requested_start: DateTime<Utc>,
    },
    /// A record with a zero-minute duration.
    ZeroDuration,
    /// A cancel found no record governing the instant.
    NothingActive { at: DateTime<Utc> },
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retroactive {
                recorded_until,
                requested_start,
            } => write!(
                f,
                "record at {requested_start} precedes timeline recorded until {recorded_until}"
            ),
            Self::ZeroDuration => write!(f, "record duration must be positive"),
            Self::NothingActive { at } => write!(f, "no record active at {at} to cancel"),
        }
    }
}

// ---------------------------------------------------------------------------
// Profile errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileError {
    /// No segments were supplied.
    Empty,
    /// The first segment does not start at midnight.
    MissingMidnightSegment,
    /// Segment start minutes are not strictly increasing or exceed a day.
    UnorderedSegments,
    /// A rate is negative or not finite.
    InvalidRate,
    /// More segments than the fixed capacity allows.
    TooManySegments,
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "basal profile has no segments"),
            Self::MissingMidnightSegment => write!(f, "first basal segment must start at 00:00"),
            Self::UnorderedSegments => write!(f, "basal segments must be ordered within one day"),
            Self::InvalidRate => write!(f, "basal rate must be finite and non-negative"),
            Self::TooManySegments => write!(f, "too many basal segments"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document could not be parsed.
    Malformed(String),
    /// A field failed range validation; the tag names the field.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed config: {msg}"),
            Self::ValidationFailed(field) => write!(f, "validation failed: {field}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Enactment failures
// ---------------------------------------------------------------------------

/// Why a command did not take effect. Carried inside a failed
/// [`EnactResult`](crate::app::result::EnactResult).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnactFailure {
    /// Malformed or contradictory request. No side effect.
    InvalidInput(&'static str),
    /// The pump model or driver lacks the capability. No side effect.
    OperationNotSupported(&'static str),
    /// The driver is not connected (or not initialized).
    NotConnected,
    /// The driver is connected but busy with another exchange.
    Busy,
    /// The pump is suspended.
    Suspended,
    /// The driver attempted the physical action and it failed.
    PhysicalDeliveryFailure(DriverError),
    /// The connection machine latched an illegal transition.
    ProtocolViolation(ProtocolViolation),
    /// The physical action succeeded but the reconciler refused the record.
    ExpectedStateRejected(ReconcileError),
}

impl EnactFailure {
    /// True when the engine refused before any physical action was attempted.
    pub fn is_side_effect_free(&self) -> bool {
        !matches!(
            self,
            Self::PhysicalDeliveryFailure(_) | Self::ExpectedStateRejected(_)
        )
    }
}

impl fmt::Display for EnactFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::OperationNotSupported(msg) => write!(f, "operation not supported: {msg}"),
            Self::NotConnected => write!(f, "pump not connected"),
            Self::Busy => write!(f, "pump busy"),
            Self::Suspended => write!(f, "pump suspended"),
            Self::PhysicalDeliveryFailure(e) => write!(f, "delivery failed: {e}"),
            Self::ProtocolViolation(v) => write!(f, "protocol violation: {v}"),
            Self::ExpectedStateRejected(e) => write!(f, "expected state rejected: {e}"),
        }
    }
}

impl From<DriverError> for EnactFailure {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::Unsupported => Self::OperationNotSupported("not supported by pump driver"),
            other => Self::PhysicalDeliveryFailure(other),
        }
    }
}

impl From<ProtocolViolation> for EnactFailure {
    fn from(v: ProtocolViolation) -> Self {
        Self::ProtocolViolation(v)
    }
}

impl From<ReconcileError> for EnactFailure {
    fn from(e: ReconcileError) -> Self {
        Self::ExpectedStateRejected(e)
    }
}
