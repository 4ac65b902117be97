//! Port traits: the boundary between the coordination core and the outside world.
//!
//! ```text
//!   Concrete driver ──▶ PumpDriver (+ ExtendedDelivery, ProfileManagement)
//!                                   │
//!                                   ▼
//!                              PumpService ──▶ HistorySink / EventSink
//! ```
//!
//! A concrete pump driver implements [`PumpDriver`]. Optional capabilities
//! live in separate traits reached through [`PumpDriver::extended`] and
//! [`PumpDriver::profile_management`]; a driver that lacks them returns
//! `None` and the engine answers with an explicit "not supported".
//!
//! ## Contract notes
//!
//! - Physical actions return only once the pump acknowledged or the driver
//!   gave up within its own timeout.
//! - A driver never reports success for an action it did not perform.
//! - Connection transitions are reported by the driver through its
//!   [`ConnectionReporter`](crate::connection::ConnectionReporter), never
//!   by the engine.

use core::time::Duration;

use chrono::{DateTime, Utc};

use crate::capabilities::PumpCapabilities;
use crate::connection::{ConnectionMonitor, LinkRequestOutcome};
use crate::error::DriverError;
use crate::profile::BasalProfile;
use crate::reconciler::{TemporaryBasalRate, TemporaryBasalType};
use crate::status::PumpStatusSnapshot;

use super::commands::{BolusDelivery, DetailedBolusInfo, TotalDailyDose};
use super::events::PumpEvent;

// ───────────────────────────────────────────────────────────────
// Pump driver (required surface)
// ───────────────────────────────────────────────────────────────

/// What a driver does instead of a plain cancel when the cancel is not
/// enforced: run a short near-baseline temp basal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CancelSubstitute {
    pub rate: TemporaryBasalRate,
    pub duration_minutes: u32,
}

/// Every concrete pump driver implements this.
pub trait PumpDriver {
    /// Stable identifier of the paired device.
    fn device_id(&self) -> &str;

    /// Static descriptor for this pump model.
    fn capabilities(&self) -> PumpCapabilities;

    /// Read handle onto the connection machine this driver reports into.
    fn connection(&self) -> ConnectionMonitor;

    /// Reset the cached status snapshot at session start.
    fn init_pump_status_data(&mut self);

    /// Copy of the driver's current status snapshot.
    fn pump_status(&self) -> PumpStatusSnapshot;

    /// Acquire the physical channel (radio link, service binding).
    fn open_channel(&mut self) -> Result<(), DriverError>;

    /// Release the physical channel. Must be safe to call more than once.
    fn close_channel(&mut self);

    /// Deliver a bolus. Progress may be reported through `progress`.
    fn deliver_bolus(
        &mut self,
        info: &DetailedBolusInfo,
        progress: &mut dyn EventSink,
    ) -> Result<BolusDelivery, DriverError>;

    fn set_temp_basal_absolute(
        &mut self,
        rate: f64,
        duration_minutes: u32,
        basal_type: TemporaryBasalType,
        enforce_new: bool,
    ) -> Result<(), DriverError>;

    /// Hard cancel of the running temp basal.
    fn cancel_temp_basal(&mut self, enforce_new: bool) -> Result<(), DriverError>;

    // ── Optional behaviour with defaults ──────────────────────

    /// Begin connecting. Must resolve within `timeout`.
    fn connect(&mut self, _reason: &str, _timeout: Duration) -> LinkRequestOutcome {
        LinkRequestOutcome::Unsupported
    }

    /// Begin disconnecting. Must resolve within `timeout`.
    fn disconnect(&mut self, _reason: &str, _timeout: Duration) -> LinkRequestOutcome {
        LinkRequestOutcome::Unsupported
    }

    fn stop_connecting(&mut self) {}

    fn is_handshake_in_progress(&self) -> bool {
        false
    }

    fn finish_handshaking(&mut self) {}

    /// Abort a bolus in progress.
    fn stop_bolus_delivering(&mut self) -> Result<(), DriverError> {
        Err(DriverError::Unsupported)
    }

    /// Substitute used for non-enforced cancels. `None` means always hard cancel.
    fn cancel_substitute(&self) -> Option<CancelSubstitute> {
        None
    }

    /// Percent temp basals and extended boluses, when the driver has them.
    fn extended(&mut self) -> Option<&mut dyn ExtendedDelivery> {
        None
    }

    /// Basal profile upload and TDD history, when the driver has them.
    fn profile_management(&mut self) -> Option<&mut dyn ProfileManagement> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Optional driver surfaces
// ───────────────────────────────────────────────────────────────

pub trait ExtendedDelivery {
    fn set_temp_basal_percent(
        &mut self,
        percent: u16,
        duration_minutes: u32,
        basal_type: TemporaryBasalType,
        enforce_new: bool,
    ) -> Result<(), DriverError>;

    fn set_extended_bolus(&mut self, insulin: f64, duration_minutes: u32) -> Result<(), DriverError>;

    fn cancel_extended_bolus(&mut self) -> Result<(), DriverError>;
}

pub trait ProfileManagement {
    fn set_basal_profile(&mut self, profile: &BasalProfile) -> Result<(), DriverError>;

    /// The pump already runs exactly this profile.
    fn is_profile_set(&self, profile: &BasalProfile) -> bool;

    /// Daily totals stored in pump memory.
    fn load_tdds(&mut self) -> Result<Vec<TotalDailyDose>, DriverError>;
}

// ───────────────────────────────────────────────────────────────
// Treatment history (driven adapter: core → persistence)
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget treatment log owned outside the core.
pub trait HistorySink {
    fn add_to_history_treatment(&mut self, info: &DetailedBolusInfo, carb_only: bool);

    fn add_total_daily_dose(&mut self, _tdd: &TotalDailyDose) {}
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: core → UI / logging)
// ───────────────────────────────────────────────────────────────

/// The core emits [`PumpEvent`]s through this port. Adapters decide where
/// they go (log, channel to a UI task, test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &PumpEvent);
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}
