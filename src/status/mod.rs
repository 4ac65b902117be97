//! Status reporter.
//!
//! Two read-only views derived from the driver's [`PumpStatusSnapshot`] and
//! the reconciler's expected state:
//!
//! - **structured**: JSON for upload, withheld entirely once the snapshot
//!   is older than the freshness window;
//! - **short**: fixed-order text lines for a compact display, no gate.

pub mod snapshot;

use core::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use log::warn;
use serde::Serialize;
use serde_json::Value;

use crate::profile::BasalProfile;
use crate::reconciler::ExpectedStateReconciler;

pub use snapshot::{PumpStatusCode, PumpStatusSnapshot};

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

// ---------------------------------------------------------------------------
// Structured status document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryStatus {
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSection {
    pub status: &'static str,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtendedStatus {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_basal_absolute_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_basal_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_basal_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_bolus_absolute_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_bolus_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_bolus_remaining: Option<i64>,
}

/// Upload document. Serializes as
/// `{battery:{percent}, status:{status,timestamp}, extended:{...}, reservoir, clock}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<BatteryStatus>,
    pub status: StatusSection,
    pub extended: ExtendedStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservoir: Option<f64>,
    pub clock: String,
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Builds status views. Holds a read handle on the reconciler; never writes.
pub struct StatusReporter {
    reconciler: Arc<ExpectedStateReconciler>,
    freshness: Duration,
}

impl StatusReporter {
    pub fn new(reconciler: Arc<ExpectedStateReconciler>, freshness: Duration) -> Self {
        Self {
            reconciler,
            freshness,
        }
    }

    /// Structured status at `now`, or `None` when the snapshot is stale or
    /// the pump was never reached.
    pub fn structured_status(
        &self,
        snapshot: &PumpStatusSnapshot,
        profile: &BasalProfile,
        profile_name: Option<&str>,
        version: &str,
        now: DateTime<Utc>,
    ) -> Option<StructuredStatus> {
        if !snapshot.is_fresh(now, self.freshness) {
            return None;
        }

        let expected = self.reconciler.expected_state(now, profile);
        let stamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);

        let mut extended = ExtendedStatus {
            version: version.to_owned(),
            active_profile: profile_name.map(str::to_owned),
            temp_basal_absolute_rate: None,
            temp_basal_start: None,
            temp_basal_remaining: None,
            extended_bolus_absolute_rate: None,
            extended_bolus_start: None,
            extended_bolus_remaining: None,
        };
        if let Some(temp) = expected.temporary_basal {
            extended.temp_basal_absolute_rate = Some(temp.absolute_rate);
            extended.temp_basal_start = Some(temp.record.start.format(DATE_TIME_FORMAT).to_string());
            extended.temp_basal_remaining = Some(temp.record.planned_remaining_minutes(now));
        }
        if let Some(eb) = expected.extended_bolus {
            extended.extended_bolus_absolute_rate = Some(eb.rate());
            extended.extended_bolus_start = Some(eb.start.format(DATE_TIME_FORMAT).to_string());
            extended.extended_bolus_remaining = Some(eb.planned_remaining_minutes(now));
        }

        Some(StructuredStatus {
            battery: snapshot
                .battery_remaining_percent
                .map(|percent| BatteryStatus { percent }),
            status: StatusSection {
                status: snapshot.pump_status.unwrap_or_default().as_str(),
                timestamp: stamp.clone(),
            },
            extended,
            reservoir: snapshot.reservoir_remaining_units,
            clock: stamp,
        })
    }

    /// [`structured_status`](Self::structured_status) as JSON. Stale
    /// snapshots and serialization failures both yield an empty object.
    pub fn structured_status_json(
        &self,
        snapshot: &PumpStatusSnapshot,
        profile: &BasalProfile,
        profile_name: Option<&str>,
        version: &str,
        now: DateTime<Utc>,
    ) -> Value {
        let Some(status) = self.structured_status(snapshot, profile, profile_name, version, now)
        else {
            return Value::Object(serde_json::Map::new());
        };
        match serde_json::to_value(&status) {
            Ok(value) => value,
            Err(e) => {
                warn!("Status: structured status dropped: {e}");
                Value::Object(serde_json::Map::new())
            }
        }
    }

    /// Compact multi-line status. Lines appear in a fixed order and are
    /// omitted when their data is missing; `very_short` drops the TDD line.
    pub fn short_status(
        &self,
        snapshot: &PumpStatusSnapshot,
        very_short: bool,
        now: DateTime<Utc>,
    ) -> String {
        let mut out = String::new();

        if let Some(ago) = snapshot.minutes_since_last_connection(now) {
            let _ = writeln!(out, "LastConn: {ago} min ago");
        }
        if let Some(at) = snapshot.last_bolus_time {
            let amount = snapshot.last_bolus_amount.unwrap_or(0.0);
            let _ = writeln!(out, "LastBolus: {amount:.2}U @{}", at.format("%H:%M"));
        }
        if let Some(temp) = self.reconciler.active_temporary_basal(now) {
            let _ = writeln!(out, "Temp: {}", temp.describe(now));
        }
        if let Some(eb) = self.reconciler.active_extended_bolus(now) {
            let _ = writeln!(out, "Extended: {}", eb.describe(now));
        }
        if !very_short {
            match (snapshot.daily_total_units, snapshot.max_daily_total_units) {
                (Some(total), Some(max)) => {
                    let _ = writeln!(out, "TDD: {total:.0} / {max:.0} U");
                }
                (Some(total), None) => {
                    let _ = writeln!(out, "TDD: {total:.0} U");
                }
                _ => {}
            }
        }
        if let Some(iob) = snapshot.insulin_on_board {
            let _ = writeln!(out, "IOB: {iob:.2}U");
        }
        if let Some(reservoir) = snapshot.reservoir_remaining_units {
            let _ = writeln!(out, "Reserv: {reservoir:.0}U");
        }
        if let Some(battery) = snapshot.battery_remaining_percent {
            let _ = writeln!(out, "Batt: {battery}");
        }
        out
    }
}
