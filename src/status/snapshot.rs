//! Driver-owned pump status snapshot.

use chrono::{DateTime, Duration, Utc};

/// Operational status reported by the pump itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PumpStatusCode {
    #[default]
    Running,
    Suspended,
}

impl PumpStatusCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "normal",
            Self::Suspended => "suspended",
        }
    }
}

/// Last values read from the pump. Mutated only by the concrete driver;
/// the core takes copies through [`PumpDriver::pump_status`](crate::app::ports::PumpDriver::pump_status).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PumpStatusSnapshot {
    pub last_connection: Option<DateTime<Utc>>,
    pub last_bolus_time: Option<DateTime<Utc>>,
    /// Units.
    pub last_bolus_amount: Option<f64>,
    pub battery_remaining_percent: Option<u8>,
    /// Units.
    pub reservoir_remaining_units: Option<f64>,
    /// Units; computed outside the core and cached here by the driver.
    pub insulin_on_board: Option<f64>,
    pub pump_status: Option<PumpStatusCode>,
    /// Insulin delivered so far today, as counted by the pump.
    pub daily_total_units: Option<f64>,
    /// Pump-side daily delivery limit.
    pub max_daily_total_units: Option<f64>,
}

impl PumpStatusSnapshot {
    /// The last connection lies within `window` of `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.last_connection
            .is_some_and(|last| last + window >= now)
    }

    /// Whole minutes since the last connection, truncated.
    pub fn minutes_since_last_connection(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_connection.map(|last| (now - last).num_minutes())
    }
}
