//! Timeline records for temporary basals and extended boluses.
//!
//! Records are created on successful enactment and afterwards only ever
//! terminated (superseded or cancelled). Termination sets `ended_at`; the
//! planned duration is kept for remaining-time views.

use chrono::{DateTime, Duration, Utc};

use crate::profile::BasalProfile;

/// How a temporary basal rate is expressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemporaryBasalRate {
    /// Absolute rate in U/h.
    Absolute(f64),
    /// Percent of the scheduled basal rate.
    Percent(u16),
}

/// What the temporary basal is being used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemporaryBasalType {
    #[default]
    Normal,
    EmulatedPumpSuspend,
    PumpSuspend,
    Superbolus,
    FakeExtended,
}

/// Why a record exists in its current form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordCause {
    /// Running (or ran) to its planned end.
    Scheduled,
    /// Terminated by an enforced (user) cancel.
    CancelledByUser,
    /// Terminated by a non-enforced (controller) cancel.
    CancelledByController,
    /// Terminated by a newer record starting.
    Superseded,
}

fn minutes(d: Duration) -> i64 {
    // Nearest minute, not truncated.
    (d.num_seconds() + 30).div_euclid(60)
}

fn elapsed_description(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>, planned: u32) -> String {
    let until = now.min(end);
    let elapsed = minutes(until - start).max(0);
    format!("@{} {}/{}'", start.format("%H:%M"), elapsed, planned)
}

// ---------------------------------------------------------------------------
// Temporary basal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemporaryBasalRecord {
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    pub rate: TemporaryBasalRate,
    pub basal_type: TemporaryBasalType,
    pub cause: RecordCause,
    /// Set when the record was terminated before its planned end.
    pub ended_at: Option<DateTime<Utc>>,
}

impl TemporaryBasalRecord {
    pub fn absolute(start: DateTime<Utc>, rate: f64, duration_minutes: u32) -> Self {
        Self::new(start, TemporaryBasalRate::Absolute(rate), duration_minutes)
    }

    pub fn percent(start: DateTime<Utc>, percent: u16, duration_minutes: u32) -> Self {
        Self::new(start, TemporaryBasalRate::Percent(percent), duration_minutes)
    }

    pub fn new(start: DateTime<Utc>, rate: TemporaryBasalRate, duration_minutes: u32) -> Self {
        Self {
            start,
            duration_minutes,
            rate,
            basal_type: TemporaryBasalType::Normal,
            cause: RecordCause::Scheduled,
            ended_at: None,
        }
    }

    pub fn with_type(mut self, basal_type: TemporaryBasalType) -> Self {
        self.basal_type = basal_type;
        self
    }

    pub fn planned_end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Planned end, or the termination time if earlier.
    pub fn end(&self) -> DateTime<Utc> {
        match self.ended_at {
            Some(ended) => ended.min(self.planned_end()),
            None => self.planned_end(),
        }
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end()
    }

    /// Whole minutes left until the planned end, never negative.
    pub fn planned_remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        minutes(self.planned_end() - now).max(0)
    }

    /// Instantaneous absolute rate (U/h) at `at`. Percent records scale the
    /// scheduled basal in effect at that moment.
    pub fn absolute_rate_at(&self, at: DateTime<Utc>, profile: &BasalProfile) -> f64 {
        match self.rate {
            TemporaryBasalRate::Absolute(rate) => rate,
            TemporaryBasalRate::Percent(pct) => profile.basal_at(at) * f64::from(pct) / 100.0,
        }
    }

    /// Same rate, duration and type as the request, ignoring timing.
    pub fn same_delivery(&self, rate: TemporaryBasalRate, duration_minutes: u32, basal_type: TemporaryBasalType) -> bool {
        let same_rate = match (self.rate, rate) {
            (TemporaryBasalRate::Absolute(a), TemporaryBasalRate::Absolute(b)) => (a - b).abs() < 1e-6,
            (TemporaryBasalRate::Percent(a), TemporaryBasalRate::Percent(b)) => a == b,
            _ => false,
        };
        same_rate && self.duration_minutes == duration_minutes && self.basal_type == basal_type
    }

    /// Short form used in status lines, e.g. `0.50U/h @14:30 10/30'`.
    pub fn describe(&self, now: DateTime<Utc>) -> String {
        let timing = elapsed_description(self.start, self.end(), now, self.duration_minutes);
        match self.rate {
            TemporaryBasalRate::Absolute(rate) => format!("{rate:.2}U/h {timing}"),
            TemporaryBasalRate::Percent(pct) => format!("{pct}% {timing}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Extended bolus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtendedBolusRecord {
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    /// Total insulin planned over the full duration (U).
    pub amount: f64,
    pub cause: RecordCause,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ExtendedBolusRecord {
    pub fn new(start: DateTime<Utc>, amount: f64, duration_minutes: u32) -> Self {
        Self {
            start,
            duration_minutes,
            amount,
            cause: RecordCause::Scheduled,
            ended_at: None,
        }
    }

    /// Delivery rate in U/h.
    pub fn rate(&self) -> f64 {
        if self.duration_minutes == 0 {
            return 0.0;
        }
        self.amount / (f64::from(self.duration_minutes) / 60.0)
    }

    pub fn planned_end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn end(&self) -> DateTime<Utc> {
        match self.ended_at {
            Some(ended) => ended.min(self.planned_end()),
            None => self.planned_end(),
        }
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end()
    }

    pub fn planned_remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        minutes(self.planned_end() - now).max(0)
    }

    /// Insulin delivered between start and `at` at the planned rate.
    pub fn delivered_at(&self, at: DateTime<Utc>) -> f64 {
        let until = at.min(self.end());
        if until <= self.start {
            return 0.0;
        }
        let hours = (until - self.start).num_seconds() as f64 / 3600.0;
        (self.rate() * hours).min(self.amount)
    }

    /// Short form used in status lines, e.g. `E 0.50U/h @14:30 10/120'`.
    pub fn describe(&self, now: DateTime<Utc>) -> String {
        let timing = elapsed_description(self.start, self.end(), now, self.duration_minutes);
        format!("E {:.2}U/h {timing}", self.rate())
    }
}
