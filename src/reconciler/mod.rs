//! Expected-state reconciler.
//!
//! The controller's own record of which temporary basal and extended bolus
//! the pump should be delivering, kept as two append-only timelines:
//!
//! ```text
//!  temp basals   ──[A 10:00 30']──[B 10:20 60']──[cancel 10:50]──▶
//!                        └─ ended 10:20 (Superseded)
//!  extended      ──[E 08:00 120']──────────────────────────────────▶
//! ```
//!
//! A new record terminates the active one at its own start time; nothing
//! is ever written before the latest instant already on a timeline. Both
//! timelines sit behind one critical-section mutex, so a reader sees either
//! the timeline before a write or after it.
//!
//! Each timeline retains the most recent [`TIMELINE_DEPTH`] records;
//! queries older than that window see no record. Long-term history belongs
//! to the external history sink.

pub mod records;

use core::cell::RefCell;

use chrono::{DateTime, Utc};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Deque;
use log::{debug, info};

use crate::error::ReconcileError;
use crate::profile::BasalProfile;

pub use records::{
    ExtendedBolusRecord, RecordCause, TemporaryBasalRate, TemporaryBasalRecord,
    TemporaryBasalType,
};

/// Records retained per timeline.
pub const TIMELINE_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// Query results
// ---------------------------------------------------------------------------

/// The temporary basal governing an instant, with its absolute rate there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveTemporaryBasal {
    pub record: TemporaryBasalRecord,
    /// U/h at the queried instant.
    pub absolute_rate: f64,
}

/// What the pump should be delivering at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExpectedPumpState {
    pub temporary_basal: Option<ActiveTemporaryBasal>,
    pub extended_bolus: Option<ExtendedBolusRecord>,
}

// ---------------------------------------------------------------------------
// Timeline lane
// ---------------------------------------------------------------------------

trait TimelineEntry: Copy {
    fn start(&self) -> DateTime<Utc>;
    fn duration_minutes(&self) -> u32;
    fn ended_at(&self) -> Option<DateTime<Utc>>;
    fn planned_end(&self) -> DateTime<Utc>;
    fn is_active_at(&self, at: DateTime<Utc>) -> bool;
    fn terminate(&mut self, at: DateTime<Utc>, cause: RecordCause);
}

macro_rules! impl_timeline_entry {
    ($ty:ty) => {
        impl TimelineEntry for $ty {
            fn start(&self) -> DateTime<Utc> {
                self.start
            }
            fn duration_minutes(&self) -> u32 {
                self.duration_minutes
            }
            fn ended_at(&self) -> Option<DateTime<Utc>> {
                self.ended_at
            }
            fn planned_end(&self) -> DateTime<Utc> {
                <$ty>::planned_end(self)
            }
            fn is_active_at(&self, at: DateTime<Utc>) -> bool {
                <$ty>::is_active_at(self, at)
            }
            fn terminate(&mut self, at: DateTime<Utc>, cause: RecordCause) {
                self.ended_at = Some(at);
                self.cause = cause;
            }
        }
    };
}

impl_timeline_entry!(TemporaryBasalRecord);
impl_timeline_entry!(ExtendedBolusRecord);

struct Lane<R> {
    records: Deque<R, TIMELINE_DEPTH>,
}

impl<R: TimelineEntry> Lane<R> {
    const fn new() -> Self {
        Self {
            records: Deque::new(),
        }
    }

    /// Latest instant already written: the last record's start or its
    /// termination time.
    fn recorded_until(&self) -> Option<DateTime<Utc>> {
        self.records.back().map(|r| match r.ended_at() {
            Some(ended) => ended.max(r.start()),
            None => r.start(),
        })
    }

    fn check_start(&self, start: DateTime<Utc>) -> Result<(), ReconcileError> {
        match self.recorded_until() {
            Some(recorded_until) if start < recorded_until => Err(ReconcileError::Retroactive {
                recorded_until,
                requested_start: start,
            }),
            _ => Ok(()),
        }
    }

    /// The record still running (not terminated, planned end after `at`).
    fn open_at(&mut self, at: DateTime<Utc>) -> Option<&mut R> {
        self.records
            .back_mut()
            .filter(|r| r.ended_at().is_none() && r.planned_end() > at)
    }

    /// Append `record`, superseding the running one. Returns the superseded
    /// record in its terminated form.
    fn start(&mut self, record: R) -> Result<Option<R>, ReconcileError> {
        if record.duration_minutes() == 0 {
            return Err(ReconcileError::ZeroDuration);
        }
        self.check_start(record.start())?;

        let superseded = self.open_at(record.start()).map(|prev| {
            prev.terminate(record.start(), RecordCause::Superseded);
            *prev
        });

        if self.records.is_full() {
            let _ = self.records.pop_front();
        }
        // Room was made above.
        let _ = self.records.push_back(record);
        Ok(superseded)
    }

    /// Terminate the record governing `at`: the same record
    /// [`active_at`](Self::active_at) reports, so a cancel always clears
    /// what a reader sees at that instant.
    fn cancel(&mut self, at: DateTime<Utc>, cause: RecordCause) -> Option<R> {
        let rec = self.records.iter_mut().rev().find(|r| r.is_active_at(at))?;
        rec.terminate(at, cause);
        Some(*rec)
    }

    fn active_at(&self, at: DateTime<Utc>) -> Option<R> {
        self.records.iter().rev().find(|r| r.is_active_at(at)).copied()
    }

    fn history(&self) -> Vec<R> {
        self.records.iter().copied().collect()
    }
}

struct Timeline {
    temporary_basals: Lane<TemporaryBasalRecord>,
    extended_boluses: Lane<ExtendedBolusRecord>,
    revision: u64,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Authoritative expected-state store. Share behind an `Arc`; the command
/// engine is the only writer.
pub struct ExpectedStateReconciler {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Timeline>>,
}

impl Default for ExpectedStateReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpectedStateReconciler {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Timeline {
                temporary_basals: Lane::new(),
                extended_boluses: Lane::new(),
                revision: 0,
            })),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut Timeline) -> T) -> T {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    fn read<T>(&self, f: impl FnOnce(&Timeline) -> T) -> T {
        self.inner.lock(|cell| f(&cell.borrow()))
    }

    // ── Temporary basal ───────────────────────────────────────

    /// Would a temporary basal starting at `start` be accepted?
    pub fn check_temporary_basal_start(&self, start: DateTime<Utc>) -> Result<(), ReconcileError> {
        self.read(|t| t.temporary_basals.check_start(start))
    }

    /// Record a newly enacted temporary basal. Any running one is terminated
    /// at `record.start` and returned.
    pub fn record_temporary_basal_start(
        &self,
        record: TemporaryBasalRecord,
    ) -> Result<Option<TemporaryBasalRecord>, ReconcileError> {
        self.write(|t| {
            let superseded = t.temporary_basals.start(record)?;
            t.revision += 1;
            if let Some(prev) = &superseded {
                debug!("Reconciler: temp basal from {} superseded", prev.start);
            }
            info!(
                "Reconciler: temp basal {:?} for {}' from {}",
                record.rate, record.duration_minutes, record.start
            );
            Ok(superseded)
        })
    }

    /// Record the termination of the running temporary basal. `enforced`
    /// marks a user cancel; otherwise the controller cancelled it.
    pub fn record_temporary_basal_cancel(
        &self,
        at: DateTime<Utc>,
        enforced: bool,
    ) -> Option<TemporaryBasalRecord> {
        let cause = if enforced {
            RecordCause::CancelledByUser
        } else {
            RecordCause::CancelledByController
        };
        self.write(|t| {
            let cancelled = t.temporary_basals.cancel(at, cause);
            if cancelled.is_some() {
                t.revision += 1;
                info!("Reconciler: temp basal cancelled at {at} ({cause:?})");
            }
            cancelled
        })
    }

    pub fn active_temporary_basal(&self, at: DateTime<Utc>) -> Option<TemporaryBasalRecord> {
        self.read(|t| t.temporary_basals.active_at(at))
    }

    // ── Extended bolus ────────────────────────────────────────

    pub fn check_extended_bolus_start(&self, start: DateTime<Utc>) -> Result<(), ReconcileError> {
        self.read(|t| t.extended_boluses.check_start(start))
    }

    pub fn record_extended_bolus_start(
        &self,
        record: ExtendedBolusRecord,
    ) -> Result<Option<ExtendedBolusRecord>, ReconcileError> {
        self.write(|t| {
            let superseded = t.extended_boluses.start(record)?;
            t.revision += 1;
            info!(
                "Reconciler: extended bolus {:.2}U over {}' from {}",
                record.amount, record.duration_minutes, record.start
            );
            Ok(superseded)
        })
    }

    pub fn record_extended_bolus_cancel(&self, at: DateTime<Utc>) -> Option<ExtendedBolusRecord> {
        self.write(|t| {
            let cancelled = t.extended_boluses.cancel(at, RecordCause::CancelledByUser);
            if cancelled.is_some() {
                t.revision += 1;
                info!("Reconciler: extended bolus cancelled at {at}");
            }
            cancelled
        })
    }

    pub fn active_extended_bolus(&self, at: DateTime<Utc>) -> Option<ExtendedBolusRecord> {
        self.read(|t| t.extended_boluses.active_at(at))
    }

    // ── Combined view ─────────────────────────────────────────

    /// Governing temporary basal (with its absolute rate at `at`) and
    /// extended bolus, taken from one consistent view of both timelines.
    pub fn expected_state(&self, at: DateTime<Utc>, profile: &BasalProfile) -> ExpectedPumpState {
        let (temp, extended) = self.read(|t| {
            (
                t.temporary_basals.active_at(at),
                t.extended_boluses.active_at(at),
            )
        });
        ExpectedPumpState {
            temporary_basal: temp.map(|record| ActiveTemporaryBasal {
                record,
                absolute_rate: record.absolute_rate_at(at, profile),
            }),
            extended_bolus: extended,
        }
    }

    /// Retained temporary basal records, oldest first.
    pub fn temporary_basal_history(&self) -> Vec<TemporaryBasalRecord> {
        self.read(|t| t.temporary_basals.history())
    }

    /// Retained extended bolus records, oldest first.
    pub fn extended_bolus_history(&self) -> Vec<ExtendedBolusRecord> {
        self.read(|t| t.extended_boluses.history())
    }

    /// Bumped on every accepted write.
    pub fn revision(&self) -> u64 {
        self.read(|t| t.revision)
    }
}
