//! Inbound commands and the data they carry.
//!
//! An external command queue serializes requests and hands them to
//! [`PumpService::handle_command`](super::service::PumpService::handle_command)
//! one at a time.

use chrono::{DateTime, NaiveDate, Utc};

use crate::profile::BasalProfile;
use crate::reconciler::TemporaryBasalType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BolusType {
    #[default]
    Normal,
    /// Super-micro-bolus issued by the loop.
    Smb,
    Priming,
}

/// A treatment request: insulin, carbs, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailedBolusInfo {
    /// Units.
    pub insulin: f64,
    /// Grams.
    pub carbs: f64,
    pub bolus_type: BolusType,
    pub timestamp: DateTime<Utc>,
    pub notes: Option<String>,
}

impl DetailedBolusInfo {
    pub fn bolus(insulin: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            insulin,
            carbs: 0.0,
            bolus_type: BolusType::Normal,
            timestamp,
            notes: None,
        }
    }

    pub fn carbs(carbs: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            carbs,
            ..Self::bolus(0.0, timestamp)
        }
    }

    pub fn with_carbs(mut self, carbs: f64) -> Self {
        self.carbs = carbs;
        self
    }

    pub fn with_type(mut self, bolus_type: BolusType) -> Self {
        self.bolus_type = bolus_type;
        self
    }

    pub fn is_carb_only(&self) -> bool {
        self.insulin == 0.0 && self.carbs > 0.0
    }
}

/// What the pump reported delivering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BolusDelivery {
    /// Units actually delivered.
    pub delivered: f64,
}

/// One day of insulin totals from pump memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TotalDailyDose {
    pub day: NaiveDate,
    pub bolus: f64,
    pub basal: f64,
}

impl TotalDailyDose {
    pub fn total(&self) -> f64 {
        self.bolus + self.basal
    }
}

/// Commands the outside world can send into the core.
#[derive(Debug, Clone, PartialEq)]
pub enum PumpCommand {
    DeliverTreatment(DetailedBolusInfo),
    SetTempBasalAbsolute {
        rate: f64,
        duration_minutes: u32,
        basal_type: TemporaryBasalType,
        enforce_new: bool,
    },
    SetTempBasalPercent {
        percent: u16,
        duration_minutes: u32,
        basal_type: TemporaryBasalType,
        enforce_new: bool,
    },
    CancelTempBasal {
        enforce_new: bool,
    },
    SetExtendedBolus {
        insulin: f64,
        duration_minutes: u32,
    },
    CancelExtendedBolus,
    SetBasalProfile(BasalProfile),
    LoadTdds,
    StopBolusDelivering,
}
