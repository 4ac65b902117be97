//! Outcome of a command enactment.

use core::fmt;

use crate::error::EnactFailure;

/// Every enactment ends in exactly one of these. `success == false` always
/// means `enacted == false`; `enacted == true` means the expected state was
/// recorded before the result was built.
#[derive(Debug, Clone, PartialEq)]
pub struct EnactResult {
    success: bool,
    enacted: bool,
    failure: Option<EnactFailure>,
    comment: String,

    pub bolus_delivered: f64,
    pub carbs_delivered: f64,
    pub duration_minutes: Option<u32>,
    pub absolute: Option<f64>,
    pub percent: Option<u16>,
    pub is_percent: bool,
    pub is_temp_cancel: bool,
}

impl EnactResult {
    fn new(success: bool, enacted: bool, failure: Option<EnactFailure>, comment: String) -> Self {
        Self {
            success,
            enacted,
            failure,
            comment,
            bolus_delivered: 0.0,
            carbs_delivered: 0.0,
            duration_minutes: None,
            absolute: None,
            percent: None,
            is_percent: false,
            is_temp_cancel: false,
        }
    }

    /// The pump state changed as requested.
    pub fn enacted(comment: impl Into<String>) -> Self {
        Self::new(true, true, None, comment.into())
    }

    /// Success with nothing to do.
    pub fn unchanged(comment: impl Into<String>) -> Self {
        Self::new(true, false, None, comment.into())
    }

    pub fn failed(failure: EnactFailure) -> Self {
        Self::new(false, false, Some(failure), failure.to_string())
    }

    pub fn with_bolus(mut self, units: f64) -> Self {
        self.bolus_delivered = units;
        self
    }

    pub fn with_carbs(mut self, grams: f64) -> Self {
        self.carbs_delivered = grams;
        self
    }

    pub fn with_absolute(mut self, rate: f64, duration_minutes: u32) -> Self {
        self.absolute = Some(rate);
        self.duration_minutes = Some(duration_minutes);
        self.is_percent = false;
        self
    }

    pub fn with_percent(mut self, percent: u16, duration_minutes: u32) -> Self {
        self.percent = Some(percent);
        self.duration_minutes = Some(duration_minutes);
        self.is_percent = true;
        self
    }

    pub fn with_duration(mut self, duration_minutes: u32) -> Self {
        self.duration_minutes = Some(duration_minutes);
        self
    }

    pub fn temp_cancel(mut self) -> Self {
        self.is_temp_cancel = true;
        self
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn enacted_on_pump(&self) -> bool {
        self.enacted
    }

    pub fn failure(&self) -> Option<EnactFailure> {
        self.failure
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }
}

impl From<EnactFailure> for EnactResult {
    fn from(failure: EnactFailure) -> Self {
        Self::failed(failure)
    }
}

impl fmt::Display for EnactResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "success={} enacted={} comment=\"{}\"",
            self.success, self.enacted, self.comment
        )?;
        if self.bolus_delivered > 0.0 {
            write!(f, " bolus={:.2}U", self.bolus_delivered)?;
        }
        if self.carbs_delivered > 0.0 {
            write!(f, " carbs={:.0}g", self.carbs_delivered)?;
        }
        if self.is_temp_cancel {
            write!(f, " temp_cancel")?;
        } else if let Some(pct) = self.percent.filter(|_| self.is_percent) {
            write!(f, " percent={pct}%")?;
        } else if let Some(rate) = self.absolute {
            write!(f, " absolute={rate:.2}U/h")?;
        }
        if let Some(d) = self.duration_minutes {
            write!(f, " duration={d}'")?;
        }
        Ok(())
    }
}
