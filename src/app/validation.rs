//! Request validation.
//!
//! Pure checks run before any capability or connection gate. Shape checks
//! need only the request; limit checks also consult the pump's
//! [`PumpCapabilities`] and run once the operation is known to be
//! supported.

use crate::capabilities::PumpCapabilities;
use crate::error::EnactFailure;
use crate::profile::BasalProfile;

use super::commands::DetailedBolusInfo;

type Check = Result<(), EnactFailure>;

fn non_negative(value: f64, what: &'static str) -> Check {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EnactFailure::InvalidInput(what))
    }
}

fn duration_within(duration: u32, step: u32, max: u32) -> Check {
    if duration == 0 {
        return Err(EnactFailure::InvalidInput("duration must be positive"));
    }
    if duration > max {
        return Err(EnactFailure::InvalidInput("duration exceeds pump maximum"));
    }
    if step > 0 && duration % step != 0 {
        return Err(EnactFailure::InvalidInput("duration is not a multiple of the pump step"));
    }
    Ok(())
}

/// `amount` must be a whole number of pump increments.
fn on_step(amount: f64, step: f64, what: &'static str) -> Check {
    if step <= 0.0 {
        return Ok(());
    }
    let increments = amount / step;
    if (increments - increments.round()).abs() > 1e-6 {
        return Err(EnactFailure::InvalidInput(what));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

pub fn check_treatment(info: &DetailedBolusInfo) -> Check {
    non_negative(info.insulin, "insulin must be finite and non-negative")?;
    non_negative(info.carbs, "carbs must be finite and non-negative")?;
    if info.insulin == 0.0 && info.carbs == 0.0 {
        return Err(EnactFailure::InvalidInput("insulin and carbs are both zero"));
    }
    Ok(())
}

pub fn check_bolus(info: &DetailedBolusInfo) -> Check {
    non_negative(info.insulin, "insulin must be finite and non-negative")?;
    non_negative(info.carbs, "carbs must be finite and non-negative")?;
    if info.insulin == 0.0 {
        return Err(EnactFailure::InvalidInput("bolus insulin must be positive"));
    }
    Ok(())
}

pub fn check_temp_basal_absolute(rate: f64, duration_minutes: u32) -> Check {
    non_negative(rate, "temp basal rate must be finite and non-negative")?;
    if duration_minutes == 0 {
        return Err(EnactFailure::InvalidInput("duration must be positive"));
    }
    Ok(())
}

pub fn check_temp_basal_percent(duration_minutes: u32) -> Check {
    if duration_minutes == 0 {
        return Err(EnactFailure::InvalidInput("duration must be positive"));
    }
    Ok(())
}

pub fn check_extended_bolus(insulin: f64, duration_minutes: u32) -> Check {
    non_negative(insulin, "extended bolus insulin must be finite and non-negative")?;
    if insulin == 0.0 {
        return Err(EnactFailure::InvalidInput("extended bolus insulin must be positive"));
    }
    if duration_minutes == 0 {
        return Err(EnactFailure::InvalidInput("duration must be positive"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Pump limits
// ---------------------------------------------------------------------------

pub fn temp_basal_absolute_limits(caps: &PumpCapabilities, rate: f64, duration_minutes: u32) -> Check {
    if rate > caps.max_temp_absolute {
        return Err(EnactFailure::InvalidInput("temp basal rate exceeds pump maximum"));
    }
    duration_within(duration_minutes, caps.temp_duration_step_minutes, caps.temp_max_duration_minutes)
}

pub fn temp_basal_percent_limits(caps: &PumpCapabilities, percent: u16, duration_minutes: u32) -> Check {
    if percent > caps.max_temp_percent {
        return Err(EnactFailure::InvalidInput("temp basal percent exceeds pump maximum"));
    }
    duration_within(duration_minutes, caps.temp_duration_step_minutes, caps.temp_max_duration_minutes)
}

pub fn bolus_limits(caps: &PumpCapabilities, insulin: f64) -> Check {
    on_step(insulin, caps.bolus_step, "bolus is not a multiple of the pump step")
}

pub fn extended_bolus_limits(caps: &PumpCapabilities, insulin: f64, duration_minutes: u32) -> Check {
    on_step(
        insulin,
        caps.extended_bolus_step,
        "extended bolus is not a multiple of the pump step",
    )?;
    duration_within(
        duration_minutes,
        caps.extended_bolus_duration_step_minutes,
        caps.extended_bolus_max_duration_minutes,
    )
}

pub fn basal_profile_limits(caps: &PumpCapabilities, profile: &BasalProfile) -> Check {
    if profile.min_rate() >= caps.basal_minimum_rate && profile.max_rate() <= caps.basal_maximum_rate {
        Ok(())
    } else {
        Err(EnactFailure::InvalidInput("basal rate outside pump limits"))
    }
}
