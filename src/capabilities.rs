//! Static pump capability descriptor.
//!
//! One value per pump model, immutable for the life of the driver. The
//! command engine consults it before any connection check so unsupported
//! operations fail without touching the pump.

use serde::Serialize;

/// Manufacturer / model pair reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PumpModel {
    pub manufacturer: &'static str,
    pub model: &'static str,
}

/// What a pump model can do and within which limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PumpCapabilities {
    pub model: PumpModel,

    // --- Temporary basal ---
    pub temp_basal_capable: bool,
    pub supports_percent_temp_basal: bool,
    /// Highest percent accepted for percent-based temp basals.
    pub max_temp_percent: u16,
    /// Highest absolute temp basal rate (U/h).
    pub max_temp_absolute: f64,
    pub temp_duration_step_minutes: u32,
    pub temp_max_duration_minutes: u32,

    // --- Extended bolus ---
    pub supports_extended_bolus: bool,
    /// Smallest extended bolus increment (U).
    pub extended_bolus_step: f64,
    pub extended_bolus_duration_step_minutes: u32,
    pub extended_bolus_max_duration_minutes: u32,

    // --- Bolus / basal ---
    /// Smallest bolus increment (U).
    pub bolus_step: f64,
    /// Lowest programmable scheduled basal rate (U/h).
    pub basal_minimum_rate: f64,
    /// Highest programmable scheduled basal rate (U/h).
    pub basal_maximum_rate: f64,

    // --- Pump memory ---
    pub set_basal_profile_capable: bool,
    pub supports_tdds: bool,

    // --- Behaviour flags ---
    /// The driver emulates temp basals with extended boluses.
    pub fakes_temps_by_extended_boluses: bool,
    /// The pump clock follows daylight-saving changes on its own.
    pub can_handle_dst: bool,
}

impl PumpCapabilities {
    /// Absolute temp basals only: no percent, no extended bolus, no pump memory.
    pub const fn basic(model: PumpModel) -> Self {
        Self {
            model,
            temp_basal_capable: true,
            supports_percent_temp_basal: false,
            max_temp_percent: 0,
            max_temp_absolute: 10.0,
            temp_duration_step_minutes: 30,
            temp_max_duration_minutes: 24 * 60,
            supports_extended_bolus: false,
            extended_bolus_step: 0.1,
            extended_bolus_duration_step_minutes: 30,
            extended_bolus_max_duration_minutes: 8 * 60,
            bolus_step: 0.1,
            basal_minimum_rate: 0.05,
            basal_maximum_rate: 10.0,
            set_basal_profile_capable: false,
            supports_tdds: false,
            fakes_temps_by_extended_boluses: false,
            can_handle_dst: false,
        }
    }

    /// Everything enabled; the descriptor used by the virtual pump.
    pub const fn virtual_pump() -> Self {
        Self {
            model: PumpModel {
                manufacturer: "PumpCore",
                model: "Virtual",
            },
            temp_basal_capable: true,
            supports_percent_temp_basal: true,
            max_temp_percent: 500,
            max_temp_absolute: 30.0,
            temp_duration_step_minutes: 15,
            temp_max_duration_minutes: 24 * 60,
            supports_extended_bolus: true,
            extended_bolus_step: 0.05,
            extended_bolus_duration_step_minutes: 30,
            extended_bolus_max_duration_minutes: 12 * 60,
            bolus_step: 0.05,
            basal_minimum_rate: 0.01,
            basal_maximum_rate: 30.0,
            set_basal_profile_capable: true,
            supports_tdds: true,
            fakes_temps_by_extended_boluses: false,
            can_handle_dst: true,
        }
    }
}
