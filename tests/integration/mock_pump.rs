//! Recording doubles for the driver port and the two sinks.

use core::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pumpcore::adapters::time::ManualClock;
use pumpcore::app::commands::{BolusDelivery, DetailedBolusInfo, TotalDailyDose};
use pumpcore::app::events::PumpEvent;
use pumpcore::app::ports::{
    CancelSubstitute, Clock, EventSink, ExtendedDelivery, HistorySink, ProfileManagement, PumpDriver,
};
use pumpcore::app::service::PumpService;
use pumpcore::capabilities::PumpCapabilities;
use pumpcore::config::CoreConfig;
use pumpcore::connection::{
    ConnectionMonitor, ConnectionReporter, ConnectionState, ConnectionStateMachine,
    LinkRequestOutcome,
};
use pumpcore::error::DriverError;
use pumpcore::profile::BasalProfile;
use pumpcore::reconciler::TemporaryBasalType;
use pumpcore::status::PumpStatusSnapshot;

// ── Driver calls ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    OpenChannel,
    CloseChannel,
    InitStatus,
    Connect,
    Disconnect,
    DeliverBolus(f64),
    SetTempAbsolute { rate: f64, duration: u32, enforce_new: bool },
    SetTempPercent { percent: u16, duration: u32, enforce_new: bool },
    CancelTemp { enforce_new: bool },
    SetExtended { insulin: f64, duration: u32 },
    CancelExtended,
    StopBolus,
    SetProfile,
    LoadTdds,
}

impl DriverCall {
    /// Calls that would move insulin or change pump programming.
    pub fn is_physical(&self) -> bool {
        !matches!(
            self,
            Self::OpenChannel | Self::CloseChannel | Self::InitStatus | Self::Connect | Self::Disconnect
        )
    }
}

// ── MockPump ──────────────────────────────────────────────────

pub struct MockPump {
    pub calls: Vec<DriverCall>,
    pub caps: PumpCapabilities,
    pub status: PumpStatusSnapshot,
    pub extended_enabled: bool,
    pub profile_enabled: bool,
    pub substitute: Option<CancelSubstitute>,
    pub fail_next: Option<DriverError>,
    pub profile_on_pump: Option<BasalProfile>,
    pub tdds: Vec<TotalDailyDose>,
    /// Fraction of each bolus the pump reports as delivered.
    pub delivery_ratio: f64,
    reporter: ConnectionReporter,
}

#[allow(dead_code)]
impl MockPump {
    /// Full-featured pump, link not yet up.
    pub fn new() -> Self {
        let (reporter, _monitor) = ConnectionStateMachine::split();
        Self {
            calls: Vec::new(),
            caps: PumpCapabilities::virtual_pump(),
            status: PumpStatusSnapshot::default(),
            extended_enabled: true,
            profile_enabled: true,
            substitute: None,
            fail_next: None,
            profile_on_pump: None,
            tdds: Vec::new(),
            delivery_ratio: 1.0,
            reporter,
        }
    }

    /// Pump exposing only the required surface.
    pub fn basic() -> Self {
        Self {
            caps: PumpCapabilities::basic(PumpCapabilities::virtual_pump().model),
            extended_enabled: false,
            profile_enabled: false,
            ..Self::new()
        }
    }

    pub fn connected(mut self) -> Self {
        self.walk_to_connected();
        self
    }

    pub fn walk_to_connected(&mut self) {
        for next in [ConnectionState::Initializing, ConnectionState::Connecting, ConnectionState::Connected] {
            let _ = self.reporter.transition_to(next);
        }
    }

    pub fn report(&mut self, next: ConnectionState) {
        let _ = self.reporter.transition_to(next);
    }

    pub fn reset_link(&mut self) {
        self.reporter.reset();
    }

    pub fn physical_calls(&self) -> usize {
        self.calls.iter().filter(|c| c.is_physical()).count()
    }

    fn act(&mut self, call: DriverCall) -> Result<(), DriverError> {
        self.calls.push(call);
        match self.fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl PumpDriver for MockPump {
    fn device_id(&self) -> &str {
        "mock-0001"
    }

    fn capabilities(&self) -> PumpCapabilities {
        self.caps
    }

    fn connection(&self) -> ConnectionMonitor {
        self.reporter.monitor()
    }

    fn init_pump_status_data(&mut self) {
        self.calls.push(DriverCall::InitStatus);
    }

    fn pump_status(&self) -> PumpStatusSnapshot {
        self.status.clone()
    }

    fn open_channel(&mut self) -> Result<(), DriverError> {
        self.calls.push(DriverCall::OpenChannel);
        Ok(())
    }

    fn close_channel(&mut self) {
        self.calls.push(DriverCall::CloseChannel);
    }

    fn deliver_bolus(
        &mut self,
        info: &DetailedBolusInfo,
        progress: &mut dyn EventSink,
    ) -> Result<BolusDelivery, DriverError> {
        self.act(DriverCall::DeliverBolus(info.insulin))?;
        progress.emit(&PumpEvent::BolusProgress { percent: 50, smb: false });
        Ok(BolusDelivery {
            delivered: info.insulin * self.delivery_ratio,
        })
    }

    fn set_temp_basal_absolute(
        &mut self,
        rate: f64,
        duration_minutes: u32,
        _basal_type: TemporaryBasalType,
        enforce_new: bool,
    ) -> Result<(), DriverError> {
        self.act(DriverCall::SetTempAbsolute {
            rate,
            duration: duration_minutes,
            enforce_new,
        })
    }

    fn cancel_temp_basal(&mut self, enforce_new: bool) -> Result<(), DriverError> {
        self.act(DriverCall::CancelTemp { enforce_new })
    }

    fn connect(&mut self, _reason: &str, _timeout: Duration) -> LinkRequestOutcome {
        self.calls.push(DriverCall::Connect);
        if let Some(_error) = self.fail_next.take() {
            return LinkRequestOutcome::TimedOut;
        }
        self.walk_to_connected();
        LinkRequestOutcome::Transitioned(self.reporter.state())
    }

    fn disconnect(&mut self, _reason: &str, _timeout: Duration) -> LinkRequestOutcome {
        self.calls.push(DriverCall::Disconnect);
        match self.reporter.transition_to(ConnectionState::Disconnected) {
            Ok(_) => LinkRequestOutcome::Transitioned(ConnectionState::Disconnected),
            Err(_) => LinkRequestOutcome::TimedOut,
        }
    }

    fn stop_bolus_delivering(&mut self) -> Result<(), DriverError> {
        self.act(DriverCall::StopBolus)
    }

    fn cancel_substitute(&self) -> Option<CancelSubstitute> {
        self.substitute
    }

    fn extended(&mut self) -> Option<&mut dyn ExtendedDelivery> {
        if !self.extended_enabled {
            return None;
        }
        Some(self)
    }

    fn profile_management(&mut self) -> Option<&mut dyn ProfileManagement> {
        if !self.profile_enabled {
            return None;
        }
        Some(self)
    }
}

impl ExtendedDelivery for MockPump {
    fn set_temp_basal_percent(
        &mut self,
        percent: u16,
        duration_minutes: u32,
        _basal_type: TemporaryBasalType,
        enforce_new: bool,
    ) -> Result<(), DriverError> {
        self.act(DriverCall::SetTempPercent {
            percent,
            duration: duration_minutes,
            enforce_new,
        })
    }

    fn set_extended_bolus(&mut self, insulin: f64, duration_minutes: u32) -> Result<(), DriverError> {
        self.act(DriverCall::SetExtended {
            insulin,
            duration: duration_minutes,
        })
    }

    fn cancel_extended_bolus(&mut self) -> Result<(), DriverError> {
        self.act(DriverCall::CancelExtended)
    }
}

impl ProfileManagement for MockPump {
    fn set_basal_profile(&mut self, profile: &BasalProfile) -> Result<(), DriverError> {
        self.act(DriverCall::SetProfile)?;
        self.profile_on_pump = Some(profile.clone());
        Ok(())
    }

    fn is_profile_set(&self, profile: &BasalProfile) -> bool {
        self.profile_on_pump.as_ref() == Some(profile)
    }

    fn load_tdds(&mut self) -> Result<Vec<TotalDailyDose>, DriverError> {
        self.act(DriverCall::LoadTdds)?;
        Ok(self.tdds.clone())
    }
}

// ── Sinks ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingHistory {
    pub treatments: Vec<(DetailedBolusInfo, bool)>,
    pub tdds: Vec<TotalDailyDose>,
}

impl HistorySink for RecordingHistory {
    fn add_to_history_treatment(&mut self, info: &DetailedBolusInfo, carb_only: bool) {
        self.treatments.push((info.clone(), carb_only));
    }

    fn add_total_daily_dose(&mut self, tdd: &TotalDailyDose) {
        self.tdds.push(*tdd);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<PumpEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn alerts(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, PumpEvent::OperatorAlert(_)))
            .count()
    }

    pub fn count(&self, wanted: &PumpEvent) -> usize {
        self.events.iter().filter(|e| *e == wanted).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &PumpEvent) {
        self.events.push(*event);
    }
}

// ── Harness ───────────────────────────────────────────────────

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap()
}

pub struct Harness {
    pub service: PumpService<MockPump, ManualClock>,
    pub clock: ManualClock,
    pub history: RecordingHistory,
    pub events: RecordingSink,
}

#[allow(dead_code)]
impl Harness {
    pub fn pump(&self) -> &MockPump {
        self.service.driver()
    }

    pub fn pump_mut(&mut self) -> &mut MockPump {
        self.service.driver_mut()
    }

    pub fn physical_calls(&self) -> usize {
        self.pump().physical_calls()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Connected full-featured pump at [`t0`].
pub fn harness() -> Harness {
    harness_with(MockPump::new().connected())
}

pub fn harness_with(pump: MockPump) -> Harness {
    let clock = ManualClock::new(t0());
    let service = PumpService::new(pump, clock.clone(), CoreConfig::default()).unwrap();
    Harness {
        service,
        clock,
        history: RecordingHistory::default(),
        events: RecordingSink::default(),
    }
}
