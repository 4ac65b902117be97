//! In-memory pump driver.
//!
//! A complete [`PumpDriver`] with extended delivery and profile management,
//! backed by nothing but its own state. It reports its connection
//! transitions like a real driver, keeps its status snapshot current, and
//! can be told to fail the next physical action. Used for host simulation,
//! integration tests and fuzzing.

use core::time::Duration;

use log::{debug, info, warn};

use crate::app::commands::{BolusDelivery, BolusType, DetailedBolusInfo, TotalDailyDose};
use crate::app::events::PumpEvent;
use crate::app::ports::{
    CancelSubstitute, Clock, EventSink, ExtendedDelivery, ProfileManagement, PumpDriver,
};
use crate::capabilities::PumpCapabilities;
use crate::connection::{
    ConnectionMonitor, ConnectionReporter, ConnectionState, ConnectionStateMachine,
    LinkRequestOutcome,
};
use crate::error::{DriverError, ProtocolViolation};
use crate::profile::BasalProfile;
use crate::reconciler::TemporaryBasalType;
use crate::status::{PumpStatusCode, PumpStatusSnapshot};

const FULL_RESERVOIR_UNITS: f64 = 300.0;

pub struct VirtualPump<C: Clock> {
    device_id: String,
    capabilities: PumpCapabilities,
    clock: C,
    reporter: ConnectionReporter,
    status: PumpStatusSnapshot,
    channel_open: bool,
    profile: Option<BasalProfile>,
    tdds: Vec<TotalDailyDose>,
    substitute: Option<CancelSubstitute>,
    fail_next: Option<DriverError>,
    physical_actions: u32,
}

impl<C: Clock> VirtualPump<C> {
    pub fn new(device_id: impl Into<String>, clock: C) -> Self {
        let (reporter, _monitor) = ConnectionStateMachine::split();
        Self {
            device_id: device_id.into(),
            capabilities: PumpCapabilities::virtual_pump(),
            clock,
            reporter,
            status: PumpStatusSnapshot::default(),
            channel_open: false,
            profile: None,
            tdds: Vec::new(),
            substitute: None,
            fail_next: None,
            physical_actions: 0,
        }
    }

    pub fn with_capabilities(mut self, capabilities: PumpCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_cancel_substitute(mut self, substitute: CancelSubstitute) -> Self {
        self.substitute = Some(substitute);
        self
    }

    pub fn with_tdds(mut self, tdds: Vec<TotalDailyDose>) -> Self {
        self.tdds = tdds;
        self
    }

    /// Fail the next physical action with `error`.
    pub fn inject_failure(&mut self, error: DriverError) {
        self.fail_next = Some(error);
    }

    /// Report a hardware-driven transition.
    pub fn report(&mut self, next: ConnectionState) -> Result<ConnectionState, ProtocolViolation> {
        self.reporter.transition_to(next)
    }

    /// Driver re-initialization.
    pub fn reinitialize(&mut self) {
        self.reporter.reset();
        self.init_pump_status_data();
    }

    pub fn suspend(&mut self) -> Result<(), ProtocolViolation> {
        self.reporter.transition_to(ConnectionState::Suspended)?;
        self.status.pump_status = Some(PumpStatusCode::Suspended);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), ProtocolViolation> {
        self.reporter.transition_to(ConnectionState::Connected)?;
        self.status.pump_status = Some(PumpStatusCode::Running);
        Ok(())
    }

    pub fn is_channel_open(&self) -> bool {
        self.channel_open
    }

    /// Physical actions attempted, failed ones included.
    pub fn physical_actions(&self) -> u32 {
        self.physical_actions
    }

    pub fn active_profile(&self) -> Option<&BasalProfile> {
        self.profile.as_ref()
    }

    /// Common prologue for every physical action.
    fn exchange(&mut self) -> Result<(), DriverError> {
        self.physical_actions += 1;
        if let Some(error) = self.fail_next.take() {
            warn!("VirtualPump: injected failure {error}");
            return Err(error);
        }
        if !self.reporter.state().is_link_up() {
            return Err(DriverError::CommunicationFailed);
        }
        self.status.last_connection = Some(self.clock.now());
        Ok(())
    }

    fn bring_up(&mut self) -> Result<(), ProtocolViolation> {
        if self.reporter.state() == ConnectionState::NotInitialized {
            self.reporter.transition_to(ConnectionState::Initializing)?;
        }
        self.reporter.transition_to(ConnectionState::Connecting)?;
        self.reporter.transition_to(ConnectionState::Connected)?;
        Ok(())
    }
}

impl<C: Clock> PumpDriver for VirtualPump<C> {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn capabilities(&self) -> PumpCapabilities {
        self.capabilities
    }

    fn connection(&self) -> ConnectionMonitor {
        self.reporter.monitor()
    }

    fn init_pump_status_data(&mut self) {
        self.status = PumpStatusSnapshot {
            battery_remaining_percent: Some(100),
            reservoir_remaining_units: Some(FULL_RESERVOIR_UNITS),
            pump_status: Some(PumpStatusCode::Running),
            insulin_on_board: Some(0.0),
            daily_total_units: Some(0.0),
            ..PumpStatusSnapshot::default()
        };
    }

    fn pump_status(&self) -> PumpStatusSnapshot {
        self.status.clone()
    }

    fn open_channel(&mut self) -> Result<(), DriverError> {
        if let Some(error) = self.fail_next.take() {
            return Err(error);
        }
        self.channel_open = true;
        debug!("VirtualPump: channel open");
        Ok(())
    }

    fn close_channel(&mut self) {
        self.channel_open = false;
        debug!("VirtualPump: channel closed");
    }

    fn deliver_bolus(
        &mut self,
        info: &DetailedBolusInfo,
        progress: &mut dyn EventSink,
    ) -> Result<BolusDelivery, DriverError> {
        self.exchange()?;
        if self.reporter.state() != ConnectionState::Connected {
            return Err(DriverError::Rejected("pump not ready for delivery"));
        }
        let reservoir = self.status.reservoir_remaining_units.unwrap_or(0.0);
        if info.insulin > reservoir {
            return Err(DriverError::ReservoirEmpty);
        }

        self.reporter
            .transition_to(ConnectionState::Busy)
            .map_err(|_| DriverError::CommunicationFailed)?;
        progress.emit(&PumpEvent::BolusProgress {
            percent: 50,
            smb: info.bolus_type == BolusType::Smb,
        });
        self.reporter
            .transition_to(ConnectionState::Connected)
            .map_err(|_| DriverError::CommunicationFailed)?;

        // Snapshot changes only once the exchange has completed.
        let now = self.clock.now();
        self.status.reservoir_remaining_units = Some(reservoir - info.insulin);
        self.status.last_bolus_time = Some(now);
        self.status.last_bolus_amount = Some(info.insulin);
        self.status.daily_total_units = Some(self.status.daily_total_units.unwrap_or(0.0) + info.insulin);
        info!("VirtualPump: delivered {:.2}U", info.insulin);
        Ok(BolusDelivery {
            delivered: info.insulin,
        })
    }

    fn set_temp_basal_absolute(
        &mut self,
        rate: f64,
        duration_minutes: u32,
        _basal_type: TemporaryBasalType,
        _enforce_new: bool,
    ) -> Result<(), DriverError> {
        self.exchange()?;
        info!("VirtualPump: temp basal {rate:.2}U/h for {duration_minutes}'");
        Ok(())
    }

    fn cancel_temp_basal(&mut self, _enforce_new: bool) -> Result<(), DriverError> {
        self.exchange()?;
        info!("VirtualPump: temp basal cancelled");
        Ok(())
    }

    fn connect(&mut self, reason: &str, _timeout: Duration) -> LinkRequestOutcome {
        if let Some(error) = self.fail_next.take() {
            warn!("VirtualPump: connect ({reason}) failed: {error}");
            return LinkRequestOutcome::TimedOut;
        }
        match self.bring_up() {
            Ok(()) => {
                self.status.last_connection = Some(self.clock.now());
                LinkRequestOutcome::Transitioned(self.reporter.state())
            }
            Err(violation) => {
                warn!("VirtualPump: connect ({reason}) broke protocol: {violation}");
                LinkRequestOutcome::Transitioned(self.reporter.state())
            }
        }
    }

    fn disconnect(&mut self, _reason: &str, _timeout: Duration) -> LinkRequestOutcome {
        let _ = self.reporter.transition_to(ConnectionState::Disconnected);
        LinkRequestOutcome::Transitioned(self.reporter.state())
    }

    fn stop_connecting(&mut self) {
        if self.reporter.state() == ConnectionState::Connecting {
            let _ = self.reporter.transition_to(ConnectionState::Disconnected);
        }
    }

    fn stop_bolus_delivering(&mut self) -> Result<(), DriverError> {
        if self.reporter.state() == ConnectionState::Busy {
            self.reporter
                .transition_to(ConnectionState::Connected)
                .map_err(|_| DriverError::CommunicationFailed)?;
        }
        Ok(())
    }

    fn cancel_substitute(&self) -> Option<CancelSubstitute> {
        self.substitute
    }

    fn extended(&mut self) -> Option<&mut dyn ExtendedDelivery> {
        Some(self)
    }

    fn profile_management(&mut self) -> Option<&mut dyn ProfileManagement> {
        Some(self)
    }
}

impl<C: Clock> ExtendedDelivery for VirtualPump<C> {
    fn set_temp_basal_percent(
        &mut self,
        percent: u16,
        duration_minutes: u32,
        _basal_type: TemporaryBasalType,
        _enforce_new: bool,
    ) -> Result<(), DriverError> {
        self.exchange()?;
        info!("VirtualPump: temp basal {percent}% for {duration_minutes}'");
        Ok(())
    }

    fn set_extended_bolus(&mut self, insulin: f64, duration_minutes: u32) -> Result<(), DriverError> {
        self.exchange()?;
        info!("VirtualPump: extended bolus {insulin:.2}U over {duration_minutes}'");
        Ok(())
    }

    fn cancel_extended_bolus(&mut self) -> Result<(), DriverError> {
        self.exchange()?;
        info!("VirtualPump: extended bolus cancelled");
        Ok(())
    }
}

impl<C: Clock> ProfileManagement for VirtualPump<C> {
    fn set_basal_profile(&mut self, profile: &BasalProfile) -> Result<(), DriverError> {
        self.exchange()?;
        self.profile = Some(profile.clone());
        Ok(())
    }

    fn is_profile_set(&self, profile: &BasalProfile) -> bool {
        self.profile.as_ref() == Some(profile)
    }

    fn load_tdds(&mut self) -> Result<Vec<TotalDailyDose>, DriverError> {
        self.exchange()?;
        Ok(self.tdds.clone())
    }
}
