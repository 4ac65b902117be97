//! Command enactment engine: the hexagonal core.
//!
//! [`PumpService`] owns the concrete driver, a clock, the expected-state
//! reconciler and the status reporter. History and event sinks are passed
//! in at each call site, so every operation is testable with recording
//! mocks.
//!
//! ```text
//!  caller ──▶ ┌──────────────────────────────┐ ──▶ HistorySink
//!             │          PumpService          │ ──▶ EventSink
//!             │ validate · gate · reconcile   │
//!             └──────────────┬───────────────┘
//!                            ▼
//!                       PumpDriver
//! ```
//!
//! Every dosing operation runs the same sequence and stops at the first
//! refusal:
//!
//! 1. validate the request shape;
//! 2. check the pump supports it, then check pump limits;
//! 3. idempotent short-circuits (nothing to cancel, identical temp basal);
//! 4. gate on the connection state (latched violation, Busy, Suspended);
//! 5. check the reconciler would accept the record;
//! 6. perform the physical action through the driver;
//! 7. record the expected state, then build the result.
//!
//! Refusals at steps 1–5 never reach the pump.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use crate::capabilities::PumpCapabilities;
use crate::config::CoreConfig;
use crate::connection::{ConnectionMonitor, ConnectionState, LinkDirection, LinkRequestOutcome};
use crate::error::{ConfigError, EnactFailure, ProtocolViolation, ReconcileError};
use crate::profile::BasalProfile;
use crate::reconciler::{
    ExpectedPumpState, ExpectedStateReconciler, ExtendedBolusRecord, TemporaryBasalRate,
    TemporaryBasalRecord, TemporaryBasalType,
};
use crate::status::{PumpStatusCode, PumpStatusSnapshot, StatusReporter, StructuredStatus};

use super::commands::{BolusType, DetailedBolusInfo, PumpCommand};
use super::events::PumpEvent;
use super::ports::{CancelSubstitute, Clock, EventSink, HistorySink, PumpDriver};
use super::result::EnactResult;
use super::session::PumpSession;
use super::validation;

type Enactment = Result<EnactResult, EnactFailure>;

/// Log and fold an enactment outcome into its result.
fn conclude(op: &'static str, outcome: Enactment) -> EnactResult {
    match outcome {
        Ok(result) => {
            info!("{op}: {result}");
            result
        }
        Err(failure) => {
            warn!("{op}: refused, {failure}");
            EnactResult::failed(failure)
        }
    }
}

/// Pre-flight reconciler check; nothing has reached the pump yet.
fn precheck(check: Result<(), ReconcileError>) -> Result<(), EnactFailure> {
    check.map_err(|_| EnactFailure::InvalidInput("start precedes the recorded timeline"))
}

/// The pump already acted; a rejected record needs an operator.
fn recorded<T>(outcome: Result<T, ReconcileError>, sink: &mut impl EventSink) -> Result<T, EnactFailure> {
    outcome.map_err(|e| {
        let failure = EnactFailure::ExpectedStateRejected(e);
        error!("Pump acted but expected state was not recorded: {e}");
        sink.emit(&PumpEvent::OperatorAlert(failure));
        failure
    })
}

/// A latched violation makes the session unusable until the driver resets.
fn raise_violation(violation: ProtocolViolation, sink: &mut impl EventSink) -> EnactFailure {
    let failure = EnactFailure::ProtocolViolation(violation);
    error!("PumpService: session unusable, {violation}");
    sink.emit(&PumpEvent::OperatorAlert(failure));
    failure
}

// ───────────────────────────────────────────────────────────────
// PumpService
// ───────────────────────────────────────────────────────────────

pub struct PumpService<D: PumpDriver, C: Clock> {
    driver: D,
    clock: C,
    config: CoreConfig,
    connection: ConnectionMonitor,
    reconciler: Arc<ExpectedStateReconciler>,
    reporter: StatusReporter,
    session_open: bool,
}

impl<D: PumpDriver, C: Clock> PumpService<D, C> {
    pub fn new(driver: D, clock: C, config: CoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let connection = driver
            .connection()
            .with_query_logging(config.display_connection_messages);
        let reconciler = Arc::new(ExpectedStateReconciler::new());
        let reporter = StatusReporter::new(Arc::clone(&reconciler), config.freshness_window());

        let model = driver.capabilities().model;
        info!(
            "PumpService: {} {} (device {})",
            model.manufacturer,
            model.model,
            driver.device_id()
        );

        Ok(Self {
            driver,
            clock,
            config,
            connection,
            reconciler,
            reporter,
            session_open: false,
        })
    }

    // ── Session lifecycle ─────────────────────────────────────

    /// Reset the driver's status cache, acquire the physical channel and
    /// hand back a guard that releases it when dropped.
    pub fn open_session(&mut self, sink: &mut impl EventSink) -> Result<PumpSession<'_, D, C>, EnactFailure> {
        self.driver.init_pump_status_data();
        self.driver.open_channel()?;
        self.session_open = true;
        info!("PumpService: session opened");
        sink.emit(&PumpEvent::CustomActionsChanged);
        Ok(PumpSession::new(self))
    }

    pub(super) fn close_session(&mut self) {
        self.driver.close_channel();
        self.session_open = false;
        info!("PumpService: session closed");
    }

    pub fn is_session_open(&self) -> bool {
        self.session_open
    }

    pub fn refresh_custom_actions(&self, sink: &mut impl EventSink) {
        sink.emit(&PumpEvent::CustomActionsChanged);
    }

    // ── Link requests ─────────────────────────────────────────

    /// Ask the driver to bring the link up. Refused while a protocol
    /// violation is latched; the driver has to re-initialize first.
    pub fn connect(&mut self, reason: &str, sink: &mut impl EventSink) -> LinkRequestOutcome {
        let snapshot = self.connection.snapshot();
        let state = snapshot.state;
        let outcome = if let Some(violation) = snapshot.violation {
            raise_violation(violation, sink);
            LinkRequestOutcome::Refused(violation)
        } else if state.is_link_up() || state == ConnectionState::Connecting {
            LinkRequestOutcome::AlreadyInState(state)
        } else {
            match self.driver.connect(reason, self.config.link_request_timeout()) {
                LinkRequestOutcome::Transitioned(_) => {
                    LinkRequestOutcome::Transitioned(self.connection.state())
                }
                other => other,
            }
        };
        info!("connect ({reason}): {outcome:?}");
        sink.emit(&PumpEvent::LinkRequested {
            direction: LinkDirection::Connect,
            outcome,
        });
        outcome
    }

    /// Ask the driver to drop the link. Still attempted with a latched
    /// violation, but the operator is alerted.
    pub fn disconnect(&mut self, reason: &str, sink: &mut impl EventSink) -> LinkRequestOutcome {
        let snapshot = self.connection.snapshot();
        if let Some(violation) = snapshot.violation {
            raise_violation(violation, sink);
        }
        let state = snapshot.state;
        let outcome = if matches!(
            state,
            ConnectionState::Disconnected | ConnectionState::NotInitialized
        ) {
            LinkRequestOutcome::AlreadyInState(state)
        } else {
            match self.driver.disconnect(reason, self.config.link_request_timeout()) {
                LinkRequestOutcome::Transitioned(_) => {
                    LinkRequestOutcome::Transitioned(self.connection.state())
                }
                other => other,
            }
        };
        info!("disconnect ({reason}): {outcome:?}");
        sink.emit(&PumpEvent::LinkRequested {
            direction: LinkDirection::Disconnect,
            outcome,
        });
        outcome
    }

    pub fn stop_connecting(&mut self) {
        self.driver.stop_connecting();
    }

    pub fn is_handshake_in_progress(&self) -> bool {
        self.driver.is_handshake_in_progress()
    }

    pub fn finish_handshaking(&mut self) {
        self.driver.finish_handshaking();
    }

    // ── Command dispatch ──────────────────────────────────────

    /// Run one queued command.
    pub fn handle_command(
        &mut self,
        cmd: PumpCommand,
        history: &mut impl HistorySink,
        sink: &mut impl EventSink,
    ) -> EnactResult {
        match cmd {
            PumpCommand::DeliverTreatment(info) => self.deliver_treatment(&info, history, sink),
            PumpCommand::SetTempBasalAbsolute {
                rate,
                duration_minutes,
                basal_type,
                enforce_new,
            } => self.set_temp_basal_absolute(rate, duration_minutes, basal_type, enforce_new, sink),
            PumpCommand::SetTempBasalPercent {
                percent,
                duration_minutes,
                basal_type,
                enforce_new,
            } => self.set_temp_basal_percent(percent, duration_minutes, basal_type, enforce_new, sink),
            PumpCommand::CancelTempBasal { enforce_new } => self.cancel_temp_basal(enforce_new, sink),
            PumpCommand::SetExtendedBolus {
                insulin,
                duration_minutes,
            } => self.set_extended_bolus(insulin, duration_minutes, sink),
            PumpCommand::CancelExtendedBolus => self.cancel_extended_bolus(sink),
            PumpCommand::SetBasalProfile(profile) => self.set_new_basal_profile(&profile, sink),
            PumpCommand::LoadTdds => self.load_tdds(history, sink),
            PumpCommand::StopBolusDelivering => self.stop_bolus_delivering(),
        }
    }

    // ── Bolus / treatment ─────────────────────────────────────

    pub fn deliver_bolus(
        &mut self,
        info: &DetailedBolusInfo,
        history: &mut impl HistorySink,
        sink: &mut impl EventSink,
    ) -> EnactResult {
        let outcome = self.try_deliver_bolus(info, history, sink);
        conclude("deliver_bolus", outcome)
    }

    /// Insulin goes through the bolus path with carbs riding along;
    /// carb-only treatments go straight to history. Always ends with a
    /// [`PumpEvent::StatusChanged`].
    pub fn deliver_treatment(
        &mut self,
        info: &DetailedBolusInfo,
        history: &mut impl HistorySink,
        sink: &mut impl EventSink,
    ) -> EnactResult {
        let outcome = self.try_deliver_treatment(info, history, sink);
        sink.emit(&PumpEvent::StatusChanged);
        conclude("deliver_treatment", outcome)
    }

    fn try_deliver_treatment(
        &mut self,
        info: &DetailedBolusInfo,
        history: &mut impl HistorySink,
        sink: &mut impl EventSink,
    ) -> Enactment {
        validation::check_treatment(info)?;
        if !info.is_carb_only() {
            return self.try_deliver_bolus(info, history, sink);
        }

        history.add_to_history_treatment(info, true);
        sink.emit(&PumpEvent::BolusProgress {
            percent: 100,
            smb: info.bolus_type == BolusType::Smb,
        });
        Ok(EnactResult::enacted("carbs recorded").with_carbs(info.carbs))
    }

    fn try_deliver_bolus(
        &mut self,
        info: &DetailedBolusInfo,
        history: &mut impl HistorySink,
        sink: &mut impl EventSink,
    ) -> Enactment {
        validation::check_bolus(info)?;
        validation::bolus_limits(&self.driver.capabilities(), info.insulin)?;
        self.gate(sink)?;

        let delivery = self.driver.deliver_bolus(info, &mut *sink)?;

        let delivered = DetailedBolusInfo {
            insulin: delivery.delivered,
            ..info.clone()
        };
        history.add_to_history_treatment(&delivered, false);
        sink.emit(&PumpEvent::BolusProgress {
            percent: 100,
            smb: info.bolus_type == BolusType::Smb,
        });
        Ok(EnactResult::enacted("bolus delivered")
            .with_bolus(delivery.delivered)
            .with_carbs(info.carbs))
    }

    /// Abort a running bolus. Not gated: stopping delivery is allowed in
    /// any connection state.
    pub fn stop_bolus_delivering(&mut self) -> EnactResult {
        let outcome = self
            .driver
            .stop_bolus_delivering()
            .map(|()| EnactResult::enacted("bolus delivery stopped"))
            .map_err(EnactFailure::from);
        conclude("stop_bolus_delivering", outcome)
    }

    // ── Temporary basal ───────────────────────────────────────

    pub fn set_temp_basal_absolute(
        &mut self,
        rate: f64,
        duration_minutes: u32,
        basal_type: TemporaryBasalType,
        enforce_new: bool,
        sink: &mut impl EventSink,
    ) -> EnactResult {
        let outcome =
            self.try_set_temp_basal_absolute(rate, duration_minutes, basal_type, enforce_new, sink);
        conclude("set_temp_basal_absolute", outcome)
    }

    fn try_set_temp_basal_absolute(
        &mut self,
        rate: f64,
        duration_minutes: u32,
        basal_type: TemporaryBasalType,
        enforce_new: bool,
        sink: &mut impl EventSink,
    ) -> Enactment {
        validation::check_temp_basal_absolute(rate, duration_minutes)?;
        let caps = self.driver.capabilities();
        if !caps.temp_basal_capable {
            return Err(EnactFailure::OperationNotSupported("temporary basal"));
        }
        validation::temp_basal_absolute_limits(&caps, rate, duration_minutes)?;

        let now = self.clock.now();
        let requested = TemporaryBasalRate::Absolute(rate);
        if !enforce_new && self.temp_basal_running(now, requested, duration_minutes, basal_type) {
            return Ok(EnactResult::unchanged("temp basal already running")
                .with_absolute(rate, duration_minutes));
        }

        self.gate(sink)?;
        precheck(self.reconciler.check_temporary_basal_start(now))?;

        self.driver
            .set_temp_basal_absolute(rate, duration_minutes, basal_type, enforce_new)?;

        let record = TemporaryBasalRecord::new(now, requested, duration_minutes).with_type(basal_type);
        recorded(self.reconciler.record_temporary_basal_start(record), sink)?;
        Ok(EnactResult::enacted("temp basal set").with_absolute(rate, duration_minutes))
    }

    /// Percent-based temp basal. 100 % is the scheduled rate, so it is
    /// enacted as a cancel.
    pub fn set_temp_basal_percent(
        &mut self,
        percent: u16,
        duration_minutes: u32,
        basal_type: TemporaryBasalType,
        enforce_new: bool,
        sink: &mut impl EventSink,
    ) -> EnactResult {
        if percent == 100 {
            let outcome = self.try_cancel_temp_basal(enforce_new, sink);
            return conclude("set_temp_basal_percent", outcome);
        }
        let outcome =
            self.try_set_temp_basal_percent(percent, duration_minutes, basal_type, enforce_new, sink);
        conclude("set_temp_basal_percent", outcome)
    }

    fn try_set_temp_basal_percent(
        &mut self,
        percent: u16,
        duration_minutes: u32,
        basal_type: TemporaryBasalType,
        enforce_new: bool,
        sink: &mut impl EventSink,
    ) -> Enactment {
        const UNSUPPORTED: EnactFailure = EnactFailure::OperationNotSupported("percent temporary basal");

        validation::check_temp_basal_percent(duration_minutes)?;
        let caps = self.driver.capabilities();
        if !caps.temp_basal_capable
            || !caps.supports_percent_temp_basal
            || self.driver.extended().is_none()
        {
            return Err(UNSUPPORTED);
        }
        validation::temp_basal_percent_limits(&caps, percent, duration_minutes)?;

        let now = self.clock.now();
        let requested = TemporaryBasalRate::Percent(percent);
        if !enforce_new && self.temp_basal_running(now, requested, duration_minutes, basal_type) {
            return Ok(EnactResult::unchanged("temp basal already running")
                .with_percent(percent, duration_minutes));
        }

        self.gate(sink)?;
        precheck(self.reconciler.check_temporary_basal_start(now))?;

        self.driver
            .extended()
            .ok_or(UNSUPPORTED)?
            .set_temp_basal_percent(percent, duration_minutes, basal_type, enforce_new)?;

        let record = TemporaryBasalRecord::new(now, requested, duration_minutes).with_type(basal_type);
        recorded(self.reconciler.record_temporary_basal_start(record), sink)?;
        Ok(EnactResult::enacted("temp basal set").with_percent(percent, duration_minutes))
    }

    /// Cancel the running temp basal. A non-enforced cancel runs the
    /// driver's substitute when it has one; an enforced cancel is always a
    /// hard cancel. With nothing running this is a no-op success.
    pub fn cancel_temp_basal(&mut self, enforce_new: bool, sink: &mut impl EventSink) -> EnactResult {
        let outcome = self.try_cancel_temp_basal(enforce_new, sink);
        conclude("cancel_temp_basal", outcome)
    }

    fn try_cancel_temp_basal(&mut self, enforce_new: bool, sink: &mut impl EventSink) -> Enactment {
        if !self.driver.capabilities().temp_basal_capable {
            return Err(EnactFailure::OperationNotSupported("temporary basal"));
        }

        let now = self.clock.now();
        if self.reconciler.active_temporary_basal(now).is_none() {
            return Ok(EnactResult::unchanged("no temp basal running").temp_cancel());
        }

        self.gate(sink)?;

        if !enforce_new {
            if let Some(substitute) = self.driver.cancel_substitute() {
                if let Some(result) = self.try_cancel_substitute(substitute, now, sink)? {
                    return Ok(result);
                }
            }
        }

        self.driver.cancel_temp_basal(enforce_new)?;
        recorded(
            self.reconciler
                .record_temporary_basal_cancel(now, enforce_new)
                .ok_or(ReconcileError::NothingActive { at: now }),
            sink,
        )?;
        Ok(EnactResult::enacted("temp basal cancelled").temp_cancel())
    }

    /// `Ok(None)` means the substitute cannot run here; fall back to a hard cancel.
    fn try_cancel_substitute(
        &mut self,
        substitute: CancelSubstitute,
        now: DateTime<Utc>,
        sink: &mut impl EventSink,
    ) -> Result<Option<EnactResult>, EnactFailure> {
        let duration = substitute.duration_minutes;
        if duration == 0 {
            warn!("cancel_temp_basal: zero-length substitute ignored");
            return Ok(None);
        }
        if self.reconciler.check_temporary_basal_start(now).is_err() {
            warn!("cancel_temp_basal: substitute would precede the timeline, hard cancel");
            return Ok(None);
        }

        match substitute.rate {
            TemporaryBasalRate::Absolute(rate) => {
                self.driver
                    .set_temp_basal_absolute(rate, duration, TemporaryBasalType::Normal, true)?;
            }
            TemporaryBasalRate::Percent(percent) => match self.driver.extended() {
                Some(ext) => {
                    ext.set_temp_basal_percent(percent, duration, TemporaryBasalType::Normal, true)?;
                }
                None => {
                    warn!("cancel_temp_basal: percent substitute unavailable, hard cancel");
                    return Ok(None);
                }
            },
        }

        recorded(
            self.reconciler
                .record_temporary_basal_cancel(now, false)
                .ok_or(ReconcileError::NothingActive { at: now }),
            sink,
        )?;
        let record = TemporaryBasalRecord::new(now, substitute.rate, duration);
        recorded(self.reconciler.record_temporary_basal_start(record), sink)?;
        Ok(Some(
            EnactResult::enacted("temp basal cancelled by substitute")
                .temp_cancel()
                .with_duration(duration),
        ))
    }

    fn temp_basal_running(
        &self,
        now: DateTime<Utc>,
        rate: TemporaryBasalRate,
        duration_minutes: u32,
        basal_type: TemporaryBasalType,
    ) -> bool {
        self.reconciler
            .active_temporary_basal(now)
            .is_some_and(|active| active.same_delivery(rate, duration_minutes, basal_type))
    }

    // ── Extended bolus ────────────────────────────────────────

    pub fn set_extended_bolus(
        &mut self,
        insulin: f64,
        duration_minutes: u32,
        sink: &mut impl EventSink,
    ) -> EnactResult {
        let outcome = self.try_set_extended_bolus(insulin, duration_minutes, sink);
        conclude("set_extended_bolus", outcome)
    }

    fn try_set_extended_bolus(
        &mut self,
        insulin: f64,
        duration_minutes: u32,
        sink: &mut impl EventSink,
    ) -> Enactment {
        validation::check_extended_bolus(insulin, duration_minutes)?;
        let caps = self.extended_capable()?;
        validation::extended_bolus_limits(&caps, insulin, duration_minutes)?;

        let now = self.clock.now();
        self.gate(sink)?;
        precheck(self.reconciler.check_extended_bolus_start(now))?;

        self.driver
            .extended()
            .ok_or(EnactFailure::OperationNotSupported("extended bolus"))?
            .set_extended_bolus(insulin, duration_minutes)?;

        let record = ExtendedBolusRecord::new(now, insulin, duration_minutes);
        recorded(self.reconciler.record_extended_bolus_start(record), sink)?;
        Ok(EnactResult::enacted("extended bolus set")
            .with_bolus(insulin)
            .with_duration(duration_minutes))
    }

    /// Cancel the running extended bolus; a no-op success when none runs.
    pub fn cancel_extended_bolus(&mut self, sink: &mut impl EventSink) -> EnactResult {
        let outcome = self.try_cancel_extended_bolus(sink);
        conclude("cancel_extended_bolus", outcome)
    }

    fn try_cancel_extended_bolus(&mut self, sink: &mut impl EventSink) -> Enactment {
        self.extended_capable()?;

        let now = self.clock.now();
        if self.reconciler.active_extended_bolus(now).is_none() {
            return Ok(EnactResult::unchanged("no extended bolus running"));
        }

        self.gate(sink)?;
        self.driver
            .extended()
            .ok_or(EnactFailure::OperationNotSupported("extended bolus"))?
            .cancel_extended_bolus()?;

        let cancelled = recorded(
            self.reconciler
                .record_extended_bolus_cancel(now)
                .ok_or(ReconcileError::NothingActive { at: now }),
            sink,
        )?;
        Ok(EnactResult::enacted("extended bolus cancelled").with_bolus(cancelled.delivered_at(now)))
    }

    fn extended_capable(&mut self) -> Result<PumpCapabilities, EnactFailure> {
        let caps = self.driver.capabilities();
        if caps.supports_extended_bolus && self.driver.extended().is_some() {
            Ok(caps)
        } else {
            Err(EnactFailure::OperationNotSupported("extended bolus"))
        }
    }

    // ── Pump memory ───────────────────────────────────────────

    pub fn set_new_basal_profile(&mut self, profile: &BasalProfile, sink: &mut impl EventSink) -> EnactResult {
        let outcome = self.try_set_new_basal_profile(profile, sink);
        conclude("set_new_basal_profile", outcome)
    }

    fn try_set_new_basal_profile(&mut self, profile: &BasalProfile, sink: &mut impl EventSink) -> Enactment {
        const UNSUPPORTED: EnactFailure = EnactFailure::OperationNotSupported("setting basal profile");

        let caps = self.driver.capabilities();
        if !caps.set_basal_profile_capable || self.driver.profile_management().is_none() {
            return Err(UNSUPPORTED);
        }
        validation::basal_profile_limits(&caps, profile)?;

        self.gate(sink)?;
        self.driver
            .profile_management()
            .ok_or(UNSUPPORTED)?
            .set_basal_profile(profile)?;

        info!(
            "Basal profile: {} segments, {:.2}U/day",
            profile.segments().len(),
            profile.daily_total()
        );
        sink.emit(&PumpEvent::StatusChanged);
        Ok(EnactResult::enacted("basal profile set"))
    }

    /// Read daily totals from pump memory into the history sink.
    pub fn load_tdds(&mut self, history: &mut impl HistorySink, sink: &mut impl EventSink) -> EnactResult {
        let outcome = self.try_load_tdds(history, sink);
        conclude("load_tdds", outcome)
    }

    fn try_load_tdds(&mut self, history: &mut impl HistorySink, sink: &mut impl EventSink) -> Enactment {
        const UNSUPPORTED: EnactFailure = EnactFailure::OperationNotSupported("loading TDDs");

        if !self.driver.capabilities().supports_tdds || self.driver.profile_management().is_none() {
            return Err(UNSUPPORTED);
        }

        self.gate(sink)?;
        let tdds = self.driver.profile_management().ok_or(UNSUPPORTED)?.load_tdds()?;
        for tdd in &tdds {
            debug!("TDD {}: {:.2}U", tdd.day, tdd.total());
            history.add_total_daily_dose(tdd);
        }
        Ok(EnactResult::enacted(format!("loaded {} daily totals", tdds.len())))
    }

    /// True when the pump already runs `profile`. Pumps without profile
    /// management always report true.
    pub fn is_this_profile_set(&mut self, profile: &BasalProfile) -> bool {
        self.driver
            .profile_management()
            .is_none_or(|pm| pm.is_profile_set(profile))
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn expected_state(&self, profile: &BasalProfile) -> ExpectedPumpState {
        self.reconciler.expected_state(self.clock.now(), profile)
    }

    /// Scheduled basal rate in effect now.
    pub fn base_basal_rate(&self, profile: &BasalProfile) -> f64 {
        profile.basal_at(self.clock.now())
    }

    /// When the driver last heard from the pump.
    pub fn last_data_time(&self) -> Option<DateTime<Utc>> {
        self.driver.pump_status().last_connection
    }

    pub fn structured_status(
        &self,
        profile: &BasalProfile,
        profile_name: Option<&str>,
        version: &str,
    ) -> Option<StructuredStatus> {
        self.reporter.structured_status(
            &self.status_snapshot(),
            profile,
            profile_name,
            version,
            self.clock.now(),
        )
    }

    pub fn structured_status_json(
        &self,
        profile: &BasalProfile,
        profile_name: Option<&str>,
        version: &str,
    ) -> serde_json::Value {
        self.reporter.structured_status_json(
            &self.status_snapshot(),
            profile,
            profile_name,
            version,
            self.clock.now(),
        )
    }

    pub fn short_status(&self, very_short: bool) -> String {
        self.reporter
            .short_status(&self.status_snapshot(), very_short, self.clock.now())
    }

    /// Driver snapshot, with the status code filled from the connection
    /// machine when the driver left it empty.
    fn status_snapshot(&self) -> PumpStatusSnapshot {
        let mut snapshot = self.driver.pump_status();
        if snapshot.pump_status.is_none() && self.connection.is_suspended() {
            snapshot.pump_status = Some(PumpStatusCode::Suspended);
        }
        snapshot
    }

    pub fn capabilities(&self) -> PumpCapabilities {
        self.driver.capabilities()
    }

    pub fn device_id(&self) -> &str {
        self.driver.device_id()
    }

    pub fn manufacturer(&self) -> &'static str {
        self.driver.capabilities().model.manufacturer
    }

    pub fn model(&self) -> &'static str {
        self.driver.capabilities().model.model
    }

    pub fn can_handle_dst(&self) -> bool {
        self.driver.capabilities().can_handle_dst
    }

    pub fn is_faking_temps_by_extended_boluses(&self) -> bool {
        self.driver.capabilities().fakes_temps_by_extended_boluses
    }

    pub fn connection(&self) -> &ConnectionMonitor {
        &self.connection
    }

    pub fn reconciler(&self) -> &Arc<ExpectedStateReconciler> {
        &self.reconciler
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    // ── Internal ──────────────────────────────────────────────

    /// Connection gate. A latched protocol violation wins over every state
    /// and is raised to the operator each time it refuses a command.
    fn gate(&self, sink: &mut impl EventSink) -> Result<(), EnactFailure> {
        let snapshot = self.connection.snapshot();
        if let Some(violation) = snapshot.violation {
            return Err(raise_violation(violation, sink));
        }
        match snapshot.state {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Busy => Err(EnactFailure::Busy),
            ConnectionState::Suspended => Err(EnactFailure::Suspended),
            _ => Err(EnactFailure::NotConnected),
        }
    }
}
