//! Integration tests: PumpService → gate → MockPump → reconciler.

use chrono::Duration;
use pumpcore::app::commands::{BolusType, DetailedBolusInfo, PumpCommand, TotalDailyDose};
use pumpcore::app::events::PumpEvent;
use pumpcore::app::ports::CancelSubstitute;
use pumpcore::connection::ConnectionState;
use pumpcore::error::{DriverError, EnactFailure};
use pumpcore::profile::BasalProfile;
use pumpcore::reconciler::{RecordCause, TemporaryBasalRate, TemporaryBasalType};

use crate::mock_pump::{harness, harness_with, t0, DriverCall, MockPump};

const NORMAL: TemporaryBasalType = TemporaryBasalType::Normal;

// ── Treatments ────────────────────────────────────────────────

#[test]
fn zero_treatment_is_invalid_and_touches_nothing() {
    let mut h = harness();
    let info = DetailedBolusInfo::bolus(0.0, t0());

    let result = h.service.deliver_treatment(&info, &mut h.history, &mut h.events);

    assert!(!result.success());
    assert!(matches!(result.failure(), Some(EnactFailure::InvalidInput(_))));
    assert!(h.history.treatments.is_empty());
    assert_eq!(h.physical_calls(), 0);
    assert_eq!(h.service.reconciler().revision(), 0);
    assert_eq!(h.events.events, vec![PumpEvent::StatusChanged]);
}

#[test]
fn carb_only_treatment_goes_to_history_without_the_pump() {
    let mut h = harness();
    let info = DetailedBolusInfo::carbs(20.0, t0());

    let result = h.service.deliver_treatment(&info, &mut h.history, &mut h.events);

    assert!(result.success());
    assert!(result.enacted_on_pump());
    assert_eq!(result.carbs_delivered, 20.0);
    assert_eq!(h.history.treatments.len(), 1);
    assert!(h.history.treatments[0].1, "carb-only flag must be set");
    assert_eq!(h.physical_calls(), 0);
    assert_eq!(
        h.events.count(&PumpEvent::BolusProgress { percent: 100, smb: false }),
        1
    );
    assert_eq!(h.events.count(&PumpEvent::StatusChanged), 1);
}

#[test]
fn carb_only_treatment_does_not_need_a_link() {
    let mut h = harness_with(MockPump::new());
    let info = DetailedBolusInfo::carbs(15.0, t0());

    let result = h.service.deliver_treatment(&info, &mut h.history, &mut h.events);

    assert!(result.success());
    assert_eq!(h.history.treatments.len(), 1);
}

#[test]
fn bolus_is_delivered_once_and_history_gets_the_delivered_amount() {
    let mut pump = MockPump::new().connected();
    pump.delivery_ratio = 0.5;
    let mut h = harness_with(pump);
    let info = DetailedBolusInfo::bolus(2.0, t0()).with_carbs(10.0);

    let result = h.service.deliver_treatment(&info, &mut h.history, &mut h.events);

    assert!(result.success());
    assert_eq!(result.bolus_delivered, 1.0);
    assert_eq!(result.carbs_delivered, 10.0);
    assert_eq!(h.pump().calls, vec![DriverCall::DeliverBolus(2.0)]);

    let (recorded, carb_only) = &h.history.treatments[0];
    assert_eq!(recorded.insulin, 1.0);
    assert_eq!(recorded.carbs, 10.0);
    assert!(!carb_only);

    let progress: Vec<_> = h
        .events
        .events
        .iter()
        .filter_map(|e| match e {
            PumpEvent::BolusProgress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![50, 100]);
}

#[test]
fn smb_completion_is_flagged() {
    let mut h = harness();
    let info = DetailedBolusInfo::bolus(0.3, t0()).with_type(BolusType::Smb);

    let result = h.service.deliver_bolus(&info, &mut h.history, &mut h.events);

    assert!(result.success());
    assert_eq!(h.events.count(&PumpEvent::BolusProgress { percent: 100, smb: true }), 1);
}

#[test]
fn driver_failure_is_reported_and_nothing_is_recorded() {
    let mut h = harness();
    h.pump_mut().fail_next = Some(DriverError::Occlusion);
    let info = DetailedBolusInfo::bolus(1.0, t0());

    let result = h.service.deliver_bolus(&info, &mut h.history, &mut h.events);

    assert_eq!(
        result.failure(),
        Some(EnactFailure::PhysicalDeliveryFailure(DriverError::Occlusion))
    );
    assert!(!result.enacted_on_pump());
    assert!(h.history.treatments.is_empty());
    assert_eq!(h.physical_calls(), 1);
}

// ── Connection gate ───────────────────────────────────────────

#[test]
fn refused_while_not_connected() {
    let mut h = harness_with(MockPump::new());
    let info = DetailedBolusInfo::bolus(1.0, t0());

    let result = h.service.deliver_bolus(&info, &mut h.history, &mut h.events);

    assert_eq!(result.failure(), Some(EnactFailure::NotConnected));
    assert_eq!(h.physical_calls(), 0);
    assert!(h.history.treatments.is_empty());
}

#[test]
fn refused_while_busy_or_suspended() {
    for (state, expected) in [
        (ConnectionState::Busy, EnactFailure::Busy),
        (ConnectionState::Suspended, EnactFailure::Suspended),
    ] {
        let mut h = harness();
        h.pump_mut().report(state);

        let result = h
            .service
            .set_temp_basal_absolute(1.0, 30, NORMAL, false, &mut h.events);

        assert_eq!(result.failure(), Some(expected));
        assert_eq!(h.physical_calls(), 0);
        assert!(h.service.reconciler().active_temporary_basal(t0()).is_none());
    }
}

#[test]
fn protocol_violation_refuses_every_command_and_alerts() {
    let mut h = harness();
    // Connected → Connecting is not a legal transition.
    h.pump_mut().report(ConnectionState::Connecting);
    assert!(h.service.connection().protocol_violation().is_some());

    let first = h.service.set_temp_basal_absolute(1.0, 30, NORMAL, false, &mut h.events);
    let info = DetailedBolusInfo::bolus(1.0, t0());
    let second = h.service.deliver_bolus(&info, &mut h.history, &mut h.events);

    for result in [&first, &second] {
        assert!(matches!(result.failure(), Some(EnactFailure::ProtocolViolation(_))));
    }
    assert_eq!(h.events.alerts(), 2);
    assert_eq!(h.physical_calls(), 0);
}

#[test]
fn driver_reset_clears_the_violation() {
    let mut h = harness();
    h.pump_mut().report(ConnectionState::Connecting);
    h.pump_mut().reset_link();
    h.pump_mut().walk_to_connected();

    let result = h.service.set_temp_basal_absolute(1.0, 30, NORMAL, false, &mut h.events);

    assert!(result.success());
}

#[test]
fn stop_bolus_is_not_gated() {
    let mut h = harness_with(MockPump::new());

    let result = h.service.stop_bolus_delivering();

    assert!(result.success());
    assert_eq!(h.pump().calls, vec![DriverCall::StopBolus]);
}

// ── Temporary basal ───────────────────────────────────────────

#[test]
fn newer_temp_basal_supersedes_the_running_one() {
    let mut h = harness();
    let profile = BasalProfile::flat(1.0).unwrap();

    assert!(h.service.set_temp_basal_absolute(1.5, 30, NORMAL, false, &mut h.events).success());
    h.clock.advance(Duration::minutes(10));
    assert!(h.service.set_temp_basal_absolute(0.5, 60, NORMAL, false, &mut h.events).success());

    let timeline = h.service.reconciler().temporary_basal_history();
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].ended_at, Some(t0() + Duration::minutes(10)));
    assert_eq!(timeline[0].cause, RecordCause::Superseded);
    assert_eq!(timeline[1].cause, RecordCause::Scheduled);

    let expected = h.service.expected_state(&profile);
    let temp = expected.temporary_basal.unwrap();
    assert_eq!(temp.absolute_rate, 0.5);
    assert_eq!(temp.record.start, t0() + Duration::minutes(10));
}

#[test]
fn identical_temp_basal_is_left_alone_unless_enforced() {
    let mut h = harness();

    h.service.set_temp_basal_absolute(1.2, 30, NORMAL, false, &mut h.events);
    let again = h.service.set_temp_basal_absolute(1.2, 30, NORMAL, false, &mut h.events);

    assert!(again.success());
    assert!(!again.enacted_on_pump());
    assert_eq!(h.physical_calls(), 1);

    let enforced = h.service.set_temp_basal_absolute(1.2, 30, NORMAL, true, &mut h.events);
    assert!(enforced.enacted_on_pump());
    assert_eq!(h.physical_calls(), 2);
}

#[test]
fn temp_basal_outside_pump_limits_is_invalid() {
    let mut h = harness();

    let off_step = h.service.set_temp_basal_absolute(1.0, 20, NORMAL, false, &mut h.events);
    let too_fast = h.service.set_temp_basal_absolute(99.0, 30, NORMAL, false, &mut h.events);

    assert!(matches!(off_step.failure(), Some(EnactFailure::InvalidInput(_))));
    assert!(matches!(too_fast.failure(), Some(EnactFailure::InvalidInput(_))));
    assert_eq!(h.physical_calls(), 0);
}

#[test]
fn insulin_off_the_pump_step_is_invalid() {
    let mut h = harness();
    h.pump_mut().caps.bolus_step = 0.05;
    h.pump_mut().caps.extended_bolus_step = 0.05;

    let info = DetailedBolusInfo::bolus(0.03, t0());
    let bolus = h.service.deliver_bolus(&info, &mut h.history, &mut h.events);
    let extended = h.service.set_extended_bolus(0.07, 60, &mut h.events);

    assert!(matches!(bolus.failure(), Some(EnactFailure::InvalidInput(_))));
    assert!(matches!(extended.failure(), Some(EnactFailure::InvalidInput(_))));
    assert_eq!(h.physical_calls(), 0);
    assert!(h.history.treatments.is_empty());

    let on_step = DetailedBolusInfo::bolus(0.05, t0());
    assert!(h.service.deliver_bolus(&on_step, &mut h.history, &mut h.events).success());
}

#[test]
fn enforced_cancel_is_a_hard_user_cancel() {
    let mut h = harness();
    h.pump_mut().substitute = Some(CancelSubstitute {
        rate: TemporaryBasalRate::Percent(90),
        duration_minutes: 15,
    });
    h.service.set_temp_basal_absolute(2.0, 60, NORMAL, false, &mut h.events);
    h.clock.advance(Duration::minutes(5));

    let result = h.service.cancel_temp_basal(true, &mut h.events);

    assert!(result.success());
    assert!(result.is_temp_cancel);
    assert_eq!(h.pump().calls.last(), Some(&DriverCall::CancelTemp { enforce_new: true }));
    let record = h.service.reconciler().temporary_basal_history()[0];
    assert_eq!(record.cause, RecordCause::CancelledByUser);
    assert_eq!(record.ended_at, Some(t0() + Duration::minutes(5)));
    assert!(h.service.reconciler().active_temporary_basal(h.now()).is_none());
}

#[test]
fn non_enforced_cancel_runs_the_substitute() {
    let mut h = harness();
    h.pump_mut().substitute = Some(CancelSubstitute {
        rate: TemporaryBasalRate::Percent(90),
        duration_minutes: 15,
    });
    h.service.set_temp_basal_absolute(2.0, 60, NORMAL, false, &mut h.events);
    h.clock.advance(Duration::minutes(5));

    let result = h.service.cancel_temp_basal(false, &mut h.events);

    assert!(result.enacted_on_pump());
    assert!(result.is_temp_cancel);
    assert_eq!(result.duration_minutes, Some(15));
    assert_eq!(
        h.pump().calls.last(),
        Some(&DriverCall::SetTempPercent {
            percent: 90,
            duration: 15,
            enforce_new: true
        })
    );

    let timeline = h.service.reconciler().temporary_basal_history();
    assert_eq!(timeline[0].cause, RecordCause::CancelledByController);
    let active = h.service.reconciler().active_temporary_basal(h.now()).unwrap();
    assert_eq!(active.rate, TemporaryBasalRate::Percent(90));
    assert_eq!(active.duration_minutes, 15);
}

#[test]
fn percent_substitute_without_extended_delivery_falls_back_to_hard_cancel() {
    let mut pump = MockPump::new().connected();
    pump.extended_enabled = false;
    pump.substitute = Some(CancelSubstitute {
        rate: TemporaryBasalRate::Percent(90),
        duration_minutes: 15,
    });
    let mut h = harness_with(pump);
    h.service.set_temp_basal_absolute(2.0, 60, NORMAL, false, &mut h.events);

    let result = h.service.cancel_temp_basal(false, &mut h.events);

    assert!(result.success());
    assert_eq!(h.pump().calls.last(), Some(&DriverCall::CancelTemp { enforce_new: false }));
    assert!(h.service.reconciler().active_temporary_basal(t0()).is_none());
}

#[test]
fn cancel_with_nothing_running_is_a_successful_no_op() {
    // Not even connected: nothing to cancel means nothing to refuse.
    let mut h = harness_with(MockPump::new());

    let result = h.service.cancel_temp_basal(true, &mut h.events);

    assert!(result.success());
    assert!(!result.enacted_on_pump());
    assert!(result.is_temp_cancel);
    assert_eq!(h.physical_calls(), 0);
}

#[test]
fn cancel_after_clock_steps_back_clears_the_governing_temp() {
    let mut h = harness();
    h.service.set_temp_basal_absolute(0.5, 60, NORMAL, false, &mut h.events);
    h.clock.advance(Duration::minutes(20));
    assert!(h.service.cancel_temp_basal(false, &mut h.events).enacted_on_pump());

    // Wall clock corrected backwards into the cancelled record's window.
    h.clock.set(t0() + Duration::minutes(10));
    assert!(h.service.reconciler().active_temporary_basal(h.now()).is_some());
    let calls_before = h.physical_calls();

    let result = h.service.cancel_temp_basal(true, &mut h.events);

    assert!(result.success(), "{result}");
    assert!(result.enacted_on_pump());
    assert_eq!(h.physical_calls(), calls_before + 1);
    assert!(h.service.reconciler().active_temporary_basal(h.now()).is_none());
    assert_eq!(h.events.alerts(), 0);
}

#[test]
fn substitute_that_would_precede_the_timeline_falls_back_to_hard_cancel() {
    let mut h = harness();
    h.pump_mut().substitute = Some(CancelSubstitute {
        rate: TemporaryBasalRate::Absolute(1.0),
        duration_minutes: 15,
    });
    h.service.set_temp_basal_absolute(0.5, 60, NORMAL, false, &mut h.events);
    h.clock.advance(Duration::minutes(20));
    h.service.set_temp_basal_absolute(2.0, 60, NORMAL, false, &mut h.events);
    h.clock.set(t0() + Duration::minutes(10));

    let result = h.service.cancel_temp_basal(false, &mut h.events);

    assert!(result.enacted_on_pump(), "{result}");
    assert_eq!(h.pump().calls.last(), Some(&DriverCall::CancelTemp { enforce_new: false }));
    assert!(h.service.reconciler().active_temporary_basal(h.now()).is_none());
    assert_eq!(h.service.reconciler().temporary_basal_history().len(), 2);
}

#[test]
fn extended_cancel_after_clock_steps_back_clears_the_governing_bolus() {
    let mut h = harness();
    h.service.set_extended_bolus(2.0, 120, &mut h.events);
    h.clock.advance(Duration::minutes(30));
    assert!(h.service.cancel_extended_bolus(&mut h.events).enacted_on_pump());

    h.clock.set(t0() + Duration::minutes(15));
    let result = h.service.cancel_extended_bolus(&mut h.events);

    assert!(result.enacted_on_pump(), "{result}");
    assert!(h.service.reconciler().active_extended_bolus(h.now()).is_none());
}

#[test]
fn hundred_percent_is_enacted_as_a_cancel() {
    let mut h = harness();
    h.service.set_temp_basal_percent(150, 30, NORMAL, false, &mut h.events);

    let result = h.service.set_temp_basal_percent(100, 30, NORMAL, false, &mut h.events);

    assert!(result.is_temp_cancel);
    assert_eq!(h.pump().calls.last(), Some(&DriverCall::CancelTemp { enforce_new: false }));
    assert!(h.service.reconciler().active_temporary_basal(t0()).is_none());
}

// ── Capabilities ──────────────────────────────────────────────

#[test]
fn basic_pump_refuses_optional_operations() {
    let mut h = harness_with(MockPump::basic().connected());
    let profile = BasalProfile::flat(1.0).unwrap();

    let results = [
        h.service.set_temp_basal_percent(120, 30, NORMAL, false, &mut h.events),
        h.service.set_extended_bolus(2.0, 60, &mut h.events),
        h.service.cancel_extended_bolus(&mut h.events),
        h.service.set_new_basal_profile(&profile, &mut h.events),
        h.service.load_tdds(&mut h.history, &mut h.events),
    ];

    for result in &results {
        assert!(
            matches!(result.failure(), Some(EnactFailure::OperationNotSupported(_))),
            "unexpected {result}"
        );
    }
    assert_eq!(h.physical_calls(), 0);
    assert!(h.service.is_this_profile_set(&profile));
}

// ── Extended bolus ────────────────────────────────────────────

#[test]
fn extended_bolus_runs_until_cancelled() {
    let mut h = harness();

    let set = h.service.set_extended_bolus(3.0, 120, &mut h.events);
    assert!(set.success());
    assert_eq!(set.bolus_delivered, 3.0);
    assert_eq!(set.duration_minutes, Some(120));

    h.clock.advance(Duration::minutes(30));
    let active = h.service.reconciler().active_extended_bolus(h.now()).unwrap();
    assert_eq!(active.rate(), 1.5);

    let cancel = h.service.cancel_extended_bolus(&mut h.events);
    assert!(cancel.enacted_on_pump());
    assert!((cancel.bolus_delivered - 0.75).abs() < 1e-9, "{}", cancel.bolus_delivered);
    assert_eq!(h.pump().calls.last(), Some(&DriverCall::CancelExtended));
    assert!(h.service.reconciler().active_extended_bolus(h.now()).is_none());

    let again = h.service.cancel_extended_bolus(&mut h.events);
    assert!(again.success());
    assert!(!again.enacted_on_pump());
}

// ── Pump memory ───────────────────────────────────────────────

#[test]
fn basal_profile_upload_is_visible_to_profile_check() {
    let mut h = harness();
    let profile = BasalProfile::flat(0.8).unwrap();
    assert!(!h.service.is_this_profile_set(&profile));

    let result = h.service.set_new_basal_profile(&profile, &mut h.events);

    assert!(result.success());
    assert!(h.service.is_this_profile_set(&profile));
    assert_eq!(h.events.count(&PumpEvent::StatusChanged), 1);
}

#[test]
fn daily_totals_are_written_to_history() {
    let mut h = harness();
    let day = t0().date_naive();
    h.pump_mut().tdds = vec![
        TotalDailyDose { day, bolus: 12.0, basal: 20.0 },
        TotalDailyDose { day: day.pred_opt().unwrap(), bolus: 10.0, basal: 21.0 },
    ];

    let result = h.service.load_tdds(&mut h.history, &mut h.events);

    assert!(result.success());
    assert_eq!(h.history.tdds.len(), 2);
    assert_eq!(h.history.tdds[0].total(), 32.0);
}

// ── Dispatch and session ──────────────────────────────────────

#[test]
fn queued_commands_dispatch_to_the_same_operations() {
    let mut h = harness();

    let result = h.service.handle_command(
        PumpCommand::SetTempBasalAbsolute {
            rate: 0.7,
            duration_minutes: 45,
            basal_type: NORMAL,
            enforce_new: false,
        },
        &mut h.history,
        &mut h.events,
    );

    assert!(result.success());
    assert_eq!(result.absolute, Some(0.7));
    assert_eq!(
        h.pump().calls,
        vec![DriverCall::SetTempAbsolute {
            rate: 0.7,
            duration: 45,
            enforce_new: false
        }]
    );
}

#[test]
fn session_guard_releases_the_channel() {
    let mut h = harness();
    {
        let mut session = h.service.open_session(&mut h.events).unwrap();
        assert!(session.is_session_open());
        assert!(session.set_temp_basal_absolute(1.0, 30, NORMAL, false, &mut h.events).success());
    }

    assert!(!h.service.is_session_open());
    assert_eq!(h.pump().calls.first(), Some(&DriverCall::InitStatus));
    assert_eq!(h.pump().calls.last(), Some(&DriverCall::CloseChannel));
    assert_eq!(h.events.count(&PumpEvent::CustomActionsChanged), 1);
}
