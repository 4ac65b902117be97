//! Fuzz target: `PumpService` command sequences over the virtual pump
//!
//! Each input byte pair selects one operation and its argument. The
//! sequence runs against a fresh service; after every step the expected
//! state must still be a single non-overlapping timeline and a refused
//! command must not have reached the pump.
//!
//! cargo fuzz run fuzz_command_sequence

#![no_main]

use chrono::{Duration, TimeZone, Utc};
use libfuzzer_sys::fuzz_target;
use pumpcore::adapters::log_sink::LogEventSink;
use pumpcore::adapters::time::ManualClock;
use pumpcore::adapters::virtual_pump::VirtualPump;
use pumpcore::app::commands::{DetailedBolusInfo, PumpCommand};
use pumpcore::app::ports::{Clock, HistorySink, PumpDriver};
use pumpcore::app::service::PumpService;
use pumpcore::config::CoreConfig;
use pumpcore::connection::ConnectionState;
use pumpcore::error::DriverError;
use pumpcore::profile::BasalProfile;
use pumpcore::reconciler::TemporaryBasalType;

struct NullHistory;

impl HistorySink for NullHistory {
    fn add_to_history_treatment(&mut self, _info: &DetailedBolusInfo, _carb_only: bool) {}
}

fuzz_target!(|data: &[u8]| {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let mut pump = VirtualPump::new("VP-fuzz", clock.clone());
    pump.init_pump_status_data();
    let mut service = PumpService::new(pump, clock.clone(), CoreConfig::default()).unwrap();
    let mut history = NullHistory;
    let mut events = LogEventSink::new();
    let profile = BasalProfile::flat(1.0).unwrap();

    for pair in data.chunks_exact(2) {
        let (op, arg) = (pair[0] % 14, pair[1]);
        let now = clock.now();
        let actions_before = service.driver().physical_actions();

        let cmd = match op {
            0 => PumpCommand::SetTempBasalAbsolute {
                rate: f64::from(arg) / 20.0,
                duration_minutes: u32::from(arg % 9) * 15,
                basal_type: TemporaryBasalType::Normal,
                enforce_new: arg & 1 == 1,
            },
            1 => PumpCommand::SetTempBasalPercent {
                percent: u16::from(arg) * 2,
                duration_minutes: u32::from(arg % 9) * 15,
                basal_type: TemporaryBasalType::Normal,
                enforce_new: false,
            },
            2 => PumpCommand::CancelTempBasal {
                enforce_new: arg & 1 == 1,
            },
            3 => PumpCommand::SetExtendedBolus {
                insulin: f64::from(arg) / 10.0,
                duration_minutes: u32::from(arg % 7) * 30,
            },
            4 => PumpCommand::CancelExtendedBolus,
            5 => PumpCommand::DeliverTreatment(
                DetailedBolusInfo::bolus(f64::from(arg % 40) / 10.0, now).with_carbs(f64::from(arg / 40)),
            ),
            6 => PumpCommand::LoadTdds,
            7 => PumpCommand::StopBolusDelivering,
            8 => {
                clock.advance(Duration::minutes(i64::from(arg)));
                continue;
            }
            9 => {
                service.connect("fuzz", &mut events);
                continue;
            }
            10 => {
                service.disconnect("fuzz", &mut events);
                continue;
            }
            11 => {
                if service.connection().state() == ConnectionState::Connected {
                    let _ = service.driver_mut().suspend();
                } else if service.connection().is_suspended() {
                    let _ = service.driver_mut().resume();
                }
                continue;
            }
            12 => {
                service.driver_mut().inject_failure(DriverError::CommunicationFailed);
                continue;
            }
            _ => {
                let _ = service.structured_status_json(&profile, None, "fuzz");
                let _ = service.short_status(arg & 1 == 1);
                continue;
            }
        };

        let result = service.handle_command(cmd, &mut history, &mut events);
        if let Some(failure) = result.failure() {
            assert!(!result.enacted_on_pump());
            if failure.is_side_effect_free() {
                assert_eq!(service.driver().physical_actions(), actions_before, "{failure}");
            }
        }

        let timeline = service.reconciler().temporary_basal_history();
        for pair in timeline.windows(2) {
            assert!(pair[0].end() <= pair[1].start, "temp basal overlap");
        }
        let extended = service.reconciler().extended_bolus_history();
        for pair in extended.windows(2) {
            assert!(pair[0].end() <= pair[1].start, "extended bolus overlap");
        }
    }
});
