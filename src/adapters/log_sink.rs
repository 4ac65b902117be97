//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing every pump event to the `log`
//! facade. A UI bridge would implement the same trait.

use log::{error, info};

use crate::app::events::PumpEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`PumpEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: u64,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events logged so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &PumpEvent) {
        self.emitted += 1;
        match event {
            PumpEvent::BolusProgress { percent, smb } => {
                info!("BOLUS | {}% {}", percent, if *smb { "smb" } else { "normal" });
            }
            PumpEvent::CustomActionsChanged => {
                info!("ACTIONS | custom actions changed");
            }
            PumpEvent::StatusChanged => {
                info!("STATUS | changed");
            }
            PumpEvent::LinkRequested { direction, outcome } => {
                info!("LINK | {:?} -> {:?}", direction, outcome);
            }
            PumpEvent::OperatorAlert(failure) => {
                error!("ALERT | {}", failure);
            }
        }
    }
}
