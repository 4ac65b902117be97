//! Outbound pump events.
//!
//! The [`PumpService`](super::service::PumpService) emits these through the
//! [`EventSink`](super::ports::EventSink) port passed to each operation.

use crate::connection::{LinkDirection, LinkRequestOutcome};
use crate::error::EnactFailure;

use super::ports::EventSink;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PumpEvent {
    /// Bolus delivery progress, 0–100.
    BolusProgress { percent: u8, smb: bool },

    /// The set of driver custom actions may have changed.
    CustomActionsChanged,

    /// Pump status or expected state changed; views should refresh.
    StatusChanged,

    /// A connect / disconnect request resolved.
    LinkRequested {
        direction: LinkDirection,
        outcome: LinkRequestOutcome,
    },

    /// Needs operator attention: protocol violation, or the pump acted but
    /// the expected state could not be recorded.
    OperatorAlert(EnactFailure),
}

/// Fixed-capacity recorder. Events beyond capacity are dropped.
impl<const N: usize> EventSink for heapless::Vec<PumpEvent, N> {
    fn emit(&mut self, event: &PumpEvent) {
        let _ = self.push(*event);
    }
}
