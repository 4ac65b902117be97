//! Channel-backed event sink.
//!
//! Bridges the synchronous command path to a consumer task (UI refresh,
//! upload) through a bounded `embassy-sync` channel. Sends never block: a
//! full channel drops the event and counts it.
//!
//! ```text
//! ┌──────────────┐  PumpEvent  ┌──────────────┐
//! │ PumpService  │────────────▶│ consumer task│
//! │  (sync)      │  try_send   │  (any)       │
//! └──────────────┘             └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::app::events::PumpEvent;
use crate::app::ports::EventSink;

/// Channel depth for outbound pump events.
pub const EVENT_DEPTH: usize = 16;

pub type PumpEventChannel = Channel<CriticalSectionRawMutex, PumpEvent, EVENT_DEPTH>;

/// Process-wide event channel for single-pump deployments.
pub static PUMP_EVENTS: PumpEventChannel = Channel::new();

pub struct ChannelEventSink<'a> {
    channel: &'a PumpEventChannel,
    dropped: u32,
}

impl<'a> ChannelEventSink<'a> {
    pub fn new(channel: &'a PumpEventChannel) -> Self {
        Self { channel, dropped: 0 }
    }

    /// Events lost to a full channel.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl EventSink for ChannelEventSink<'_> {
    fn emit(&mut self, event: &PumpEvent) {
        if self.channel.try_send(*event).is_err() {
            self.dropped = self.dropped.saturating_add(1);
            warn!("Event channel full, dropping {:?}", event);
        }
    }
}

/// Take every queued event without waiting.
pub fn drain(channel: &PumpEventChannel) -> Vec<PumpEvent> {
    let mut out = Vec::new();
    while let Ok(event) = channel.try_receive() {
        out.push(event);
    }
    out
}
