//! Transition table for the connection state machine.
//!
//! ```text
//!  NotInitialized ──▶ Initializing ──▶ Connecting ──▶ Connected ◀──▶ Busy
//!                          │                │            ▲   │
//!                          │                ▼            │   └────▶ Suspended
//!                          └──────────▶ Disconnected ────┘
//!
//!  Any state except Error ──[hardware fault]──▶ Error ──▶ Initializing | Connecting | Disconnected
//! ```
//!
//! `NotInitialized` never appears as a target: it is only re-entered through
//! [`ConnectionReporter::reset`](super::ConnectionReporter::reset).

use super::{ConnectionState, StateDescriptor};

use ConnectionState::{
    Busy, Connected, Connecting, Disconnected, Error, Initializing, NotInitialized, Suspended,
};

/// Build the static transition table. Indexed by `ConnectionState as usize`.
pub fn build_state_table() -> [StateDescriptor; ConnectionState::COUNT] {
    [
        // Index 0: NotInitialized
        StateDescriptor {
            id: NotInitialized,
            name: "NotInitialized",
            allowed_next: &[Initializing, Error],
        },
        // Index 1: Initializing
        StateDescriptor {
            id: Initializing,
            name: "Initializing",
            allowed_next: &[Connecting, Connected, Disconnected, Error],
        },
        // Index 2: Connecting
        StateDescriptor {
            id: Connecting,
            name: "Connecting",
            allowed_next: &[Connected, Disconnected, Error],
        },
        // Index 3: Connected
        StateDescriptor {
            id: Connected,
            name: "Connected",
            allowed_next: &[Busy, Suspended, Disconnected, Error],
        },
        // Index 4: Suspended
        StateDescriptor {
            id: Suspended,
            name: "Suspended",
            allowed_next: &[Connected, Disconnected, Error],
        },
        // Index 5: Busy
        StateDescriptor {
            id: Busy,
            name: "Busy",
            allowed_next: &[Connected, Disconnected, Error],
        },
        // Index 6: Disconnected
        StateDescriptor {
            id: Disconnected,
            name: "Disconnected",
            allowed_next: &[Initializing, Connecting, Connected, Error],
        },
        // Index 7: Error
        StateDescriptor {
            id: Error,
            name: "Error",
            allowed_next: &[Initializing, Connecting, Disconnected],
        },
    ]
}
