//! Connection state machine.
//!
//! Tracks the driver lifecycle and gates command enactment:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌────────────────┬──────────────────────────────────────┐   │
//! │  │ ConnectionState│ allowed_next                         │   │
//! │  ├────────────────┼──────────────────────────────────────┤   │
//! │  │ NotInitialized │ Initializing, Error                  │   │
//! │  │ Connected      │ Busy, Suspended, Disconnected, Error │   │
//! │  │ ...            │ ...                                  │   │
//! │  └────────────────┴──────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The machine is split into two handles sharing one mutex-guarded cell:
//!
//! - [`ConnectionReporter`]: owned by the concrete driver, the only place
//!   `transition_to` exists. Not `Clone`, so there is exactly one writer.
//! - [`ConnectionMonitor`]: cheap `Clone` read handle for the command
//!   engine and status readers on other tasks.
//!
//! Every read takes the same critical section as the writer, so readers see
//! either the state before or after a transition, never a mix of state and
//! violation latch.

pub mod states;

use core::cell::RefCell;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolViolation;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Driver lifecycle states. Must stay in sync with [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConnectionState {
    NotInitialized = 0,
    Initializing = 1,
    Connecting = 2,
    Connected = 3,
    Suspended = 4,
    Busy = 5,
    Disconnected = 6,
    Error = 7,
}

impl ConnectionState {
    /// Total number of states: sizes the table array.
    pub const COUNT: usize = 8;

    pub const ALL: [Self; Self::COUNT] = [
        Self::NotInitialized,
        Self::Initializing,
        Self::Connecting,
        Self::Connected,
        Self::Suspended,
        Self::Busy,
        Self::Disconnected,
        Self::Error,
    ];

    /// Convert a table index back to a state. Out-of-range indices map to
    /// `Error` in release builds.
    pub fn from_index(idx: usize) -> Self {
        if let Some(state) = Self::ALL.get(idx) {
            *state
        } else {
            debug_assert!(false, "invalid connection state index: {idx}");
            Self::Error
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitialized",
            Self::Initializing => "Initializing",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Suspended => "Suspended",
            Self::Busy => "Busy",
            Self::Disconnected => "Disconnected",
            Self::Error => "Error",
        }
    }

    /// The driver finished initialization at least once this session.
    pub const fn is_initialized(self) -> bool {
        !matches!(self, Self::NotInitialized | Self::Initializing)
    }

    /// The link to the pump is up (possibly busy or with delivery suspended).
    pub const fn is_link_up(self) -> bool {
        matches!(self, Self::Connected | Self::Busy | Self::Suspended)
    }
}

// ---------------------------------------------------------------------------
// Transition table row
// ---------------------------------------------------------------------------

/// Static descriptor for one state: its name and legal successors.
pub struct StateDescriptor {
    pub id: ConnectionState,
    pub name: &'static str,
    pub allowed_next: &'static [ConnectionState],
}

// ---------------------------------------------------------------------------
// Link requests (connect / disconnect)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    Connect,
    Disconnect,
}

/// What became of a connect / disconnect request.
///
/// A request never disappears silently: the driver either moves the machine,
/// reports that it cannot, or gives up after its own timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRequestOutcome {
    /// The machine moved; carries the state observed afterwards.
    Transitioned(ConnectionState),
    /// Nothing to do: the link was already in the requested condition.
    AlreadyInState(ConnectionState),
    /// The driver does not implement this request.
    Unsupported,
    /// The driver gave up within its timeout.
    TimedOut,
    /// Not attempted: the machine holds a latched protocol violation.
    Refused(ProtocolViolation),
}

// ---------------------------------------------------------------------------
// Shared machine
// ---------------------------------------------------------------------------

/// Consistent point-in-time view of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub violation: Option<ProtocolViolation>,
    pub transitions: u64,
}

struct Inner {
    current: ConnectionState,
    violation: Option<ProtocolViolation>,
    transitions: u64,
}

/// The connection state machine. Construct with [`ConnectionStateMachine::split`].
pub struct ConnectionStateMachine {
    table: [StateDescriptor; ConnectionState::COUNT],
    inner: Mutex<CriticalSectionRawMutex, RefCell<Inner>>,
}

impl ConnectionStateMachine {
    /// Create a machine in `NotInitialized` and hand out its two handles.
    pub fn split() -> (ConnectionReporter, ConnectionMonitor) {
        let machine = Arc::new(Self {
            table: states::build_state_table(),
            inner: Mutex::new(RefCell::new(Inner {
                current: ConnectionState::NotInitialized,
                violation: None,
                transitions: 0,
            })),
        });
        (
            ConnectionReporter {
                machine: Arc::clone(&machine),
            },
            ConnectionMonitor {
                machine,
                log_queries: false,
            },
        )
    }

    fn snapshot(&self) -> ConnectionSnapshot {
        self.inner.lock(|cell| {
            let inner = cell.borrow();
            ConnectionSnapshot {
                state: inner.current,
                violation: inner.violation,
                transitions: inner.transitions,
            }
        })
    }

    fn transition(&self, next: ConnectionState) -> Result<ConnectionState, ProtocolViolation> {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            let prev = inner.current;

            if prev == next {
                debug!("Connection: already {}", next.name());
                return Ok(prev);
            }

            let row = &self.table[prev as usize];
            if !row.allowed_next.contains(&next) {
                let violation = ProtocolViolation { from: prev, to: next };
                error!("Connection: rejected {violation}");
                // Keep the first violation; it is the one that broke agreement.
                if inner.violation.is_none() {
                    inner.violation = Some(violation);
                }
                return Err(violation);
            }

            info!(
                "Connection transition: {} -> {}",
                row.name,
                self.table[next as usize].name
            );
            inner.current = next;
            inner.transitions += 1;
            Ok(prev)
        })
    }

    fn reset(&self) {
        self.inner.lock(|cell| {
            let mut inner = cell.borrow_mut();
            info!(
                "Connection reset: {} -> NotInitialized",
                inner.current.name()
            );
            inner.current = ConnectionState::NotInitialized;
            inner.violation = None;
            inner.transitions += 1;
        });
    }
}

// ---------------------------------------------------------------------------
// Driver-side handle
// ---------------------------------------------------------------------------

/// Write handle held by the concrete driver.
pub struct ConnectionReporter {
    machine: Arc<ConnectionStateMachine>,
}

impl ConnectionReporter {
    /// Report a hardware-driven transition. Returns the previous state.
    ///
    /// Illegal transitions are not applied; the violation is latched until
    /// [`reset`](Self::reset) and the engine refuses commands meanwhile.
    pub fn transition_to(&mut self, next: ConnectionState) -> Result<ConnectionState, ProtocolViolation> {
        self.machine.transition(next)
    }

    /// Driver re-initialization: back to `NotInitialized`, latch cleared.
    pub fn reset(&mut self) {
        self.machine.reset();
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.snapshot().state
    }

    /// A read handle onto the same machine.
    pub fn monitor(&self) -> ConnectionMonitor {
        ConnectionMonitor {
            machine: Arc::clone(&self.machine),
            log_queries: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Read-side handle
// ---------------------------------------------------------------------------

/// Read handle for the engine and status readers. All predicates are pure.
#[derive(Clone)]
pub struct ConnectionMonitor {
    machine: Arc<ConnectionStateMachine>,
    log_queries: bool,
}

impl ConnectionMonitor {
    /// Log every predicate query at debug level.
    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.machine.snapshot()
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot().state
    }

    pub fn is_initialized(&self) -> bool {
        self.state().is_initialized()
    }

    pub fn is_connected(&self) -> bool {
        if self.log_queries {
            debug!("isConnected queried");
        }
        self.state().is_link_up()
    }

    pub fn is_connecting(&self) -> bool {
        if self.log_queries {
            debug!("isConnecting queried");
        }
        self.state() == ConnectionState::Connecting
    }

    pub fn is_busy(&self) -> bool {
        self.state() == ConnectionState::Busy
    }

    pub fn is_suspended(&self) -> bool {
        self.state() == ConnectionState::Suspended
    }

    /// The latched violation, if the driver broke the transition rules.
    pub fn protocol_violation(&self) -> Option<ProtocolViolation> {
        self.snapshot().violation
    }
}
