//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter         | Implements         | Connects to                  |
//! |-----------------|--------------------|------------------------------|
//! | `log_sink`      | EventSink          | `log` facade                 |
//! | `channel_sink`  | EventSink          | embassy-sync bounded channel |
//! | `time`          | Clock              | system clock / manual clock  |
//! | `virtual_pump`  | PumpDriver         | in-memory pump simulation    |
//! |                 | ExtendedDelivery   |                              |
//! |                 | ProfileManagement  |                              |

pub mod channel_sink;
pub mod log_sink;
pub mod time;
pub mod virtual_pump;
