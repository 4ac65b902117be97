//! Application core: command enactment, zero I/O.
//!
//! Business rules for coordinating a pump driver: request validation,
//! connection gating, expected-state bookkeeping and result reporting.
//! All interaction with the pump happens through the **port traits** in
//! [`ports`], keeping this layer testable without hardware.

pub mod commands;
pub mod events;
pub mod ports;
pub mod result;
pub mod service;
pub mod session;
pub mod validation;
