//! Pump driver coordination core.
//!
//! Tracks a pump driver's connection lifecycle, keeps the controller's
//! expected record of running temp basals and extended boluses, enacts
//! dosing commands with unambiguous outcomes, and derives status views.
//! Concrete drivers plug in through [`app::ports::PumpDriver`].
//!
//! Shared state sits behind `embassy-sync` blocking mutexes over a
//! `critical-section` implementation. The default `std` feature supplies the
//! host one; with `default-features = false` the final binary must link its
//! own (for example `critical-section = { features = ["std"] }`).

#![deny(unused_must_use)]

#[cfg(feature = "std")]
use critical_section as _;

pub mod adapters;
pub mod app;
pub mod capabilities;
pub mod config;
pub mod connection;
pub mod error;
pub mod profile;
pub mod reconciler;
pub mod status;
