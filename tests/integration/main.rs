//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one part of the core
//! against the recording doubles in `mock_pump`. Everything runs on the
//! host with no pump attached.

mod enactment_tests;
mod mock_pump;
