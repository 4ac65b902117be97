//! Fuzz target: `CoreConfig::from_json`
//!
//! Arbitrary bytes must parse to either a validated config or a typed
//! `ConfigError`, never a panic.
//!
//! cargo fuzz run fuzz_config

#![no_main]

use libfuzzer_sys::fuzz_target;
use pumpcore::config::CoreConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = CoreConfig::from_json(text) {
        assert!(config.validate().is_ok(), "from_json returned an invalid config");
        assert!(config.freshness_window().num_minutes() > 0);
    }
});
