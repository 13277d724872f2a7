//! Fuzz target: device configuration loading
//!
//! Drives `ConfigStore::load_str` with arbitrary documents and checks:
//! - No panics under arbitrary byte inputs
//! - An accepted config always names a broker and non-zero intervals
//! - Deep-sleep configs mark every endpoint one-shot
//!
//! cargo fuzz run fuzz_config_load

#![no_main]

use libfuzzer_sys::fuzz_target;
use pinbridge::config::{ConfigStore, SleepType};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = core::str::from_utf8(data) else {
        return;
    };
    let Ok(config) = ConfigStore::new("a4cf12b3c4d5").load_str(text) else {
        return;
    };
    assert!(!config.publish.server.trim().is_empty());
    assert!(config.publish.interval > 0);
    assert!(config.subscribe.interval > 0);
    if config.sleep_type == SleepType::DeepSleep {
        assert!(config.devices.iter().all(|d| d.oneshot));
    }
});
