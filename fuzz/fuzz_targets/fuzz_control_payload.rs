//! Fuzz target: control-message payload parsing
//!
//! Feeds arbitrary bytes to the digital-level and PWM parsers and checks:
//! - No panics under arbitrary byte inputs
//! - A parsed level echoes a value that re-parses to the same level
//! - A parsed PWM update carries at least one field and never a zero frequency
//!
//! cargo fuzz run fuzz_control_payload

#![no_main]

use libfuzzer_sys::fuzz_target;
use pinbridge::endpoint::reading::{PwmUpdate, parse_level};

fuzz_target!(|data: &[u8]| {
    if let Some((high, value)) = parse_level(data) {
        let echoed = serde_json::to_vec(&value).expect("value serialises");
        assert_eq!(parse_level(&echoed).map(|(h, _)| h), Some(high));
    }

    if let Some(update) = PwmUpdate::parse(data) {
        assert!(update.freq.is_some() || update.duty.is_some());
        assert!(update.freq.is_none_or(|f| f > 0));
    }
});
