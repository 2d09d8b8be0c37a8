#![no_main]

use libfuzzer_sys::fuzz_target;
use belugas_core::config::BelugasConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        if let Ok(config) = BelugasConfig::parse(content) {
            let _ = config.validate();
        }
    }
});
