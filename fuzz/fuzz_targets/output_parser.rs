#![no_main]

use libfuzzer_sys::fuzz_target;
use belugas_engine::EngineOutput;

fuzz_target!(|data: &[u8]| {
    if let Some(output) = EngineOutput::parse(data.to_vec()) {
        // 유효한 출력은 항상 기능을 가지고, 무효 출력은 항상 메시지를 가진다
        assert_eq!(output.is_valid(), output.feature().is_some());
        assert_eq!(output.is_valid(), output.error_message().is_none());
        if let Some(feature) = output.feature() {
            assert!(!feature.name.is_empty());
        }
    }
});
