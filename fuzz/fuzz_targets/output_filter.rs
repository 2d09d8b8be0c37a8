#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::json;

use belugas_core::types::DetectedFeature;
use belugas_engine::{EngineOutput, EngineOutputFilter};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    excluded: Vec<String>,
    names: Vec<String>,
}

fuzz_target!(|input: FuzzInput| {
    let filter = EngineOutputFilter::new(&json!({ "exclude_features": input.excluded }));
    for name in input.names.iter().take(64) {
        let output = EngineOutput::from_feature(DetectedFeature::new(name.as_str()));
        assert_eq!(filter.filter(&output), input.excluded.contains(name));
    }
});
