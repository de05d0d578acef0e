//! Golden tests for the positional-argument contract
//!
//! The fixture pair under `tests/fixtures/` pins the builder output for a
//! canonical request. The worker side holds the same golden; regenerate both
//! together whenever the contract version is bumped.

use gridgen::args::{self, GenerationRequest, CONTRACT_VERSION, EXPECTED_LENGTH};
use serde_json::Value;

const CANONICAL_REQUEST: &str = include_str!("fixtures/canonical_request.json");
const CANONICAL_ARGS: &str = include_str!("fixtures/canonical_args.json");

fn canonical_request() -> GenerationRequest {
    let body: Value = serde_json::from_str(CANONICAL_REQUEST).unwrap();
    GenerationRequest::from_value(body).unwrap()
}

#[test]
fn contract_version_is_pinned() {
    assert_eq!(CONTRACT_VERSION, 1);
    assert_eq!(EXPECTED_LENGTH, 152);
}

#[test]
fn canonical_request_matches_golden() {
    let built = args::build(&canonical_request());
    let golden: Vec<Value> = serde_json::from_str(CANONICAL_ARGS).unwrap();
    assert_eq!(golden.len(), EXPECTED_LENGTH);
    assert_eq!(built.len(), EXPECTED_LENGTH);
    for (index, (built_slot, golden_slot)) in built.iter().zip(golden.iter()).enumerate() {
        assert_eq!(
            built_slot, golden_slot,
            "slot {} diverged from the golden fixture",
            index
        );
    }
}

#[test]
fn golden_vector_validates() {
    let golden: Vec<Value> = serde_json::from_str(CANONICAL_ARGS).unwrap();
    args::validate(&golden).unwrap();
}

#[test]
fn build_then_validate_round_trips_for_varied_requests() {
    let bodies = [
        serde_json::json!({}),
        serde_json::json!({ "prompt": "lighthouse at dusk", "image_number": 4 }),
        serde_json::json!({ "aspect_ratios_selection": "704x1408", "seed_random": true }),
        serde_json::json!({ "loras": [], "style_selections": [] }),
    ];
    for body in bodies {
        let request = GenerationRequest::from_value(body.clone()).unwrap();
        let built = args::build(&request);
        assert_eq!(built.len(), EXPECTED_LENGTH, "request {}", body);
        args::validate(&built).unwrap();
    }
}

#[test]
fn fan_out_overrides_pin_the_sub_task_fields() {
    let mut built = args::build(&canonical_request());
    args::apply_fan_out(&mut built, 6, 12351);
    assert_eq!(built[6], serde_json::json!(6));
    assert_eq!(built[8], serde_json::json!(12351));
    assert_eq!(built[9], serde_json::json!(false));
    args::validate(&built).unwrap();
}
