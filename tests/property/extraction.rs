//! Property-based tests for extraction guarantees

use proptest::prelude::*;
use scribe::error::PipelineError;
use scribe::extract::{classify, extract, Classification};
use serde_json::{Map, Value};

/// Strategy for JSON objects with benign keys and scalar values, including
/// string values that may contain braces and quotes.
fn json_object() -> impl Strategy<Value = Value> {
    let scalar = prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-zA-Z0-9 {}\\[\\]:,.!?]{0,30}".prop_map(Value::from),
    ];
    prop::collection::btree_map("[a-z_]{1,10}", scalar, 1..6).prop_map(|entries| {
        let mut map = Map::new();
        for (key, value) in entries {
            map.insert(key, value);
        }
        Value::Object(map)
    })
}

/// Prose wrappers with no status vocabulary and no delimiters of their own.
fn benign_prose() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("Here is the result: ".to_string()),
        Just("Sure! The answer follows.\n".to_string()),
        Just("As requested, see below. ".to_string()),
    ]
}

/// Test that a payload embedded in benign prose is always recovered intact
#[test]
fn embedded_payload_survives_prose_wrapping() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(benign_prose(), json_object(), benign_prose()),
            |(prefix, payload, suffix)| {
                let serialized = serde_json::to_string(&payload).unwrap();
                let raw = format!("{}{}{}", prefix, serialized, suffix);

                let recovered = extract(&raw).expect("payload should be recoverable");
                prop_assert_eq!(recovered, payload);
                Ok(())
            },
        )
        .unwrap();
}

/// Test that status-prefixed prose without a payload classifies as a status message
#[test]
fn status_prefixed_prose_classifies_as_status() {
    let mut runner = proptest::test_runner::TestRunner::default();

    let prefixes = prop_oneof![
        Just("Initializing"),
        Just("Loading"),
        Just("Processing"),
        Just("Please wait"),
        Just("Warming up"),
    ];

    runner
        .run(
            &(prefixes, "[a-zA-Z0-9 ,.]{0,60}"),
            |(prefix, trailer)| {
                let raw = format!("{} {}", prefix, trailer);
                prop_assert_eq!(classify(&raw), Classification::StatusMessage);
                match extract(&raw) {
                    Err(PipelineError::StatusMessage(_)) => Ok(()),
                    other => panic!("expected status message error, got {:?}", other),
                }
            },
        )
        .unwrap();
}

/// Test that extraction never panics, whatever the provider sends back
#[test]
fn extraction_is_total_over_arbitrary_text() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&any::<String>(), |raw| {
            // Outcome is irrelevant; only absence of panics and bounded
            // error text are asserted.
            if let Err(err) = extract(&raw) {
                prop_assert!(err.to_string().len() < 1200);
            }
            let _ = classify(&raw);
            Ok(())
        })
        .unwrap();
}
