// stepchain-core/tests/determinism.rs
// ============================================================================
// Module: Determinism Tests
// Description: Byte-identical replay and tamper detection.
// ============================================================================
//! ## Overview
//! Validates the primary external contract: fixed inputs produce
//! byte-identical traces, and any flipped byte breaks verification.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use serde_json::json;
use stepchain_core::EngineRunner;
use stepchain_core::ExecuteRequest;
use stepchain_core::ProblemSpec;
use stepchain_core::Timestamp;
use stepchain_core::TraceId;
use stepchain_core::runtime::TraceVerifyError;
use stepchain_core::trace_divergence;
use stepchain_core::verify_trace_bytes;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn request(settings: Option<serde_json::Value>) -> ExecuteRequest {
    let mut spec = json!({
        "version": "1.0.0",
        "id": "req-replay-1",
        "created_at": "2026-02-02T00:00:00Z",
        "inputs": { "prompt": "Hello world" },
    });
    if let Some(settings) = settings {
        spec["settings"] = settings;
    }
    let spec: ProblemSpec = serde_json::from_value(spec).unwrap();
    ExecuteRequest {
        problem_spec: spec,
        trace_id: TraceId::new("trace-replay-1"),
        now: Timestamp::parse("2026-02-02T00:00:00Z").unwrap(),
    }
}

// ============================================================================
// SECTION: Replay
// ============================================================================

/// Two runs over identical inputs yield byte-identical traces.
#[test]
fn replay_is_byte_identical() {
    let request = request(None);
    let first = EngineRunner::new().execute(&request).unwrap();
    let second = EngineRunner::new().execute(&request).unwrap();

    assert_eq!(first.trace_bytes, second.trace_bytes);
    assert!(trace_divergence(&first.trace_bytes, &second.trace_bytes).is_none());
}

/// Replay holds across loop iterations and control records.
#[test]
fn replay_is_byte_identical_with_loop() {
    let settings = json!({
        "evidence_required": true,
        "loop": {
            "enabled": true,
            "start_step": "AcquireEvidence",
            "end_step": "Verify",
            "max_iterations": 3,
            "stop_condition": {
                "path": "artifacts.verification.status",
                "operator": "equals",
                "value": "passed",
            },
        },
    });
    let request = request(Some(settings));
    let first = EngineRunner::new().execute(&request).unwrap();
    let second = EngineRunner::new().execute(&request).unwrap();
    assert_eq!(first.trace_bytes, second.trace_bytes);
}

/// A different clock seed changes the bytes but stays verifiable.
#[test]
fn different_seed_produces_different_verified_trace() {
    let base = request(None);
    let mut shifted = request(None);
    shifted.now = Timestamp::parse("2026-02-03T00:00:00Z").unwrap();

    let first = EngineRunner::new().execute(&base).unwrap();
    let second = EngineRunner::new().execute(&shifted).unwrap();

    assert_ne!(first.trace_bytes, second.trace_bytes);
    verify_trace_bytes(&second.trace_bytes).unwrap();
    let divergence = trace_divergence(&first.trace_bytes, &second.trace_bytes).unwrap();
    assert_eq!(divergence.line, 1);
}

// ============================================================================
// SECTION: Tamper Detection
// ============================================================================

/// Flipping one byte inside a step record's output breaks verification.
#[test]
fn tampered_output_breaks_verification() {
    let result = EngineRunner::new().execute(&request(None)).unwrap();
    verify_trace_bytes(&result.trace_bytes).unwrap();

    let text = String::from_utf8(result.trace_bytes.clone()).unwrap();
    let tampered = text.replacen("Hello world", "Jello world", 1);
    assert_ne!(text, tampered);

    let err = verify_trace_bytes(tampered.as_bytes()).unwrap_err();
    assert!(matches!(err, TraceVerifyError::RecordHashMismatch { .. }));
    assert_eq!(err.code(), "trace_chain_broken");
}

/// Trace bytes survive a file round-trip unchanged and still verify.
#[test]
fn trace_file_round_trip_verifies() {
    let result = EngineRunner::new().execute(&request(None)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.ndjson");
    std::fs::write(&path, &result.trace_bytes).unwrap();

    let reread = std::fs::read(&path).unwrap();
    assert_eq!(reread, result.trace_bytes);
    verify_trace_bytes(&reread).unwrap();
}

/// Splicing a record from another run breaks the prev-hash chain.
#[test]
fn spliced_record_breaks_chain() {
    let first = EngineRunner::new().execute(&request(None)).unwrap();
    let mut shifted = request(None);
    shifted.now = Timestamp::parse("2026-02-03T00:00:00Z").unwrap();
    let second = EngineRunner::new().execute(&shifted).unwrap();

    let first_lines: Vec<&str> =
        std::str::from_utf8(&first.trace_bytes).unwrap().lines().collect();
    let second_lines: Vec<&str> =
        std::str::from_utf8(&second.trace_bytes).unwrap().lines().collect();

    // Replace the second record wholesale with a sealed record from the
    // other run; its own hash is valid but the chain no longer links.
    let mut spliced: Vec<&str> = first_lines.clone();
    spliced[1] = second_lines[1];
    let mut bytes = spliced.join("\n").into_bytes();
    bytes.push(b'\n');

    let err = verify_trace_bytes(&bytes).unwrap_err();
    assert!(matches!(err, TraceVerifyError::ChainBroken { .. }));
}
