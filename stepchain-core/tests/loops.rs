// stepchain-core/tests/loops.rs
// ============================================================================
// Module: Loop Controller Tests
// Description: Tests for loop decisions, iteration keys, and configuration.
// ============================================================================
//! ## Overview
//! Validates stop-on-first-check, repeat-until-exhaustion with
//! iteration-suffixed artifacts, ordering operators, the legacy `equals`
//! rewrite, and rejection of invalid loop configurations.

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
use stepchain_core::ControlAction;
use stepchain_core::EngineError;
use stepchain_core::EngineRunner;
use stepchain_core::ExecuteRequest;
use stepchain_core::ProblemSpec;
use stepchain_core::StateStatus;
use stepchain_core::StopOperator;
use stepchain_core::Timestamp;
use stepchain_core::TraceId;
use stepchain_core::TraceRecord;
use stepchain_core::verify_trace_bytes;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn spec_with_settings(settings: serde_json::Value) -> ProblemSpec {
    serde_json::from_value(json!({
        "version": "1.0.0",
        "id": "req-loop-1",
        "created_at": "2026-02-02T00:00:00Z",
        "inputs": { "prompt": "Check loop behavior" },
        "settings": settings,
    }))
    .unwrap()
}

fn request(spec: ProblemSpec) -> ExecuteRequest {
    ExecuteRequest {
        problem_spec: spec,
        trace_id: TraceId::new("trace-loop-1"),
        now: Timestamp::parse("2026-02-02T00:00:00Z").unwrap(),
    }
}

fn step_names(records: &[TraceRecord]) -> Vec<&str> {
    records
        .iter()
        .filter_map(|record| match record {
            TraceRecord::Step(step) => Some(step.result.step.as_str()),
            _ => None,
        })
        .collect()
}

fn control_actions(records: &[TraceRecord]) -> Vec<ControlAction> {
    records
        .iter()
        .filter_map(|record| match record {
            TraceRecord::Control(control) => Some(control.action),
            _ => None,
        })
        .collect()
}

fn verification_loop(max_iterations: u64) -> serde_json::Value {
    json!({
        "loop": {
            "enabled": true,
            "start_step": "AcquireEvidence",
            "end_step": "Verify",
            "max_iterations": max_iterations,
            "stop_condition": {
                "path": "artifacts.verification.status",
                "operator": "equals",
                "value": "passed",
            },
        },
    })
}

// ============================================================================
// SECTION: Stop and Repeat
// ============================================================================

/// A satisfied condition on the first check emits exactly one stop record.
#[test]
fn loop_stops_on_first_check() {
    let result =
        EngineRunner::new().execute(&request(spec_with_settings(verification_loop(3)))).unwrap();

    assert_eq!(result.final_state.status, StateStatus::Completed);
    assert_eq!(
        step_names(&result.records),
        vec![
            "Normalize",
            "Decompose",
            "AcquireEvidence",
            "Compute",
            "Verify",
            "Synthesize",
            "Audit"
        ]
    );
    assert_eq!(control_actions(&result.records), vec![ControlAction::Stop]);
    let TraceRecord::Control(control) = &result.records[6] else {
        panic!("control record expected after the Verify step record");
    };
    assert_eq!(control.loop_iteration, 1);
    assert_eq!(control.stop_condition.operator, StopOperator::Equals);
    verify_trace_bytes(&result.trace_bytes).unwrap();
}

/// An unsatisfiable condition repeats the segment and then exhausts.
///
/// Exhaustion proceeds past the segment without failing the run; the
/// verification artifact carries the truth.
#[test]
fn loop_exhaustion_proceeds_without_failing() {
    let mut settings = verification_loop(3);
    settings["evidence_required"] = json!(true);
    let result = EngineRunner::new().execute(&request(spec_with_settings(settings))).unwrap();

    assert_eq!(
        step_names(&result.records),
        vec![
            "Normalize",
            "Decompose",
            "AcquireEvidence",
            "Compute",
            "Verify",
            "AcquireEvidence",
            "Compute",
            "Verify",
            "AcquireEvidence",
            "Compute",
            "Verify",
            "Synthesize",
            "Audit"
        ]
    );
    assert_eq!(
        control_actions(&result.records),
        vec![ControlAction::Repeat, ControlAction::Repeat, ControlAction::MaxIterationsReached]
    );
    assert_eq!(result.final_state.status, StateStatus::Completed);
    assert_eq!(
        result.final_state.artifacts["verification.iter.3"]["status"],
        json!("failed")
    );
    verify_trace_bytes(&result.trace_bytes).unwrap();
}

/// Iterations append under suffixed keys instead of overwriting.
#[test]
fn loop_iterations_preserve_append_only_artifacts() {
    let mut settings = verification_loop(2);
    settings["evidence_required"] = json!(true);
    let result = EngineRunner::new().execute(&request(spec_with_settings(settings))).unwrap();

    let artifacts = &result.final_state.artifacts;
    for key in ["evidence", "computation", "verification"] {
        assert!(artifacts.contains_key(key), "missing base key {key}");
        assert!(artifacts.contains_key(&format!("{key}.iter.2")), "missing iteration key {key}");
    }
    assert_eq!(
        result.final_state.latest_artifact("verification"),
        artifacts.get("verification.iter.2")
    );
}

/// Ordering operators evaluate integer artifact values.
#[test]
fn loop_stop_condition_ordering_operator() {
    let settings = json!({
        "loop": {
            "enabled": true,
            "start_step": "AcquireEvidence",
            "end_step": "Verify",
            "max_iterations": 2,
            "stop_condition": {
                "path": "artifacts.verification.checks.task_count",
                "operator": "gte",
                "value": 1,
            },
        },
    });
    let result = EngineRunner::new().execute(&request(spec_with_settings(settings))).unwrap();
    assert_eq!(result.final_state.status, StateStatus::Completed);
    assert_eq!(control_actions(&result.records), vec![ControlAction::Stop]);
}

/// The legacy `equals` field rewrites to the equals operator.
#[test]
fn loop_legacy_equals_is_rewritten() {
    let settings = json!({
        "loop": {
            "enabled": true,
            "start_step": "AcquireEvidence",
            "end_step": "Verify",
            "max_iterations": 2,
            "stop_condition": {
                "path": "artifacts.verification.status",
                "equals": "passed",
            },
        },
    });
    let result = EngineRunner::new().execute(&request(spec_with_settings(settings))).unwrap();
    let TraceRecord::Control(control) = &result.records[6] else {
        panic!("control record expected");
    };
    assert_eq!(control.action, ControlAction::Stop);
    assert_eq!(control.stop_condition.operator, StopOperator::Equals);
    assert_eq!(control.stop_condition.value, json!("passed"));
}

/// A disabled loop block executes the plain graph.
#[test]
fn disabled_loop_is_ignored() {
    let settings = json!({
        "loop": {
            "enabled": false,
            "start_step": "AcquireEvidence",
            "end_step": "Verify",
            "max_iterations": 2,
            "stop_condition": {
                "path": "artifacts.verification.status",
                "operator": "equals",
                "value": "passed",
            },
        },
    });
    let result = EngineRunner::new().execute(&request(spec_with_settings(settings))).unwrap();
    assert!(control_actions(&result.records).is_empty());
    assert_eq!(result.final_state.status, StateStatus::Completed);
}

// ============================================================================
// SECTION: Configuration Rejection
// ============================================================================

/// Combining legacy `equals` with `operator`/`value` is rejected.
#[test]
fn equals_conflict_rejected() {
    let settings = json!({
        "loop": {
            "enabled": true,
            "start_step": "AcquireEvidence",
            "end_step": "Verify",
            "max_iterations": 2,
            "stop_condition": {
                "path": "artifacts.verification.status",
                "equals": "passed",
                "operator": "equals",
            },
        },
    });
    let err = EngineRunner::new().execute(&request(spec_with_settings(settings))).unwrap_err();
    assert_eq!(err.code(), "stop_condition_invalid");
}

/// Paths outside the `artifacts.` root are rejected.
#[test]
fn stop_path_outside_artifacts_rejected() {
    let settings = json!({
        "loop": {
            "enabled": true,
            "start_step": "AcquireEvidence",
            "end_step": "Verify",
            "max_iterations": 2,
            "stop_condition": {
                "path": "metadata.trace_id",
                "operator": "equals",
                "value": "trace-loop-1",
            },
        },
    });
    let err = EngineRunner::new().execute(&request(spec_with_settings(settings))).unwrap_err();
    assert_eq!(err.code(), "stop_condition_invalid");
}

/// Ordering operators require an integer expected value.
#[test]
fn ordering_operator_requires_integer_value() {
    let settings = json!({
        "loop": {
            "enabled": true,
            "start_step": "AcquireEvidence",
            "end_step": "Verify",
            "max_iterations": 2,
            "stop_condition": {
                "path": "artifacts.verification.checks.task_count",
                "operator": "gte",
                "value": "one",
            },
        },
    });
    let err = EngineRunner::new().execute(&request(spec_with_settings(settings))).unwrap_err();
    assert_eq!(err.code(), "stop_condition_invalid");
}

/// A segment whose start follows its end is rejected.
#[test]
fn inverted_segment_rejected() {
    let settings = json!({
        "loop": {
            "enabled": true,
            "start_step": "Verify",
            "end_step": "AcquireEvidence",
            "max_iterations": 2,
            "stop_condition": {
                "path": "artifacts.verification.status",
                "operator": "equals",
                "value": "passed",
            },
        },
    });
    let err = EngineRunner::new().execute(&request(spec_with_settings(settings))).unwrap_err();
    assert_eq!(err.code(), "loop_config_invalid");
}

/// `max_steps` below the loop expansion is rejected.
#[test]
fn max_steps_below_loop_expansion_rejected() {
    let mut settings = verification_loop(2);
    settings["max_steps"] = json!(5);
    let err = EngineRunner::new().execute(&request(spec_with_settings(settings))).unwrap_err();
    assert!(matches!(err, EngineError::MaxStepsTooLow { .. }));
    assert_eq!(err.code(), "schema_invalid");
}
