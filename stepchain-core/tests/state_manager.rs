// stepchain-core/tests/state_manager.rs
// ============================================================================
// Module: State Manager Tests
// Description: Tests for result application and state invariants.
// ============================================================================
//! ## Overview
//! Validates application semantics per result status, overwrite refusal,
//! terminal freezing, clock discipline, and transition checking.

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
use stepchain_core::ErrorEntry;
use stepchain_core::ProblemSpec;
use stepchain_core::ReasoningState;
use stepchain_core::StateStatus;
use stepchain_core::StepName;
use stepchain_core::StepResult;
use stepchain_core::StepStatus;
use stepchain_core::Timestamp;
use stepchain_core::TraceId;
use stepchain_core::runtime::StateError;
use stepchain_core::runtime::apply;
use stepchain_core::runtime::artifact_key;
use stepchain_core::runtime::build_step_result;
use stepchain_core::runtime::check_transition;
use stepchain_core::runtime::mark_completed;
use stepchain_core::runtime::mark_failed;
use stepchain_core::runtime::transition_running;
use stepchain_core::runtime::validate_invariants;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn ts(value: &str) -> Timestamp {
    Timestamp::parse(value).unwrap()
}

fn seed() -> Timestamp {
    ts("2026-02-02T00:00:00Z")
}

fn running_state() -> ReasoningState {
    let spec: ProblemSpec = serde_json::from_value(json!({
        "version": "1.0.0",
        "id": "req-1",
        "created_at": "2026-02-02T00:00:00Z",
        "inputs": { "prompt": "Hello", "constraints": ["stay deterministic"] },
    }))
    .unwrap();
    let initial = ReasoningState::initial(spec, TraceId::new("trace-1"), seed());
    transition_running(&initial, seed().plus_seconds(1)).unwrap()
}

fn success_result(step: StepName, at: Timestamp) -> StepResult {
    build_step_result(
        step,
        StepStatus::Success,
        &json!({"in": 1}),
        Some(json!({"out": 1})),
        None,
        at,
        at.plus_seconds(1),
    )
    .unwrap()
}

// ============================================================================
// SECTION: Application Semantics
// ============================================================================

/// Success appends the artifact, bumps the index, and advances the clock.
#[test]
fn apply_success_appends_artifact() {
    let state = running_state();
    let result = success_result(StepName::Normalize, seed().plus_seconds(2));
    let next = apply(&state, &result, seed().plus_seconds(4), None).unwrap();

    assert_eq!(next.step_index, 1);
    assert_eq!(next.status, StateStatus::Running);
    assert_eq!(next.artifacts.get("normalized"), Some(&json!({"out": 1})));
    assert!(next.metadata.updated_at > state.metadata.updated_at);
    check_transition(&state, &next).unwrap();
    validate_invariants(&next).unwrap();
}

/// Failure appends attributed errors and freezes the state.
#[test]
fn apply_failure_freezes_state() {
    let state = running_state();
    let result = build_step_result(
        StepName::Verify,
        StepStatus::Failed,
        &json!({}),
        None,
        Some(vec![ErrorEntry::new("collaborator_timeout", "evidence fetch timed out")]),
        seed().plus_seconds(2),
        seed().plus_seconds(3),
    )
    .unwrap();
    let next = apply(&state, &result, seed().plus_seconds(4), None).unwrap();

    assert_eq!(next.status, StateStatus::Failed);
    assert_eq!(next.step_index, state.step_index);
    assert_eq!(next.errors.len(), 1);
    assert_eq!(next.errors[0].step, Some(StepName::Verify));

    // Terminal states refuse further application.
    let late = success_result(StepName::Synthesize, seed().plus_seconds(5));
    let err = apply(&next, &late, seed().plus_seconds(7), None).unwrap_err();
    assert!(matches!(err, StateError::TerminalStatus(_)));
    assert_eq!(err.code(), "state_invariant_violation");
}

/// Skipped bumps the index without touching artifacts.
#[test]
fn apply_skipped_increments_index_only() {
    let state = running_state();
    let result = build_step_result(
        StepName::Compute,
        StepStatus::Skipped,
        &json!({}),
        None,
        None,
        seed().plus_seconds(2),
        seed().plus_seconds(2),
    )
    .unwrap();
    let next = apply(&state, &result, seed().plus_seconds(3), None).unwrap();
    assert_eq!(next.step_index, 1);
    assert!(next.artifacts.is_empty());
}

/// Overwrite attempts raise `artifact_overwrite` and leave state unchanged.
#[test]
fn apply_refuses_artifact_overwrite() {
    let state = running_state();
    let first = success_result(StepName::Normalize, seed().plus_seconds(2));
    let applied = apply(&state, &first, seed().plus_seconds(4), None).unwrap();

    let again = success_result(StepName::Normalize, seed().plus_seconds(5));
    let snapshot = applied.clone();
    let err = apply(&applied, &again, seed().plus_seconds(7), None).unwrap_err();
    assert_eq!(err.code(), "artifact_overwrite");
    assert_eq!(applied, snapshot);
}

/// A clock reading that does not advance `updated_at` is refused.
#[test]
fn apply_requires_advancing_clock() {
    let state = running_state();
    let result = success_result(StepName::Normalize, seed().plus_seconds(2));
    let err = apply(&state, &result, state.metadata.updated_at, None).unwrap_err();
    assert!(matches!(err, StateError::ClockNotAdvanced));
}

// ============================================================================
// SECTION: Iteration Keys
// ============================================================================

/// Loop iterations tag artifact keys from the second pass onward.
#[test]
fn iteration_tagging_preserves_append_only_keys() {
    assert_eq!(artifact_key(StepName::Verify, None), "verification");
    assert_eq!(artifact_key(StepName::Verify, Some(1)), "verification");
    assert_eq!(artifact_key(StepName::Verify, Some(2)), "verification.iter.2");

    let state = running_state();
    let first = success_result(StepName::Verify, seed().plus_seconds(2));
    let applied = apply(&state, &first, seed().plus_seconds(4), None).unwrap();
    let second = success_result(StepName::Verify, seed().plus_seconds(5));
    let next = apply(&applied, &second, seed().plus_seconds(7), Some(2)).unwrap();

    assert!(next.artifacts.contains_key("verification"));
    assert!(next.artifacts.contains_key("verification.iter.2"));
    assert_eq!(next.latest_artifact("verification"), next.artifacts.get("verification.iter.2"));
}

// ============================================================================
// SECTION: Lifecycle and Transition Checks
// ============================================================================

/// The pending-to-running-to-completed path is the only happy path.
#[test]
fn lifecycle_transitions_are_gated() {
    let state = running_state();
    let completed = mark_completed(&state, seed().plus_seconds(2)).unwrap();
    assert_eq!(completed.status, StateStatus::Completed);

    let err = mark_completed(&completed, seed().plus_seconds(3)).unwrap_err();
    assert!(matches!(err, StateError::InvalidTransition { .. }));

    let err = mark_failed(&completed, ErrorEntry::new("cancelled", "late"), seed().plus_seconds(3))
        .unwrap_err();
    assert!(matches!(err, StateError::TerminalStatus(_)));
}

/// Transition checking catches index regression and artifact mutation.
#[test]
fn check_transition_catches_violations() {
    let state = running_state();
    let result = success_result(StepName::Normalize, seed().plus_seconds(2));
    let next = apply(&state, &result, seed().plus_seconds(4), None).unwrap();

    let mut regressed = state.clone();
    regressed.step_index = 5;
    let err = check_transition(&regressed, &next).unwrap_err();
    assert!(matches!(err, StateError::StepIndexRegression { .. }));

    let mut mutated = next.clone();
    mutated.artifacts.insert("normalized".to_string(), json!({"out": "changed"}));
    mutated.metadata.updated_at = next.metadata.updated_at.plus_seconds(1);
    let err = check_transition(&next, &mutated).unwrap_err();
    assert!(matches!(err, StateError::ArtifactMutation { .. }));

    let mut truncated = next.clone();
    truncated.errors.clear();
    let failed = mark_failed(&next, ErrorEntry::new("cancelled", "stop"), next.metadata.updated_at.plus_seconds(1)).unwrap();
    truncated.metadata.updated_at = failed.metadata.updated_at.plus_seconds(1);
    let err = check_transition(&failed, &truncated).unwrap_err();
    assert!(matches!(err, StateError::ErrorHistoryTruncated));
}

/// A failed state without errors violates the invariants.
#[test]
fn failed_state_requires_errors() {
    let mut state = running_state();
    state.status = StateStatus::Failed;
    let err = validate_invariants(&state).unwrap_err();
    assert!(matches!(err, StateError::MissingErrors));
}
