// stepchain-core/tests/artifact.rs
// ============================================================================
// Module: Typed Artifact Tests
// Description: Tests for construction-checked artifact payloads.
// ============================================================================
//! ## Overview
//! Validates that derived fields are fixed at construction, that payloads
//! expose their step and canonical key, and that wire forms are stable.

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
use stepchain_core::ArtifactPayload;
use stepchain_core::ComputationOutput;
use stepchain_core::DecompositionOutput;
use stepchain_core::EvidenceOutput;
use stepchain_core::NormalizedOutput;
use stepchain_core::StepName;
use stepchain_core::VerificationChecks;
use stepchain_core::VerificationOutput;
use stepchain_core::VerificationPathOutcome;
use stepchain_core::VerificationStatus;

// ============================================================================
// SECTION: Construction Invariants
// ============================================================================

/// Evidence counts are derived from the entries and cannot drift.
#[test]
fn evidence_count_matches_entries() {
    let payload = EvidenceOutput::new(vec![json!({"source": "a"}), json!({"source": "b"})], true);
    assert_eq!(payload.evidence_count, 2);
    assert_eq!(
        payload.to_value().unwrap(),
        json!({
            "evidence": [{"source": "a"}, {"source": "b"}],
            "evidence_required": true,
            "evidence_count": 2,
        })
    );
}

/// Normalization collapses interior whitespace at construction.
#[test]
fn normalized_output_collapses_whitespace() {
    let payload = NormalizedOutput::from_prompt("  a \t b\n c  ");
    assert_eq!(payload.normalized_prompt, "a b c");
}

/// Decomposition filters blank goals and falls back to the prompt.
#[test]
fn decomposition_filters_and_falls_back() {
    let from_goals =
        DecompositionOutput::derive(&["one".to_string(), "  ".to_string()], "prompt");
    assert_eq!(from_goals.tasks, vec!["one"]);

    let from_prompt = DecompositionOutput::derive(&[], "prompt");
    assert_eq!(from_prompt.tasks, vec!["prompt"]);

    let fallback = DecompositionOutput::derive(&[], "   ");
    assert_eq!(fallback.tasks, vec!["unspecified task"]);
}

/// The verification aggregate is computed from its parts.
#[test]
fn verification_aggregate_cannot_drift() {
    let passing = VerificationChecks {
        tasks_present: true,
        task_count: 2,
        evidence_present: true,
        evidence_required: true,
    };
    let failing = VerificationChecks {
        evidence_present: false,
        ..passing
    };

    let payload = VerificationOutput::compose(vec![
        VerificationPathOutcome::evaluate("basic", passing),
        VerificationPathOutcome::evaluate("evidence-backed", failing),
    ]);
    assert_eq!(payload.status(), VerificationStatus::Failed);

    let VerificationOutput::Composed {
        aggregate, ..
    } = &payload
    else {
        panic!("composed form expected");
    };
    assert_eq!(aggregate.total, 2);
    assert_eq!(aggregate.failed_count, 1);
}

/// The single-check form derives its status from the checks.
#[test]
fn verification_single_derives_status() {
    let checks = VerificationChecks {
        tasks_present: true,
        task_count: 1,
        evidence_present: false,
        evidence_required: false,
    };
    let payload = VerificationOutput::single(checks);
    assert_eq!(payload.status(), VerificationStatus::Passed);
    assert_eq!(
        payload.to_value().unwrap(),
        json!({
            "checks": {
                "tasks_present": true,
                "task_count": 1,
                "evidence_present": false,
                "evidence_required": false,
            },
            "status": "passed",
        })
    );
}

// ============================================================================
// SECTION: Capability Surface
// ============================================================================

/// Payloads expose their producing step and canonical key.
#[test]
fn payloads_expose_step_and_key() {
    assert_eq!(ComputationOutput::STEP, StepName::Compute);
    assert_eq!(ComputationOutput::base_key(), "computation");
    assert_eq!(NormalizedOutput::base_key(), "normalized");
    assert_eq!(VerificationOutput::base_key(), "verification");

    let payload = ComputationOutput::completed(3);
    assert_eq!(payload.status, "ok");
    assert_eq!(payload.canonical_hash().unwrap().len(), 64);
}
