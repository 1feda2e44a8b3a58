// stepchain-core/tests/graph.rs
// ============================================================================
// Module: Execution Graph Tests
// Description: Tests for the fixed step ordering and routing policies.
// ============================================================================
//! ## Overview
//! Validates the frozen standard ordering, index navigation, duplicate
//! rejection, and policy-profile resolution.

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
use stepchain_core::ProblemSpec;
use stepchain_core::StepName;
use stepchain_core::runtime::ExecutionGraph;
use stepchain_core::runtime::GraphError;
use stepchain_core::runtime::PolicyRegistry;
use stepchain_core::runtime::RoutingPolicy;

// ============================================================================
// SECTION: Graph Ordering
// ============================================================================

/// The standard ordering is frozen.
#[test]
fn standard_ordering_is_frozen() {
    let graph = ExecutionGraph::standard();
    assert_eq!(
        graph.steps(),
        [
            StepName::Normalize,
            StepName::Decompose,
            StepName::AcquireEvidence,
            StepName::Compute,
            StepName::Verify,
            StepName::Synthesize,
            StepName::Audit,
        ]
    );
}

/// Index navigation walks the graph and stops at the end.
#[test]
fn next_walks_to_the_terminal_step() {
    let graph = ExecutionGraph::standard();
    assert_eq!(graph.next(0), Some(1));
    assert_eq!(graph.next(graph.len() - 1), None);
    assert_eq!(graph.index_of(StepName::Verify), Some(4));
    assert_eq!(graph.step_at(6), Some(StepName::Audit));
    assert_eq!(graph.step_at(7), None);
}

/// Duplicate steps and empty orderings are rejected.
#[test]
fn invalid_orderings_rejected() {
    let err = ExecutionGraph::new(vec![]).unwrap_err();
    assert!(matches!(err, GraphError::Empty));

    let err =
        ExecutionGraph::new(vec![StepName::Normalize, StepName::Normalize]).unwrap_err();
    assert!(matches!(err, GraphError::DuplicateStep(StepName::Normalize)));
}

// ============================================================================
// SECTION: Routing Policies
// ============================================================================

/// The default registry resolves unprofiled specs to the standard graph.
#[test]
fn default_policy_resolves_standard_graph() {
    let spec: ProblemSpec = serde_json::from_value(json!({
        "version": "1.0.0",
        "id": "req-1",
        "created_at": "2026-02-02T00:00:00Z",
        "inputs": { "prompt": "Hello" },
    }))
    .unwrap();
    let graph = PolicyRegistry::default().resolve(&spec).unwrap();
    assert_eq!(graph.len(), 7);
}

/// A registered profile selects its own ordering.
#[test]
fn custom_policy_profile_selects_ordering() {
    let mut registry = PolicyRegistry::default();
    registry
        .register(RoutingPolicy {
            name: "triage".to_string(),
            steps: vec![StepName::Normalize, StepName::Decompose, StepName::Audit],
        })
        .unwrap();

    let spec: ProblemSpec = serde_json::from_value(json!({
        "version": "1.0.0",
        "id": "req-1",
        "created_at": "2026-02-02T00:00:00Z",
        "inputs": { "prompt": "Hello" },
        "settings": { "policy_profile": "triage" },
    }))
    .unwrap();
    let graph = registry.resolve(&spec).unwrap();
    assert_eq!(graph.steps(), [StepName::Normalize, StepName::Decompose, StepName::Audit]);

    // Re-registering the same name is refused.
    let err = registry.register(RoutingPolicy {
        name: "triage".to_string(),
        steps: vec![StepName::Normalize],
    });
    assert!(err.is_err());
}
