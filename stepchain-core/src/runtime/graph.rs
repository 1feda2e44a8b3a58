// stepchain-core/src/runtime/graph.rs
// ============================================================================
// Module: Stepchain Execution Graph
// Description: Static, acyclic step ordering for one run.
// Purpose: Freeze the topological order steps execute in.
// Dependencies: crate::core::result
// ============================================================================

//! ## Overview
//! The execution graph is a fixed linear ordering of registered step names.
//! The ordering is frozen per engine version; adding a step is a MAJOR
//! change. The loop controller addresses segments of this ordering by index.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::result::StepName;

// ============================================================================
// SECTION: Standard Ordering
// ============================================================================

/// The standard seven-step ordering.
pub const STANDARD_STEPS: [StepName; 7] = [
    StepName::Normalize,
    StepName::Decompose,
    StepName::AcquireEvidence,
    StepName::Compute,
    StepName::Verify,
    StepName::Synthesize,
    StepName::Audit,
];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Execution graph construction errors.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Graph contains no steps.
    #[error("execution graph must contain at least one step")]
    Empty,
    /// A step appears more than once.
    #[error("duplicate step in execution graph: {0}")]
    DuplicateStep(StepName),
}

impl GraphError {
    /// Stable taxonomy code for this error family.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        "schema_invalid"
    }
}

// ============================================================================
// SECTION: Execution Graph
// ============================================================================

/// Deterministic execution graph with a fixed linear order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionGraph {
    /// Steps in execution order.
    steps: Vec<StepName>,
}

impl ExecutionGraph {
    /// Builds a graph from an ordered step list.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] when the list is empty or repeats a step.
    pub fn new(steps: Vec<StepName>) -> Result<Self, GraphError> {
        if steps.is_empty() {
            return Err(GraphError::Empty);
        }
        for (position, step) in steps.iter().enumerate() {
            if steps.iter().skip(position + 1).any(|other| other == step) {
                return Err(GraphError::DuplicateStep(*step));
            }
        }
        Ok(Self {
            steps,
        })
    }

    /// Returns the standard seven-step graph.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            steps: STANDARD_STEPS.to_vec(),
        }
    }

    /// Returns the steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepName] {
        &self.steps
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true when the graph has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the step at an execution index.
    #[must_use]
    pub fn step_at(&self, index: usize) -> Option<StepName> {
        self.steps.get(index).copied()
    }

    /// Returns the index following the given one, when in bounds.
    #[must_use]
    pub fn next(&self, index: usize) -> Option<usize> {
        let next = index.checked_add(1)?;
        (next < self.steps.len()).then_some(next)
    }

    /// Returns the execution index of a step.
    #[must_use]
    pub fn index_of(&self, step: StepName) -> Option<usize> {
        self.steps.iter().position(|candidate| *candidate == step)
    }
}
