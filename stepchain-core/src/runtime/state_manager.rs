// stepchain-core/src/runtime/state_manager.rs
// ============================================================================
// Module: Stepchain State Manager
// Description: Applies validated step results under append-only invariants.
// Purpose: Own every reasoning-state mutation in the engine.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The state manager is the only code that produces a new reasoning state
//! from a prior one. Application is by value: the prior state is never
//! touched, so a refused mutation leaves it unchanged. Refusals cover
//! artifact overwrites, step-index regression, terminal-status mutation, and
//! a clock reading that fails to advance `updated_at`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::ErrorEntry;
use crate::core::ReasoningState;
use crate::core::StateStatus;
use crate::core::StepName;
use crate::core::StepResult;
use crate::core::StepStatus;
use crate::core::Timestamp;
use crate::core::spec::parse_semver;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// State mutation and invariant errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// An artifact key would be overwritten.
    #[error("artifact key already present: {key}")]
    ArtifactOverwrite {
        /// Key that already holds an artifact.
        key: String,
    },
    /// A mutation was attempted on a terminal state.
    #[error("state is terminal ({0:?}) and cannot be mutated")]
    TerminalStatus(StateStatus),
    /// `step_index` would decrease.
    #[error("step_index regression: {prev} -> {next}")]
    StepIndexRegression {
        /// Prior step index.
        prev: u64,
        /// Proposed step index.
        next: u64,
    },
    /// The clock reading does not advance `updated_at`.
    #[error("updated_at must strictly advance")]
    ClockNotAdvanced,
    /// A previously stored artifact changed or disappeared.
    #[error("prior artifact mutated: {key}")]
    ArtifactMutation {
        /// Key whose value changed or vanished.
        key: String,
    },
    /// The error history lost entries.
    #[error("error history is append-only")]
    ErrorHistoryTruncated,
    /// Illegal status transition.
    #[error("illegal status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Prior status.
        from: StateStatus,
        /// Proposed status.
        to: StateStatus,
    },
    /// A successful result carried no output.
    #[error("successful result for {0} carried no output")]
    MissingOutput(StepName),
    /// A failed state holds no error entries.
    #[error("failed state must carry at least one error")]
    MissingErrors,
    /// State version is not a semantic version.
    #[error("state version is not a semantic version: {0}")]
    InvalidVersion(String),
}

impl StateError {
    /// Stable taxonomy code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ArtifactOverwrite {
                ..
            } => "artifact_overwrite",
            _ => "state_invariant_violation",
        }
    }
}

// ============================================================================
// SECTION: Artifact Keys
// ============================================================================

/// Returns the artifact key for a step, iteration-suffixed inside loops.
///
/// The first pass through a loop segment writes the base key; re-executions
/// (iteration ≥ 2) write `<base>.iter.<n>` to preserve append-only history.
#[must_use]
pub fn artifact_key(step: StepName, iteration: Option<u64>) -> String {
    match iteration {
        Some(iteration) if iteration >= 2 => format!("{}.iter.{iteration}", step.artifact_key()),
        _ => step.artifact_key().to_string(),
    }
}

// ============================================================================
// SECTION: Application
// ============================================================================

/// Applies a validated step result, producing the next state.
///
/// # Errors
///
/// Returns [`StateError`] when the mutation would violate an invariant; the
/// prior state is left unchanged.
pub fn apply(
    prev: &ReasoningState,
    result: &StepResult,
    now: Timestamp,
    iteration: Option<u64>,
) -> Result<ReasoningState, StateError> {
    if prev.status.is_terminal() {
        return Err(StateError::TerminalStatus(prev.status));
    }
    if now <= prev.metadata.updated_at {
        return Err(StateError::ClockNotAdvanced);
    }

    let mut next = prev.clone();
    match result.status {
        StepStatus::Success => {
            let key = artifact_key(result.step, iteration);
            if next.artifacts.contains_key(&key) {
                return Err(StateError::ArtifactOverwrite {
                    key,
                });
            }
            let Some(output) = &result.output else {
                return Err(StateError::MissingOutput(result.step));
            };
            next.artifacts.insert(key, output.clone());
            next.step_index += 1;
            next.status = StateStatus::Running;
        }
        StepStatus::Failed => {
            for entry in result.errors.as_deref().unwrap_or_default() {
                let mut entry = entry.clone();
                entry.step.get_or_insert(result.step);
                next.errors.push(entry);
            }
            next.status = StateStatus::Failed;
        }
        StepStatus::Skipped => {
            next.step_index += 1;
        }
    }
    next.metadata.updated_at = now;
    Ok(next)
}

// ============================================================================
// SECTION: Lifecycle Transitions
// ============================================================================

/// Transitions a pending state to running.
///
/// # Errors
///
/// Returns [`StateError`] when the state is not pending or the clock did not
/// advance.
pub fn transition_running(state: &ReasoningState, now: Timestamp) -> Result<ReasoningState, StateError> {
    if state.status != StateStatus::Pending {
        return Err(StateError::InvalidTransition {
            from: state.status,
            to: StateStatus::Running,
        });
    }
    if now <= state.metadata.updated_at {
        return Err(StateError::ClockNotAdvanced);
    }
    let mut next = state.clone();
    next.status = StateStatus::Running;
    next.metadata.updated_at = now;
    Ok(next)
}

/// Transitions a running state to completed.
///
/// # Errors
///
/// Returns [`StateError`] when the state is not running or the clock did not
/// advance.
pub fn mark_completed(state: &ReasoningState, now: Timestamp) -> Result<ReasoningState, StateError> {
    if state.status != StateStatus::Running {
        return Err(StateError::InvalidTransition {
            from: state.status,
            to: StateStatus::Completed,
        });
    }
    if now <= state.metadata.updated_at {
        return Err(StateError::ClockNotAdvanced);
    }
    let mut next = state.clone();
    next.status = StateStatus::Completed;
    next.metadata.updated_at = now;
    Ok(next)
}

/// Appends an error entry and freezes the state as failed.
///
/// # Errors
///
/// Returns [`StateError`] when the state already completed or the clock did
/// not advance.
pub fn mark_failed(
    state: &ReasoningState,
    entry: ErrorEntry,
    now: Timestamp,
) -> Result<ReasoningState, StateError> {
    if state.status == StateStatus::Completed {
        return Err(StateError::TerminalStatus(state.status));
    }
    if now <= state.metadata.updated_at {
        return Err(StateError::ClockNotAdvanced);
    }
    let mut next = state.clone();
    next.errors.push(entry);
    next.status = StateStatus::Failed;
    next.metadata.updated_at = now;
    Ok(next)
}

// ============================================================================
// SECTION: Invariant Validation
// ============================================================================

/// Validates the standalone invariants of a state value.
///
/// # Errors
///
/// Returns [`StateError`] on the first violated invariant.
pub fn validate_invariants(state: &ReasoningState) -> Result<(), StateError> {
    if parse_semver(&state.version).is_none() {
        return Err(StateError::InvalidVersion(state.version.clone()));
    }
    if state.status == StateStatus::Failed && state.errors.is_empty() {
        return Err(StateError::MissingErrors);
    }
    if state.metadata.updated_at < state.metadata.created_at {
        return Err(StateError::ClockNotAdvanced);
    }
    Ok(())
}

/// Validates the transition discipline between two state values.
///
/// # Errors
///
/// Returns [`StateError`] when monotonicity, append-only history, or status
/// legality is violated.
pub fn check_transition(prev: &ReasoningState, next: &ReasoningState) -> Result<(), StateError> {
    if next.step_index < prev.step_index {
        return Err(StateError::StepIndexRegression {
            prev: prev.step_index,
            next: next.step_index,
        });
    }
    for (key, value) in &prev.artifacts {
        if next.artifacts.get(key) != Some(value) {
            return Err(StateError::ArtifactMutation {
                key: key.clone(),
            });
        }
    }
    if next.errors.len() < prev.errors.len()
        || next.errors[..prev.errors.len()] != prev.errors[..]
    {
        return Err(StateError::ErrorHistoryTruncated);
    }
    let legal = matches!(
        (prev.status, next.status),
        (StateStatus::Pending, StateStatus::Pending | StateStatus::Running | StateStatus::Failed)
            | (
                StateStatus::Running,
                StateStatus::Running | StateStatus::Completed | StateStatus::Failed
            )
    ) || prev.status == next.status;
    if !legal {
        return Err(StateError::InvalidTransition {
            from: prev.status,
            to: next.status,
        });
    }
    if next.metadata.updated_at <= prev.metadata.updated_at {
        return Err(StateError::ClockNotAdvanced);
    }
    Ok(())
}
