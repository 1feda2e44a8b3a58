// stepchain-core/src/core/state.rs
// ============================================================================
// Module: Stepchain Reasoning State
// Description: Append-only run state owned by the state manager.
// Purpose: Define the state value whose hashes anchor every trace record.
// Dependencies: crate::core::{canonical, identifiers, result, spec, time}, serde
// ============================================================================

//! ## Overview
//! The reasoning state is the single mutable value of a run. Artifacts are
//! append-only per key, errors are never removed, `step_index` never
//! decreases, and `updated_at` strictly advances on every mutation. Loop
//! iterations append under iteration-suffixed keys (`<name>.iter.<n>`)
//! instead of overwriting; [`ReasoningState::latest_artifact`] resolves the
//! most recent value for a step's base key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::canonical::CanonicalError;
use crate::core::canonical::hash_canonical_json;
use crate::core::identifiers::TraceId;
use crate::core::result::ErrorEntry;
use crate::core::spec::ProblemSpec;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: State Status
// ============================================================================

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStatus {
    /// Constructed but not yet running.
    Pending,
    /// Actively executing steps.
    Running,
    /// Terminal failure.
    Failed,
    /// Terminal success.
    Completed,
}

impl StateStatus {
    /// Returns true for terminal statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Completed)
    }
}

// ============================================================================
// SECTION: State Metadata
// ============================================================================

/// Run metadata carried inside the reasoning state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMetadata {
    /// Trace identifier binding state to its trace.
    pub trace_id: TraceId,
    /// Routing policy selector, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_profile: Option<String>,
    /// Model profile, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_profile: Option<String>,
    /// State creation time (deterministic clock seed).
    pub created_at: Timestamp,
    /// Last mutation time; strictly advances.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Reasoning State
// ============================================================================

/// Schema version of reasoning states.
pub const STATE_VERSION: &str = "1.0.0";

/// Append-only run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningState {
    /// State schema version.
    pub version: String,
    /// Immutable copy of the problem specification.
    pub problem: ProblemSpec,
    /// Count of applied step results; strictly monotonic.
    pub step_index: u64,
    /// Lifecycle status.
    pub status: StateStatus,
    /// Artifact records keyed by canonical step key.
    pub artifacts: BTreeMap<String, Value>,
    /// Recorded assumptions.
    pub assumptions: Vec<String>,
    /// Active constraints (seeded from the problem inputs).
    pub constraints: Vec<String>,
    /// Append-only error history.
    pub errors: Vec<ErrorEntry>,
    /// Run metadata.
    pub metadata: StateMetadata,
}

impl ReasoningState {
    /// Constructs the initial pending state for a problem.
    #[must_use]
    pub fn initial(problem: ProblemSpec, trace_id: TraceId, now: Timestamp) -> Self {
        let constraints = problem.inputs.constraints.clone().unwrap_or_default();
        let (policy_profile, model_profile) = problem.settings.as_ref().map_or((None, None), |settings| {
            (settings.policy_profile.clone(), settings.model_profile.clone())
        });
        Self {
            version: STATE_VERSION.to_string(),
            problem,
            step_index: 0,
            status: StateStatus::Pending,
            artifacts: BTreeMap::new(),
            assumptions: Vec::new(),
            constraints,
            errors: Vec::new(),
            metadata: StateMetadata {
                trace_id,
                policy_profile,
                model_profile,
                created_at: now,
                updated_at: now,
            },
        }
    }

    /// Computes the canonical hash of this state.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] when canonical encoding fails.
    pub fn canonical_hash(&self) -> Result<String, CanonicalError> {
        hash_canonical_json(self)
    }

    /// Returns the artifact stored under an exact key.
    #[must_use]
    pub fn artifact(&self, key: &str) -> Option<&Value> {
        self.artifacts.get(key)
    }

    /// Returns the most recent artifact for a base key.
    ///
    /// Loop iterations append under `<base>.iter.<n>`; the highest iteration
    /// wins, falling back to the untagged base key.
    #[must_use]
    pub fn latest_artifact(&self, base: &str) -> Option<&Value> {
        let prefix = format!("{base}.iter.");
        let mut best: Option<(u64, &Value)> = None;
        for (key, value) in &self.artifacts {
            if let Some(suffix) = key.strip_prefix(&prefix)
                && let Ok(iteration) = suffix.parse::<u64>()
                && best.is_none_or(|(current, _)| iteration > current)
            {
                best = Some((iteration, value));
            }
        }
        best.map(|(_, value)| value).or_else(|| self.artifacts.get(base))
    }
}
