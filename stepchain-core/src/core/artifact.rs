// stepchain-core/src/core/artifact.rs
// ============================================================================
// Module: Stepchain Typed Artifacts
// Description: Construction-checked artifact payloads, tagged per step.
// Purpose: Make artifact invariants checkable where the value is built.
// Dependencies: crate::core::{canonical, identifiers, result, time}, serde
// ============================================================================

//! ## Overview
//! Every step produces a typed payload rather than an untyped mapping:
//! derived fields (counts, aggregates, pass signals) are computed by the
//! constructors, so an inconsistent artifact cannot be built. The shared
//! [`ArtifactPayload`] capability supplies the producing step, its canonical
//! state key, and canonical encoding. Payloads serialize to the wire form
//! stored in `ReasoningState.artifacts` and hashed into step results.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::canonical::CanonicalError;
use crate::core::canonical::hash_canonical_json;
use crate::core::identifiers::RequestId;
use crate::core::result::StepName;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Artifact Capability
// ============================================================================

/// Shared capability of all typed artifact payloads.
pub trait ArtifactPayload: Serialize {
    /// Step that produces this artifact.
    const STEP: StepName;

    /// Canonical base key in the state's artifact mapping.
    #[must_use]
    fn base_key() -> &'static str {
        Self::STEP.artifact_key()
    }

    /// Wire-form JSON value stored in the state.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] when the payload cannot be represented.
    fn to_value(&self) -> Result<Value, CanonicalError> {
        serde_json::to_value(self).map_err(|err| CanonicalError::Serialize(err.to_string()))
    }

    /// Canonical hash of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] when canonical encoding fails.
    fn canonical_hash(&self) -> Result<String, CanonicalError> {
        hash_canonical_json(self)
    }
}

// ============================================================================
// SECTION: Normalize / Decompose Payloads
// ============================================================================

/// Output of the Normalize step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedOutput {
    /// Prompt with whitespace runs collapsed to single spaces.
    pub normalized_prompt: String,
}

impl NormalizedOutput {
    /// Normalizes a raw prompt.
    #[must_use]
    pub fn from_prompt(prompt: &str) -> Self {
        let collapsed: Vec<&str> = prompt.split_whitespace().collect();
        Self {
            normalized_prompt: collapsed.join(" "),
        }
    }
}

impl ArtifactPayload for NormalizedOutput {
    const STEP: StepName = StepName::Normalize;
}

/// Output of the Decompose step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompositionOutput {
    /// Deterministic task list.
    pub tasks: Vec<String>,
}

impl DecompositionOutput {
    /// Derives tasks from goals, falling back to the base prompt.
    #[must_use]
    pub fn derive(goals: &[String], base_prompt: &str) -> Self {
        let mut tasks: Vec<String> =
            goals.iter().filter(|goal| !goal.trim().is_empty()).cloned().collect();
        if tasks.is_empty() {
            if base_prompt.trim().is_empty() {
                tasks.push("unspecified task".to_string());
            } else {
                tasks.push(base_prompt.to_string());
            }
        }
        Self {
            tasks,
        }
    }
}

impl ArtifactPayload for DecompositionOutput {
    const STEP: StepName = StepName::Decompose;
}

// ============================================================================
// SECTION: Evidence / Computation Payloads
// ============================================================================

/// Output of the AcquireEvidence step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceOutput {
    /// Evidence entries from the problem context.
    pub evidence: Vec<Value>,
    /// Whether verification requires evidence by default.
    pub evidence_required: bool,
    /// Entry count; always consistent with `evidence`.
    pub evidence_count: u64,
}

impl EvidenceOutput {
    /// Builds the payload with a count derived from the entries.
    #[must_use]
    pub fn new(evidence: Vec<Value>, evidence_required: bool) -> Self {
        let evidence_count = evidence.len() as u64;
        Self {
            evidence,
            evidence_required,
            evidence_count,
        }
    }
}

impl ArtifactPayload for EvidenceOutput {
    const STEP: StepName = StepName::AcquireEvidence;
}

/// Output of the Compute step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationOutput {
    /// Number of tasks the computation covered.
    pub task_count: u64,
    /// Computation status marker.
    pub status: String,
}

impl ComputationOutput {
    /// Builds a completed computation over the given task count.
    #[must_use]
    pub fn completed(task_count: u64) -> Self {
        Self {
            task_count,
            status: "ok".to_string(),
        }
    }
}

impl ArtifactPayload for ComputationOutput {
    const STEP: StepName = StepName::Compute;
}

// ============================================================================
// SECTION: Verification Payloads
// ============================================================================

/// Aggregate verification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// All required checks passed.
    Passed,
    /// At least one required check failed.
    Failed,
}

/// Check signals evaluated for one verification path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationChecks {
    /// Whether decomposition produced any tasks.
    pub tasks_present: bool,
    /// Number of decomposed tasks.
    pub task_count: u64,
    /// Whether any evidence was acquired.
    pub evidence_present: bool,
    /// Whether this path requires evidence.
    pub evidence_required: bool,
}

impl VerificationChecks {
    /// Returns the pass signal implied by the checks.
    #[must_use]
    pub const fn passed(self) -> bool {
        self.tasks_present && (!self.evidence_required || self.evidence_present)
    }

    /// Returns the status implied by the checks.
    #[must_use]
    pub const fn status(self) -> VerificationStatus {
        if self.passed() {
            VerificationStatus::Passed
        } else {
            VerificationStatus::Failed
        }
    }
}

/// Outcome of one configured verification path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPathOutcome {
    /// Path name from the configuration.
    pub name: String,
    /// Checks evaluated for the path.
    pub checks: VerificationChecks,
    /// Status derived from the checks.
    pub status: VerificationStatus,
}

impl VerificationPathOutcome {
    /// Builds an outcome whose status is derived from its checks.
    #[must_use]
    pub fn evaluate(name: impl Into<String>, checks: VerificationChecks) -> Self {
        Self {
            name: name.into(),
            checks,
            status: checks.status(),
        }
    }
}

/// Roll-up across configured verification paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationAggregate {
    /// Aggregate status; passed iff every path passed.
    pub status: VerificationStatus,
    /// Number of evaluated paths.
    pub total: u64,
    /// Number of failed paths.
    pub failed_count: u64,
}

/// Output of the Verify step.
///
/// Serializes to the composed form when paths are configured and to the
/// single-check form otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerificationOutput {
    /// Per-path outcomes with an aggregate roll-up.
    Composed {
        /// Outcomes in configuration order.
        paths: Vec<VerificationPathOutcome>,
        /// Roll-up across all paths.
        aggregate: VerificationAggregate,
        /// Aggregate status mirrored at the top level.
        status: VerificationStatus,
    },
    /// Single check block when no paths are configured.
    Single {
        /// Checks evaluated with the default evidence requirement.
        checks: VerificationChecks,
        /// Status derived from the checks.
        status: VerificationStatus,
    },
}

impl VerificationOutput {
    /// Composes path outcomes; the aggregate cannot drift from the parts.
    #[must_use]
    pub fn compose(paths: Vec<VerificationPathOutcome>) -> Self {
        let failed_count =
            paths.iter().filter(|path| path.status == VerificationStatus::Failed).count() as u64;
        let status = if failed_count == 0 {
            VerificationStatus::Passed
        } else {
            VerificationStatus::Failed
        };
        let aggregate = VerificationAggregate {
            status,
            total: paths.len() as u64,
            failed_count,
        };
        Self::Composed {
            paths,
            aggregate,
            status,
        }
    }

    /// Builds the single-check form.
    #[must_use]
    pub const fn single(checks: VerificationChecks) -> Self {
        Self::Single {
            checks,
            status: checks.status(),
        }
    }

    /// Returns the aggregate status.
    #[must_use]
    pub const fn status(&self) -> VerificationStatus {
        match self {
            Self::Composed {
                status, ..
            }
            | Self::Single {
                status, ..
            } => *status,
        }
    }
}

impl ArtifactPayload for VerificationOutput {
    const STEP: StepName = StepName::Verify;
}

// ============================================================================
// SECTION: Synthesis / Audit Payloads
// ============================================================================

/// Output of the Synthesize step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisOutput {
    /// Human-readable run summary.
    pub summary: String,
}

impl SynthesisOutput {
    /// Summarizes a completed computation.
    #[must_use]
    pub fn from_task_count(task_count: u64) -> Self {
        Self {
            summary: format!("Processed {task_count} task(s)."),
        }
    }
}

impl ArtifactPayload for SynthesisOutput {
    const STEP: StepName = StepName::Synthesize;
}

/// Input summary inside the audit report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInputs {
    /// Request identifier.
    pub id: RequestId,
    /// Raw prompt.
    pub prompt: String,
}

/// Step summary inside the audit report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSteps {
    /// Artifact keys present at audit time, in lexicographic order.
    pub artifact_keys: Vec<String>,
    /// Applied step count at audit time.
    pub step_index: u64,
}

/// Verification summary inside the audit report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditVerification {
    /// Aggregate verification status, or `not_run`.
    pub status: String,
}

/// Timestamp summary inside the audit report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTimestamps {
    /// State creation time.
    pub created_at: Timestamp,
    /// Last state mutation time.
    pub updated_at: Timestamp,
}

/// Output of the Audit step: the structured run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Input summary.
    pub inputs: AuditInputs,
    /// Step summary.
    pub steps: AuditSteps,
    /// Verification summary.
    pub verification: AuditVerification,
    /// Timestamp summary.
    pub timestamps: AuditTimestamps,
}

impl ArtifactPayload for AuditReport {
    const STEP: StepName = StepName::Audit;
}
