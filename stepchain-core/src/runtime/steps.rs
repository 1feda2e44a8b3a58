// stepchain-core/src/runtime/steps.rs
// ============================================================================
// Module: Stepchain Step Registry
// Description: Deterministic step functions behind a uniform contract.
// Purpose: Map registered step names to pure state-to-result functions.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! Steps derive all outputs solely from the provided state and configuration.
//! Each step exposes its input projection (the canonical value covered by
//! `input_hash`) separately from execution, so the runner can recompute the
//! declared hash and fail closed on drift. Outputs are built as typed
//! artifact payloads whose derived fields are fixed at construction, then
//! serialized into the state's wire form. Timestamps come exclusively from
//! the deterministic clock in the step context.
//!
//! Steps read prior artifacts through [`ReasoningState::latest_artifact`],
//! which resolves iteration-suffixed keys written inside loop segments.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;
use serde_json::json;

use crate::core::CanonicalError;
use crate::core::DeterministicClock;
use crate::core::ErrorEntry;
use crate::core::RESULT_VERSION;
use crate::core::ReasoningState;
use crate::core::StepName;
use crate::core::StepResult;
use crate::core::StepStatus;
use crate::core::Timestamp;
use crate::core::UnknownStepError;
use crate::core::artifact::ArtifactPayload;
use crate::core::artifact::AuditInputs;
use crate::core::artifact::AuditReport;
use crate::core::artifact::AuditSteps;
use crate::core::artifact::AuditTimestamps;
use crate::core::artifact::AuditVerification;
use crate::core::artifact::ComputationOutput;
use crate::core::artifact::DecompositionOutput;
use crate::core::artifact::EvidenceOutput;
use crate::core::artifact::NormalizedOutput;
use crate::core::artifact::SynthesisOutput;
use crate::core::artifact::VerificationChecks;
use crate::core::artifact::VerificationOutput;
use crate::core::artifact::VerificationPathOutcome;
use crate::core::hash_canonical_json;

// ============================================================================
// SECTION: Step Contract
// ============================================================================

/// Execution context handed to a step.
pub struct StepContext<'a> {
    /// Deterministic clock; the only source of timestamps.
    pub clock: &'a mut DeterministicClock,
}

/// Deterministic step function.
pub trait Step {
    /// Registered name of the step.
    fn name(&self) -> StepName;

    /// Canonical projection of the inputs this step derives its output from.
    fn input_projection(&self, state: &ReasoningState) -> Value;

    /// Executes the step against an immutable state view.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] when hashing the projection or output fails.
    fn execute(
        &self,
        state: &ReasoningState,
        ctx: &mut StepContext<'_>,
    ) -> Result<StepResult, CanonicalError>;
}

/// Builds a sealed step result with canonical hashes.
///
/// # Errors
///
/// Returns [`CanonicalError`] when hashing fails.
pub fn build_step_result(
    step: StepName,
    status: StepStatus,
    input: &Value,
    output: Option<Value>,
    errors: Option<Vec<ErrorEntry>>,
    started_at: Timestamp,
    finished_at: Timestamp,
) -> Result<StepResult, CanonicalError> {
    let empty = Value::Object(serde_json::Map::new());
    let output_hash = hash_canonical_json(output.as_ref().unwrap_or(&empty))?;
    Ok(StepResult {
        version: RESULT_VERSION.to_string(),
        step,
        status,
        input_hash: hash_canonical_json(input)?,
        output_hash,
        started_at,
        finished_at,
        output,
        errors,
        metrics: None,
    })
}

/// Builds a successful result from a projection and a typed payload.
fn succeed<P: ArtifactPayload>(
    input: &Value,
    payload: &P,
    ctx: &mut StepContext<'_>,
) -> Result<StepResult, CanonicalError> {
    let started_at = ctx.clock.now();
    let finished_at = ctx.clock.now();
    build_step_result(
        P::STEP,
        StepStatus::Success,
        input,
        Some(payload.to_value()?),
        None,
        started_at,
        finished_at,
    )
}

// ============================================================================
// SECTION: Value Helpers
// ============================================================================

/// Extracts a string field from an optional artifact value.
fn artifact_str<'a>(artifact: Option<&'a Value>, field: &str) -> Option<&'a str> {
    artifact?.get(field)?.as_str()
}

/// Extracts an array field from an optional artifact value.
fn artifact_array<'a>(artifact: Option<&'a Value>, field: &str) -> Option<&'a Vec<Value>> {
    artifact?.get(field)?.as_array()
}

/// Extracts an unsigned integer field from an optional artifact value.
fn artifact_u64(artifact: Option<&Value>, field: &str) -> Option<u64> {
    artifact?.get(field)?.as_u64()
}

// ============================================================================
// SECTION: Normalize
// ============================================================================

/// Normalizes the input prompt (trim and collapse whitespace).
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeStep;

impl Step for NormalizeStep {
    fn name(&self) -> StepName {
        StepName::Normalize
    }

    fn input_projection(&self, state: &ReasoningState) -> Value {
        json!({ "prompt": state.problem.inputs.prompt })
    }

    fn execute(
        &self,
        state: &ReasoningState,
        ctx: &mut StepContext<'_>,
    ) -> Result<StepResult, CanonicalError> {
        let input = self.input_projection(state);
        let prompt = state.problem.inputs.prompt.as_str();
        if prompt.trim().is_empty() {
            let started_at = ctx.clock.now();
            let finished_at = ctx.clock.now();
            let errors = vec![ErrorEntry::new("invalid_prompt", "prompt is required")];
            return build_step_result(
                StepName::Normalize,
                StepStatus::Failed,
                &input,
                None,
                Some(errors),
                started_at,
                finished_at,
            );
        }
        succeed(&input, &NormalizedOutput::from_prompt(prompt), ctx)
    }
}

// ============================================================================
// SECTION: Decompose
// ============================================================================

/// Derives a deterministic task list from goals or the normalized prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecomposeStep;

impl DecomposeStep {
    /// Returns the prompt decomposition falls back to.
    fn base_prompt(state: &ReasoningState) -> &str {
        artifact_str(state.latest_artifact("normalized"), "normalized_prompt")
            .unwrap_or(state.problem.inputs.prompt.as_str())
    }
}

impl Step for DecomposeStep {
    fn name(&self) -> StepName {
        StepName::Decompose
    }

    fn input_projection(&self, state: &ReasoningState) -> Value {
        let goals = state.problem.inputs.goals.clone().unwrap_or_default();
        json!({ "goals": goals, "prompt": Self::base_prompt(state) })
    }

    fn execute(
        &self,
        state: &ReasoningState,
        ctx: &mut StepContext<'_>,
    ) -> Result<StepResult, CanonicalError> {
        let input = self.input_projection(state);
        let goals = state.problem.inputs.goals.as_deref().unwrap_or_default();
        let payload = DecompositionOutput::derive(goals, Self::base_prompt(state));
        succeed(&input, &payload, ctx)
    }
}

// ============================================================================
// SECTION: AcquireEvidence
// ============================================================================

/// Collects deterministic evidence from the problem context.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireEvidenceStep;

impl AcquireEvidenceStep {
    /// Returns the evidence list declared in the problem context.
    fn evidence(state: &ReasoningState) -> Vec<Value> {
        state
            .problem
            .inputs
            .context
            .as_ref()
            .and_then(|context| context.get("evidence"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

impl Step for AcquireEvidenceStep {
    fn name(&self) -> StepName {
        StepName::AcquireEvidence
    }

    fn input_projection(&self, state: &ReasoningState) -> Value {
        json!({ "evidence": Self::evidence(state) })
    }

    fn execute(
        &self,
        state: &ReasoningState,
        ctx: &mut StepContext<'_>,
    ) -> Result<StepResult, CanonicalError> {
        let input = self.input_projection(state);
        let evidence_required = state
            .problem
            .settings
            .as_ref()
            .and_then(|settings| settings.evidence_required)
            .unwrap_or(false);
        let payload = EvidenceOutput::new(Self::evidence(state), evidence_required);
        succeed(&input, &payload, ctx)
    }
}

// ============================================================================
// SECTION: Compute
// ============================================================================

/// Deterministic computation derived from decomposed tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeStep;

impl ComputeStep {
    /// Returns the current task count from the decomposition artifact.
    fn task_count(state: &ReasoningState) -> u64 {
        artifact_array(state.latest_artifact("decomposition"), "tasks")
            .map_or(0, |tasks| tasks.len() as u64)
    }
}

impl Step for ComputeStep {
    fn name(&self) -> StepName {
        StepName::Compute
    }

    fn input_projection(&self, state: &ReasoningState) -> Value {
        let tasks = artifact_array(state.latest_artifact("decomposition"), "tasks")
            .cloned()
            .unwrap_or_default();
        json!({ "tasks": tasks })
    }

    fn execute(
        &self,
        state: &ReasoningState,
        ctx: &mut StepContext<'_>,
    ) -> Result<StepResult, CanonicalError> {
        let input = self.input_projection(state);
        let payload = ComputationOutput::completed(Self::task_count(state));
        succeed(&input, &payload, ctx)
    }
}

// ============================================================================
// SECTION: Verify
// ============================================================================

/// Evaluates configured verification paths over the current artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerifyStep;

impl VerifyStep {
    /// Computes the base checks under a concrete evidence requirement.
    fn checks(state: &ReasoningState, evidence_required: bool) -> VerificationChecks {
        let task_count = ComputeStep::task_count(state);
        let evidence_count =
            artifact_u64(state.latest_artifact("evidence"), "evidence_count").unwrap_or(0);
        VerificationChecks {
            tasks_present: task_count > 0,
            task_count,
            evidence_present: evidence_count > 0,
            evidence_required,
        }
    }
}

impl Step for VerifyStep {
    fn name(&self) -> StepName {
        StepName::Verify
    }

    fn input_projection(&self, state: &ReasoningState) -> Value {
        let tasks = artifact_array(state.latest_artifact("decomposition"), "tasks")
            .cloned()
            .unwrap_or_default();
        json!({ "tasks": tasks })
    }

    fn execute(
        &self,
        state: &ReasoningState,
        ctx: &mut StepContext<'_>,
    ) -> Result<StepResult, CanonicalError> {
        let input = self.input_projection(state);
        let settings = state.problem.settings.as_ref();
        let evidence_required_default =
            settings.and_then(|settings| settings.evidence_required).unwrap_or(false);
        let paths = settings.and_then(|settings| settings.verification_paths.as_deref());

        let payload = match paths {
            Some(paths) if !paths.is_empty() => {
                let outcomes = paths
                    .iter()
                    .filter(|path| !path.name.trim().is_empty())
                    .map(|path| {
                        let evidence_required =
                            path.evidence_required.unwrap_or(evidence_required_default);
                        VerificationPathOutcome::evaluate(
                            path.name.clone(),
                            Self::checks(state, evidence_required),
                        )
                    })
                    .collect();
                VerificationOutput::compose(outcomes)
            }
            _ => VerificationOutput::single(Self::checks(state, evidence_required_default)),
        };
        succeed(&input, &payload, ctx)
    }
}

// ============================================================================
// SECTION: Synthesize
// ============================================================================

/// Synthesizes the run summary from computation results.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynthesizeStep;

impl SynthesizeStep {
    /// Returns the task count reported by the computation artifact.
    fn task_count(state: &ReasoningState) -> u64 {
        artifact_u64(state.latest_artifact("computation"), "task_count").unwrap_or(0)
    }
}

impl Step for SynthesizeStep {
    fn name(&self) -> StepName {
        StepName::Synthesize
    }

    fn input_projection(&self, state: &ReasoningState) -> Value {
        json!({ "task_count": Self::task_count(state) })
    }

    fn execute(
        &self,
        state: &ReasoningState,
        ctx: &mut StepContext<'_>,
    ) -> Result<StepResult, CanonicalError> {
        let input = self.input_projection(state);
        let payload = SynthesisOutput::from_task_count(Self::task_count(state));
        succeed(&input, &payload, ctx)
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Composes the structured audit report over the final artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditStep;

impl AuditStep {
    /// Returns the artifact keys in lexicographic order.
    fn artifact_keys(state: &ReasoningState) -> Vec<String> {
        state.artifacts.keys().cloned().collect()
    }
}

impl Step for AuditStep {
    fn name(&self) -> StepName {
        StepName::Audit
    }

    fn input_projection(&self, state: &ReasoningState) -> Value {
        json!({ "artifact_keys": Self::artifact_keys(state) })
    }

    fn execute(
        &self,
        state: &ReasoningState,
        ctx: &mut StepContext<'_>,
    ) -> Result<StepResult, CanonicalError> {
        let input = self.input_projection(state);
        let verification_status =
            artifact_str(state.latest_artifact("verification"), "status").unwrap_or("not_run");
        let payload = AuditReport {
            inputs: AuditInputs {
                id: state.problem.id.clone(),
                prompt: state.problem.inputs.prompt.clone(),
            },
            steps: AuditSteps {
                artifact_keys: Self::artifact_keys(state),
                step_index: state.step_index,
            },
            verification: AuditVerification {
                status: verification_status.to_string(),
            },
            timestamps: AuditTimestamps {
                created_at: state.metadata.created_at,
                updated_at: state.metadata.updated_at,
            },
        };
        succeed(&input, &payload, ctx)
    }
}

// ============================================================================
// SECTION: Step Registry
// ============================================================================

/// Registry mapping step names to deterministic step functions.
pub struct StepRegistry {
    /// Registered steps keyed by name.
    steps: BTreeMap<StepName, Box<dyn Step + Send + Sync>>,
}

impl StepRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: BTreeMap::new(),
        }
    }

    /// Creates the standard registry with all seven steps.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(NormalizeStep));
        registry.register(Box::new(DecomposeStep));
        registry.register(Box::new(AcquireEvidenceStep));
        registry.register(Box::new(ComputeStep));
        registry.register(Box::new(VerifyStep));
        registry.register(Box::new(SynthesizeStep));
        registry.register(Box::new(AuditStep));
        registry
    }

    /// Registers a step, replacing any previous entry for its name.
    pub fn register(&mut self, step: Box<dyn Step + Send + Sync>) {
        self.steps.insert(step.name(), step);
    }

    /// Resolves a step by name.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownStepError`] when the step is not registered.
    pub fn resolve(&self, name: StepName) -> Result<&(dyn Step + Send + Sync), UnknownStepError> {
        self.steps
            .get(&name)
            .map(|step| step.as_ref())
            .ok_or_else(|| UnknownStepError(name.as_str().to_string()))
    }

    /// Returns registered step names in lexicographic order.
    #[must_use]
    pub fn names(&self) -> Vec<StepName> {
        self.steps.keys().copied().collect()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
