// stepchain-core/src/runtime/engine.rs
// ============================================================================
// Module: Stepchain Engine Runner
// Description: Deterministic orchestration of one problem execution.
// Purpose: Drive steps over the graph, applying results and chaining the trace.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The runner is the single canonical execution path. Per request it
//! validates the problem spec, writes the header, and then for each step in
//! graph order: snapshots and hashes the state, invokes the step, validates
//! the result contract, recomputes the declared `input_hash`, applies the
//! result, validates invariants, and commits a step record. Loop decisions
//! are taken after the configured end step and recorded as control records.
//!
//! Defective steps do not corrupt the trace: contract violations, unknown
//! steps, hash drift, and artifact overwrites collapse into a failed final
//! step record and a failed state. Only canonicalization failures, chain
//! breaks, and state-invariant violations abort the run, because they imply
//! the trace itself cannot be trusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::json;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::core::CANONICALIZATION;
use crate::core::CanonicalError;
use crate::core::ControlRecord;
use crate::core::DeterministicClock;
use crate::core::ErrorEntry;
use crate::core::HASH_ALGORITHM;
use crate::core::HeaderRecord;
use crate::core::ProblemSpec;
use crate::core::ReasoningState;
use crate::core::SpecValidationError;
use crate::core::StateStatus;
use crate::core::StepName;
use crate::core::StepRecord;
use crate::core::StepResult;
use crate::core::StepStatus;
use crate::core::TRACE_VERSION;
use crate::core::Timestamp;
use crate::core::TraceId;
use crate::core::TraceRecord;
use crate::core::hash_canonical_json;
use crate::core::seal_record;
use crate::interfaces::CancellationSignal;
use crate::interfaces::NeverCancelled;
use crate::runtime::graph::ExecutionGraph;
use crate::runtime::looping::LoopConfig;
use crate::runtime::looping::LoopController;
use crate::runtime::looping::LoopError;
use crate::runtime::routing::PolicyRegistry;
use crate::runtime::routing::RoutingError;
use crate::runtime::state_manager;
use crate::runtime::state_manager::StateError;
use crate::runtime::steps::StepContext;
use crate::runtime::steps::StepRegistry;
use crate::runtime::steps::build_step_result;
use crate::runtime::writer::TraceWriteError;
use crate::runtime::writer::TraceWriter;

// ============================================================================
// SECTION: Engine Constants
// ============================================================================

/// Engine version recorded in trace headers.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// SECTION: Request and Result
// ============================================================================

/// One execution request.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// Problem specification to execute.
    pub problem_spec: ProblemSpec,
    /// Stable trace identifier.
    pub trace_id: TraceId,
    /// Seed for the deterministic clock.
    pub now: Timestamp,
}

/// Final state and trace of one execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Trace identifier of the run.
    pub trace_id: TraceId,
    /// Engine version that produced the run.
    pub engine_version: String,
    /// Final reasoning state including the full error history.
    pub final_state: ReasoningState,
    /// Trace records in append order.
    pub records: Vec<TraceRecord>,
    /// Concatenated NDJSON record bytes.
    pub trace_bytes: Vec<u8>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Engine errors returned instead of a trace.
///
/// Configuration errors occur before the header is written; fatal errors
/// mean the trace under construction cannot be trusted.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Problem specification failed validation.
    #[error(transparent)]
    Spec(#[from] SpecValidationError),
    /// Routing policy resolution failed.
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// Loop configuration or stop condition is invalid.
    #[error(transparent)]
    Loop(#[from] LoopError),
    /// `settings.max_steps` cannot cover the required step count.
    #[error("settings.max_steps is lower than the required step count ({required} > {max_steps})")]
    MaxStepsTooLow {
        /// Configured ceiling.
        max_steps: u64,
        /// Steps required by the graph and loop expansion.
        required: u64,
    },
    /// Trace identifier is empty.
    #[error("trace_id must be a non-empty string")]
    EmptyTraceId,
    /// Canonical encoding failed (fatal).
    #[error(transparent)]
    Canonical(#[from] CanonicalError),
    /// Trace chain could not be extended (fatal).
    #[error(transparent)]
    Trace(#[from] TraceWriteError),
    /// State invariant violated (fatal).
    #[error(transparent)]
    State(#[from] StateError),
}

impl EngineError {
    /// Stable taxonomy code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Spec(err) => err.code(),
            Self::Routing(err) => err.code(),
            Self::Loop(err) => err.code(),
            Self::MaxStepsTooLow {
                ..
            }
            | Self::EmptyTraceId => "schema_invalid",
            Self::Canonical(err) => err.code(),
            Self::Trace(err) => err.code(),
            Self::State(err) => err.code(),
        }
    }

    /// Returns true when the error implies an untrustworthy trace.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Canonical(_) | Self::Trace(_) | Self::State(_))
    }
}

// ============================================================================
// SECTION: Step Invocation Outcome
// ============================================================================

/// Outcome of invoking and validating one step.
enum StepOutcome {
    /// Contract-valid result ready for application.
    Valid(StepResult),
    /// Non-fatal defect; the run fails cleanly with this entry.
    Defect(ErrorEntry),
}

// ============================================================================
// SECTION: Engine Runner
// ============================================================================

/// Deterministic engine runner over a step registry and routing policies.
pub struct EngineRunner {
    /// Registered step functions.
    registry: StepRegistry,
    /// Routing policies resolving step orderings.
    routing: PolicyRegistry,
}

impl EngineRunner {
    /// Creates a runner with the standard registry and default routing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: StepRegistry::standard(),
            routing: PolicyRegistry::default(),
        }
    }

    /// Creates a runner from explicit parts.
    #[must_use]
    pub const fn with_parts(registry: StepRegistry, routing: PolicyRegistry) -> Self {
        Self {
            registry,
            routing,
        }
    }

    /// Executes one problem to completion.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on invalid configuration or fatal trace
    /// corruption; step-level failures yield `Ok` with a failed final state.
    pub fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionResult, EngineError> {
        self.execute_with_cancellation(request, &NeverCancelled)
    }

    /// Executes one problem, checking the signal between steps.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on invalid configuration or fatal trace
    /// corruption.
    #[allow(
        clippy::too_many_lines,
        reason = "Single linear flow keeps the ordered trace commitments auditable."
    )]
    pub fn execute_with_cancellation(
        &self,
        request: &ExecuteRequest,
        signal: &dyn CancellationSignal,
    ) -> Result<ExecutionResult, EngineError> {
        request.problem_spec.validate()?;
        if request.trace_id.as_str().trim().is_empty() {
            return Err(EngineError::EmptyTraceId);
        }

        let graph = self.routing.resolve(&request.problem_spec)?;
        let loop_config = LoopConfig::from_spec(&request.problem_spec, &graph)?;
        enforce_max_steps(&request.problem_spec, &graph, loop_config.as_ref())?;

        let mut clock = DeterministicClock::new(request.now);
        let initial = ReasoningState::initial(
            request.problem_spec.clone(),
            request.trace_id.clone(),
            clock.now(),
        );

        let mut writer = TraceWriter::new();
        let header = TraceRecord::Header(HeaderRecord {
            index: 0,
            version: TRACE_VERSION.to_string(),
            trace_id: request.trace_id.clone(),
            created_at: request.now,
            engine_version: ENGINE_VERSION.to_string(),
            hash_algorithm: HASH_ALGORITHM.to_string(),
            canonicalization: CANONICALIZATION.to_string(),
            problem_spec_hash: request.problem_spec.canonical_hash()?,
            initial_state_hash: initial.canonical_hash()?,
            record_hash: String::new(),
        });
        writer.append(seal_record(header)?)?;
        debug!(trace_id = %request.trace_id, steps = graph.len(), "trace header committed");

        let mut state = state_manager::transition_running(&initial, clock.now())?;
        let mut controller = loop_config.map(LoopController::new);
        let mut cursor = 0usize;

        while let Some(step_name) = graph.step_at(cursor) {
            if signal.is_cancelled() {
                warn!(trace_id = %request.trace_id, step = %step_name, "run cancelled between steps");
                state = Self::record_cancellation(&mut writer, &state, step_name, &mut clock)?;
                break;
            }
            if let Some(controller) = controller.as_mut() {
                controller.enter_segment(cursor);
            }
            let iteration_tag =
                controller.as_ref().and_then(|controller| controller.iteration_tag(cursor));

            let state_before_hash = state.canonical_hash()?;
            let step_index_before = state.step_index;
            debug!(step = %step_name, cursor, iteration = ?iteration_tag, "executing step");

            let outcome = self.invoke_step(step_name, &state, &mut clock)?;
            let (result, next_state) = match outcome {
                StepOutcome::Valid(result) => {
                    match state_manager::apply(&state, &result, clock.now(), iteration_tag) {
                        Ok(next_state) => (result, next_state),
                        Err(err @ StateError::ArtifactOverwrite {
                            ..
                        }) => {
                            let entry = ErrorEntry::for_step(err.code(), err.to_string(), step_name);
                            Self::fail_step(&state, step_name, entry, &mut clock)?
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                StepOutcome::Defect(entry) => Self::fail_step(&state, step_name, entry, &mut clock)?,
            };

            state_manager::check_transition(&state, &next_state)?;
            state_manager::validate_invariants(&next_state)?;
            let state_after_hash = next_state.canonical_hash()?;

            let record = TraceRecord::Step(StepRecord {
                index: writer.next_index(),
                step_index: step_index_before,
                result,
                state_before_hash,
                state_after_hash: state_after_hash.clone(),
                prev_hash: writer.last_hash().unwrap_or_default().to_string(),
                record_hash: String::new(),
            });
            writer.append(seal_record(record)?)?;
            state = next_state;

            let mut next_cursor = cursor + 1;
            if state.status != StateStatus::Failed
                && let Some(controller) = controller.as_mut()
                && controller.is_decision_point(cursor)
            {
                let action = controller.decide(&state);
                let config = controller.config();
                let control = TraceRecord::Control(ControlRecord {
                    index: writer.next_index(),
                    control_type: "loop".to_string(),
                    action,
                    loop_iteration: controller.iteration(),
                    start_step: config.start_step,
                    end_step: config.end_step,
                    stop_condition: config.stop_condition.clone(),
                    state_hash: state_after_hash,
                    prev_hash: writer.last_hash().unwrap_or_default().to_string(),
                    record_hash: String::new(),
                });
                writer.append(seal_record(control)?)?;
                debug!(action = ?action, iteration = controller.iteration(), "loop decision");
                next_cursor = controller.advance(action);
            }

            if state.status == StateStatus::Failed {
                break;
            }
            cursor = next_cursor;
        }

        if state.status == StateStatus::Running {
            state = state_manager::mark_completed(&state, clock.now())?;
        }
        match state.status {
            StateStatus::Completed => {
                info!(trace_id = %request.trace_id, step_index = state.step_index, "run completed");
            }
            _ => {
                warn!(trace_id = %request.trace_id, errors = state.errors.len(), "run failed");
            }
        }

        let (records, trace_bytes) = writer.into_parts();
        Ok(ExecutionResult {
            trace_id: request.trace_id.clone(),
            engine_version: ENGINE_VERSION.to_string(),
            final_state: state,
            records,
            trace_bytes,
        })
    }

    /// Invokes one step and validates its result contract.
    ///
    /// Non-fatal defects are reported as [`StepOutcome::Defect`]; only
    /// canonicalization failures abort.
    fn invoke_step(
        &self,
        step_name: StepName,
        state: &ReasoningState,
        clock: &mut DeterministicClock,
    ) -> Result<StepOutcome, EngineError> {
        let step = match self.registry.resolve(step_name) {
            Ok(step) => step,
            Err(err) => {
                return Ok(StepOutcome::Defect(ErrorEntry::for_step(
                    err.code(),
                    err.to_string(),
                    step_name,
                )));
            }
        };
        let projection = step.input_projection(state);
        let mut ctx = StepContext {
            clock,
        };
        let result = step.execute(state, &mut ctx)?;

        if result.step != step_name {
            return Ok(StepOutcome::Defect(ErrorEntry::for_step(
                "step_contract_violation",
                format!("result reports step {} instead of {step_name}", result.step),
                step_name,
            )));
        }
        if let Err(err) = result.validate() {
            return Ok(StepOutcome::Defect(ErrorEntry::for_step(
                err.code(),
                err.to_string(),
                step_name,
            )));
        }
        let expected_input_hash = hash_canonical_json(&projection)?;
        if result.input_hash != expected_input_hash {
            return Ok(StepOutcome::Defect(ErrorEntry::for_step(
                "hash_mismatch",
                format!("declared input_hash does not match the step's declared inputs for {step_name}"),
                step_name,
            )));
        }
        Ok(StepOutcome::Valid(result))
    }

    /// Produces the failed result and failed state for a non-fatal defect.
    fn fail_step(
        state: &ReasoningState,
        step_name: StepName,
        entry: ErrorEntry,
        clock: &mut DeterministicClock,
    ) -> Result<(StepResult, ReasoningState), EngineError> {
        let started_at = clock.now();
        let finished_at = clock.now();
        let result = build_step_result(
            step_name,
            StepStatus::Failed,
            &json!({}),
            None,
            Some(vec![entry.clone()]),
            started_at,
            finished_at,
        )?;
        let next_state = state_manager::mark_failed(state, entry, clock.now())?;
        Ok((result, next_state))
    }

    /// Records the skipped step and failed state for a cancellation.
    fn record_cancellation(
        writer: &mut TraceWriter,
        state: &ReasoningState,
        step_name: StepName,
        clock: &mut DeterministicClock,
    ) -> Result<ReasoningState, EngineError> {
        let state_before_hash = state.canonical_hash()?;
        let step_index_before = state.step_index;
        let started_at = clock.now();
        let finished_at = clock.now();
        let result = build_step_result(
            step_name,
            StepStatus::Skipped,
            &json!({}),
            None,
            None,
            started_at,
            finished_at,
        )?;
        let entry = ErrorEntry::for_step("cancelled", "run cancelled before the step started", step_name);
        let next_state = state_manager::mark_failed(state, entry, clock.now())?;
        let record = TraceRecord::Step(StepRecord {
            index: writer.next_index(),
            step_index: step_index_before,
            result,
            state_before_hash,
            state_after_hash: next_state.canonical_hash()?,
            prev_hash: writer.last_hash().unwrap_or_default().to_string(),
            record_hash: String::new(),
        });
        writer.append(seal_record(record)?)?;
        Ok(next_state)
    }
}

impl Default for EngineRunner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SECTION: Configuration Guards
// ============================================================================

/// Enforces `settings.max_steps` against the graph and loop expansion.
fn enforce_max_steps(
    spec: &ProblemSpec,
    graph: &ExecutionGraph,
    loop_config: Option<&LoopConfig>,
) -> Result<(), EngineError> {
    let Some(max_steps) = spec.settings.as_ref().and_then(|settings| settings.max_steps) else {
        return Ok(());
    };
    let required =
        loop_config.map_or(graph.len() as u64, |config| config.required_steps(graph.len()));
    if max_steps < required {
        return Err(EngineError::MaxStepsTooLow {
            max_steps,
            required,
        });
    }
    Ok(())
}

