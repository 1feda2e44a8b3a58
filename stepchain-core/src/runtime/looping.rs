// stepchain-core/src/runtime/looping.rs
// ============================================================================
// Module: Stepchain Loop Controller
// Description: Loop configuration, stop evaluation, and repeat decisions.
// Purpose: Decide repeat/stop/exhaustion after a loop segment's end step.
// Dependencies: crate::core, crate::runtime::graph
// ============================================================================

//! ## Overview
//! When a loop is configured, the controller evaluates the stop condition
//! against the post-state after every execution of `end_step`. Comparison
//! fails closed: a missing path node or a type mismatch never satisfies the
//! condition. Exhaustion is not a failure; execution proceeds past the
//! segment and the verification artifact carries the truth.
//!
//! The controller never mutates the reasoning state. Its only output is a
//! decision; the runner records it as a control record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::core::ControlAction;
use crate::core::ProblemSpec;
use crate::core::ReasoningState;
use crate::core::StepName;
use crate::core::StopCondition;
use crate::core::StopOperator;
use crate::runtime::graph::ExecutionGraph;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Loop configuration and stop-condition errors.
#[derive(Debug, Error)]
pub enum LoopError {
    /// A segment boundary names an unregistered step.
    #[error("loop {field} is not a registered step: {name}")]
    UnknownStep {
        /// Offending field (`start_step` or `end_step`).
        field: &'static str,
        /// Name that failed to resolve.
        name: String,
    },
    /// A segment boundary step is not in the execution graph.
    #[error("loop {field} is not in the execution graph: {name}")]
    StepNotInGraph {
        /// Offending field (`start_step` or `end_step`).
        field: &'static str,
        /// Step missing from the graph.
        name: StepName,
    },
    /// `start_step` appears after `end_step` in graph order.
    #[error("loop start_step must not appear after end_step")]
    StartAfterEnd,
    /// `max_iterations` must be positive.
    #[error("loop max_iterations must be > 0")]
    MaxIterationsInvalid,
    /// Legacy `equals` combined with `operator`/`value`.
    #[error("stop_condition must use either equals or operator/value")]
    EqualsConflict,
    /// `operator` missing without legacy `equals`.
    #[error("stop_condition operator is required")]
    OperatorMissing,
    /// Unknown operator name.
    #[error("stop_condition operator is not supported: {0}")]
    OperatorUnknown(String),
    /// `value` missing without legacy `equals`.
    #[error("stop_condition value is required")]
    ValueMissing,
    /// Path does not match `artifacts.<name>(.<key>)*`.
    #[error("stop_condition path must match artifacts.<name>(.<key>)*: {0}")]
    PathInvalid(String),
    /// Ordering operators require an integer expected value.
    #[error("stop_condition value must be an integer for ordering operators")]
    ValueNotInteger,
    /// Expected value must be a string, integer, or boolean.
    #[error("stop_condition value must be a string, integer, or boolean")]
    ValueTypeInvalid,
}

impl LoopError {
    /// Stable taxonomy code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownStep {
                ..
            }
            | Self::StepNotInGraph {
                ..
            }
            | Self::StartAfterEnd
            | Self::MaxIterationsInvalid => "loop_config_invalid",
            _ => "stop_condition_invalid",
        }
    }
}

// ============================================================================
// SECTION: Loop Configuration
// ============================================================================

/// Validated loop configuration resolved against an execution graph.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// First step of the repeated segment.
    pub start_step: StepName,
    /// Last step of the repeated segment; the decision point.
    pub end_step: StepName,
    /// Graph index of `start_step`.
    pub start_index: usize,
    /// Graph index of `end_step`.
    pub end_index: usize,
    /// Maximum number of iterations.
    pub max_iterations: u64,
    /// Resolved stop condition.
    pub stop_condition: StopCondition,
}

impl LoopConfig {
    /// Resolves and validates the loop settings of a problem specification.
    ///
    /// Returns `Ok(None)` when no loop is configured or the loop is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError`] when the configuration or stop condition is
    /// invalid.
    pub fn from_spec(spec: &ProblemSpec, graph: &ExecutionGraph) -> Result<Option<Self>, LoopError> {
        let Some(settings) = spec.settings.as_ref().and_then(|settings| settings.loop_settings.as_ref())
        else {
            return Ok(None);
        };
        if !settings.enabled {
            return Ok(None);
        }

        let start_step = resolve_boundary("start_step", &settings.start_step)?;
        let end_step = resolve_boundary("end_step", &settings.end_step)?;
        let start_index = graph.index_of(start_step).ok_or(LoopError::StepNotInGraph {
            field: "start_step",
            name: start_step,
        })?;
        let end_index = graph.index_of(end_step).ok_or(LoopError::StepNotInGraph {
            field: "end_step",
            name: end_step,
        })?;
        if start_index > end_index {
            return Err(LoopError::StartAfterEnd);
        }
        if settings.max_iterations == 0 {
            return Err(LoopError::MaxIterationsInvalid);
        }

        let stop_condition = resolve_stop_condition(settings)?;
        Ok(Some(Self {
            start_step,
            end_step,
            start_index,
            end_index,
            max_iterations: settings.max_iterations,
            stop_condition,
        }))
    }

    /// Number of steps in the repeated segment.
    #[must_use]
    pub const fn segment_length(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    /// Total steps required when every iteration runs.
    #[must_use]
    pub fn required_steps(&self, graph_len: usize) -> u64 {
        graph_len as u64 + (self.max_iterations - 1) * self.segment_length() as u64
    }
}

/// Resolves one loop boundary step name.
fn resolve_boundary(field: &'static str, name: &str) -> Result<StepName, LoopError> {
    name.parse().map_err(|_| LoopError::UnknownStep {
        field,
        name: name.to_string(),
    })
}

/// Resolves the wire stop condition, rewriting legacy `equals`.
fn resolve_stop_condition(
    settings: &crate::core::LoopSettings,
) -> Result<StopCondition, LoopError> {
    let wire = &settings.stop_condition;
    validate_stop_path(&wire.path)?;

    let (operator, value) = if let Some(equals) = &wire.equals {
        if wire.operator.is_some() || wire.value.is_some() {
            return Err(LoopError::EqualsConflict);
        }
        (StopOperator::Equals, equals.clone())
    } else {
        let name = wire.operator.as_deref().ok_or(LoopError::OperatorMissing)?;
        let operator =
            StopOperator::from_wire(name).ok_or_else(|| LoopError::OperatorUnknown(name.to_string()))?;
        let value = wire.value.clone().ok_or(LoopError::ValueMissing)?;
        (operator, value)
    };

    if operator.is_ordering() {
        if !is_integer(&value) {
            return Err(LoopError::ValueNotInteger);
        }
    } else if !matches!(&value, Value::String(_) | Value::Bool(_)) && !is_integer(&value) {
        return Err(LoopError::ValueTypeInvalid);
    }

    Ok(StopCondition {
        path: wire.path.clone(),
        operator,
        value,
    })
}

/// Validates the restricted dotted-path grammar.
fn validate_stop_path(path: &str) -> Result<(), LoopError> {
    let mut segments = path.split('.');
    if segments.next() != Some("artifacts") {
        return Err(LoopError::PathInvalid(path.to_string()));
    }
    let Some(name) = segments.next() else {
        return Err(LoopError::PathInvalid(path.to_string()));
    };
    if name.is_empty() || segments.any(str::is_empty) {
        return Err(LoopError::PathInvalid(path.to_string()));
    }
    Ok(())
}

/// Returns true for integer JSON numbers (decimals excluded).
fn is_integer(value: &Value) -> bool {
    value.as_number().is_some_and(|number| number.as_i64().is_some() || number.as_u64().is_some())
}

// ============================================================================
// SECTION: Loop Controller
// ============================================================================

/// Tracks loop progress and issues repeat/stop decisions.
#[derive(Debug, Clone)]
pub struct LoopController {
    /// Validated loop configuration.
    config: LoopConfig,
    /// Current iteration; 0 until the segment is first entered.
    iteration: u64,
}

impl LoopController {
    /// Creates a controller over a validated configuration.
    #[must_use]
    pub const fn new(config: LoopConfig) -> Self {
        Self {
            config,
            iteration: 0,
        }
    }

    /// Returns the loop configuration.
    #[must_use]
    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Returns the current iteration (0 before the segment is entered).
    #[must_use]
    pub const fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Marks the segment entered when the cursor reaches `start_step`.
    pub const fn enter_segment(&mut self, cursor: usize) {
        if cursor == self.config.start_index && self.iteration == 0 {
            self.iteration = 1;
        }
    }

    /// Returns the iteration tag steps at this cursor should write under.
    #[must_use]
    pub const fn iteration_tag(&self, cursor: usize) -> Option<u64> {
        if self.iteration >= 2
            && cursor >= self.config.start_index
            && cursor <= self.config.end_index
        {
            Some(self.iteration)
        } else {
            None
        }
    }

    /// Returns true when a decision is due after the step at this cursor.
    #[must_use]
    pub const fn is_decision_point(&self, cursor: usize) -> bool {
        self.iteration >= 1 && cursor == self.config.end_index
    }

    /// Evaluates the stop condition and picks the action.
    #[must_use]
    pub fn decide(&self, state: &ReasoningState) -> ControlAction {
        if stop_condition_met(state, &self.config.stop_condition, self.iteration) {
            ControlAction::Stop
        } else if self.iteration < self.config.max_iterations {
            ControlAction::Repeat
        } else {
            ControlAction::MaxIterationsReached
        }
    }

    /// Applies a decision, returning the next execution cursor.
    pub const fn advance(&mut self, action: ControlAction) -> usize {
        match action {
            ControlAction::Repeat => {
                self.iteration += 1;
                self.config.start_index
            }
            ControlAction::Stop | ControlAction::MaxIterationsReached => self.config.end_index + 1,
        }
    }
}

// ============================================================================
// SECTION: Stop Evaluation
// ============================================================================

/// Evaluates a stop condition against a state at a loop iteration.
///
/// A missing node fails closed. Resolution is iteration-aware: at iteration
/// n ≥ 2 the artifact name resolves through its `<name>.iter.<n>` key when
/// present, so the condition always examines the freshest segment output.
#[must_use]
pub fn stop_condition_met(state: &ReasoningState, condition: &StopCondition, iteration: u64) -> bool {
    resolve_stop_path_value(state, &condition.path, iteration)
        .is_some_and(|actual| compare(condition.operator, actual, &condition.value))
}

/// Resolves a validated stop path against the state artifacts.
fn resolve_stop_path_value<'a>(
    state: &'a ReasoningState,
    path: &str,
    iteration: u64,
) -> Option<&'a Value> {
    let mut segments = path.split('.');
    // Validated grammar guarantees the leading `artifacts` and a name.
    segments.next()?;
    let name = segments.next()?;

    let mut node = if iteration >= 2 {
        let tagged = format!("{name}.iter.{iteration}");
        state.artifacts.get(&tagged).or_else(|| state.artifacts.get(name))?
    } else {
        state.artifacts.get(name)?
    };
    for segment in segments {
        node = node.get(segment)?;
    }
    Some(node)
}

/// Compares actual and expected values under an operator, failing closed.
fn compare(operator: StopOperator, actual: &Value, expected: &Value) -> bool {
    match operator {
        StopOperator::Equals => actual == expected,
        StopOperator::NotEquals => actual != expected,
        StopOperator::Gt | StopOperator::Gte | StopOperator::Lt | StopOperator::Lte => {
            let Some(ordering) = integer_cmp(actual, expected) else {
                return false;
            };
            match operator {
                StopOperator::Gt => ordering.is_gt(),
                StopOperator::Gte => ordering.is_ge(),
                StopOperator::Lt => ordering.is_lt(),
                StopOperator::Lte => ordering.is_le(),
                StopOperator::Equals | StopOperator::NotEquals => false,
            }
        }
    }
}

/// Integer representation used for deterministic ordering.
enum IntegerValue {
    /// Signed 64-bit value.
    Signed(i64),
    /// Unsigned 64-bit value.
    Unsigned(u64),
}

/// Extracts an integer value, rejecting decimals and non-numbers.
fn integer_value(value: &Value) -> Option<IntegerValue> {
    let number = value.as_number()?;
    if let Some(signed) = number.as_i64() {
        return Some(IntegerValue::Signed(signed));
    }
    number.as_u64().map(IntegerValue::Unsigned)
}

/// Compares two JSON values using integer-only semantics.
fn integer_cmp(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    let left = integer_value(left)?;
    let right = integer_value(right)?;
    match (left, right) {
        (IntegerValue::Signed(left), IntegerValue::Signed(right)) => Some(left.cmp(&right)),
        (IntegerValue::Unsigned(left), IntegerValue::Unsigned(right)) => Some(left.cmp(&right)),
        (IntegerValue::Signed(left), IntegerValue::Unsigned(right)) => {
            if left < 0 {
                Some(std::cmp::Ordering::Less)
            } else {
                let left = u64::try_from(left).ok()?;
                Some(left.cmp(&right))
            }
        }
        (IntegerValue::Unsigned(left), IntegerValue::Signed(right)) => {
            if right < 0 {
                Some(std::cmp::Ordering::Greater)
            } else {
                let right = u64::try_from(right).ok()?;
                Some(left.cmp(&right))
            }
        }
    }
}
