// stepchain-core/src/runtime/metrics.rs
// ============================================================================
// Module: Stepchain Trace Metrics
// Description: Pure aggregation over trace records.
// Purpose: Summarize step activity and durations for evaluation surfaces.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Metrics aggregation is a pure function over an already-committed trace.
//! It never touches the engine or the clock; durations come from the
//! deterministic timestamps recorded in step results.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::StepStatus;
use crate::core::Timestamp;
use crate::core::TraceRecord;

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Aggregated metrics for one trace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TraceMetrics {
    /// Total step records.
    pub steps_total: u64,
    /// Step records per step name.
    pub step_counts: BTreeMap<String, u64>,
    /// Step records per result status.
    pub step_status_counts: BTreeMap<String, u64>,
    /// Total control records.
    pub controls_total: u64,
    /// Control records per control family.
    pub control_counts: BTreeMap<String, u64>,
    /// Control records per action.
    pub control_action_counts: BTreeMap<String, u64>,
    /// Sum of per-step durations in milliseconds.
    pub total_step_duration_ms: u64,
    /// Longest single step duration in milliseconds.
    pub max_step_duration_ms: u64,
    /// Wall span from first step start to last step finish in milliseconds.
    pub trace_duration_ms: u64,
}

/// Aggregates metrics over trace records.
#[must_use]
pub fn aggregate_trace_metrics(records: &[TraceRecord]) -> TraceMetrics {
    let mut metrics = TraceMetrics::default();
    let mut first_start: Option<Timestamp> = None;
    let mut last_finish: Option<Timestamp> = None;

    for record in records {
        match record {
            TraceRecord::Header(_) => {}
            TraceRecord::Step(step) => {
                metrics.steps_total += 1;
                bump(&mut metrics.step_counts, step.result.step.as_str());
                bump(&mut metrics.step_status_counts, status_label(step.result.status));

                let duration = step.result.finished_at.millis_since(step.result.started_at);
                let duration = u64::try_from(duration).unwrap_or(0);
                metrics.total_step_duration_ms += duration;
                metrics.max_step_duration_ms = metrics.max_step_duration_ms.max(duration);

                if first_start.is_none_or(|start| step.result.started_at < start) {
                    first_start = Some(step.result.started_at);
                }
                if last_finish.is_none_or(|finish| step.result.finished_at > finish) {
                    last_finish = Some(step.result.finished_at);
                }
            }
            TraceRecord::Control(control) => {
                metrics.controls_total += 1;
                bump(&mut metrics.control_counts, &control.control_type);
                bump(&mut metrics.control_action_counts, action_label(control.action));
            }
        }
    }

    if let (Some(start), Some(finish)) = (first_start, last_finish) {
        metrics.trace_duration_ms = u64::try_from(finish.millis_since(start)).unwrap_or(0);
    }
    metrics
}

/// Increments a named counter.
fn bump(counters: &mut BTreeMap<String, u64>, key: &str) {
    *counters.entry(key.to_string()).or_insert(0) += 1;
}

/// Wire label of a step status.
const fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Success => "success",
        StepStatus::Failed => "failed",
        StepStatus::Skipped => "skipped",
    }
}

/// Wire label of a control action.
const fn action_label(action: crate::core::ControlAction) -> &'static str {
    match action {
        crate::core::ControlAction::Repeat => "repeat",
        crate::core::ControlAction::Stop => "stop",
        crate::core::ControlAction::MaxIterationsReached => "max_iterations_reached",
    }
}
