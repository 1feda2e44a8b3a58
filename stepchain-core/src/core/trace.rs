// stepchain-core/src/core/trace.rs
// ============================================================================
// Module: Stepchain Trace Records
// Description: Hash-chained header, step, and control records.
// Purpose: Define the append-only trace whose bytes prove a run happened.
// Dependencies: crate::core::{canonical, identifiers, result, spec, time}, serde
// ============================================================================

//! ## Overview
//! A trace is an ordered sequence of records: one header, one step record per
//! executed step, and one control record per loop decision. Each record
//! carries a strictly monotonic `index`, the prior record's hash as
//! `prev_hash` (absent on the header), and its own `record_hash` computed
//! over the canonical JSON of the record with the `record_hash` field
//! omitted. The omission is a value projection, never string surgery on
//! encoded output.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::canonical::CanonicalError;
use crate::core::canonical::hash_canonical_json;
use crate::core::identifiers::TraceId;
use crate::core::result::StepName;
use crate::core::result::StepResult;
use crate::core::spec::StopCondition;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Trace Constants
// ============================================================================

/// Schema version of trace records.
pub const TRACE_VERSION: &str = "1.0.0";

/// Hash algorithm identifier recorded in headers.
pub const HASH_ALGORITHM: &str = "sha256";

/// Canonicalization scheme identifier recorded in headers.
pub const CANONICALIZATION: &str = "json-c14n-v1";

// ============================================================================
// SECTION: Record Types
// ============================================================================

/// One record of the append-only trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceRecord {
    /// Run header; always index 0.
    Header(HeaderRecord),
    /// One executed step.
    Step(StepRecord),
    /// One loop decision.
    Control(ControlRecord),
}

impl TraceRecord {
    /// Returns the record index.
    #[must_use]
    pub const fn index(&self) -> u64 {
        match self {
            Self::Header(record) => record.index,
            Self::Step(record) => record.index,
            Self::Control(record) => record.index,
        }
    }

    /// Returns the declared record hash.
    #[must_use]
    pub fn record_hash(&self) -> &str {
        match self {
            Self::Header(record) => &record.record_hash,
            Self::Step(record) => &record.record_hash,
            Self::Control(record) => &record.record_hash,
        }
    }

    /// Returns the declared previous-record hash, absent on the header.
    #[must_use]
    pub fn prev_hash(&self) -> Option<&str> {
        match self {
            Self::Header(_) => None,
            Self::Step(record) => Some(&record.prev_hash),
            Self::Control(record) => Some(&record.prev_hash),
        }
    }
}

/// Run header record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderRecord {
    /// Record index; always 0.
    pub index: u64,
    /// Trace schema version.
    pub version: String,
    /// Trace identifier.
    pub trace_id: TraceId,
    /// Deterministic clock seed for the run.
    pub created_at: Timestamp,
    /// Engine version executing the run.
    pub engine_version: String,
    /// Hash algorithm identifier.
    pub hash_algorithm: String,
    /// Canonicalization scheme identifier.
    pub canonicalization: String,
    /// Canonical hash of the normalized problem specification.
    pub problem_spec_hash: String,
    /// Canonical hash of the initial (pending) state.
    pub initial_state_hash: String,
    /// Hash of this record with `record_hash` omitted.
    pub record_hash: String,
}

/// Step execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Record index.
    pub index: u64,
    /// State `step_index` before the step was applied.
    pub step_index: u64,
    /// Validated step result.
    pub result: StepResult,
    /// Canonical hash of the state passed to the step.
    pub state_before_hash: String,
    /// Canonical hash of the state after application.
    pub state_after_hash: String,
    /// Hash of the prior record.
    pub prev_hash: String,
    /// Hash of this record with `record_hash` omitted.
    pub record_hash: String,
}

/// Loop decision actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Re-enter the loop segment at `start_step`.
    Repeat,
    /// Stop condition satisfied; continue past `end_step`.
    Stop,
    /// Iteration budget exhausted; continue past `end_step`.
    MaxIterationsReached,
}

/// Loop control record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRecord {
    /// Record index.
    pub index: u64,
    /// Control family; always `loop`.
    pub control_type: String,
    /// Decision taken at this point.
    pub action: ControlAction,
    /// Loop iteration at decision time (1-based).
    pub loop_iteration: u64,
    /// First step of the repeated segment.
    pub start_step: StepName,
    /// Last step of the repeated segment.
    pub end_step: StepName,
    /// Stop condition the decision evaluated.
    pub stop_condition: StopCondition,
    /// Canonical hash of the state the decision examined.
    pub state_hash: String,
    /// Hash of the prior record.
    pub prev_hash: String,
    /// Hash of this record with `record_hash` omitted.
    pub record_hash: String,
}

// ============================================================================
// SECTION: Record Hashing
// ============================================================================

/// Computes a record's hash over its canonical form without `record_hash`.
///
/// # Errors
///
/// Returns [`CanonicalError`] when canonical encoding fails.
pub fn compute_record_hash(record: &TraceRecord) -> Result<String, CanonicalError> {
    let mut value =
        serde_json::to_value(record).map_err(|err| CanonicalError::Serialize(err.to_string()))?;
    if let Some(map) = value.as_object_mut() {
        map.remove("record_hash");
    }
    hash_canonical_json(&value)
}

/// Seals a record by computing and storing its `record_hash`.
///
/// # Errors
///
/// Returns [`CanonicalError`] when canonical encoding fails.
pub fn seal_record(mut record: TraceRecord) -> Result<TraceRecord, CanonicalError> {
    let hash = compute_record_hash(&record)?;
    match &mut record {
        TraceRecord::Header(header) => header.record_hash = hash,
        TraceRecord::Step(step) => step.record_hash = hash,
        TraceRecord::Control(control) => control.record_hash = hash,
    }
    Ok(record)
}
