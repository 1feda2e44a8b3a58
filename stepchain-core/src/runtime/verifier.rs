// stepchain-core/src/runtime/verifier.rs
// ============================================================================
// Module: Stepchain Trace Verifier
// Description: Offline re-validation of trace bytes and replay comparison.
// Purpose: Prove a trace is well-framed, hash-chained, and untampered.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The verifier re-derives everything a reader can check without re-running
//! the engine: strict NDJSON framing (one canonical line per record, LF
//! terminated, no blank lines), monotonic indices starting at the header,
//! the `prev_hash` chain, and every record's own hash. A single flipped byte
//! anywhere makes verification fail.
//!
//! [`trace_divergence`] supports determinism checks: byte comparison of two
//! traces reporting the first divergent line.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::CanonicalError;
use crate::core::TraceRecord;
use crate::core::canonical::canonical_value_bytes;
use crate::core::canonical::from_canonical_slice;
use crate::core::compute_record_hash;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Trace verification errors.
#[derive(Debug, Error)]
pub enum TraceVerifyError {
    /// Trace holds no records.
    #[error("trace is empty")]
    Empty,
    /// Trace does not end with a line feed.
    #[error("trace must end with a line feed")]
    MissingFinalNewline,
    /// A line is blank or fails strict parsing into a record.
    #[error("trace line {line} is not a valid record: {message}")]
    Framing {
        /// One-based line number.
        line: usize,
        /// Parse failure description.
        message: String,
    },
    /// A line does not re-encode to its own bytes.
    #[error("trace line {line} is not in canonical form")]
    NotCanonicalLine {
        /// One-based line number.
        line: usize,
    },
    /// Header is missing from position zero or repeated later.
    #[error("header must be exactly the first record (line {line})")]
    HeaderPosition {
        /// One-based line number.
        line: usize,
    },
    /// Record index does not continue the sequence.
    #[error("non-monotonic record index at line {line}: expected {expected}")]
    NonMonotonicIndex {
        /// One-based line number.
        line: usize,
        /// Expected index value.
        expected: u64,
    },
    /// `prev_hash` does not match the prior record's hash.
    #[error("trace chain broken at record {index}")]
    ChainBroken {
        /// Index of the offending record.
        index: u64,
    },
    /// Declared `record_hash` does not match the recomputed value.
    #[error("record hash mismatch at record {index}")]
    RecordHashMismatch {
        /// Index of the offending record.
        index: u64,
    },
    /// Canonical encoding failed while recomputing hashes.
    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

impl TraceVerifyError {
    /// Stable taxonomy code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Empty
            | Self::MissingFinalNewline
            | Self::Framing {
                ..
            }
            | Self::NotCanonicalLine {
                ..
            } => "schema_invalid",
            Self::Canonical(err) => err.code(),
            _ => "trace_chain_broken",
        }
    }
}

// ============================================================================
// SECTION: Verification Report
// ============================================================================

/// Summary of a successfully verified trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceVerificationReport {
    /// Total records, header included.
    pub records: usize,
    /// Step records.
    pub step_records: usize,
    /// Control records.
    pub control_records: usize,
    /// Hash of the final record.
    pub final_record_hash: String,
}

/// Re-validates trace bytes end to end.
///
/// # Errors
///
/// Returns [`TraceVerifyError`] on the first framing, ordering, chain, or
/// hash violation.
pub fn verify_trace_bytes(bytes: &[u8]) -> Result<TraceVerificationReport, TraceVerifyError> {
    if bytes.is_empty() {
        return Err(TraceVerifyError::Empty);
    }
    if bytes.last() != Some(&b'\n') {
        return Err(TraceVerifyError::MissingFinalNewline);
    }

    let mut step_records = 0usize;
    let mut control_records = 0usize;
    let mut prev_hash: Option<String> = None;
    let mut line_number = 0usize;

    for line in bytes[..bytes.len() - 1].split(|byte| *byte == b'\n') {
        line_number += 1;
        if line.is_empty() {
            return Err(TraceVerifyError::Framing {
                line: line_number,
                message: "blank line".to_string(),
            });
        }
        let value = from_canonical_slice(line).map_err(|err| TraceVerifyError::Framing {
            line: line_number,
            message: err.to_string(),
        })?;
        if canonical_value_bytes(&value)? != line {
            return Err(TraceVerifyError::NotCanonicalLine {
                line: line_number,
            });
        }
        let record: TraceRecord =
            serde_json::from_value(value).map_err(|err| TraceVerifyError::Framing {
                line: line_number,
                message: err.to_string(),
            })?;

        let expected_index = line_number as u64 - 1;
        if record.index() != expected_index {
            return Err(TraceVerifyError::NonMonotonicIndex {
                line: line_number,
                expected: expected_index,
            });
        }
        if matches!(record, TraceRecord::Header(_)) != (expected_index == 0) {
            return Err(TraceVerifyError::HeaderPosition {
                line: line_number,
            });
        }
        if record.prev_hash() != prev_hash.as_deref() {
            return Err(TraceVerifyError::ChainBroken {
                index: record.index(),
            });
        }
        let recomputed = compute_record_hash(&record)?;
        if recomputed != record.record_hash() {
            return Err(TraceVerifyError::RecordHashMismatch {
                index: record.index(),
            });
        }

        match &record {
            TraceRecord::Header(_) => {}
            TraceRecord::Step(_) => step_records += 1,
            TraceRecord::Control(_) => control_records += 1,
        }
        prev_hash = Some(recomputed);
    }

    prev_hash.map_or(Err(TraceVerifyError::Empty), |final_record_hash| {
        Ok(TraceVerificationReport {
            records: line_number,
            step_records,
            control_records,
            final_record_hash,
        })
    })
}

// ============================================================================
// SECTION: Determinism Comparison
// ============================================================================

/// First point at which two traces diverge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceDivergence {
    /// One-based line number of the first difference.
    pub line: usize,
    /// Expected line, absent when the expected trace is shorter.
    pub expected: Option<String>,
    /// Actual line, absent when the actual trace is shorter.
    pub actual: Option<String>,
}

/// Compares two traces line by line, reporting the first divergence.
#[must_use]
pub fn trace_divergence(expected: &[u8], actual: &[u8]) -> Option<TraceDivergence> {
    if expected == actual {
        return None;
    }
    let expected_lines: Vec<&[u8]> = expected.split(|byte| *byte == b'\n').collect();
    let actual_lines: Vec<&[u8]> = actual.split(|byte| *byte == b'\n').collect();
    let length = expected_lines.len().max(actual_lines.len());
    for position in 0..length {
        let expected_line = expected_lines.get(position).copied();
        let actual_line = actual_lines.get(position).copied();
        if expected_line != actual_line {
            return Some(TraceDivergence {
                line: position + 1,
                expected: expected_line.map(|line| String::from_utf8_lossy(line).into_owned()),
                actual: actual_line.map(|line| String::from_utf8_lossy(line).into_owned()),
            });
        }
    }
    None
}
