// stepchain-core/src/runtime/writer.rs
// ============================================================================
// Module: Stepchain Trace Writer
// Description: Append-only NDJSON sink for hash-chained records.
// Purpose: Commit records as canonical LF-terminated lines, verifying the chain.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The writer owns the output sink for one run. Every append re-derives the
//! record hash and checks the chain before any byte is committed, so the
//! sink never holds a partial or inconsistent record: one canonical JSON
//! object per line, LF-terminated, no blank lines, no trailing whitespace.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::CanonicalError;
use crate::core::TraceRecord;
use crate::core::canonical_json_bytes;
use crate::core::compute_record_hash;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Trace writer errors; all imply the trace cannot be trusted.
#[derive(Debug, Error)]
pub enum TraceWriteError {
    /// First record must be the header, and only the first.
    #[error("header must be exactly the first record (index {index})")]
    HeaderPosition {
        /// Index at which the violation occurred.
        index: u64,
    },
    /// Record index is not the next expected value.
    #[error("non-monotonic record index: expected {expected}, got {actual}")]
    NonMonotonicIndex {
        /// Expected next index.
        expected: u64,
        /// Declared index.
        actual: u64,
    },
    /// Declared `prev_hash` does not match the prior record hash.
    #[error("trace chain broken at index {index}")]
    ChainBroken {
        /// Index of the offending record.
        index: u64,
    },
    /// Declared `record_hash` does not match the recomputed value.
    #[error("record hash mismatch at index {index}")]
    RecordHashMismatch {
        /// Index of the offending record.
        index: u64,
    },
    /// Canonical encoding failed.
    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

impl TraceWriteError {
    /// Stable taxonomy code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Canonical(err) => err.code(),
            _ => "trace_chain_broken",
        }
    }
}

// ============================================================================
// SECTION: Trace Writer
// ============================================================================

/// Append-only writer producing the byte-exact trace of one run.
#[derive(Debug, Default)]
pub struct TraceWriter {
    /// Committed records in append order.
    records: Vec<TraceRecord>,
    /// Committed NDJSON bytes.
    bytes: Vec<u8>,
    /// Hash of the last committed record.
    last_hash: Option<String>,
}

impl TraceWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next expected record index.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.records.len() as u64
    }

    /// Returns the hash of the last committed record.
    #[must_use]
    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Returns the committed records.
    #[must_use]
    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    /// Returns the committed NDJSON bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the writer, returning records and bytes.
    #[must_use]
    pub fn into_parts(self) -> (Vec<TraceRecord>, Vec<u8>) {
        (self.records, self.bytes)
    }

    /// Verifies and commits one record.
    ///
    /// # Errors
    ///
    /// Returns [`TraceWriteError`] when the record breaks monotonicity, the
    /// hash chain, or its own hash; nothing is committed on error.
    pub fn append(&mut self, record: TraceRecord) -> Result<(), TraceWriteError> {
        let expected = self.next_index();
        let actual = record.index();
        if actual != expected {
            return Err(TraceWriteError::NonMonotonicIndex {
                expected,
                actual,
            });
        }

        let is_header = matches!(record, TraceRecord::Header(_));
        if is_header != (expected == 0) {
            return Err(TraceWriteError::HeaderPosition {
                index: actual,
            });
        }
        if record.prev_hash() != self.last_hash() {
            return Err(TraceWriteError::ChainBroken {
                index: actual,
            });
        }
        let recomputed = compute_record_hash(&record)?;
        if recomputed != record.record_hash() {
            return Err(TraceWriteError::RecordHashMismatch {
                index: actual,
            });
        }

        let mut line = canonical_json_bytes(&record)?;
        line.push(b'\n');
        self.bytes.extend_from_slice(&line);
        self.last_hash = Some(recomputed);
        self.records.push(record);
        Ok(())
    }
}
