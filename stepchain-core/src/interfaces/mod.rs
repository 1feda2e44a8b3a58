// stepchain-core/src/interfaces/mod.rs
// ============================================================================
// Module: Stepchain Interfaces
// Description: Backend-agnostic interfaces for collaborators.
// Purpose: Define the contract surfaces used by the engine runtime.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the engine integrates with external systems without
//! embedding backend details. Implementations must be deterministic under
//! replay: a collaborator response becomes part of the calling step's inputs
//! and is covered by `input_hash`, so cached or fixture responses must be
//! byte-identical to the originals.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::core::TraceId;

// ============================================================================
// SECTION: Model Provider
// ============================================================================

/// Model provider errors.
#[derive(Debug, Error)]
pub enum ModelProviderError {
    /// Provider call exceeded its caller-supplied deadline.
    #[error("model provider timeout: {0}")]
    Timeout(String),
    /// Provider reported an error.
    #[error("model provider error: {0}")]
    Provider(String),
}

impl ModelProviderError {
    /// Stable taxonomy code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "collaborator_timeout",
            Self::Provider(_) => "structured_generation_failed",
        }
    }
}

/// Deterministic oracle for model-backed steps.
///
/// Under replay the provider must return byte-identical responses for
/// identical `(prompt, schema)` inputs; fixtures satisfy this trivially.
pub trait ModelProvider {
    /// Generates raw response bytes for a prompt, optionally schema-guided.
    ///
    /// # Errors
    ///
    /// Returns [`ModelProviderError`] when generation fails or times out.
    fn generate(&self, prompt: &str, schema: Option<&Value>) -> Result<Vec<u8>, ModelProviderError>;
}

// ============================================================================
// SECTION: Trace Store
// ============================================================================

/// Trace store errors.
#[derive(Debug, Error)]
pub enum TraceStoreError {
    /// Store I/O error.
    #[error("trace store io error: {0}")]
    Io(String),
    /// A record was re-appended with different bytes.
    #[error("trace store conflict at ({trace_id}, {index})")]
    Conflict {
        /// Trace identifier of the conflicting append.
        trace_id: String,
        /// Record index of the conflicting append.
        index: u64,
    },
}

/// Append-only record sink, idempotent by `(trace_id, index)`.
pub trait TraceStore {
    /// Appends one encoded record line.
    ///
    /// Re-appending the same `(trace_id, index)` with identical bytes is a
    /// no-op; differing bytes are a conflict.
    ///
    /// # Errors
    ///
    /// Returns [`TraceStoreError`] when the append fails or conflicts.
    fn append(&self, trace_id: &TraceId, index: u64, record_bytes: &[u8]) -> Result<(), TraceStoreError>;
}

// ============================================================================
// SECTION: Idempotency Cache
// ============================================================================

/// Idempotency cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Cache backend reported an error.
    #[error("idempotency cache error: {0}")]
    Backend(String),
}

/// Response cache keyed by trace identifier.
///
/// A cached response must be byte-identical to the original.
pub trait IdempotencyCache {
    /// Returns the cached response bytes, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend fails.
    fn get(&self, trace_id: &TraceId) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores response bytes with a time-to-live.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] when the backend fails.
    fn put(&self, trace_id: &TraceId, response_bytes: &[u8], ttl: Duration) -> Result<(), CacheError>;
}

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// Cooperative cancellation signal checked between steps.
pub trait CancellationSignal {
    /// Returns true when the run should stop before the next step.
    fn is_cancelled(&self) -> bool;
}

/// Signal that never requests cancellation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelled;

impl CancellationSignal for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}
