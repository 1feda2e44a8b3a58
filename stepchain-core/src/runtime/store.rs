// stepchain-core/src/runtime/store.rs
// ============================================================================
// Module: Stepchain In-Memory Collaborators
// Description: Reference implementations of the collaborator interfaces.
// Purpose: Provide deterministic stores and fixtures for tests and demos.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! These implementations back tests and local demos; production deployments
//! supply their own stores behind the same interfaces. The trace store is
//! idempotent by `(trace_id, index)`; the idempotency cache returns
//! byte-identical responses; the fixture provider replays canned bytes and
//! can simulate timeouts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use crate::core::TraceId;
use crate::interfaces::CacheError;
use crate::interfaces::IdempotencyCache;
use crate::interfaces::ModelProvider;
use crate::interfaces::ModelProviderError;
use crate::interfaces::TraceStore;
use crate::interfaces::TraceStoreError;

// ============================================================================
// SECTION: In-Memory Trace Store
// ============================================================================

/// In-memory trace store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTraceStore {
    /// Record bytes keyed by `(trace_id, index)`.
    records: Arc<Mutex<BTreeMap<(String, u64), Vec<u8>>>>,
}

impl InMemoryTraceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored record count for a trace.
    #[must_use]
    pub fn record_count(&self, trace_id: &TraceId) -> usize {
        self.records.lock().map_or(0, |guard| {
            guard.keys().filter(|(stored, _)| stored == trace_id.as_str()).count()
        })
    }
}

impl TraceStore for InMemoryTraceStore {
    fn append(&self, trace_id: &TraceId, index: u64, record_bytes: &[u8]) -> Result<(), TraceStoreError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| TraceStoreError::Io("trace store mutex poisoned".to_string()))?;
        let key = (trace_id.as_str().to_string(), index);
        if let Some(existing) = guard.get(&key) {
            if existing == record_bytes {
                return Ok(());
            }
            return Err(TraceStoreError::Conflict {
                trace_id: trace_id.as_str().to_string(),
                index,
            });
        }
        guard.insert(key, record_bytes.to_vec());
        Ok(())
    }
}

// ============================================================================
// SECTION: In-Memory Idempotency Cache
// ============================================================================

/// In-memory idempotency cache for tests and examples.
///
/// The time-to-live is recorded for backend parity but never evaluated:
/// expiry requires wall-clock time, which belongs to the real backend.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIdempotencyCache {
    /// Cached responses keyed by trace identifier.
    responses: Arc<Mutex<BTreeMap<String, (Vec<u8>, Duration)>>>,
}

impl InMemoryIdempotencyCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotencyCache for InMemoryIdempotencyCache {
    fn get(&self, trace_id: &TraceId) -> Result<Option<Vec<u8>>, CacheError> {
        let guard = self
            .responses
            .lock()
            .map_err(|_| CacheError::Backend("cache mutex poisoned".to_string()))?;
        Ok(guard.get(trace_id.as_str()).map(|(bytes, _)| bytes.clone()))
    }

    fn put(&self, trace_id: &TraceId, response_bytes: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.responses
            .lock()
            .map_err(|_| CacheError::Backend("cache mutex poisoned".to_string()))?
            .insert(trace_id.as_str().to_string(), (response_bytes.to_vec(), ttl));
        Ok(())
    }
}

// ============================================================================
// SECTION: Fixture Model Provider
// ============================================================================

/// Model provider replaying canned responses keyed by prompt.
#[derive(Debug, Default, Clone)]
pub struct FixtureModelProvider {
    /// Canned response bytes keyed by prompt.
    fixtures: BTreeMap<String, Vec<u8>>,
    /// Prompts that simulate a collaborator timeout.
    timeouts: BTreeSet<String>,
}

impl FixtureModelProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a canned response for a prompt.
    #[must_use]
    pub fn with_fixture(mut self, prompt: impl Into<String>, response: impl Into<Vec<u8>>) -> Self {
        self.fixtures.insert(prompt.into(), response.into());
        self
    }

    /// Registers a canned JSON response for a prompt.
    ///
    /// # Panics
    ///
    /// Never panics: JSON values always serialize.
    #[must_use]
    pub fn with_json_fixture(self, prompt: impl Into<String>, response: &Value) -> Self {
        let bytes = serde_json::to_vec(response).unwrap_or_default();
        self.with_fixture(prompt, bytes)
    }

    /// Marks a prompt as timing out.
    #[must_use]
    pub fn with_timeout(mut self, prompt: impl Into<String>) -> Self {
        self.timeouts.insert(prompt.into());
        self
    }
}

impl ModelProvider for FixtureModelProvider {
    fn generate(&self, prompt: &str, _schema: Option<&Value>) -> Result<Vec<u8>, ModelProviderError> {
        if self.timeouts.contains(prompt) {
            return Err(ModelProviderError::Timeout(format!("fixture timeout for prompt: {prompt}")));
        }
        self.fixtures
            .get(prompt)
            .cloned()
            .ok_or_else(|| ModelProviderError::Provider(format!("no fixture for prompt: {prompt}")))
    }
}
