// stepchain-core/tests/store.rs
// ============================================================================
// Module: Collaborator Store Tests
// Description: Tests for the in-memory trace store and idempotency cache.
// ============================================================================
//! ## Overview
//! Validates idempotent appends keyed by `(trace_id, index)`, conflict
//! detection, and byte-identical cached responses.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::time::Duration;

use stepchain_core::IdempotencyCache;
use stepchain_core::InMemoryIdempotencyCache;
use stepchain_core::InMemoryTraceStore;
use stepchain_core::TraceId;
use stepchain_core::TraceStore;
use stepchain_core::interfaces::TraceStoreError;

// ============================================================================
// SECTION: Trace Store
// ============================================================================

/// Re-appending identical bytes at the same index is a no-op.
#[test]
fn trace_store_append_is_idempotent() {
    let store = InMemoryTraceStore::new();
    let trace_id = TraceId::new("trace-1");

    store.append(&trace_id, 0, b"header\n").unwrap();
    store.append(&trace_id, 0, b"header\n").unwrap();
    store.append(&trace_id, 1, b"step\n").unwrap();

    assert_eq!(store.record_count(&trace_id), 2);
}

/// Differing bytes at an occupied index are a conflict.
#[test]
fn trace_store_rejects_conflicting_append() {
    let store = InMemoryTraceStore::new();
    let trace_id = TraceId::new("trace-1");

    store.append(&trace_id, 0, b"header\n").unwrap();
    let err = store.append(&trace_id, 0, b"different\n").unwrap_err();
    assert!(matches!(err, TraceStoreError::Conflict { .. }));
}

/// Appends are scoped per trace identifier.
#[test]
fn trace_store_scopes_by_trace_id() {
    let store = InMemoryTraceStore::new();
    store.append(&TraceId::new("trace-1"), 0, b"a\n").unwrap();
    store.append(&TraceId::new("trace-2"), 0, b"b\n").unwrap();
    assert_eq!(store.record_count(&TraceId::new("trace-1")), 1);
    assert_eq!(store.record_count(&TraceId::new("trace-2")), 1);
}

// ============================================================================
// SECTION: Idempotency Cache
// ============================================================================

/// Cached responses come back byte-identical.
#[test]
fn cache_returns_byte_identical_response() {
    let cache = InMemoryIdempotencyCache::new();
    let trace_id = TraceId::new("trace-1");
    let response = b"{\"final_state\":{}}".to_vec();

    cache.put(&trace_id, &response, Duration::from_secs(60)).unwrap();
    assert_eq!(cache.get(&trace_id).unwrap(), Some(response));
}

/// Missing entries return none.
#[test]
fn cache_misses_return_none() {
    let cache = InMemoryIdempotencyCache::new();
    assert_eq!(cache.get(&TraceId::new("absent")).unwrap(), None);
}
