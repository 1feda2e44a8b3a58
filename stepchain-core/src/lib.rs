// stepchain-core/src/lib.rs
// ============================================================================
// Module: Stepchain Core Library
// Description: Public API surface for the deterministic reasoning engine.
// Purpose: Expose core types, interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Stepchain executes a fixed sequence of named steps over an append-only
//! reasoning state, emitting a tamper-evident, hash-chained NDJSON trace
//! whose bytes are reproducible from the inputs alone. It is embeddable and
//! backend-agnostic: persistence, caching, and model access integrate
//! through explicit interfaces rather than framework coupling.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::CacheError;
pub use interfaces::CancellationSignal;
pub use interfaces::IdempotencyCache;
pub use interfaces::ModelProvider;
pub use interfaces::ModelProviderError;
pub use interfaces::NeverCancelled;
pub use interfaces::TraceStore;
pub use interfaces::TraceStoreError;
pub use runtime::ENGINE_VERSION;
pub use runtime::EngineError;
pub use runtime::EngineRunner;
pub use runtime::ExecuteRequest;
pub use runtime::ExecutionGraph;
pub use runtime::ExecutionResult;
pub use runtime::FixtureModelProvider;
pub use runtime::InMemoryIdempotencyCache;
pub use runtime::InMemoryTraceStore;
pub use runtime::LoopConfig;
pub use runtime::LoopController;
pub use runtime::LoopError;
pub use runtime::PolicyRegistry;
pub use runtime::RoutingPolicy;
pub use runtime::StepRegistry;
pub use runtime::StructuredGenerator;
pub use runtime::TraceMetrics;
pub use runtime::TraceVerificationReport;
pub use runtime::TraceWriter;
pub use runtime::aggregate_trace_metrics;
pub use runtime::trace_divergence;
pub use runtime::verify_trace_bytes;
