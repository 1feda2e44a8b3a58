// stepchain-core/src/runtime/mod.rs
// ============================================================================
// Module: Stepchain Runtime
// Description: Engine runner, state manager, loop controller, and trace sink.
// Purpose: Execute problems deterministically over the core types.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime helpers orchestrate deterministic execution: the graph and
//! routing pick the step ordering, the registry supplies step functions, the
//! state manager applies results, the loop controller decides repeats, and
//! the writer commits the hash-chained trace. The verifier and metrics
//! modules operate offline on committed traces.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod engine;
pub mod graph;
pub mod looping;
pub mod metrics;
pub mod routing;
pub mod state_manager;
pub mod steps;
pub mod store;
pub mod structured;
pub mod verifier;
pub mod writer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use engine::ENGINE_VERSION;
pub use engine::EngineError;
pub use engine::EngineRunner;
pub use engine::ExecuteRequest;
pub use engine::ExecutionResult;
pub use graph::ExecutionGraph;
pub use graph::GraphError;
pub use graph::STANDARD_STEPS;
pub use looping::LoopConfig;
pub use looping::LoopController;
pub use looping::LoopError;
pub use looping::stop_condition_met;
pub use metrics::TraceMetrics;
pub use metrics::aggregate_trace_metrics;
pub use routing::DEFAULT_POLICY_NAME;
pub use routing::PolicyRegistry;
pub use routing::RoutingError;
pub use routing::RoutingPolicy;
pub use state_manager::StateError;
pub use state_manager::apply;
pub use state_manager::artifact_key;
pub use state_manager::check_transition;
pub use state_manager::mark_completed;
pub use state_manager::mark_failed;
pub use state_manager::transition_running;
pub use state_manager::validate_invariants;
pub use steps::Step;
pub use steps::StepContext;
pub use steps::StepRegistry;
pub use steps::build_step_result;
pub use store::FixtureModelProvider;
pub use store::InMemoryIdempotencyCache;
pub use store::InMemoryTraceStore;
pub use structured::StructuredGenerationError;
pub use structured::StructuredGenerator;
pub use verifier::TraceDivergence;
pub use verifier::TraceVerificationReport;
pub use verifier::TraceVerifyError;
pub use verifier::trace_divergence;
pub use verifier::verify_trace_bytes;
pub use writer::TraceWriteError;
pub use writer::TraceWriter;
