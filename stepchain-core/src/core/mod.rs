// stepchain-core/src/core/mod.rs
// ============================================================================
// Module: Stepchain Core Types
// Description: Canonical encoding, schemas, state, and trace structures.
// Purpose: Provide stable, serializable types for deterministic runs.
// Dependencies: serde, serde_json, sha2, chrono
// ============================================================================

//! ## Overview
//! Core types define the problem specification, reasoning state, step-result
//! contract, and the hash-chained trace. These types are the canonical source
//! of truth for any derived surface (CLI, HTTP, or SDKs).

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod artifact;
pub mod canonical;
pub mod identifiers;
pub mod result;
pub mod spec;
pub mod state;
pub mod time;
pub mod trace;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use artifact::ArtifactPayload;
pub use artifact::AuditInputs;
pub use artifact::AuditReport;
pub use artifact::AuditSteps;
pub use artifact::AuditTimestamps;
pub use artifact::AuditVerification;
pub use artifact::ComputationOutput;
pub use artifact::DecompositionOutput;
pub use artifact::EvidenceOutput;
pub use artifact::NormalizedOutput;
pub use artifact::SynthesisOutput;
pub use artifact::VerificationAggregate;
pub use artifact::VerificationChecks;
pub use artifact::VerificationOutput;
pub use artifact::VerificationPathOutcome;
pub use artifact::VerificationStatus;
pub use canonical::CanonicalError;
pub use canonical::canonical_json_bytes;
pub use canonical::canonical_json_string;
pub use canonical::from_canonical_slice;
pub use canonical::hash_bytes;
pub use canonical::hash_canonical_json;
pub use identifiers::RequestId;
pub use identifiers::TraceId;
pub use result::ErrorEntry;
pub use result::RESULT_VERSION;
pub use result::StepContractError;
pub use result::StepMetrics;
pub use result::StepName;
pub use result::StepResult;
pub use result::StepStatus;
pub use result::UnknownStepError;
pub use spec::LoopSettings;
pub use spec::ProblemInputs;
pub use spec::ProblemSettings;
pub use spec::ProblemSpec;
pub use spec::SUPPORTED_SPEC_MAJOR;
pub use spec::SpecValidationError;
pub use spec::StopCondition;
pub use spec::StopConditionSettings;
pub use spec::StopOperator;
pub use spec::VerificationPathConfig;
pub use spec::Violation;
pub use state::ReasoningState;
pub use state::STATE_VERSION;
pub use state::StateMetadata;
pub use state::StateStatus;
pub use time::DeterministicClock;
pub use time::TimeError;
pub use time::Timestamp;
pub use trace::CANONICALIZATION;
pub use trace::ControlAction;
pub use trace::ControlRecord;
pub use trace::HASH_ALGORITHM;
pub use trace::HeaderRecord;
pub use trace::StepRecord;
pub use trace::TRACE_VERSION;
pub use trace::TraceRecord;
pub use trace::compute_record_hash;
pub use trace::seal_record;
