// stepchain-core/src/core/result.rs
// ============================================================================
// Module: Stepchain Step Results
// Description: Step names, statuses, and the validated step-result contract.
// Purpose: Define the only channel through which steps report work.
// Dependencies: crate::core::{canonical, time}, serde
// ============================================================================

//! ## Overview
//! Every step invocation yields exactly one [`StepResult`]. The contract is
//! strict: success carries an output, failure carries errors, skipped carries
//! neither, and both hashes are canonical SHA-256 renderings. Contract
//! validation enumerates every violated rule so a defective step surfaces all
//! of its problems at once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::canonical::is_hash_hex;
use crate::core::spec::Violation;
use crate::core::spec::parse_semver;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Step Names
// ============================================================================

/// Registered step names, frozen per engine version.
///
/// Adding a step is a MAJOR engine change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepName {
    /// Prompt normalization.
    Normalize,
    /// Goal decomposition into tasks.
    Decompose,
    /// Deterministic evidence collection.
    AcquireEvidence,
    /// Computation over decomposed tasks.
    Compute,
    /// Verification against configured paths.
    Verify,
    /// Synthesis of the final summary.
    Synthesize,
    /// Structured audit report.
    Audit,
}

impl StepName {
    /// Returns the wire name of the step.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normalize => "Normalize",
            Self::Decompose => "Decompose",
            Self::AcquireEvidence => "AcquireEvidence",
            Self::Compute => "Compute",
            Self::Verify => "Verify",
            Self::Synthesize => "Synthesize",
            Self::Audit => "Audit",
        }
    }

    /// Returns the canonical short artifact key written by the step.
    #[must_use]
    pub const fn artifact_key(self) -> &'static str {
        match self {
            Self::Normalize => "normalized",
            Self::Decompose => "decomposition",
            Self::AcquireEvidence => "evidence",
            Self::Compute => "computation",
            Self::Verify => "verification",
            Self::Synthesize => "synthesis",
            Self::Audit => "audit",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unregistered step names.
#[derive(Debug, Error)]
#[error("unknown step: {0}")]
pub struct UnknownStepError(pub String);

impl UnknownStepError {
    /// Stable taxonomy code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        "step_unknown"
    }
}

impl FromStr for StepName {
    type Err = UnknownStepError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Normalize" => Ok(Self::Normalize),
            "Decompose" => Ok(Self::Decompose),
            "AcquireEvidence" => Ok(Self::AcquireEvidence),
            "Compute" => Ok(Self::Compute),
            "Verify" => Ok(Self::Verify),
            "Synthesize" => Ok(Self::Synthesize),
            "Audit" => Ok(Self::Audit),
            other => Err(UnknownStepError(other.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Step Status
// ============================================================================

/// Outcome of one step invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step produced an output artifact.
    Success,
    /// Step failed and reported errors.
    Failed,
    /// Step was skipped; no output, no errors.
    Skipped,
}

// ============================================================================
// SECTION: Error Entries
// ============================================================================

/// Structured error entry carried by step results and state history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Stable taxonomy code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Step attribution, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepName>,
}

impl ErrorEntry {
    /// Creates an unattributed error entry.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            step: None,
        }
    }

    /// Creates an error entry attributed to a step.
    #[must_use]
    pub fn for_step(code: impl Into<String>, message: impl Into<String>, step: StepName) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            step: Some(step),
        }
    }
}

// ============================================================================
// SECTION: Step Metrics
// ============================================================================

/// Optional collaborator metrics attached to a step result.
///
/// Metric values are integer-only; fractional readings are rounded by the
/// collaborator boundary before they reach the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepMetrics {
    /// Tokens consumed by the collaborator call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_in: Option<u64>,
    /// Tokens produced by the collaborator call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_out: Option<u64>,
    /// Collaborator latency in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

// ============================================================================
// SECTION: Step Result
// ============================================================================

/// Schema version of step results.
pub const RESULT_VERSION: &str = "1.0.0";

/// Validated output of one step invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Result schema version.
    pub version: String,
    /// Registered step name.
    pub step: StepName,
    /// Step outcome.
    pub status: StepStatus,
    /// Canonical hash of the step's input projection.
    pub input_hash: String,
    /// Canonical hash of the step's output.
    pub output_hash: String,
    /// Step start per the deterministic clock.
    pub started_at: Timestamp,
    /// Step finish per the deterministic clock.
    pub finished_at: Timestamp,
    /// Output artifact; present iff status is success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Errors; present iff status is failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorEntry>>,
    /// Optional collaborator metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<StepMetrics>,
}

impl StepResult {
    /// Validates the step-result contract, enumerating every violated rule.
    ///
    /// # Errors
    ///
    /// Returns [`StepContractError`] listing all violations.
    pub fn validate(&self) -> Result<(), StepContractError> {
        let mut violations = Vec::new();

        if parse_semver(&self.version).is_none() {
            violations.push(Violation::new(
                "step_contract_violation",
                "version",
                "must be a semantic version (MAJOR.MINOR.PATCH)",
            ));
        }
        if !is_hash_hex(&self.input_hash) {
            violations.push(Violation::new(
                "step_contract_violation",
                "input_hash",
                "must be 64 lowercase hex digits",
            ));
        }
        if !is_hash_hex(&self.output_hash) {
            violations.push(Violation::new(
                "step_contract_violation",
                "output_hash",
                "must be 64 lowercase hex digits",
            ));
        }
        if self.finished_at < self.started_at {
            violations.push(Violation::new(
                "step_contract_violation",
                "finished_at",
                "must not precede started_at",
            ));
        }

        match self.status {
            StepStatus::Success => {
                if self.output.is_none() {
                    violations.push(Violation::new(
                        "step_contract_violation",
                        "output",
                        "success requires output",
                    ));
                }
                if self.errors.is_some() {
                    violations.push(Violation::new(
                        "step_contract_violation",
                        "errors",
                        "success must not carry errors",
                    ));
                }
            }
            StepStatus::Failed => {
                if self.errors.as_ref().is_none_or(Vec::is_empty) {
                    violations.push(Violation::new(
                        "step_contract_violation",
                        "errors",
                        "failed requires at least one error",
                    ));
                }
                if self.output.is_some() {
                    violations.push(Violation::new(
                        "step_contract_violation",
                        "output",
                        "failed must not carry output",
                    ));
                }
            }
            StepStatus::Skipped => {
                if self.output.is_some() || self.errors.is_some() {
                    violations.push(Violation::new(
                        "step_contract_violation",
                        "status",
                        "skipped carries neither output nor errors",
                    ));
                }
            }
        }

        if let Some(errors) = &self.errors {
            for (position, entry) in errors.iter().enumerate() {
                if entry.code.trim().is_empty() || entry.message.trim().is_empty() {
                    violations.push(Violation::new(
                        "step_contract_violation",
                        format!("errors[{position}]"),
                        "entries require code and message",
                    ));
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(StepContractError {
                step: self.step,
                violations,
            })
        }
    }
}

/// Step-result contract failure listing every violated rule.
#[derive(Debug)]
pub struct StepContractError {
    /// Step whose result violated the contract.
    pub step: StepName,
    /// All violations found in one validation pass.
    pub violations: Vec<Violation>,
}

impl std::error::Error for StepContractError {}

impl StepContractError {
    /// Stable taxonomy code for this error family.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        "step_contract_violation"
    }
}

impl fmt::Display for StepContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step result contract violated for {}: ", self.step)?;
        for (position, violation) in self.violations.iter().enumerate() {
            if position > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}
