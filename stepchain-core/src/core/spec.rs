// stepchain-core/src/core/spec.rs
// ============================================================================
// Module: Stepchain Problem Specification
// Description: Immutable problem input with settings for loops and checks.
// Purpose: Define the canonical problem contract with validation helpers.
// Dependencies: crate::core::{canonical, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A problem specification is the immutable input of a run: prompt, ordered
//! constraints and goals, opaque context, and engine settings (routing
//! profile, verification paths, loop configuration). Specs are untrusted:
//! validation enumerates every violated rule rather than stopping at the
//! first, so callers can surface complete diagnostics in one pass.
//!
//! Unknown fields are preserved through (de)serialization; the spec hash
//! covers the normalized document.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::canonical::CanonicalError;
use crate::core::canonical::hash_canonical_json;
use crate::core::identifiers::RequestId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Version Gate
// ============================================================================

/// Supported MAJOR component of `problem_spec.version`.
pub const SUPPORTED_SPEC_MAJOR: u64 = 1;

/// Parses a strict `MAJOR.MINOR.PATCH` semantic version.
#[must_use]
pub fn parse_semver(value: &str) -> Option<(u64, u64, u64)> {
    let mut parts = value.split('.');
    let major = parse_semver_component(parts.next()?)?;
    let minor = parse_semver_component(parts.next()?)?;
    let patch = parse_semver_component(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// Parses one numeric semver component with no sign or leading junk.
fn parse_semver_component(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

// ============================================================================
// SECTION: Problem Specification
// ============================================================================

/// Immutable problem specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemSpec {
    /// Specification schema version (semver; MAJOR gates acceptance).
    pub version: String,
    /// Stable request identifier.
    pub id: RequestId,
    /// Creation timestamp (ISO-8601 UTC).
    pub created_at: Timestamp,
    /// Problem inputs.
    pub inputs: ProblemInputs,
    /// Optional engine settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ProblemSettings>,
    /// Opaque provenance payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Value>,
    /// Unknown fields preserved for hashing and round-trips.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ProblemSpec {
    /// Computes the canonical hash of the normalized specification.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalError`] when canonical encoding fails.
    pub fn canonical_hash(&self) -> Result<String, CanonicalError> {
        hash_canonical_json(self)
    }

    /// Validates the specification, enumerating every violated rule.
    ///
    /// # Errors
    ///
    /// Returns [`SpecValidationError`] listing all violations.
    pub fn validate(&self) -> Result<(), SpecValidationError> {
        let mut violations = Vec::new();

        match parse_semver(&self.version) {
            None => violations.push(Violation::new(
                "schema_invalid",
                "version",
                "must be a semantic version (MAJOR.MINOR.PATCH)",
            )),
            Some((major, _, _)) if major != SUPPORTED_SPEC_MAJOR => {
                violations.push(Violation::new(
                    "version_unsupported",
                    "version",
                    format!("major version {major} is not supported (expected {SUPPORTED_SPEC_MAJOR})"),
                ));
            }
            Some(_) => {}
        }

        if self.id.as_str().trim().is_empty() {
            violations.push(Violation::new("schema_invalid", "id", "must be a non-empty string"));
        }

        self.inputs.collect_violations(&mut violations);

        if let Some(settings) = &self.settings {
            settings.collect_violations(&mut violations);
        }

        if let Some(provenance) = &self.provenance
            && !provenance.is_object()
        {
            violations.push(Violation::new("schema_invalid", "provenance", "must be an object"));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SpecValidationError {
                violations,
            })
        }
    }
}

/// Problem inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemInputs {
    /// Task prompt; must be non-empty after whitespace trim.
    pub prompt: String,
    /// Ordered constraint statements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<String>>,
    /// Ordered goal statements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<String>>,
    /// Opaque context mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, Value>>,
    /// Unknown fields preserved for hashing and round-trips.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ProblemInputs {
    /// Appends input-level violations.
    fn collect_violations(&self, violations: &mut Vec<Violation>) {
        if self.prompt.trim().is_empty() {
            violations.push(Violation::new(
                "schema_invalid",
                "inputs.prompt",
                "must be a non-empty string",
            ));
        }
        collect_string_list(self.constraints.as_deref(), "inputs.constraints", violations);
        collect_string_list(self.goals.as_deref(), "inputs.goals", violations);
    }
}

/// Flags entries of an optional string list that are empty after trim.
fn collect_string_list(list: Option<&[String]>, field: &str, violations: &mut Vec<Violation>) {
    let Some(list) = list else {
        return;
    };
    for (position, entry) in list.iter().enumerate() {
        if entry.trim().is_empty() {
            violations.push(Violation::new(
                "schema_invalid",
                format!("{field}[{position}]"),
                "must be a non-empty string",
            ));
        }
    }
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Engine settings carried inside a problem specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemSettings {
    /// Default evidence requirement for verification checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_required: Option<bool>,
    /// Upper bound on executed steps, including loop expansion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
    /// Routing policy selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_profile: Option<String>,
    /// Model profile recorded in state metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_profile: Option<String>,
    /// Enables schema-enforced generation at the collaborator boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_generation: Option<bool>,
    /// Verification paths evaluated by the Verify step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_paths: Option<Vec<VerificationPathConfig>>,
    /// Loop configuration.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "loop")]
    pub loop_settings: Option<LoopSettings>,
    /// Unknown fields preserved for hashing and round-trips.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ProblemSettings {
    /// Appends settings-level violations.
    fn collect_violations(&self, violations: &mut Vec<Violation>) {
        if self.max_steps == Some(0) {
            violations.push(Violation::new("schema_invalid", "settings.max_steps", "must be > 0"));
        }
        collect_non_empty_option(
            self.policy_profile.as_deref(),
            "settings.policy_profile",
            violations,
        );
        collect_non_empty_option(
            self.model_profile.as_deref(),
            "settings.model_profile",
            violations,
        );
        if let Some(paths) = &self.verification_paths {
            for (position, path) in paths.iter().enumerate() {
                if path.name.trim().is_empty() {
                    violations.push(Violation::new(
                        "schema_invalid",
                        format!("settings.verification_paths[{position}].name"),
                        "must be a non-empty string",
                    ));
                }
            }
        }
    }
}

/// Flags an optional string setting that is present but blank.
fn collect_non_empty_option(value: Option<&str>, field: &str, violations: &mut Vec<Violation>) {
    if let Some(value) = value
        && value.trim().is_empty()
    {
        violations.push(Violation::new("schema_invalid", field, "must be a non-empty string"));
    }
}

/// One verification path evaluated by the Verify step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerificationPathConfig {
    /// Path name; unique within the configuration by convention.
    pub name: String,
    /// Per-path override of the evidence requirement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_required: Option<bool>,
}

// ============================================================================
// SECTION: Loop Settings (wire form)
// ============================================================================

/// Loop configuration as written in the problem specification.
///
/// Step names and the stop condition are kept in wire form here; resolution
/// against the execution graph happens in the loop controller, which reports
/// `loop_config_invalid` / `stop_condition_invalid` with full context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoopSettings {
    /// Whether the loop is active.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// First step of the repeated segment.
    pub start_step: String,
    /// Last step of the repeated segment; the decision point.
    pub end_step: String,
    /// Maximum number of iterations; must be positive.
    pub max_iterations: u64,
    /// Stop condition in wire form.
    pub stop_condition: StopConditionSettings,
}

/// Loops default to enabled when the block is present.
const fn default_enabled() -> bool {
    true
}

/// Stop condition as written in the problem specification.
///
/// The legacy `equals` field is accepted and rewritten to
/// `operator = "equals"` during resolution; combining it with
/// `operator`/`value` is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopConditionSettings {
    /// Dotted path rooted at `artifacts.`.
    pub path: String,
    /// Comparison operator name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    /// Expected value for the comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Legacy equality shorthand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,
}

// ============================================================================
// SECTION: Resolved Stop Condition
// ============================================================================

/// Stop-condition comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOperator {
    /// Equality across any matching value types.
    Equals,
    /// Inequality across any matching value types.
    NotEquals,
    /// Numeric greater-than.
    Gt,
    /// Numeric greater-than-or-equal.
    Gte,
    /// Numeric less-than.
    Lt,
    /// Numeric less-than-or-equal.
    Lte,
}

impl StopOperator {
    /// Returns the wire name of the operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }

    /// Returns true for the numeric ordering operators.
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    /// Resolves a wire operator name.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "equals" => Some(Self::Equals),
            "not_equals" => Some(Self::NotEquals),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }
}

/// Fully resolved stop condition as recorded in control records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopCondition {
    /// Dotted path rooted at `artifacts.`.
    pub path: String,
    /// Comparison operator.
    pub operator: StopOperator,
    /// Expected value.
    pub value: Value,
}

// ============================================================================
// SECTION: Validation Errors
// ============================================================================

/// One violated specification rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Stable taxonomy code.
    pub code: String,
    /// Dotted field path relative to the spec root.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl Violation {
    /// Creates a violation entry.
    #[must_use]
    pub fn new(code: &str, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Specification validation failure listing every violated rule.
#[derive(Debug)]
pub struct SpecValidationError {
    /// All violations found in one validation pass.
    pub violations: Vec<Violation>,
}

impl std::error::Error for SpecValidationError {}

impl SpecValidationError {
    /// Stable taxonomy code for the failure as a whole.
    ///
    /// Version gating dominates: a spec from an unsupported MAJOR reports
    /// `version_unsupported` even when other fields are also invalid.
    #[must_use]
    pub fn code(&self) -> &'static str {
        if self.violations.iter().any(|violation| violation.code == "version_unsupported") {
            "version_unsupported"
        } else {
            "schema_invalid"
        }
    }
}

impl fmt::Display for SpecValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "problem spec validation failed: ")?;
        for (position, violation) in self.violations.iter().enumerate() {
            if position > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}
