// stepchain-core/src/runtime/routing.rs
// ============================================================================
// Module: Stepchain Routing Policies
// Description: Named step orderings selected by policy profile.
// Purpose: Resolve a problem's settings to a deterministic execution graph.
// Dependencies: crate::core, crate::runtime::graph
// ============================================================================

//! ## Overview
//! A routing policy names a step ordering. The registry resolves
//! `settings.policy_profile` (falling back to `default`) and builds the
//! execution graph for the run. Registration order never affects resolution;
//! lookups are by exact name.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::ProblemSpec;
use crate::core::StepName;
use crate::runtime::graph::ExecutionGraph;
use crate::runtime::graph::GraphError;
use crate::runtime::graph::STANDARD_STEPS;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Routing policy errors.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// A policy with this name is already registered.
    #[error("routing policy already registered: {0}")]
    AlreadyRegistered(String),
    /// No policy with this name exists.
    #[error("unknown routing policy: {0}")]
    UnknownPolicy(String),
    /// Policy steps do not form a valid graph.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl RoutingError {
    /// Stable taxonomy code for this error family.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        "schema_invalid"
    }
}

// ============================================================================
// SECTION: Routing Policy
// ============================================================================

/// Named deterministic step ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPolicy {
    /// Policy name referenced by `settings.policy_profile`.
    pub name: String,
    /// Steps in execution order.
    pub steps: Vec<StepName>,
}

/// Name of the implicit fallback policy.
pub const DEFAULT_POLICY_NAME: &str = "default";

// ============================================================================
// SECTION: Policy Registry
// ============================================================================

/// Deterministic policy registry with explicit ordering.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    /// Policies keyed by name.
    policies: BTreeMap<String, RoutingPolicy>,
}

impl PolicyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            policies: BTreeMap::new(),
        }
    }

    /// Registers a policy under its name.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] on duplicate names or invalid orderings.
    pub fn register(&mut self, policy: RoutingPolicy) -> Result<(), RoutingError> {
        ExecutionGraph::new(policy.steps.clone())?;
        if self.policies.contains_key(&policy.name) {
            return Err(RoutingError::AlreadyRegistered(policy.name));
        }
        self.policies.insert(policy.name.clone(), policy);
        Ok(())
    }

    /// Returns a policy by name.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::UnknownPolicy`] when the name is not registered.
    pub fn get(&self, name: &str) -> Result<&RoutingPolicy, RoutingError> {
        self.policies.get(name).ok_or_else(|| RoutingError::UnknownPolicy(name.to_string()))
    }

    /// Returns registered policy names in lexicographic order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.policies.keys().map(String::as_str).collect()
    }

    /// Resolves the execution graph for a problem specification.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] when the selected policy is unknown.
    pub fn resolve(&self, spec: &ProblemSpec) -> Result<ExecutionGraph, RoutingError> {
        let name = select_policy_name(spec);
        let policy = self.get(name)?;
        Ok(ExecutionGraph::new(policy.steps.clone())?)
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        let policy = RoutingPolicy {
            name: DEFAULT_POLICY_NAME.to_string(),
            steps: STANDARD_STEPS.to_vec(),
        };
        // The standard ordering is statically valid.
        let _ = registry.register(policy);
        registry
    }
}

/// Selects the policy name for a spec, falling back to `default`.
#[must_use]
pub fn select_policy_name(spec: &ProblemSpec) -> &str {
    spec.settings
        .as_ref()
        .and_then(|settings| settings.policy_profile.as_deref())
        .filter(|profile| !profile.is_empty())
        .unwrap_or(DEFAULT_POLICY_NAME)
}
