// stepchain-core/src/runtime/structured.rs
// ============================================================================
// Module: Stepchain Structured Generation
// Description: Schema-enforced generation over the model provider boundary.
// Purpose: Accept model output only after strict JSON and schema validation.
// Dependencies: crate::{core, interfaces}, jsonschema
// ============================================================================

//! ## Overview
//! Models are consulted as deterministic oracles: their raw bytes must parse
//! as strict JSON (duplicate keys rejected), form an object, and validate
//! against the caller's JSON Schema before they are accepted. Anything less
//! fails closed with `structured_generation_failed`; provider timeouts
//! surface as `collaborator_timeout`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::core::from_canonical_slice;
use crate::interfaces::ModelProvider;
use crate::interfaces::ModelProviderError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Structured generation errors.
#[derive(Debug, Error)]
pub enum StructuredGenerationError {
    /// Provider call failed or timed out.
    #[error(transparent)]
    Provider(#[from] ModelProviderError),
    /// Response bytes are not strict JSON.
    #[error("model response is not valid json: {0}")]
    InvalidJson(String),
    /// Response JSON is not an object.
    #[error("model response must be a json object")]
    NotAnObject,
    /// The supplied schema itself does not compile.
    #[error("response schema is invalid: {0}")]
    SchemaInvalid(String),
    /// Response violates the schema.
    #[error("model response violates the schema: {0}")]
    SchemaViolation(String),
}

impl StructuredGenerationError {
    /// Stable taxonomy code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Provider(err) => err.code(),
            _ => "structured_generation_failed",
        }
    }
}

// ============================================================================
// SECTION: Structured Generator
// ============================================================================

/// Schema-conformant generation using a model provider.
pub struct StructuredGenerator<P> {
    /// Backing model provider.
    provider: P,
}

impl<P: ModelProvider> StructuredGenerator<P> {
    /// Creates a generator over a provider.
    #[must_use]
    pub const fn new(provider: P) -> Self {
        Self {
            provider,
        }
    }

    /// Generates a schema-validated JSON object for a prompt.
    ///
    /// # Errors
    ///
    /// Returns [`StructuredGenerationError`] when the provider fails or the
    /// response does not satisfy the schema.
    pub fn generate(&self, prompt: &str, schema: &Value) -> Result<Value, StructuredGenerationError> {
        let validator = jsonschema::validator_for(schema)
            .map_err(|err| StructuredGenerationError::SchemaInvalid(err.to_string()))?;
        let bytes = self.provider.generate(prompt, Some(schema))?;
        let payload = from_canonical_slice(&bytes)
            .map_err(|err| StructuredGenerationError::InvalidJson(err.to_string()))?;
        if !payload.is_object() {
            return Err(StructuredGenerationError::NotAnObject);
        }
        validator
            .validate(&payload)
            .map_err(|err| StructuredGenerationError::SchemaViolation(err.to_string()))?;
        Ok(payload)
    }
}
