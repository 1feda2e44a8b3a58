// stepchain-core/src/core/canonical.rs
// ============================================================================
// Module: Stepchain Canonical Encoding
// Description: json-c14n-v1 encoding and SHA-256 content hashing.
// Purpose: Provide the single byte-unique JSON form used for every hash.
// Dependencies: serde, serde_json, sha2
// ============================================================================

//! ## Overview
//! `json-c14n-v1` encodes any JSON-shaped value to a unique byte sequence:
//! UTF-8, object keys sorted by raw byte order, array order preserved, no
//! inter-token whitespace, integers with no fractional part, and the standard
//! two-character escapes plus lowercase `\u00xx` for remaining control codes.
//! The strict decoder rejects duplicate object keys so that canonicalization
//! is idempotent over the full admissible input set.
//!
//! This module is the only path to a hash anywhere in the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeSeed;
use serde::de::MapAccess;
use serde::de::SeqAccess;
use serde::de::Visitor;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while producing or consuming canonical JSON.
#[derive(Debug, Error)]
pub enum CanonicalError {
    /// Value could not be represented as JSON (non-string map keys and
    /// similar serialization failures).
    #[error("value is not canonical json: {0}")]
    Serialize(String),
    /// A number is NaN or infinite.
    #[error("non-finite number cannot be canonicalized")]
    NonFiniteNumber,
    /// Input bytes are not strict canonical JSON.
    #[error("canonical json parse failed: {0}")]
    Parse(String),
}

impl CanonicalError {
    /// Stable taxonomy code for this error family.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        "canonicalization_error"
    }
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Returns `json-c14n-v1` bytes for a serializable value.
///
/// # Errors
///
/// Returns [`CanonicalError`] when the value cannot be represented as
/// canonical JSON.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let value = serde_json::to_value(value).map_err(|err| CanonicalError::Serialize(err.to_string()))?;
    canonical_value_bytes(&value)
}

/// Returns `json-c14n-v1` bytes for an already-materialized JSON value.
///
/// # Errors
///
/// Returns [`CanonicalError::NonFiniteNumber`] when a number is not finite.
pub fn canonical_value_bytes(value: &Value) -> Result<Vec<u8>, CanonicalError> {
    let mut out = Vec::new();
    write_value(value, &mut out)?;
    Ok(out)
}

/// Returns the canonical encoding as a UTF-8 string.
///
/// # Errors
///
/// Returns [`CanonicalError`] when encoding fails.
pub fn canonical_json_string<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    let bytes = canonical_json_bytes(value)?;
    // The writer only ever emits valid UTF-8.
    String::from_utf8(bytes).map_err(|err| CanonicalError::Serialize(err.to_string()))
}

/// Hashes a serializable value over its canonical encoding.
///
/// # Errors
///
/// Returns [`CanonicalError`] when encoding fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    Ok(hash_bytes(&canonical_json_bytes(value)?))
}

/// Hashes raw bytes with SHA-256, rendered as 64 lowercase hex digits.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

// ============================================================================
// SECTION: Strict Decoding
// ============================================================================

/// Parses canonical JSON bytes into a value, rejecting duplicate object keys.
///
/// # Errors
///
/// Returns [`CanonicalError::Parse`] on malformed JSON, duplicate keys, or
/// trailing input.
pub fn from_canonical_slice(bytes: &[u8]) -> Result<Value, CanonicalError> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let value = StrictValueSeed
        .deserialize(&mut deserializer)
        .map_err(|err| CanonicalError::Parse(err.to_string()))?;
    deserializer.end().map_err(|err| CanonicalError::Parse(err.to_string()))?;
    Ok(value)
}

/// Seed that builds a [`Value`] while rejecting duplicate object keys.
struct StrictValueSeed;

impl<'de> DeserializeSeed<'de> for StrictValueSeed {
    type Value = Value;

    fn deserialize<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(StrictValueVisitor)
    }
}

/// Visitor backing [`StrictValueSeed`].
struct StrictValueVisitor;

impl<'de> Visitor<'de> for StrictValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a canonical json value")
    }

    fn visit_bool<E>(self, value: bool) -> Result<Value, E> {
        Ok(Value::Bool(value))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Value, E> {
        Ok(Value::from(value))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Value, E> {
        Ok(Value::from(value))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Value, E>
    where
        E: serde::de::Error,
    {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .ok_or_else(|| E::custom("non-finite number"))
    }

    fn visit_str<E>(self, value: &str) -> Result<Value, E> {
        Ok(Value::String(value.to_string()))
    }

    fn visit_string<E>(self, value: String) -> Result<Value, E> {
        Ok(Value::String(value))
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut out = Vec::new();
        while let Some(element) = seq.next_element_seed(StrictValueSeed)? {
            out.push(element);
        }
        Ok(Value::Array(out))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut out = serde_json::Map::new();
        while let Some(key) = map.next_key::<String>()? {
            if out.contains_key(&key) {
                return Err(serde::de::Error::custom(format!("duplicate object key: {key}")));
            }
            let value = map.next_value_seed(StrictValueSeed)?;
            out.insert(key, value);
        }
        Ok(Value::Object(out))
    }
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Writes one value in canonical form.
fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<(), CanonicalError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(number) => write_number(number, out)?,
        Value::String(text) => write_string(text, out),
        Value::Array(items) => {
            out.push(b'[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable_by(|left, right| left.as_bytes().cmp(right.as_bytes()));
            out.push(b'{');
            for (position, key) in keys.iter().enumerate() {
                if position > 0 {
                    out.push(b',');
                }
                write_string(key, out);
                out.push(b':');
                // Key presence is guaranteed by the iteration above.
                if let Some(entry) = map.get(key.as_str()) {
                    write_value(entry, out)?;
                }
            }
            out.push(b'}');
        }
    }
    Ok(())
}

/// Writes a number, rejecting non-finite floating values.
fn write_number(number: &serde_json::Number, out: &mut Vec<u8>) -> Result<(), CanonicalError> {
    if let Some(float) = number.as_f64()
        && number.as_i64().is_none()
        && number.as_u64().is_none()
        && !float.is_finite()
    {
        return Err(CanonicalError::NonFiniteNumber);
    }
    out.extend_from_slice(number.to_string().as_bytes());
    Ok(())
}

/// Writes a JSON string with canonical escaping.
fn write_string(text: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for ch in text.chars() {
        match ch {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{0008}' => out.extend_from_slice(b"\\b"),
            '\u{0009}' => out.extend_from_slice(b"\\t"),
            '\u{000a}' => out.extend_from_slice(b"\\n"),
            '\u{000c}' => out.extend_from_slice(b"\\f"),
            '\u{000d}' => out.extend_from_slice(b"\\r"),
            ch if (ch as u32) < 0x20 => {
                let mut escape = [0u8; 6];
                escape[0] = b'\\';
                escape[1] = b'u';
                escape[2] = b'0';
                escape[3] = b'0';
                let code = ch as u32;
                escape[4] = HEX[(code >> 4) as usize & 0x0f];
                escape[5] = HEX[code as usize & 0x0f];
                out.extend_from_slice(&escape);
            }
            ch => {
                let mut buffer = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buffer).as_bytes());
            }
        }
    }
    out.push(b'"');
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Lowercase hex alphabet.
const HEX: &[u8; 16] = b"0123456789abcdef";

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

/// Returns true when the value is a 64-digit lowercase hex SHA-256 rendering.
#[must_use]
pub fn is_hash_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'))
}
