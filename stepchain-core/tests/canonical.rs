// stepchain-core/tests/canonical.rs
// ============================================================================
// Module: Canonical Encoding Tests
// Description: Tests for json-c14n-v1 encoding and hashing.
// ============================================================================
//! ## Overview
//! Validates byte-unique encoding: sorted keys, strict escapes, integer
//! emission, duplicate-key rejection, and idempotent decode/encode.

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

use serde_json::json;
use stepchain_core::canonical_json_string;
use stepchain_core::core::canonical::canonical_json_bytes;
use stepchain_core::core::canonical::is_hash_hex;
use stepchain_core::from_canonical_slice;
use stepchain_core::hash_canonical_json;

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Encoding is deterministic and sorts object keys by byte order.
#[test]
fn canonical_encoding_sorts_keys() {
    let value = json!({"b": 2, "a": 1, "c": {"z": 0, "y": 1}});
    let first = canonical_json_string(&value).unwrap();
    let second = canonical_json_string(&value).unwrap();
    assert_eq!(first, second);
    assert_eq!(first, r#"{"a":1,"b":2,"c":{"y":1,"z":0}}"#);
}

/// Key order in the input never changes the hash.
#[test]
fn canonical_hash_ignores_key_order() {
    let left = json!({"b": 1, "a": 2});
    let right = json!({"a": 2, "b": 1});
    assert_eq!(hash_canonical_json(&left).unwrap(), hash_canonical_json(&right).unwrap());
}

/// Array order is preserved and significant.
#[test]
fn canonical_encoding_preserves_array_order() {
    let left = json!([1, 2, 3]);
    let right = json!([3, 2, 1]);
    assert_eq!(canonical_json_string(&left).unwrap(), "[1,2,3]");
    assert_ne!(hash_canonical_json(&left).unwrap(), hash_canonical_json(&right).unwrap());
}

/// Integers are emitted with no fractional part; booleans and null are
/// lowercase; no whitespace appears between tokens.
#[test]
fn canonical_encoding_primitive_forms() {
    let value = json!({"i": 42, "n": null, "t": true, "f": false});
    assert_eq!(canonical_json_string(&value).unwrap(), r#"{"f":false,"i":42,"n":null,"t":true}"#);
}

/// Control codes escape as two-character sequences or lowercase `\u00xx`.
#[test]
fn canonical_encoding_escapes_control_codes() {
    let value = json!({"s": "a\tb\nc\u{001f}d\"e\\f"});
    assert_eq!(
        canonical_json_string(&value).unwrap(),
        "{\"s\":\"a\\tb\\nc\\u001fd\\\"e\\\\f\"}"
    );
}

/// Non-ASCII text is emitted as raw UTF-8, not escaped.
#[test]
fn canonical_encoding_keeps_utf8_raw() {
    let value = json!({"s": "héllo"});
    assert_eq!(canonical_json_bytes(&value).unwrap(), "{\"s\":\"héllo\"}".as_bytes());
}

// ============================================================================
// SECTION: Strict Decoding
// ============================================================================

/// Duplicate object keys are rejected.
#[test]
fn strict_decode_rejects_duplicate_keys() {
    let err = from_canonical_slice(br#"{"a":1,"a":2}"#).unwrap_err();
    assert!(err.to_string().contains("duplicate object key"));
    assert_eq!(err.code(), "canonicalization_error");
}

/// Trailing input after the value is rejected.
#[test]
fn strict_decode_rejects_trailing_input() {
    assert!(from_canonical_slice(b"{} trailing").is_err());
}

/// Decode followed by encode is idempotent.
#[test]
fn canonicalization_is_idempotent() {
    let bytes = br#"{ "b" : [1, 2],  "a": {"y": null} }"#;
    let decoded = from_canonical_slice(bytes).unwrap();
    let canonical = canonical_json_bytes(&decoded).unwrap();
    let redecoded = from_canonical_slice(&canonical).unwrap();
    assert_eq!(canonical, canonical_json_bytes(&redecoded).unwrap());
    assert_eq!(canonical, br#"{"a":{"y":null},"b":[1,2]}"#);
}

// ============================================================================
// SECTION: Hashing
// ============================================================================

/// Hashes render as 64 lowercase hex digits.
#[test]
fn hash_renders_lowercase_hex() {
    let hash = hash_canonical_json(&json!({"a": 1})).unwrap();
    assert!(is_hash_hex(&hash));
}

/// A known vector pins the hash construction.
#[test]
fn hash_matches_known_vector() {
    // sha256 of the literal bytes `{}`.
    assert_eq!(
        hash_canonical_json(&json!({})).unwrap(),
        "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
    );
}
