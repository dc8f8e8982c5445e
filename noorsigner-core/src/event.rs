// SPDX-FileCopyrightText: © 2026 NoorSigner contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! NIP-01 event canonicalization and hashing.
//!
//! The event id is `SHA-256(serialize([0, pubkey, created_at, kind, tags,
//! content]))` over the compact JSON form with HTML characters unescaped,
//! matching what `JSON.stringify` produces in JavaScript clients.
//!
//! The `pubkey` field is taken verbatim from the caller's event and is *not*
//! checked against the signing key; callers are responsible for providing the
//! pubkey that matches the identity they sign with.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::{Result, SignerError};

// Largest integer exactly representable in an f64.
const MAX_SAFE_FLOAT: f64 = 9_007_199_254_740_992.0;

fn integer_field(event: &Value, name: &'static str) -> Result<i64> {
    let number = event
        .get(name)
        .and_then(Value::as_number)
        .ok_or_else(|| SignerError::MalformedEvent(format!("missing or invalid {name} field")))?;

    // Integer literals are kept exact, even above 2^53.
    if let Some(value) = number.as_i64() {
        return Ok(value);
    }

    // Tolerate float spellings like 1.6942e9 as long as they carry no
    // fractional part and sit inside the f64-exact range.
    match number.as_f64() {
        Some(value) if value.fract() == 0.0 && value.abs() < MAX_SAFE_FLOAT => Ok(value as i64),
        _ => Err(SignerError::MalformedEvent(format!(
            "non-integer {name} field"
        ))),
    }
}

/// Produce the canonical NIP-01 serialization of an event JSON object.
///
/// # Errors
///
/// Returns [`SignerError::MalformedEvent`] when the JSON does not parse or a
/// required field is missing or mistyped.
pub fn canonical_serialization(event_json: &str) -> Result<String> {
    let event: Value = serde_json::from_str(event_json)
        .map_err(|e| SignerError::MalformedEvent(format!("invalid event JSON: {e}")))?;

    let pubkey = event
        .get("pubkey")
        .and_then(Value::as_str)
        .ok_or_else(|| SignerError::MalformedEvent("missing or invalid pubkey field".into()))?;

    let created_at = integer_field(&event, "created_at")?;
    let kind = integer_field(&event, "kind")?;

    let tags = event
        .get("tags")
        .and_then(Value::as_array)
        .ok_or_else(|| SignerError::MalformedEvent("missing or invalid tags field".into()))?;

    let content = event
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| SignerError::MalformedEvent("missing or invalid content field".into()))?;

    let serialization = json!([0, pubkey, created_at, kind, tags, content]);

    // serde_json emits compact JSON with no trailing newline and never
    // escapes `<`, `>` or `&`, so no further normalization is needed.
    Ok(serde_json::to_string(&serialization)?)
}

/// Compute the NIP-01 event hash (the event id) of an event JSON object.
pub fn event_hash(event_json: &str) -> Result<[u8; 32]> {
    let canonical = canonical_serialization(event_json)?;
    Ok(Sha256::digest(canonical.as_bytes()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBKEY: &str = "7e7e9c42a91bfef19fa929e5fda1b72e0ebc1a4c1141673e2794234d86addf4e";

    fn event(extra: &str) -> String {
        format!(
            r#"{{"pubkey":"{PUBKEY}","created_at":1700000000,"kind":1,"tags":[],"content":"hi"{extra}}}"#
        )
    }

    #[test]
    fn test_canonical_form() {
        let canonical = canonical_serialization(&event("")).unwrap();
        assert_eq!(
            canonical,
            format!(r#"[0,"{PUBKEY}",1700000000,1,[],"hi"]"#)
        );
    }

    #[test]
    fn test_extra_fields_ignored() {
        let canonical = canonical_serialization(&event(r#","id":"x","sig":"y""#)).unwrap();
        assert_eq!(
            canonical,
            format!(r#"[0,"{PUBKEY}",1700000000,1,[],"hi"]"#)
        );
    }

    #[test]
    fn test_html_characters_not_escaped() {
        let json = format!(
            r#"{{"pubkey":"{PUBKEY}","created_at":1,"kind":1,"tags":[],"content":"<script>&amp;</script>"}}"#
        );
        let canonical = canonical_serialization(&json).unwrap();
        assert!(canonical.contains("<script>&amp;</script>"));
        assert!(!canonical.contains("\\u003c"));
        assert!(!canonical.contains("\\u0026"));
    }

    #[test]
    fn test_float_created_at_becomes_integer() {
        let json = format!(
            r#"{{"pubkey":"{PUBKEY}","created_at":1.6942e9,"kind":1,"tags":[],"content":""}}"#
        );
        let canonical = canonical_serialization(&json).unwrap();
        assert!(canonical.contains(",1694200000,"));
    }

    #[test]
    fn test_fractional_created_at_rejected() {
        let json = format!(
            r#"{{"pubkey":"{PUBKEY}","created_at":1700000000.5,"kind":1,"tags":[],"content":""}}"#
        );
        assert!(matches!(
            canonical_serialization(&json),
            Err(SignerError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_missing_fields_rejected() {
        for field in ["pubkey", "created_at", "kind", "tags", "content"] {
            let json = event("").replace(&format!(r#""{field}""#), r#""other""#);
            assert!(
                matches!(
                    canonical_serialization(&json),
                    Err(SignerError::MalformedEvent(_))
                ),
                "expected rejection with {field} missing"
            );
        }
    }

    #[test]
    fn test_wrong_typed_fields_rejected() {
        let json = format!(
            r#"{{"pubkey":{{}},"created_at":1,"kind":1,"tags":[],"content":""}}"#
        );
        assert!(canonical_serialization(&json).is_err());

        let json = format!(
            r#"{{"pubkey":"{PUBKEY}","created_at":"1","kind":1,"tags":[],"content":""}}"#
        );
        assert!(canonical_serialization(&json).is_err());

        let json = format!(
            r#"{{"pubkey":"{PUBKEY}","created_at":1,"kind":1,"tags":{{}},"content":""}}"#
        );
        assert!(canonical_serialization(&json).is_err());
    }

    #[test]
    fn test_tags_preserved() {
        let json = format!(
            r#"{{"pubkey":"{PUBKEY}","created_at":1,"kind":1,"tags":[["e","abc"],["p","def"]],"content":""}}"#
        );
        let canonical = canonical_serialization(&json).unwrap();
        assert!(canonical.contains(r#"[["e","abc"],["p","def"]]"#));
    }

    #[test]
    fn test_event_hash_deterministic() {
        let a = event_hash(&event("")).unwrap();
        let b = event_hash(&event("")).unwrap();
        assert_eq!(a, b);

        let other = event("").replace("hi", "ho");
        assert_ne!(a, event_hash(&other).unwrap());
    }
}
