//! # JSON Bodies
//!
//! Request bodies are parsed with simd-json, falling back to `serde_json`
//! when the SIMD parser rejects input that the scalar one accepts (simd-json
//! needs a mutable copy and is stricter about some edge cases).

use serde_json::Value;

/// Parse a JSON document into a dynamic value.
///
/// # Errors
///
/// Message of the scalar parser, which reports line and column.
pub fn parse_value(bytes: &[u8]) -> Result<Value, String> {
    let mut scratch = bytes.to_vec();
    match simd_json::from_slice::<Value>(&mut scratch) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
    }
}

/// Structured-syntax suffix check, e.g. `application/problem+json`
#[must_use]
pub fn is_json_suffix(subtype: &str) -> bool {
    subtype.to_ascii_lowercase().ends_with("+json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object() {
        let value = parse_value(br#"{"name": "lamp", "price": 12.5, "tags": ["a"]}"#).unwrap();
        assert_eq!(value, json!({"name": "lamp", "price": 12.5, "tags": ["a"]}));
    }

    #[test]
    fn test_parse_scalar_document() {
        assert_eq!(parse_value(b"42").unwrap(), json!(42));
    }

    #[test]
    fn test_parse_invalid() {
        let err = parse_value(b"{\"name\": ").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn test_json_suffix() {
        assert!(is_json_suffix("vnd.api+json"));
        assert!(is_json_suffix("Problem+JSON"));
        assert!(!is_json_suffix("json"));
    }
}
