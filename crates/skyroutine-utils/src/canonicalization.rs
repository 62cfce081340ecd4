//! JSON Canonicalization Scheme (RFC 8785) output for routine reports.

use anyhow::{Context, Result};
use serde::Serialize;

/// Emit a serializable value as JCS-canonical JSON.
///
/// Key order and number formatting are deterministic, so two reports for
/// identical runs compare byte-for-byte.
///
/// ```rust
/// use skyroutine_utils::canonicalization::emit_jcs;
///
/// #[derive(serde::Serialize)]
/// struct Out { b: u8, a: u8 }
///
/// assert_eq!(emit_jcs(&Out { b: 2, a: 1 }).unwrap(), r#"{"a":1,"b":2}"#);
/// ```
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}
