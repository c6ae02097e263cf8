//! # Typed Path Captures
//!
//! Converter names and value conversion for `<type:name>` template segments.
//! A capture only matches when its raw segment converts to the declared
//! type, so `<int:id>` against `"abc"` is a non-match rather than a string.

use serde::Serialize;
use std::fmt;

/// Supported capture types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParamType {
    /// Any single non-empty segment (default)
    #[default]
    String,
    /// Signed integer, parsed to i64
    Int,
    /// Finite float, parsed to f64
    Float,
    /// Greedy remainder of the path, slashes included
    Path,
}

impl ParamType {
    /// Parse a converter name as written in a template (`int` in `<int:id>`)
    ///
    /// Returns `None` for unknown converters; the caller reports those as a
    /// malformed template.
    #[must_use]
    pub fn from_specifier(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "str" | "default" => Some(Self::String),
            "int" | "integer" => Some(Self::Int),
            "float" | "number" => Some(Self::Float),
            "path" => Some(Self::Path),
            _ => None,
        }
    }

    /// Canonical converter name
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Path => "path",
        }
    }

    /// Whether the capture may consume more than one segment
    #[must_use]
    pub const fn is_greedy(&self) -> bool {
        matches!(self, Self::Path)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A captured and converted path parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Single segment
    String(String),
    /// Integer capture
    Int(i64),
    /// Float capture
    Float(f64),
    /// Path capture, slashes preserved
    Path(String),
}

impl ParamValue {
    /// Borrow the textual value of string and path captures
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Path(s) => Some(s),
            _ => None,
        }
    }

    /// Get as i64 if Int variant
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if Float variant
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::Path(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Convert a decoded segment to the declared type.
///
/// `None` means the segment does not satisfy the converter and the template
/// must not match.
#[must_use]
pub fn convert_param(raw: &str, param_type: ParamType) -> Option<ParamValue> {
    if raw.is_empty() {
        return None;
    }
    match param_type {
        ParamType::String => {
            (!raw.contains('/')).then(|| ParamValue::String(raw.to_string()))
        }
        ParamType::Path => Some(ParamValue::Path(raw.to_string())),
        ParamType::Int => {
            let digits = raw.strip_prefix('-').unwrap_or(raw);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            raw.parse::<i64>().ok().map(ParamValue::Int)
        }
        ParamType::Float => {
            let looks_numeric = raw
                .bytes()
                .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'));
            if !looks_numeric {
                return None;
            }
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(ParamValue::Float)
        }
    }
}

/// Parse a template segment into a capture.
///
/// - `<id>` -> `Some(Ok(("id", String)))`
/// - `<int:id>` -> `Some(Ok(("id", Int)))`
/// - `users` -> `None` (literal)
///
/// A segment that opens a capture but is malformed yields `Some(Err(reason))`.
pub fn parse_capture(segment: &str) -> Option<Result<(String, ParamType), String>> {
    let opens = segment.starts_with('<');
    let closes = segment.ends_with('>');
    if !opens && !closes && !segment.contains(['<', '>']) {
        return None;
    }
    if !(opens && closes) || segment.len() < 2 {
        return Some(Err(format!("unbalanced capture in segment '{segment}'")));
    }

    let inner = &segment[1..segment.len() - 1];
    let (type_spec, name) = match inner.split_once(':') {
        Some((type_spec, name)) => (Some(type_spec.trim()), name.trim()),
        None => (None, inner.trim()),
    };

    if name.is_empty() {
        return Some(Err(format!("capture without a name in segment '{segment}'")));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Some(Err(format!("invalid capture name '{name}'")));
    }

    let param_type = match type_spec {
        None => ParamType::String,
        Some(spec) => match ParamType::from_specifier(spec) {
            Some(t) => t,
            None => return Some(Err(format!("unknown converter '{spec}'"))),
        },
    };
    Some(Ok((name.to_string(), param_type)))
}
