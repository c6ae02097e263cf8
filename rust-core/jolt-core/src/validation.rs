//! # Validation
//!
//! Field-level errors produced while decoding and validating request
//! payloads. The whole collection is serialized into the `data` field of a
//! 422 response, so every failing field is reported at once.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Error code for categorizing validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// Required field is missing
    Required,
    /// Value has the wrong JSON type
    InvalidType,
    /// String or array is too short
    TooShort,
    /// String or array is too long
    TooLong,
    /// Number is below the minimum
    TooSmall,
    /// Number is above the maximum
    TooLarge,
    /// Value could not be parsed
    InvalidFormat,
    /// Value is not one of the allowed choices
    InvalidChoice,
    /// Field is not declared by the schema
    UnknownField,
    /// Custom validation failed
    Custom,
}

/// A single validation error for a specific field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /// Field path (e.g. "email", "address.city", "tags.2")
    pub field: String,
    /// Human-readable error message
    pub message: String,
    /// Machine-readable error code
    pub code: ValidationCode,
}

impl FieldError {
    /// Create a new field error
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: ValidationCode) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }

    /// Create a "required field" error
    pub fn required(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{field} is required");
        Self::new(field, message, ValidationCode::Required)
    }

    /// Create an "invalid type" error
    pub fn invalid_type(field: impl Into<String>, expected: &str) -> Self {
        let field = field.into();
        let message = format!("{field} must be {expected}");
        Self::new(field, message, ValidationCode::InvalidType)
    }

    /// Create a "too short" error
    pub fn too_short(field: impl Into<String>, min: usize) -> Self {
        let field = field.into();
        let message = format!("{field} must have at least {min} characters or items");
        Self::new(field, message, ValidationCode::TooShort)
    }

    /// Create a "too long" error
    pub fn too_long(field: impl Into<String>, max: usize) -> Self {
        let field = field.into();
        let message = format!("{field} must have at most {max} characters or items");
        Self::new(field, message, ValidationCode::TooLong)
    }

    /// Create a "below minimum" error
    pub fn too_small(field: impl Into<String>, min: f64) -> Self {
        let field = field.into();
        let message = format!("{field} must be greater than or equal to {min}");
        Self::new(field, message, ValidationCode::TooSmall)
    }

    /// Create an "above maximum" error
    pub fn too_large(field: impl Into<String>, max: f64) -> Self {
        let field = field.into();
        let message = format!("{field} must be less than or equal to {max}");
        Self::new(field, message, ValidationCode::TooLarge)
    }

    /// Create a "not one of" error
    pub fn invalid_choice(field: impl Into<String>, choices: &[String]) -> Self {
        let field = field.into();
        let message = format!("{field} must be one of: {}", choices.join(", "));
        Self::new(field, message, ValidationCode::InvalidChoice)
    }

    /// Create an "unknown field" error
    pub fn unknown_field(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{field} is not an allowed field");
        Self::new(field, message, ValidationCode::UnknownField)
    }
}

/// Collection of validation errors
///
/// Allows aggregating multiple field errors for a single request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    /// List of field-level errors
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Create an empty error collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection holding one error
    #[must_use]
    pub fn single(error: FieldError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// Add a field error
    pub fn add(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    /// Add a required field error
    pub fn add_required(&mut self, field: impl Into<String>) {
        self.add(FieldError::required(field));
    }

    /// Append every error from `other`
    pub fn merge(&mut self, other: Self) {
        self.errors.extend(other.errors);
    }

    /// Check if there are any errors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of errors
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `Ok(())` when empty, otherwise `Err(self)`
    ///
    /// # Errors
    ///
    /// Returns the collection itself when it holds at least one error.
    pub fn into_result(self) -> ValidationResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Errors as a JSON array for the response `data` field
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
    }

    /// Group errors by field
    #[must_use]
    pub fn by_field(&self) -> HashMap<&str, Vec<&FieldError>> {
        let mut map: HashMap<&str, Vec<&FieldError>> = HashMap::new();
        for error in &self.errors {
            map.entry(error.field.as_str()).or_default().push(error);
        }
        map
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.errors.iter().map(|e| e.field.as_str()).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

/// Result type for validation operations
pub type ValidationResult<T> = std::result::Result<T, ValidationErrors>;
