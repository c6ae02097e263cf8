//! # Payload Schemas
//!
//! A [`Schema`] checks a decoded payload and reports every failing field.
//! Two implementations ship with the crate:
//!
//! - [`ObjectSchema`]: declarative field rules (type, required, length and
//!   range bounds, allowed choices, nested objects). All rules are checked;
//!   nested failures use dotted paths like `address.city` or `tags.1`.
//! - [`TypedSchema`]: validation by deserializing into a serde type. serde
//!   stops at the first problem, so this reports a single error.

use crate::validation::{FieldError, ValidationErrors, ValidationResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// Validates a decoded payload
pub trait Schema: Send + Sync {
    /// Schema name for logs
    fn name(&self) -> &str;

    /// Check `value`, collecting every field error.
    ///
    /// # Errors
    ///
    /// All field errors found, in document order.
    fn validate(&self, value: &Value) -> ValidationResult<()>;
}

/// JSON type expected for a field
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Any JSON string
    String,
    /// Whole number
    Integer,
    /// Any JSON number
    Number,
    /// `true` or `false`
    Boolean,
    /// Array, optionally with a rule for every item
    Array(Option<Box<Field>>),
    /// Nested object
    Object(ObjectSchema),
    /// No type constraint
    Any,
}

impl FieldKind {
    const fn expected(&self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Integer => "an integer",
            Self::Number => "a number",
            Self::Boolean => "a boolean",
            Self::Array(_) => "an array",
            Self::Object(_) => "an object",
            Self::Any => "any value",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array(_) => value.is_array(),
            Self::Object(_) => value.is_object(),
            Self::Any => true,
        }
    }
}

/// Rule for a single field
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    required: bool,
    nullable: bool,
    min_len: Option<usize>,
    max_len: Option<usize>,
    min: Option<f64>,
    max: Option<f64>,
    choices: Vec<String>,
}

impl Field {
    /// Optional field of the given kind
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            nullable: false,
            min_len: None,
            max_len: None,
            min: None,
            max: None,
            choices: Vec::new(),
        }
    }

    /// String field
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    /// Integer field
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    /// Number field
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    /// Boolean field
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// Array field with no item rule
    pub fn array(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Array(None))
    }

    /// Nested object field
    pub fn object(name: impl Into<String>, schema: ObjectSchema) -> Self {
        Self::new(name, FieldKind::Object(schema))
    }

    /// Mark as required
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Accept `null` as a value
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Minimum length for strings (in characters) and arrays
    #[must_use]
    pub const fn min_len(mut self, min: usize) -> Self {
        self.min_len = Some(min);
        self
    }

    /// Maximum length for strings (in characters) and arrays
    #[must_use]
    pub const fn max_len(mut self, max: usize) -> Self {
        self.max_len = Some(max);
        self
    }

    /// Inclusive lower bound for numbers
    #[must_use]
    pub const fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Inclusive upper bound for numbers
    #[must_use]
    pub const fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Restrict string values to a fixed set
    #[must_use]
    pub fn one_of(mut self, choices: &[&str]) -> Self {
        self.choices = choices.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Rule applied to every array item
    #[must_use]
    pub fn items(mut self, item: Self) -> Self {
        self.kind = FieldKind::Array(Some(Box::new(item)));
        self
    }

    fn check(&self, value: &Value, path: &str, errors: &mut ValidationErrors) {
        if !self.kind.accepts(value) {
            errors.add(FieldError::invalid_type(path, self.kind.expected()));
            return;
        }

        let len = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(len) = len {
            if let Some(min) = self.min_len.filter(|min| len < *min) {
                errors.add(FieldError::too_short(path, min));
            }
            if let Some(max) = self.max_len.filter(|max| len > *max) {
                errors.add(FieldError::too_long(path, max));
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.min.filter(|min| n < *min) {
                errors.add(FieldError::too_small(path, min));
            }
            if let Some(max) = self.max.filter(|max| n > *max) {
                errors.add(FieldError::too_large(path, max));
            }
        }

        if let Some(s) = value.as_str() {
            if !self.choices.is_empty() && !self.choices.iter().any(|c| c == s) {
                errors.add(FieldError::invalid_choice(path, &self.choices));
            }
        }

        match (&self.kind, value) {
            (FieldKind::Array(Some(item)), Value::Array(items)) => {
                for (idx, entry) in items.iter().enumerate() {
                    let item_path = join_path(path, &idx.to_string());
                    if entry.is_null() {
                        if !item.nullable {
                            errors.add(FieldError::invalid_type(item_path, item.kind.expected()));
                        }
                        continue;
                    }
                    item.check(entry, &item_path, errors);
                }
            }
            (FieldKind::Object(schema), value) => schema.check(value, path, errors),
            _ => {}
        }
    }
}

/// Declarative object schema
#[derive(Debug, Clone)]
pub struct ObjectSchema {
    name: String,
    fields: Vec<Field>,
    deny_unknown: bool,
}

impl ObjectSchema {
    /// Create an empty schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            deny_unknown: false,
        }
    }

    /// Add a field rule
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Reject keys that no field declares
    #[must_use]
    pub const fn deny_unknown_fields(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    fn check(&self, value: &Value, prefix: &str, errors: &mut ValidationErrors) {
        let Some(object) = value.as_object() else {
            let field = if prefix.is_empty() { "body" } else { prefix };
            errors.add(FieldError::invalid_type(field, "an object"));
            return;
        };

        for field in &self.fields {
            let path = join_path(prefix, &field.name);
            match object.get(&field.name) {
                None => {
                    if field.required {
                        errors.add_required(path);
                    }
                }
                Some(Value::Null) => {
                    if field.required && !field.nullable {
                        errors.add_required(path);
                    } else if !field.nullable {
                        errors.add(FieldError::invalid_type(path, field.kind.expected()));
                    }
                }
                Some(v) => field.check(v, &path, errors),
            }
        }

        if self.deny_unknown {
            for key in object.keys() {
                if !self.fields.iter().any(|f| &f.name == key) {
                    errors.add(FieldError::unknown_field(join_path(prefix, key)));
                }
            }
        }
    }
}

impl Schema for ObjectSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, value: &Value) -> ValidationResult<()> {
        let mut errors = ValidationErrors::new();
        self.check(value, "", &mut errors);
        errors.into_result()
    }
}

/// Validation by deserialization into `T`
pub struct TypedSchema<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedSchema<T> {
    /// Schema named after the Rust type
    #[must_use]
    pub fn new() -> Self {
        let full = std::any::type_name::<T>();
        let name = full.rsplit("::").next().unwrap_or(full);
        Self::named(name)
    }

    /// Schema with an explicit name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TypedSchema<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedSchema").field("name", &self.name).finish()
    }
}

impl<T: DeserializeOwned> Schema for TypedSchema<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, value: &Value) -> ValidationResult<()> {
        T::deserialize(value)
            .map(|_| ())
            .map_err(|e| ValidationErrors::single(field_error_from_serde(&e.to_string())))
    }
}

/// Map a serde message onto a field error
fn field_error_from_serde(message: &str) -> FieldError {
    if let Some(field) = backticked(message, "missing field `") {
        return FieldError::required(field);
    }
    if let Some(field) = backticked(message, "unknown field `") {
        return FieldError::unknown_field(field);
    }
    if message.starts_with("invalid type") {
        return FieldError::new("body", message, crate::validation::ValidationCode::InvalidType);
    }
    FieldError::new("body", message, crate::validation::ValidationCode::InvalidFormat)
}

fn backticked<'a>(message: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = message.strip_prefix(prefix)?;
    rest.split_once('`').map(|(field, _)| field)
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationCode;
    use serde::Deserialize;
    use serde_json::json;

    fn item_schema() -> ObjectSchema {
        ObjectSchema::new("CreateItem")
            .field(Field::string("name").required().min_len(1).max_len(20))
            .field(Field::number("price").required().min(0.0))
            .field(Field::string("size").one_of(&["s", "m", "l"]))
            .field(Field::array("tags").max_len(3).items(Field::string("tag")))
            .field(Field::object(
                "supplier",
                ObjectSchema::new("Supplier").field(Field::string("city").required()),
            ))
    }

    fn codes(errors: &ValidationErrors) -> Vec<(&str, ValidationCode)> {
        errors
            .errors
            .iter()
            .map(|e| (e.field.as_str(), e.code))
            .collect()
    }

    #[test]
    fn test_valid_payload() {
        let payload = json!({"name": "lamp", "price": 10, "size": "m", "tags": ["home"]});
        assert!(item_schema().validate(&payload).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let errors = item_schema().validate(&json!({"price": 1.5})).unwrap_err();
        assert_eq!(codes(&errors), vec![("name", ValidationCode::Required)]);
    }

    #[test]
    fn test_collects_every_error() {
        let payload = json!({
            "name": "",
            "price": -1,
            "size": "xl",
            "tags": ["a", 2],
            "supplier": {}
        });
        let errors = item_schema().validate(&payload).unwrap_err();
        assert_eq!(
            codes(&errors),
            vec![
                ("name", ValidationCode::TooShort),
                ("price", ValidationCode::TooSmall),
                ("size", ValidationCode::InvalidChoice),
                ("tags.1", ValidationCode::InvalidType),
                ("supplier.city", ValidationCode::Required),
            ]
        );
    }

    #[test]
    fn test_wrong_types() {
        let errors = item_schema()
            .validate(&json!({"name": 5, "price": "cheap"}))
            .unwrap_err();
        assert_eq!(
            codes(&errors),
            vec![
                ("name", ValidationCode::InvalidType),
                ("price", ValidationCode::InvalidType),
            ]
        );
    }

    #[test]
    fn test_non_object_body() {
        let errors = item_schema().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(codes(&errors), vec![("body", ValidationCode::InvalidType)]);
    }

    #[test]
    fn test_null_handling() {
        let schema = ObjectSchema::new("Note")
            .field(Field::string("title").required())
            .field(Field::string("body").nullable());

        assert!(schema.validate(&json!({"title": "t", "body": null})).is_ok());
        let errors = schema.validate(&json!({"title": null})).unwrap_err();
        assert_eq!(codes(&errors), vec![("title", ValidationCode::Required)]);
    }

    #[test]
    fn test_deny_unknown_fields() {
        let schema = ObjectSchema::new("Login")
            .field(Field::string("user").required())
            .deny_unknown_fields();

        let errors = schema.validate(&json!({"user": "a", "admin": true})).unwrap_err();
        assert_eq!(codes(&errors), vec![("admin", ValidationCode::UnknownField)]);
    }

    #[test]
    fn test_integer_rejects_fraction() {
        let schema = ObjectSchema::new("Page").field(Field::integer("page").min(1.0));
        assert!(schema.validate(&json!({"page": 2})).is_ok());
        assert!(schema.validate(&json!({"page": 2.5})).is_err());
        assert!(schema.validate(&json!({"page": 0})).is_err());
    }

    #[derive(Deserialize)]
    #[allow(dead_code)]
    struct NewUser {
        name: String,
        age: u8,
    }

    #[test]
    fn test_typed_schema() {
        let schema = TypedSchema::<NewUser>::new();
        assert_eq!(schema.name(), "NewUser");
        assert!(schema.validate(&json!({"name": "ann", "age": 30})).is_ok());

        let errors = schema.validate(&json!({"age": 30})).unwrap_err();
        assert_eq!(codes(&errors), vec![("name", ValidationCode::Required)]);

        let errors = schema.validate(&json!({"name": "ann", "age": "old"})).unwrap_err();
        assert_eq!(codes(&errors), vec![("body", ValidationCode::InvalidType)]);
    }
}
