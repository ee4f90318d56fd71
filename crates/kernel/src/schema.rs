//! Collection validators and index declarations expressed as data.
//!
//! A [`Validator`] renders to the engine's `$jsonSchema` document and can also
//! evaluate a JSON document locally, so the constraints are testable without a
//! running database.

use regex::Regex;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Engine-level type names accepted by `bsonType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BsonType {
    Object,
    String,
    Int,
    Long,
    Double,
    Bool,
    Date,
    ObjectId,
    Array,
}

impl BsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BsonType::Object => "object",
            BsonType::String => "string",
            BsonType::Int => "int",
            BsonType::Long => "long",
            BsonType::Double => "double",
            BsonType::Bool => "bool",
            BsonType::Date => "date",
            BsonType::ObjectId => "objectId",
            BsonType::Array => "array",
        }
    }

    /// Whether a JSON value (extended JSON for dates and object ids) has this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            BsonType::Object => value.is_object() && !is_extended(value),
            BsonType::String => value.is_string(),
            BsonType::Int => value
                .as_i64()
                .is_some_and(|n| i32::try_from(n).is_ok()),
            BsonType::Long => value.is_i64() || value.is_u64(),
            BsonType::Double => value.is_f64(),
            BsonType::Bool => value.is_boolean(),
            BsonType::Date => value.get("$date").is_some(),
            BsonType::ObjectId => value.get("$oid").is_some_and(Value::is_string),
            BsonType::Array => value.is_array(),
        }
    }
}

fn is_extended(value: &Value) -> bool {
    value.get("$date").is_some() || value.get("$oid").is_some()
}

/// Constraint attached to a single property.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldRule {
    pub bson_type: Option<BsonType>,
    pub pattern: Option<String>,
    pub enumeration: Option<Vec<String>>,
    pub description: String,
}

impl FieldRule {
    pub fn of_type(bson_type: BsonType) -> Self {
        Self {
            bson_type: Some(bson_type),
            ..Self::default()
        }
    }

    pub fn string() -> Self {
        Self::of_type(BsonType::String)
    }

    /// A rule restricting the value to one of `values`, with no type constraint.
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enumeration: Some(values.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn to_json(&self) -> Value {
        let mut rule = Map::new();
        if let Some(bson_type) = self.bson_type {
            rule.insert("bsonType".into(), Value::from(bson_type.as_str()));
        }
        if let Some(pattern) = &self.pattern {
            rule.insert("pattern".into(), Value::from(pattern.as_str()));
        }
        if let Some(values) = &self.enumeration {
            rule.insert("enum".into(), json!(values));
        }
        if !self.description.is_empty() {
            rule.insert("description".into(), Value::from(self.description.as_str()));
        }
        Value::Object(rule)
    }
}

/// Errors raised when a validator definition itself is malformed.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid pattern for field '{field}': {source}")]
    InvalidPattern {
        field: String,
        #[source]
        source: regex::Error,
    },

    #[error("required field '{field}' is not declared as a property")]
    UndeclaredRequired { field: String },
}

/// Reason a document failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("document must be an object")]
    NotAnObject,

    #[error("missing required field '{field}'")]
    MissingRequired { field: String },

    #[error("field '{field}' must be of type {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("field '{field}' does not match pattern {pattern}")]
    PatternMismatch { field: String, pattern: String },

    #[error("field '{field}' must be one of {allowed:?}")]
    NotInEnum { field: String, allowed: Vec<String> },
}

/// Object-level `$jsonSchema` validator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Validator {
    required: Vec<String>,
    properties: Vec<(String, FieldRule)>,
}

impl Validator {
    pub fn object() -> Self {
        Self::default()
    }

    /// Declare a property that must be present.
    pub fn required_field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.push((name, rule));
        self
    }

    /// Declare an optional property.
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        self.properties.push((name.into(), rule));
        self
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.properties.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn property(&self, name: &str) -> Option<&FieldRule> {
        self.properties
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, rule)| rule)
    }

    /// Render the `{ "$jsonSchema": ... }` document registered with the engine.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, rule)| (name.clone(), rule.to_json()))
            .collect();

        json!({
            "$jsonSchema": {
                "bsonType": BsonType::Object.as_str(),
                "required": self.required,
                "properties": properties,
            }
        })
    }

    /// Verify the definition is well formed before it is registered.
    pub fn check(&self) -> Result<(), SchemaError> {
        for field in &self.required {
            if self.property(field).is_none() {
                return Err(SchemaError::UndeclaredRequired {
                    field: field.clone(),
                });
            }
        }
        for (field, rule) in &self.properties {
            if let Some(pattern) = &rule.pattern {
                Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
                    field: field.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Evaluate `document` against this validator, collecting every violation.
    ///
    /// Absent optional properties are not checked and undeclared properties are
    /// allowed, matching engine behaviour for schemas without
    /// `additionalProperties`.
    pub fn validate(&self, document: &Value) -> Result<(), Vec<Violation>> {
        let Some(object) = document.as_object() else {
            return Err(vec![Violation::NotAnObject]);
        };

        let mut violations = Vec::new();

        for field in &self.required {
            if !object.contains_key(field) {
                violations.push(Violation::MissingRequired {
                    field: field.clone(),
                });
            }
        }

        for (field, rule) in &self.properties {
            let Some(value) = object.get(field) else {
                continue;
            };

            if let Some(bson_type) = rule.bson_type {
                if !bson_type.matches(value) {
                    violations.push(Violation::WrongType {
                        field: field.clone(),
                        expected: bson_type.as_str(),
                    });
                    continue;
                }
            }

            if let (Some(pattern), Some(text)) = (&rule.pattern, value.as_str()) {
                // An uncompilable pattern is reported by `check`; treat it as a mismatch here.
                let matched = Regex::new(pattern).is_ok_and(|re| re.is_match(text));
                if !matched {
                    violations.push(Violation::PatternMismatch {
                        field: field.clone(),
                        pattern: pattern.clone(),
                    });
                }
            }

            if let Some(allowed) = &rule.enumeration {
                let listed = value
                    .as_str()
                    .is_some_and(|text| allowed.iter().any(|candidate| candidate == text));
                if !listed {
                    violations.push(Violation::NotInEnum {
                        field: field.clone(),
                        allowed: allowed.clone(),
                    });
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

/// Key direction inside an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_i32(&self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// Secondary index declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    keys: Vec<(String, SortOrder)>,
    unique: bool,
    name: Option<String>,
}

impl IndexSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            keys: vec![(field.into(), SortOrder::Ascending)],
            unique: false,
            name: None,
        }
    }

    pub fn then(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.keys.push((field.into(), order));
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Override the engine default name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn keys(&self) -> &[(String, SortOrder)] {
        &self.keys
    }

    /// Explicit name if set, otherwise the engine default, e.g. `email_1` or
    /// `user_id_1_status_-1`.
    pub fn name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.keys
            .iter()
            .map(|(field, order)| format!("{}_{}", field, order.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn to_keys_json(&self) -> Value {
        let keys: Map<String, Value> = self
            .keys
            .iter()
            .map(|(field, order)| (field.clone(), Value::from(order.as_i32())))
            .collect();
        Value::Object(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_validator() -> Validator {
        Validator::object()
            .required_field("name", FieldRule::string())
            .required_field("email", FieldRule::string().pattern(r"^.+@.+\..+$"))
            .field("tier", FieldRule::one_of(["free", "pro"]))
    }

    #[test]
    fn renders_json_schema_document() {
        let schema = account_validator().to_json_schema();
        let inner = &schema["$jsonSchema"];

        assert_eq!(inner["bsonType"], "object");
        assert_eq!(inner["required"], json!(["name", "email"]));
        assert_eq!(inner["properties"]["email"]["pattern"], r"^.+@.+\..+$");
        assert_eq!(inner["properties"]["tier"]["enum"], json!(["free", "pro"]));
        assert!(inner["properties"]["tier"].get("bsonType").is_none());
    }

    #[test]
    fn collects_all_violations() {
        let violations = account_validator()
            .validate(&json!({ "email": 7, "tier": "enterprise" }))
            .unwrap_err();

        assert_eq!(violations.len(), 3);
        assert!(violations.contains(&Violation::MissingRequired {
            field: "name".into()
        }));
        assert!(violations.contains(&Violation::WrongType {
            field: "email".into(),
            expected: "string"
        }));
        assert!(matches!(violations[2], Violation::NotInEnum { .. }));
    }

    #[test]
    fn pattern_requires_at_sign_and_domain_dot() {
        let validator = account_validator();
        for bad in ["abc", "a@b", "@b.c"] {
            let doc = json!({ "name": "n", "email": bad });
            assert!(validator.validate(&doc).is_err(), "{bad} should be rejected");
        }
        assert!(validator
            .validate(&json!({ "name": "n", "email": "a@b.com" }))
            .is_ok());
    }

    #[test]
    fn absent_optional_and_extra_fields_are_allowed() {
        let doc = json!({ "name": "n", "email": "a@b.co", "nickname": 5 });
        assert!(account_validator().validate(&doc).is_ok());
    }

    #[test]
    fn non_object_documents_are_rejected() {
        let violations = account_validator().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(violations, vec![Violation::NotAnObject]);
    }

    #[test]
    fn check_rejects_bad_pattern_and_undeclared_required() {
        let bad_pattern = Validator::object().field("x", FieldRule::string().pattern("(unclosed"));
        assert!(matches!(
            bad_pattern.check(),
            Err(SchemaError::InvalidPattern { .. })
        ));

        let mut undeclared = Validator::object();
        undeclared.required.push("ghost".into());
        assert!(matches!(
            undeclared.check(),
            Err(SchemaError::UndeclaredRequired { .. })
        ));
    }

    #[test]
    fn bson_types_match_extended_json() {
        assert!(BsonType::Date.matches(&json!({ "$date": "2024-01-01T00:00:00Z" })));
        assert!(!BsonType::Object.matches(&json!({ "$date": "2024-01-01T00:00:00Z" })));
        assert!(BsonType::ObjectId.matches(&json!({ "$oid": "65a1b2c3d4e5f60718293a4b" })));
        assert!(BsonType::Int.matches(&json!(12)));
        assert!(!BsonType::Int.matches(&json!(1_i64 << 40)));
        assert!(BsonType::Double.matches(&json!(1.5)));
    }

    #[test]
    fn index_names_follow_engine_convention() {
        assert_eq!(IndexSpec::ascending("email").unique().name(), "email_1");
        let compound = IndexSpec::ascending("user_id").then("status", SortOrder::Descending);
        assert_eq!(compound.name(), "user_id_1_status_-1");
        assert_eq!(compound.to_keys_json(), json!({ "user_id": 1, "status": -1 }));
        assert!(!compound.is_unique());
        assert_eq!(
            IndexSpec::ascending("email").named("users_email").name(),
            "users_email"
        );
    }
}
