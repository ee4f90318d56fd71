//! Error handling for taskdb store operations

use taskdb_kernel::{SchemaError, Violation};
use thiserror::Error;

/// Failures raised by a [`crate::DocumentStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("collection '{collection}' already exists")]
    NamespaceExists { collection: String },

    #[error("index '{index}' on '{collection}' conflicts with an existing index")]
    IndexConflict { collection: String, index: String },

    #[error("collection '{collection}' exists without its declared validator")]
    ValidatorMissing { collection: String },

    #[error("duplicate key in '{collection}' for index '{index}': {key}")]
    DuplicateKey {
        collection: String,
        index: String,
        key: String,
    },

    #[error("document failed validation for '{collection}': {}", join_violations(.violations))]
    DocumentValidation {
        collection: String,
        violations: Vec<String>,
    },

    #[error("invalid validator for '{collection}': {source}")]
    Schema {
        collection: String,
        #[source]
        source: SchemaError,
    },

    #[error("cannot convert document: {0}")]
    Conversion(String),

    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),
}

impl StoreError {
    pub fn validation(collection: impl Into<String>, violations: &[Violation]) -> Self {
        Self::DocumentValidation {
            collection: collection.into(),
            violations: violations.iter().map(ToString::to_string).collect(),
        }
    }
}

fn join_violations(violations: &[String]) -> String {
    violations.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_violations() {
        let error = StoreError::validation(
            "users",
            &[
                Violation::MissingRequired {
                    field: "email".into(),
                },
                Violation::NotAnObject,
            ],
        );

        assert_eq!(
            error.to_string(),
            "document failed validation for 'users': missing required field 'email'; document must be an object"
        );
    }
}
