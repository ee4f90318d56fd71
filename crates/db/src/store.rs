use async_trait::async_trait;
use serde_json::Value;
use taskdb_kernel::{IndexSpec, Validator};

use crate::error::StoreError;

/// A collection as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    pub name: String,
    /// Whether a validator is registered on the collection
    pub validated: bool,
}

/// An index definition as reported by the database.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    /// Key fields in order with their direction or index type (`1`, `-1`, `"text"`, ...)
    pub keys: Vec<(String, Value)>,
    pub unique: bool,
}

impl IndexInfo {
    pub fn from_spec(spec: &IndexSpec) -> Self {
        Self {
            name: spec.name(),
            keys: spec_keys(spec),
            unique: spec.is_unique(),
        }
    }

    /// Whether this index has the same keys and uniqueness as `spec`, ignoring the name.
    pub fn matches(&self, spec: &IndexSpec) -> bool {
        self.unique == spec.is_unique() && self.keys == spec_keys(spec)
    }
}

fn spec_keys(spec: &IndexSpec) -> Vec<(String, Value)> {
    spec.keys()
        .iter()
        .map(|(field, order)| (field.clone(), Value::from(order.as_i32())))
        .collect()
}

/// Session bound to a single database. The bootstrap receives one of these
/// explicitly instead of reaching for a global handle.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the selected database
    fn database_name(&self) -> &str;

    /// Collections currently in the database
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError>;

    /// Create a collection, registering `validator` when given
    ///
    /// Fails with [`StoreError::NamespaceExists`] if the collection exists.
    async fn create_collection(
        &self,
        name: &str,
        validator: Option<&Validator>,
    ) -> Result<(), StoreError>;

    /// Index definitions on `collection`, including `_id_`
    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, StoreError>;

    /// Create an index; creating an identical index again is a no-op
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError>;

    /// Insert one document (extended JSON) subject to validator and unique indexes
    async fn insert_one(&self, collection: &str, document: Value) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskdb_kernel::SortOrder;

    #[test]
    fn test_index_info_matches_definition_not_name() {
        let spec = IndexSpec::ascending("email").unique();
        let renamed = IndexInfo {
            name: "users_email_unique".into(),
            ..IndexInfo::from_spec(&spec)
        };
        assert!(renamed.matches(&spec));

        let plain = IndexInfo::from_spec(&IndexSpec::ascending("email"));
        assert_eq!(plain.name, spec.name());
        assert!(!plain.matches(&spec));

        let descending = IndexInfo::from_spec(
            &IndexSpec::ascending("user_id").then("status", SortOrder::Descending),
        );
        assert_eq!(
            descending.keys,
            vec![("user_id".into(), json!(1)), ("status".into(), json!(-1))]
        );
    }
}
