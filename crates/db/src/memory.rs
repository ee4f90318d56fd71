//! In-process document engine.
//!
//! Enforces collection validators and unique indexes at write time the way
//! the real engine does, which lets the bootstrap be exercised without a
//! running server.
//!
//! Index keys compare numbers by value, so `1` and `1.0` collide in a unique
//! index as they do on the server. Other BSON type-ordering rules (for example
//! across decimal and string) are not modelled.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use taskdb_kernel::{IndexSpec, Validator};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{CollectionInfo, DocumentStore, IndexInfo};

const ID_FIELD: &str = "_id";
const ID_INDEX: &str = "_id_";

#[derive(Debug, Clone)]
struct StoredIndex {
    name: String,
    spec: IndexSpec,
}

impl StoredIndex {
    fn primary() -> Self {
        Self {
            name: ID_INDEX.to_string(),
            spec: IndexSpec::ascending(ID_FIELD).unique(),
        }
    }

    fn key_of(&self, document: &Value) -> Value {
        Value::Array(
            self.spec
                .keys()
                .iter()
                .map(|(field, _)| document.get(field).map(canonical).unwrap_or(Value::Null))
                .collect(),
        )
    }
}

/// Rewrite every number as a double so keys compare by numeric value.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(number) => number
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, item)| (key.clone(), canonical(item)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[derive(Debug)]
struct CollectionState {
    validator: Option<Validator>,
    indexes: Vec<StoredIndex>,
    documents: Vec<Value>,
}

impl CollectionState {
    fn new(validator: Option<Validator>) -> Self {
        Self {
            validator,
            indexes: vec![StoredIndex::primary()],
            documents: Vec::new(),
        }
    }

    fn duplicate_for(&self, index: &StoredIndex, document: &Value) -> Option<Value> {
        let key = index.key_of(document);
        self.documents
            .iter()
            .any(|existing| index.key_of(existing) == key)
            .then_some(key)
    }
}

#[derive(Debug, Default)]
struct DatabaseState {
    collections: BTreeMap<String, CollectionState>,
    next_id: u64,
}

impl DatabaseState {
    fn collection_mut(&mut self, name: &str) -> &mut CollectionState {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| CollectionState::new(None))
    }
}

/// Shared in-memory server holding any number of named databases.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
    databases: Arc<RwLock<HashMap<String, DatabaseState>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a database by name; it springs into existence on first write.
    pub fn database(&self, name: impl Into<String>) -> MemoryDatabase {
        MemoryDatabase {
            name: name.into(),
            databases: Arc::clone(&self.databases),
        }
    }
}

/// A [`DocumentStore`] over one database of a [`MemoryEngine`].
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    name: String,
    databases: Arc<RwLock<HashMap<String, DatabaseState>>>,
}

impl MemoryDatabase {
    /// Documents stored in `collection`, in insertion order
    pub async fn documents(&self, collection: &str) -> Vec<Value> {
        let databases = self.databases.read().await;
        databases
            .get(&self.name)
            .and_then(|db| db.collections.get(collection))
            .map(|state| state.documents.clone())
            .unwrap_or_default()
    }

    /// Validator registered on `collection`, if any
    pub async fn validator(&self, collection: &str) -> Option<Validator> {
        let databases = self.databases.read().await;
        databases
            .get(&self.name)
            .and_then(|db| db.collections.get(collection))
            .and_then(|state| state.validator.clone())
    }

    /// Whether `index` on `collection` enforces uniqueness
    pub async fn index_is_unique(&self, collection: &str, index: &str) -> Option<bool> {
        let databases = self.databases.read().await;
        databases
            .get(&self.name)
            .and_then(|db| db.collections.get(collection))
            .and_then(|state| state.indexes.iter().find(|stored| stored.name == index))
            .map(|stored| stored.spec.is_unique())
    }
}

#[async_trait]
impl DocumentStore for MemoryDatabase {
    fn database_name(&self) -> &str {
        &self.name
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let databases = self.databases.read().await;
        Ok(databases
            .get(&self.name)
            .map(|db| {
                db.collections
                    .iter()
                    .map(|(name, state)| CollectionInfo {
                        name: name.clone(),
                        validated: state.validator.is_some(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_collection(
        &self,
        name: &str,
        validator: Option<&Validator>,
    ) -> Result<(), StoreError> {
        if let Some(validator) = validator {
            validator.check().map_err(|source| StoreError::Schema {
                collection: name.to_string(),
                source,
            })?;
        }

        let mut databases = self.databases.write().await;
        let db = databases.entry(self.name.clone()).or_default();

        if db.collections.contains_key(name) {
            return Err(StoreError::NamespaceExists {
                collection: name.to_string(),
            });
        }

        db.collections
            .insert(name.to_string(), CollectionState::new(validator.cloned()));
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, StoreError> {
        let databases = self.databases.read().await;
        Ok(databases
            .get(&self.name)
            .and_then(|db| db.collections.get(collection))
            .map(|state| {
                state
                    .indexes
                    .iter()
                    .map(|index| IndexInfo {
                        name: index.name.clone(),
                        ..IndexInfo::from_spec(&index.spec)
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError> {
        let mut databases = self.databases.write().await;
        let state = databases
            .entry(self.name.clone())
            .or_default()
            .collection_mut(collection);

        let candidate = StoredIndex {
            name: index.name(),
            spec: index.clone(),
        };

        if let Some(existing) = state
            .indexes
            .iter()
            .find(|stored| stored.name == candidate.name || stored.spec.keys() == index.keys())
        {
            if existing.name == candidate.name && IndexInfo::from_spec(&existing.spec).matches(index)
            {
                return Ok(());
            }
            return Err(StoreError::IndexConflict {
                collection: collection.to_string(),
                index: candidate.name,
            });
        }

        if candidate.spec.is_unique() {
            let mut seen = Vec::with_capacity(state.documents.len());
            for document in &state.documents {
                let key = candidate.key_of(document);
                if seen.contains(&key) {
                    return Err(StoreError::DuplicateKey {
                        collection: collection.to_string(),
                        index: candidate.name,
                        key: key.to_string(),
                    });
                }
                seen.push(key);
            }
        }

        state.indexes.push(candidate);
        Ok(())
    }

    async fn insert_one(&self, collection: &str, mut document: Value) -> Result<(), StoreError> {
        let mut databases = self.databases.write().await;
        let db = databases.entry(self.name.clone()).or_default();

        if !document.is_object() {
            return Err(StoreError::Conversion(format!(
                "expected a document for '{}', got {}",
                collection, document
            )));
        }
        if let Some(fields) = document.as_object_mut() {
            if !fields.contains_key(ID_FIELD) {
                db.next_id += 1;
                fields.insert(
                    ID_FIELD.to_string(),
                    serde_json::json!({ "$oid": format!("{:024x}", db.next_id) }),
                );
            }
        }

        let state = db.collection_mut(collection);

        if let Some(validator) = &state.validator {
            validator
                .validate(&document)
                .map_err(|violations| StoreError::validation(collection, &violations))?;
        }

        for index in state.indexes.iter().filter(|index| index.spec.is_unique()) {
            if let Some(key) = state.duplicate_for(index, &document) {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    index: index.name.clone(),
                    key: key.to_string(),
                });
            }
        }

        state.documents.push(document);
        Ok(())
    }
}
