//! MongoDB-backed document store.

use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};
use serde_json::Value;
use taskdb_kernel::settings::DatabaseSettings;
use taskdb_kernel::{IndexSpec, Validator};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{CollectionInfo, DocumentStore, IndexInfo};

const NAMESPACE_NOT_FOUND: i32 = 26;
const NAMESPACE_EXISTS: i32 = 48;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
const DUPLICATE_KEY: i32 = 11000;

/// [`DocumentStore`] over a live MongoDB deployment.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
}

impl MongoStore {
    /// Connect using the configured URI and select the configured database.
    ///
    /// Issues a `ping` so an unreachable server fails here rather than on the
    /// first bootstrap step.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(&settings.uri).await?;
        options.app_name = Some(settings.app_name.clone());
        options.connect_timeout = Some(Duration::from_millis(settings.connect_timeout_ms));
        options.server_selection_timeout =
            Some(Duration::from_millis(settings.server_selection_timeout_ms));

        let client = Client::with_options(options)?;
        let database = client.database(&settings.name);

        database.run_command(doc! { "ping": 1 }).await?;
        info!(database = %settings.name, "connected to MongoDB");

        Ok(Self { client, database })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Close the client, waiting for in-flight operations.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn database_name(&self) -> &str {
        self.database.name()
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let mut cursor = self.database.list_collections().await?;
        let mut collections = Vec::new();
        while cursor.advance().await? {
            let spec = cursor.deserialize_current()?;
            collections.push(CollectionInfo {
                validated: spec.options.validator.is_some(),
                name: spec.name,
            });
        }
        Ok(collections)
    }

    async fn create_collection(
        &self,
        name: &str,
        validator: Option<&Validator>,
    ) -> Result<(), StoreError> {
        let result = match validator {
            Some(validator) => {
                validator.check().map_err(|source| StoreError::Schema {
                    collection: name.to_string(),
                    source,
                })?;
                let schema = bson::to_document(&validator.to_json_schema())
                    .map_err(|err| StoreError::Conversion(err.to_string()))?;
                debug!(collection = name, "registering $jsonSchema validator");
                self.database.create_collection(name).validator(schema).await
            }
            None => self.database.create_collection(name).await,
        };

        result.map_err(|err| classify(err, name, None))
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, StoreError> {
        let listed = self
            .database
            .collection::<Document>(collection)
            .list_indexes()
            .await;

        let mut cursor = match listed {
            Ok(cursor) => cursor,
            Err(err) if command_code(&err) == Some(NAMESPACE_NOT_FOUND) => return Ok(vec![]),
            Err(err) => return Err(err.into()),
        };

        let mut indexes = Vec::new();
        while cursor.advance().await? {
            let model = cursor.deserialize_current()?;
            let options = model.options.unwrap_or_default();
            indexes.push(IndexInfo {
                name: options.name.unwrap_or_default(),
                keys: index_keys(&model.keys),
                unique: options.unique.unwrap_or(false),
            });
        }
        Ok(indexes)
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> Result<(), StoreError> {
        let keys = bson::to_document(&index.to_keys_json())
            .map_err(|err| StoreError::Conversion(err.to_string()))?;

        let mut options = IndexOptions::default();
        options.name = Some(index.name());
        if index.is_unique() {
            options.unique = Some(true);
        }

        let model = IndexModel::builder().keys(keys).options(options).build();

        self.database
            .collection::<Document>(collection)
            .create_index(model)
            .await
            .map(|_| ())
            .map_err(|err| classify(err, collection, Some(index.name())))
    }

    async fn insert_one(&self, collection: &str, document: Value) -> Result<(), StoreError> {
        let document = match Bson::try_from(document) {
            Ok(Bson::Document(document)) => document,
            Ok(other) => {
                return Err(StoreError::Conversion(format!(
                    "expected a document for '{}', got {:?}",
                    collection,
                    other.element_type()
                )))
            }
            Err(err) => return Err(StoreError::Conversion(err.to_string())),
        };

        self.database
            .collection::<Document>(collection)
            .insert_one(document)
            .await
            .map(|_| ())
            .map_err(|err| classify(err, collection, None))
    }
}

/// Key document as ordered `(field, direction)` pairs. Numeric directions are
/// normalised to integers since the server echoes whatever type was sent.
fn index_keys(keys: &Document) -> Vec<(String, Value)> {
    keys.iter()
        .map(|(field, value)| {
            let value = match value {
                Bson::Int32(n) => Value::from(*n),
                Bson::Int64(n) => Value::from(*n),
                Bson::Double(n) => Value::from(*n as i64),
                Bson::String(kind) => Value::from(kind.as_str()),
                other => Value::from(other.to_string()),
            };
            (field.clone(), value)
        })
        .collect()
}

fn command_code(err: &mongodb::error::Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

/// Map well-known server error codes onto [`StoreError`] variants.
fn classify(err: mongodb::error::Error, collection: &str, index: Option<String>) -> StoreError {
    let (code, message) = match err.kind.as_ref() {
        ErrorKind::Command(command) => (command.code, command.message.clone()),
        ErrorKind::Write(WriteFailure::WriteError(write)) => (write.code, write.message.clone()),
        _ => return StoreError::Driver(err),
    };

    match code {
        NAMESPACE_EXISTS => StoreError::NamespaceExists {
            collection: collection.to_string(),
        },
        INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT => StoreError::IndexConflict {
            collection: collection.to_string(),
            index: index.unwrap_or_default(),
        },
        DUPLICATE_KEY => StoreError::DuplicateKey {
            collection: collection.to_string(),
            index: index.unwrap_or_else(|| duplicate_index_name(&message)),
            key: message,
        },
        DOCUMENT_VALIDATION_FAILURE => StoreError::DocumentValidation {
            collection: collection.to_string(),
            violations: vec![message],
        },
        _ => StoreError::Driver(err),
    }
}

/// Pull `email_1` out of `E11000 duplicate key error collection: db.users index: email_1 dup key: ...`.
fn duplicate_index_name(message: &str) -> String {
    message
        .split_once("index: ")
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .unwrap_or_default()
        .to_string()
}
