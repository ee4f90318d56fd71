//! One-shot provisioning of collections, validators, indexes, and seed data.

use std::collections::HashMap;

use anyhow::Context;
use taskdb_kernel::settings::{ExistingPolicy, SeedSettings};
use taskdb_kernel::{IndexSpec, ModuleRegistry};

use crate::error::StoreError;
use crate::store::{CollectionInfo, DocumentStore, IndexInfo};

/// What a bootstrap run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub database: String,
    pub collections_created: Vec<String>,
    pub collections_skipped: Vec<String>,
    /// `collection.index` pairs
    pub indexes_created: Vec<String>,
    pub indexes_skipped: Vec<String>,
    pub documents_seeded: usize,
    pub documents_skipped: usize,
}

impl BootstrapReport {
    /// True when the run changed nothing in the database.
    pub fn is_noop(&self) -> bool {
        self.collections_created.is_empty()
            && self.indexes_created.is_empty()
            && self.documents_seeded == 0
    }

    /// Human-readable completion line.
    pub fn completion_message(&self) -> String {
        format!(
            "MongoDB initialization completed for {} database",
            self.database
        )
    }
}

/// Runs the provisioning sequence for a registry against a store:
/// collections in registration order, then every index, then seed documents.
///
/// There is no retry or rollback. The first failing step aborts the run and
/// leaves whatever the store already applied.
pub struct Bootstrapper<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    registry: &'a ModuleRegistry,
    policy: ExistingPolicy,
}

impl<'a, S: DocumentStore + ?Sized> Bootstrapper<'a, S> {
    pub fn new(store: &'a S, registry: &'a ModuleRegistry) -> Self {
        Self {
            store,
            registry,
            policy: ExistingPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ExistingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn run(&self, seed: &SeedSettings) -> anyhow::Result<BootstrapReport> {
        let mut report = BootstrapReport {
            database: self.store.database_name().to_string(),
            ..BootstrapReport::default()
        };

        tracing::info!(
            database = %report.database,
            policy = %self.policy,
            collections = ?self.registry.collection_names(),
            "starting database bootstrap"
        );

        self.create_collections(&mut report).await?;
        self.create_indexes(&mut report).await?;
        if seed.enabled {
            self.seed(seed, &mut report).await?;
        } else {
            tracing::debug!("seeding disabled");
        }

        tracing::info!(
            database = %report.database,
            collections_created = report.collections_created.len(),
            indexes_created = report.indexes_created.len(),
            documents_seeded = report.documents_seeded,
            "database bootstrap complete"
        );

        Ok(report)
    }

    async fn create_collections(&self, report: &mut BootstrapReport) -> anyhow::Result<()> {
        let existing = self
            .store
            .list_collections()
            .await
            .context("failed to list collections")?;

        for module in self.registry.modules() {
            let name = module.name();
            let validator = module.validator();

            if let Some(info) = find_collection(&existing, name) {
                let failure = match self.policy {
                    ExistingPolicy::Fail => StoreError::NamespaceExists {
                        collection: name.to_string(),
                    },
                    ExistingPolicy::Skip if validator.is_some() && !info.validated => {
                        StoreError::ValidatorMissing {
                            collection: name.to_string(),
                        }
                    }
                    ExistingPolicy::Skip => {
                        tracing::info!(collection = name, "collection exists, skipping");
                        report.collections_skipped.push(name.to_string());
                        continue;
                    }
                };
                return Err(failure)
                    .with_context(|| format!("failed to create collection '{}'", name));
            }

            tracing::info!(
                collection = name,
                validated = validator.is_some(),
                "creating collection"
            );

            self.store
                .create_collection(name, validator.as_ref())
                .await
                .with_context(|| format!("failed to create collection '{}'", name))?;
            report.collections_created.push(name.to_string());
        }

        Ok(())
    }

    async fn create_indexes(&self, report: &mut BootstrapReport) -> anyhow::Result<()> {
        let mut existing: HashMap<&str, Vec<IndexInfo>> = HashMap::new();

        for (collection, index) in self.registry.collect_indexes() {
            let index_name = index.name();
            let qualified = format!("{}.{}", collection, index_name);

            if !existing.contains_key(collection) {
                let listed = self
                    .store
                    .list_indexes(collection)
                    .await
                    .with_context(|| format!("failed to list indexes on '{}'", collection))?;
                existing.insert(collection, listed);
            }
            let listed = existing.entry(collection).or_default();

            match compare_index(listed.as_slice(), &index) {
                IndexState::Mismatched => {
                    return Err(StoreError::IndexConflict {
                        collection: collection.to_string(),
                        index: index_name,
                    })
                    .with_context(|| format!("failed to create index '{}'", qualified));
                }
                IndexState::Present(found) if self.policy == ExistingPolicy::Skip => {
                    tracing::info!(collection, index = %index_name, existing = %found, "index exists, skipping");
                    report.indexes_skipped.push(qualified);
                    continue;
                }
                IndexState::Present(_) | IndexState::Absent => {}
            }

            tracing::info!(
                collection,
                index = %index_name,
                unique = index.is_unique(),
                "creating index"
            );

            self.store
                .create_index(collection, &index)
                .await
                .with_context(|| format!("failed to create index '{}'", qualified))?;

            listed.push(IndexInfo::from_spec(&index));
            report.indexes_created.push(qualified);
        }

        Ok(())
    }

    async fn seed(&self, settings: &SeedSettings, report: &mut BootstrapReport) -> anyhow::Result<()> {
        for module in self.registry.modules() {
            let name = module.name();
            let documents = module
                .seed(settings)
                .with_context(|| format!("failed to build seed documents for '{}'", name))?;

            for document in documents {
                match self.store.insert_one(name, document).await {
                    Ok(()) => {
                        tracing::info!(collection = name, "seeded document");
                        report.documents_seeded += 1;
                    }
                    Err(StoreError::DuplicateKey { index, .. })
                        if self.policy == ExistingPolicy::Skip =>
                    {
                        tracing::warn!(collection = name, index = %index, "seed document exists, skipping");
                        report.documents_skipped += 1;
                    }
                    Err(err) => {
                        return Err(err)
                            .with_context(|| format!("failed to seed collection '{}'", name));
                    }
                }
            }
        }

        Ok(())
    }
}

/// How a declared index relates to what the database holds.
enum IndexState {
    Absent,
    /// Same definition exists, under the given name
    Present(String),
    /// An index with the declared name exists with different keys or options
    Mismatched,
}

fn compare_index(existing: &[IndexInfo], spec: &IndexSpec) -> IndexState {
    let name = spec.name();
    if let Some(info) = existing.iter().find(|info| info.name == name) {
        return if info.matches(spec) {
            IndexState::Present(name)
        } else {
            IndexState::Mismatched
        };
    }
    existing
        .iter()
        .find(|info| info.matches(spec))
        .map_or(IndexState::Absent, |info| IndexState::Present(info.name.clone()))
}

fn find_collection<'c>(existing: &'c [CollectionInfo], name: &str) -> Option<&'c CollectionInfo> {
    existing.iter().find(|collection| collection.name == name)
}

/// Declared objects that are missing from the database or differ from their
/// declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inspection {
    pub database: String,
    pub missing_collections: Vec<String>,
    /// Collections that exist without the validator their module declares
    pub unvalidated_collections: Vec<String>,
    /// `collection.index` pairs
    pub missing_indexes: Vec<String>,
    /// `collection.index` pairs whose name exists with another definition
    pub mismatched_indexes: Vec<String>,
}

impl Inspection {
    pub fn is_complete(&self) -> bool {
        self.missing_collections.is_empty()
            && self.unvalidated_collections.is_empty()
            && self.missing_indexes.is_empty()
            && self.mismatched_indexes.is_empty()
    }
}

/// Compare the registry against the database without changing anything.
///
/// An index counts as present when an index with the same keys and uniqueness
/// exists, whatever its name.
pub async fn inspect<S: DocumentStore + ?Sized>(
    store: &S,
    registry: &ModuleRegistry,
) -> anyhow::Result<Inspection> {
    let collections = store
        .list_collections()
        .await
        .context("failed to list collections")?;

    let mut inspection = Inspection {
        database: store.database_name().to_string(),
        ..Inspection::default()
    };

    for module in registry.modules() {
        let name = module.name();
        match find_collection(&collections, name) {
            None => inspection.missing_collections.push(name.to_string()),
            Some(info) if !info.validated && module.validator().is_some() => {
                inspection.unvalidated_collections.push(name.to_string())
            }
            Some(_) => {}
        }
    }

    let mut indexes: HashMap<&str, Vec<IndexInfo>> = HashMap::new();
    for (collection, index) in registry.collect_indexes() {
        if !indexes.contains_key(collection) {
            let listed = store
                .list_indexes(collection)
                .await
                .with_context(|| format!("failed to list indexes on '{}'", collection))?;
            indexes.insert(collection, listed);
        }

        let qualified = format!("{}.{}", collection, index.name());
        let listed = indexes.get(collection).map(Vec::as_slice).unwrap_or_default();
        match compare_index(listed, &index) {
            IndexState::Absent => inspection.missing_indexes.push(qualified),
            IndexState::Mismatched => inspection.mismatched_indexes.push(qualified),
            IndexState::Present(_) => {}
        }
    }

    tracing::debug!(
        database = %inspection.database,
        missing_collections = inspection.missing_collections.len(),
        unvalidated_collections = inspection.unvalidated_collections.len(),
        missing_indexes = inspection.missing_indexes.len(),
        mismatched_indexes = inspection.mismatched_indexes.len(),
        "inspected database"
    );

    Ok(inspection)
}
