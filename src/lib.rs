//! Task manager database bootstrap.
//!
//! Provisions the `users`, `tasks`, and `categories` collections with their
//! validators and secondary indexes.

pub mod modules;

use anyhow::Context;
use taskdb_db::{BootstrapReport, Bootstrapper, DocumentStore, MongoStore};
use taskdb_kernel::settings::Settings;
use taskdb_kernel::ModuleRegistry;

pub use modules::register_all;

/// Registry holding every task manager collection.
pub fn registry() -> anyhow::Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    register_all(&mut registry)?;
    Ok(registry)
}

/// Bootstrap an already-selected database.
pub async fn bootstrap<S: DocumentStore + ?Sized>(
    store: &S,
    settings: &Settings,
) -> anyhow::Result<BootstrapReport> {
    let registry = registry()?;

    Bootstrapper::new(store, &registry)
        .with_policy(settings.database.on_existing)
        .run(&settings.seed)
        .await
}

/// Connect to the configured MongoDB deployment and bootstrap it.
pub async fn run(settings: &Settings) -> anyhow::Result<BootstrapReport> {
    let store = MongoStore::connect(&settings.database)
        .await
        .with_context(|| format!("failed to connect for database '{}'", settings.database.name))?;

    let report = bootstrap(&store, settings).await;
    store.shutdown().await;
    report
}
