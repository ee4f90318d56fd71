use crate::schema::{IndexSpec, Validator};
use crate::settings::SeedSettings;

/// A collection the bootstrap provisions, together with its validator,
/// secondary indexes, and optional seed documents.
pub trait CollectionModule: Sync + Send {
    /// Collection name in the target database
    fn name(&self) -> &'static str;

    /// Validator registered when the collection is created
    /// `None` creates a schemaless collection
    fn validator(&self) -> Option<Validator> {
        None
    }

    /// Secondary indexes, created in the order returned
    fn indexes(&self) -> Vec<IndexSpec> {
        vec![]
    }

    /// Documents inserted after all indexes exist
    /// Modules must return nothing unless seeding is enabled
    fn seed(&self, _settings: &SeedSettings) -> anyhow::Result<Vec<serde_json::Value>> {
        Ok(vec![])
    }
}
