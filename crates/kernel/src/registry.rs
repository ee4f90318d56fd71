use anyhow::bail;
use std::sync::Arc;

use crate::module::CollectionModule;
use crate::schema::IndexSpec;

/// Ordered set of collection modules. Registration order is creation order.
pub struct ModuleRegistry {
    modules: Vec<Arc<dyn CollectionModule>>,
}

impl ModuleRegistry {
    /// Create a new module registry
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Register a collection module; collection names must be unique
    pub fn register(&mut self, module: Arc<dyn CollectionModule>) -> anyhow::Result<()> {
        if self.get_module(module.name()).is_some() {
            bail!("collection '{}' is already registered", module.name());
        }

        tracing::debug!(collection = module.name(), "registered collection module");
        self.modules.push(module);
        Ok(())
    }

    /// All registered modules in registration order
    pub fn modules(&self) -> &[Arc<dyn CollectionModule>] {
        &self.modules
    }

    /// Get a module by collection name
    pub fn get_module(&self, name: &str) -> Option<&Arc<dyn CollectionModule>> {
        self.modules.iter().find(|module| module.name() == name)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Collection names in creation order
    pub fn collection_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|module| module.name()).collect()
    }

    /// Collect index declarations from all modules, keeping module order and
    /// then declaration order within each module
    pub fn collect_indexes(&self) -> Vec<(&'static str, IndexSpec)> {
        let mut indexes = Vec::new();

        for module in &self.modules {
            for index in module.indexes() {
                indexes.push((module.name(), index));
            }
        }

        indexes
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldRule, Validator};

    struct TestModule {
        name: &'static str,
    }

    impl CollectionModule for TestModule {
        fn name(&self) -> &'static str {
            self.name
        }

        fn validator(&self) -> Option<Validator> {
            Some(Validator::object().required_field("key", FieldRule::string()))
        }

        fn indexes(&self) -> Vec<IndexSpec> {
            vec![IndexSpec::ascending("key").unique(), IndexSpec::ascending("rank")]
        }
    }

    #[test]
    fn test_module_registry_creation() {
        let registry = ModuleRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.collect_indexes().is_empty());
    }

    #[test]
    fn test_registration_order_is_preserved() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(TestModule { name: "b" })).unwrap();
        registry.register(Arc::new(TestModule { name: "a" })).unwrap();

        assert_eq!(registry.collection_names(), vec!["b", "a"]);
        assert!(registry.get_module("a").is_some());
        assert!(registry.get_module("c").is_none());

        let indexes: Vec<_> = registry
            .collect_indexes()
            .into_iter()
            .map(|(collection, index)| format!("{collection}.{}", index.name()))
            .collect();
        assert_eq!(indexes, vec!["b.key_1", "b.rank_1", "a.key_1", "a.rank_1"]);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(TestModule { name: "a" })).unwrap();

        let err = registry
            .register(Arc::new(TestModule { name: "a" }))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.len(), 1);
    }
}
