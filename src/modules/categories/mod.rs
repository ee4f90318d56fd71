use taskdb_kernel::{CollectionModule, IndexSpec};

/// Task categories. Schemaless: documents are not validated.
pub struct CategoriesModule;

impl CategoriesModule {
    pub const fn new() -> Self {
        Self
    }
}

impl CollectionModule for CategoriesModule {
    fn name(&self) -> &'static str {
        "categories"
    }

    fn indexes(&self) -> Vec<IndexSpec> {
        vec![IndexSpec::ascending("user_id")]
    }
}

/// Create a new instance of the categories module
pub fn create_module() -> std::sync::Arc<dyn CollectionModule> {
    std::sync::Arc::new(CategoriesModule::new())
}
