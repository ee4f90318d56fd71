pub mod module;
pub mod registry;
pub mod schema;
pub mod settings;

pub use module::CollectionModule;
pub use registry::ModuleRegistry;
pub use schema::{BsonType, FieldRule, IndexSpec, SchemaError, SortOrder, Validator, Violation};
