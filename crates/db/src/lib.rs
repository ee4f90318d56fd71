//! MongoDB client factory and collection bootstrap tooling.

pub mod bootstrap;
pub mod error;
pub mod memory;
pub mod mongo;
pub mod store;

pub use bootstrap::{inspect, BootstrapReport, Bootstrapper, Inspection};
pub use error::StoreError;
pub use memory::{MemoryDatabase, MemoryEngine};
pub use mongo::MongoStore;
pub use store::{CollectionInfo, DocumentStore, IndexInfo};
