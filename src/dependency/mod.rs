pub mod registry;
pub mod schema;

pub use registry::{
    DependencyInstance, DependencyRegistry, RegistryError, RegistrySnapshot, RelationSnapshot,
    UpsertOutcome,
};
pub use schema::{FieldIssue, SchemaError};
