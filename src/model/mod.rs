//! Declarative models: typed field registry, instances with dirty tracking, relationships.

mod field;
mod instance;
mod schema;

pub use field::{FieldDef, FieldInit, FieldKind, RefValue};
pub use instance::Model;
pub use schema::{ModelSchema, SchemaBuilder, TableDescriptor};
