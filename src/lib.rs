//! declarest: declarative data models exposed as nested REST resources with SQL persistence.

pub mod error;
pub mod filters;
pub mod index;
pub mod migrations;
pub mod model;
pub mod routing;
pub mod sql;
pub mod storage;
pub mod types;

pub use error::{AppError, SchemaError};
pub use filters::Filter;
pub use index::{IndexError, IndexOptions, SharedIndex};
pub use migrations::{MigrationEngine, MigrationStep, SqlFileStep};
pub use model::{FieldDef, Model, ModelSchema, RefValue, TableDescriptor};
pub use routing::{dispatch, Controller, Outcome, ResourceMap, Route, RouteBuilder, Verb};
pub use sql::{Dialect, MySqlDialect, PostgresDialect, QueryResult, Statement};
pub use storage::{Engine, EngineFactory, Objects, Session};
