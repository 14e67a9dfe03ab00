//! Dependency-ordered schema migrations with an applied-state ledger.

mod engine;
mod step;

pub use engine::{plan_apply, plan_rollback, LoadedStep, MigrationEngine};
pub use step::{MigrationStep, SqlFileStep};
