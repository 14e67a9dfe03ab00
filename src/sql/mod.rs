//! SQL rendering and execution: dialects, parameter binding, result wrapping.

mod bind;
mod dialect;
mod result;

pub use bind::{bind_all, row_to_json};
pub use dialect::{Dialect, MySqlDialect, PostgresDialect, Statement};
pub use result::QueryResult;
