//! Storage: engine registry, session scoping, model persistence operations.

mod engine;
mod orm;
mod session;

pub use engine::{Engine, EngineFactory};
pub use orm::Objects;
pub use session::Session;
