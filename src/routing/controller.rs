//! Controller and action contracts the dispatcher calls into.

use crate::error::AppError;
use crate::model::{FieldInit, Model, ModelSchema};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Serves one resource type. Unimplemented operations answer with a typed
/// not-implemented error, so a read-only controller only fills in the reads.
#[async_trait]
pub trait Controller: Send + Sync {
    fn schema(&self) -> &Arc<ModelSchema>;

    /// Field names left out of packed resource bodies.
    fn hidden_fields(&self) -> Vec<String> {
        Vec::new()
    }

    async fn filter(
        &self,
        _parent: Option<&Model>,
        _params: &BTreeMap<String, String>,
    ) -> Result<Vec<Model>, AppError> {
        Err(AppError::NotImplemented("filter"))
    }

    async fn create(
        &self,
        _parent: Option<&Model>,
        _body: BTreeMap<String, FieldInit>,
    ) -> Result<Model, AppError> {
        Err(AppError::NotImplemented("create"))
    }

    async fn get(&self, _parent: Option<&Model>, _id: &str) -> Result<Model, AppError> {
        Err(AppError::NotImplemented("get"))
    }

    async fn update(
        &self,
        _parent: Option<&Model>,
        _id: &str,
        _body: BTreeMap<String, FieldInit>,
    ) -> Result<Model, AppError> {
        Err(AppError::NotImplemented("update"))
    }

    async fn delete(&self, _parent: Option<&Model>, _id: &str) -> Result<(), AppError> {
        Err(AppError::NotImplemented("delete"))
    }
}

/// Handler for one named action, running against a resolved resource.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn run(&self, resource: &Model) -> Result<Value, AppError>;
}
