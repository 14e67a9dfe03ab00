//! Minimal vms/ports service over in-memory controllers.
//!
//! Run with `cargo run --example server`, then e.g.:
//!   curl -X POST localhost:3000/vms/ -H 'content-type: application/json' -d '{"name":"alpha"}'
//!   curl localhost:3000/vms/

use async_trait::async_trait;
use declarest::error::AppError;
use declarest::model::{FieldDef, FieldInit, Model, ModelSchema};
use declarest::routing::{router, ActionHandler, AppState, Controller, ResourceMap, Route};
use declarest::types::{Integer, Mac, Text};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

struct MemController {
    schema: Arc<ModelSchema>,
    store: Mutex<HashMap<String, Model>>,
}

impl MemController {
    fn new(schema: Arc<ModelSchema>) -> Arc<MemController> {
        Arc::new(MemController {
            schema,
            store: Mutex::new(HashMap::new()),
        })
    }

    fn put(&self, model: &Model) -> Result<(), AppError> {
        let id = model
            .identifier()
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| AppError::BadRequest("instance has no identifier".to_string()))?;
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, model.clone());
        Ok(())
    }
}

#[async_trait]
impl Controller for MemController {
    fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    async fn filter(
        &self,
        _parent: Option<&Model>,
        _params: &BTreeMap<String, String>,
    ) -> Result<Vec<Model>, AppError> {
        Ok(self
            .store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        parent: Option<&Model>,
        mut body: BTreeMap<String, FieldInit>,
    ) -> Result<Model, AppError> {
        if let Some(p) = parent {
            body.entry("vm".to_string())
                .or_insert_with(|| FieldInit::Ref(Arc::new(p.clone())));
        }
        let model = Model::new(&self.schema, body)?;
        self.put(&model)?;
        Ok(model)
    }

    async fn get(&self, parent: Option<&Model>, id: &str) -> Result<Model, AppError> {
        let mut model = self
            .store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;
        if let Some(p) = parent {
            if model.schema().field("vm").is_some() {
                model.set("vm", Arc::new(p.clone()))?;
            }
        }
        Ok(model)
    }

    async fn update(
        &self,
        parent: Option<&Model>,
        id: &str,
        body: BTreeMap<String, FieldInit>,
    ) -> Result<Model, AppError> {
        let mut model = self.get(parent, id).await?;
        model.apply(body)?;
        self.put(&model)?;
        Ok(model)
    }

    async fn delete(&self, _parent: Option<&Model>, id: &str) -> Result<(), AppError> {
        self.store
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }
}

struct PowerAction(&'static str);

#[async_trait]
impl ActionHandler for PowerAction {
    async fn run(&self, resource: &Model) -> Result<Value, AppError> {
        Ok(json!({ "state": self.0, "vm": resource.identifier() }))
    }
}

fn build_state() -> Result<AppState, declarest::error::SchemaError> {
    let vm_schema = ModelSchema::builder("vm", "vms")
        .field(FieldDef::uuid_identifier())
        .field(FieldDef::scalar("name", Text::default()).required())
        .field(FieldDef::scalar("cores", Integer::default()))
        .build()?;
    let port_schema = ModelSchema::builder("port", "ports")
        .field(FieldDef::uuid_identifier())
        .field(FieldDef::scalar("mac", Mac))
        .field(FieldDef::relationship("vm", ["vm"]).required())
        .build()?;
    let root_schema = ModelSchema::builder("root", "root")
        .field(FieldDef::uuid_identifier())
        .build()?;

    let ports = Route::builder(MemController::new(port_schema)).build()?;
    let vms = Route::builder(MemController::new(vm_schema))
        .resource_route("ports", ports)
        .invoke_action("start", Arc::new(PowerAction("running")))
        .invoke_action("stop", Arc::new(PowerAction("stopped")))
        .action("power", Arc::new(PowerAction("unknown")))
        .build()?;
    let root = Route::builder(MemController::new(root_schema))
        .allow([])
        .collection_route("vms", vms)
        .build()?;

    let map = Arc::new(ResourceMap::build(&root)?);
    Ok(AppState { root, map })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,declarest=debug".into()),
        )
        .init();

    let state = build_state()?;
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
