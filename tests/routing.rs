//! End-to-end dispatch over a two-level vms/ports tree with in-memory controllers.

use async_trait::async_trait;
use axum::http::Method;
use declarest::error::{AppError, SchemaError};
use declarest::model::{FieldDef, FieldInit, Model, ModelSchema};
use declarest::routing::{dispatch, ActionHandler, Controller, Outcome, ResourceMap, Route, Verb};
use declarest::types::Text;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

fn vm_schema() -> Arc<ModelSchema> {
    ModelSchema::builder("vm", "vms")
        .field(FieldDef::uuid_identifier())
        .field(FieldDef::scalar("name", Text::default()).required())
        .build()
        .unwrap()
}

fn port_schema() -> Arc<ModelSchema> {
    ModelSchema::builder("port", "ports")
        .field(FieldDef::uuid_identifier())
        .field(FieldDef::scalar("mac", Text::default()))
        .field(FieldDef::relationship("vm", ["vm"]))
        .build()
        .unwrap()
}

struct MemController {
    schema: Arc<ModelSchema>,
    store: Mutex<HashMap<String, Model>>,
    last_parent: Mutex<Option<String>>,
}

impl MemController {
    fn new(schema: Arc<ModelSchema>) -> Arc<MemController> {
        Arc::new(MemController {
            schema,
            store: Mutex::new(HashMap::new()),
            last_parent: Mutex::new(None),
        })
    }

    fn put(&self, model: &Model) -> String {
        let id = model.identifier().unwrap().as_str().unwrap().to_string();
        self.store.lock().unwrap().insert(id.clone(), model.clone());
        id
    }

    fn seen_parent(&self) -> Option<String> {
        self.last_parent.lock().unwrap().clone()
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
        Ok(self.store.lock().unwrap().values().cloned().collect())
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
        self.put(&model);
        Ok(model)
    }

    async fn get(&self, parent: Option<&Model>, id: &str) -> Result<Model, AppError> {
        *self.last_parent.lock().unwrap() = parent
            .and_then(|p| p.identifier())
            .and_then(|v| v.as_str().map(String::from));
        let mut model = self
            .store
            .lock()
            .unwrap()
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
        self.put(&model);
        Ok(model)
    }

    async fn delete(&self, _parent: Option<&Model>, id: &str) -> Result<(), AppError> {
        self.store
            .lock()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }
}

struct Echo(&'static str);

#[async_trait]
impl ActionHandler for Echo {
    async fn run(&self, resource: &Model) -> Result<Value, AppError> {
        Ok(json!({ "action": self.0, "on": resource.identifier() }))
    }
}

struct Harness {
    root: Arc<Route>,
    map: ResourceMap,
    vms: Arc<MemController>,
    ports: Arc<MemController>,
}

fn harness() -> Harness {
    let vms = MemController::new(vm_schema());
    let ports = MemController::new(port_schema());

    let port_route = Route::builder(ports.clone()).build().unwrap();
    let vm_route = Route::builder(vms.clone())
        .resource_route("ports", port_route)
        .invoke_action("start", Arc::new(Echo("start")))
        .action("status", Arc::new(Echo("status")))
        .build()
        .unwrap();
    let root = Route::builder(MemController::new(vm_schema()))
        .allow([])
        .collection_route("vms", vm_route)
        .build()
        .unwrap();
    let map = ResourceMap::build(&root).unwrap();
    Harness {
        root,
        map,
        vms,
        ports,
    }
}

fn segments(path: &str) -> Vec<String> {
    path.split('/').skip(1).map(String::from).collect()
}

async fn run(
    h: &Harness,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> Result<Outcome, AppError> {
    dispatch(
        &h.root,
        &h.map,
        &method,
        &segments(path),
        0,
        &BTreeMap::new(),
        body.as_ref(),
        None,
    )
    .await
}

fn seed_vm(h: &Harness, name: &str) -> String {
    let vm = Model::new(
        &h.vms.schema,
        [(
            "name".to_string(),
            FieldInit::Value(json!(name)),
        )]
        .into(),
    )
    .unwrap();
    h.vms.put(&vm)
}

fn seed_port(h: &Harness, mac: &str) -> String {
    let port = Model::new(
        &h.ports.schema,
        [("mac".to_string(), FieldInit::Value(json!(mac)))].into(),
    )
    .unwrap();
    h.ports.put(&port)
}

#[tokio::test]
async fn collection_get_lists_resources() {
    let h = harness();
    seed_vm(&h, "alpha");
    let outcome = run(&h, Method::GET, "/vms/", None).await.unwrap();
    match outcome {
        Outcome::Collection(Value::Array(items)) => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0]["name"], json!("alpha"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn create_returns_location_header_value() {
    let h = harness();
    let outcome = run(&h, Method::POST, "/vms/", Some(json!({"name": "beta"})))
        .await
        .unwrap();
    match outcome {
        Outcome::Created { location, body } => {
            let id = body["uuid"].as_str().unwrap();
            assert_eq!(location, format!("/vms/{}", id));
            assert_eq!(body["name"], json!("beta"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn nested_get_resolves_parent_first() {
    let h = harness();
    let vm_id = seed_vm(&h, "alpha");
    let port_id = seed_port(&h, "00:11:22:33:44:55");

    let outcome = run(
        &h,
        Method::GET,
        &format!("/vms/{}/ports/{}", vm_id, port_id),
        None,
    )
    .await
    .unwrap();

    assert_eq!(h.ports.seen_parent(), Some(vm_id.clone()));
    match outcome {
        Outcome::Resource(body) => {
            assert_eq!(body["uuid"], json!(port_id));
            // The relationship renders as the parent's resource URI.
            assert_eq!(body["vm"], json!(format!("/vms/{}", vm_id)));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn uri_synthesis_walks_the_parent_chain() {
    let h = harness();
    let vm_id = seed_vm(&h, "alpha");
    let vm = h.vms.get(None, &vm_id).await.unwrap();
    let port = Model::new(
        &h.ports.schema,
        [
            (
                "mac".to_string(),
                FieldInit::Value(json!("00:11:22:33:44:55")),
            ),
            ("vm".to_string(), FieldInit::Ref(Arc::new(vm))),
        ]
        .into(),
    )
    .unwrap();
    let port_id = port.identifier().unwrap();
    assert_eq!(
        h.map.uri_for(&port).unwrap(),
        format!("/vms/{}/ports/{}", vm_id, port_id.as_str().unwrap())
    );
}

#[tokio::test]
async fn create_body_resolves_relationship_uris() {
    let h = harness();
    let vm_id = seed_vm(&h, "alpha");
    let outcome = run(
        &h,
        Method::POST,
        &format!("/vms/{}/ports/", vm_id),
        Some(json!({"mac": "00:11:22:33:44:55", "vm": format!("/vms/{}", vm_id)})),
    )
    .await
    .unwrap();
    match outcome {
        Outcome::Created { location, body } => {
            let port_id = body["uuid"].as_str().unwrap();
            assert_eq!(location, format!("/vms/{}/ports/{}", vm_id, port_id));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn invoke_action_requires_invoke_suffix() {
    let h = harness();
    let vm_id = seed_vm(&h, "alpha");

    let outcome = run(
        &h,
        Method::POST,
        &format!("/vms/{}/actions/start/invoke", vm_id),
        None,
    )
    .await
    .unwrap();
    match outcome {
        Outcome::Action(v) => assert_eq!(v["action"], json!("start")),
        other => panic!("unexpected outcome: {:?}", other),
    }

    // An invokable action without the suffix does not exist.
    let err = run(
        &h,
        Method::GET,
        &format!("/vms/{}/actions/start", vm_id),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn status_action_answers_plain_get_only() {
    let h = harness();
    let vm_id = seed_vm(&h, "alpha");

    let outcome = run(
        &h,
        Method::GET,
        &format!("/vms/{}/actions/status", vm_id),
        None,
    )
    .await
    .unwrap();
    assert!(matches!(outcome, Outcome::Action(_)));

    let err = run(
        &h,
        Method::POST,
        &format!("/vms/{}/actions/status", vm_id),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn disallowed_verb_is_not_found() {
    let vms = MemController::new(vm_schema());
    let vm_route = Route::builder(vms.clone())
        .allow([Verb::Get, Verb::Filter])
        .build()
        .unwrap();
    let root = Route::builder(MemController::new(port_schema()))
        .allow([])
        .collection_route("vms", vm_route)
        .build()
        .unwrap();
    let map = ResourceMap::build(&root).unwrap();
    let vm = Model::new(
        &vms.schema,
        [("name".to_string(), FieldInit::Value(json!("a")))].into(),
    )
    .unwrap();
    let id = vms.put(&vm);

    let err = dispatch(
        &root,
        &map,
        &Method::DELETE,
        &segments(&format!("/vms/{}", id)),
        0,
        &BTreeMap::new(),
        None,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let h = harness();
    let err = run(&h, Method::GET, "/disks/", None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn update_and_delete_round_trip() {
    let h = harness();
    let vm_id = seed_vm(&h, "alpha");

    let outcome = run(
        &h,
        Method::PUT,
        &format!("/vms/{}", vm_id),
        Some(json!({"name": "renamed"})),
    )
    .await
    .unwrap();
    match outcome {
        Outcome::Resource(body) => assert_eq!(body["name"], json!("renamed")),
        other => panic!("unexpected outcome: {:?}", other),
    }

    let outcome = run(&h, Method::DELETE, &format!("/vms/{}", vm_id), None)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Deleted));
    let err = run(&h, Method::GET, &format!("/vms/{}", vm_id), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn one_resource_cannot_register_two_locators() {
    let vms = MemController::new(vm_schema());
    let twin = Route::builder(vms.clone()).build().unwrap();
    let root = Route::builder(MemController::new(port_schema()))
        .allow([])
        .collection_route("vms", Route::builder(vms.clone()).build().unwrap())
        .collection_route("machines", twin)
        .build()
        .unwrap();
    assert!(matches!(
        ResourceMap::build(&root),
        Err(SchemaError::DuplicateLocator(r)) if r == "vm"
    ));
}
