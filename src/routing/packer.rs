//! Converts model instances to and from resource JSON bodies.

use crate::error::AppError;
use crate::model::{FieldInit, FieldKind, Model, ModelSchema, RefValue};
use crate::routing::locator::ResourceMap;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Pack an instance into a JSON object. Scalars render in wire form;
/// relationships render as resource URIs when the referenced instance is
/// resolved, falling back to the bare key otherwise.
pub fn pack(map: &ResourceMap, model: &Model, hidden: &[String]) -> Result<Value, AppError> {
    let mut body = Map::new();
    let wire = model.wire_data()?;
    for def in model.schema().fields() {
        if hidden.iter().any(|h| h == &def.name) {
            continue;
        }
        let value = match (&def.kind, model.reference(&def.name)) {
            (FieldKind::Relationship { .. }, Some(RefValue::Model(parent))) => {
                Value::String(map.uri_for(parent)?)
            }
            _ => wire.get(&def.name).cloned().unwrap_or(Value::Null),
        };
        body.insert(def.name.clone(), value);
    }
    Ok(Value::Object(body))
}

/// Unpack a request body into field initializers. Relationship fields given
/// as resource URIs resolve to instances through the map.
pub async fn unpack(
    map: &ResourceMap,
    schema: &Arc<ModelSchema>,
    body: &Value,
) -> Result<BTreeMap<String, FieldInit>, AppError> {
    let object = body
        .as_object()
        .ok_or_else(|| AppError::BadRequest("request body is not a JSON object".to_string()))?;
    let mut init = BTreeMap::new();
    for (name, value) in object {
        let is_relationship = matches!(
            schema.field(name).map(|f| &f.kind),
            Some(FieldKind::Relationship { .. })
        );
        let field_init = match value {
            Value::String(s) if is_relationship && s.starts_with('/') => {
                let resolved = map.resolve_uri(s).await?;
                FieldInit::Ref(Arc::new(resolved))
            }
            other => FieldInit::Value(other.clone()),
        };
        init.insert(name.clone(), field_init);
    }
    Ok(init)
}
