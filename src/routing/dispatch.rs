//! Pure inbound dispatch over an immutable segment list and cursor.

use crate::error::AppError;
use crate::model::Model;
use crate::routing::locator::ResourceMap;
use crate::routing::packer::{pack, unpack};
use crate::routing::route::{Route, Verb};
use axum::http::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a dispatched request produced, already in wire form.
#[derive(Debug)]
pub enum Outcome {
    Collection(Value),
    Resource(Value),
    Created { location: String, body: Value },
    Deleted,
    Action(Value),
}

fn not_found(segments: &[String]) -> AppError {
    AppError::NotFound(format!("/{}", segments.join("/")))
}

/// Resolve one request against the route tree.
///
/// `segments` is the request path split on `/` with the leading empty piece
/// dropped, so `/vms/` becomes `["vms", ""]` and `/vms/x` becomes
/// `["vms", "x"]`. The cursor advances as segments are consumed; intermediate
/// identifiers resolve to parent resources through the owning controller.
/// Unknown segments, unknown actions and verbs a node does not allow all
/// answer not-found.
pub async fn dispatch(
    root: &Arc<Route>,
    map: &ResourceMap,
    method: &Method,
    segments: &[String],
    cursor: usize,
    params: &BTreeMap<String, String>,
    body: Option<&Value>,
    parent: Option<&Model>,
) -> Result<Outcome, AppError> {
    let mut route = root.clone();
    let mut cursor = cursor;
    let mut resolved: Option<Model> = None;

    loop {
        let current_parent = resolved.as_ref().or(parent);
        let name = segments
            .get(cursor)
            .map(String::as_str)
            .ok_or_else(|| not_found(segments))?;
        let peek = segments.get(cursor + 1).map(String::as_str);

        let Some(peek) = peek else {
            // Terminal segment: collection address or resource identifier.
            return if name.is_empty() {
                collection_op(&route, map, method, segments, params, body, current_parent).await
            } else {
                resource_op(&route, map, method, segments, name, body, current_parent).await
            };
        };

        if name.is_empty() {
            return Err(not_found(segments));
        }

        if let Some(child) = route.child(name) {
            // Collection-style descent: the child addresses a whole set.
            if child.resource_route {
                return Err(not_found(segments));
            }
            route = child.route.clone();
            cursor += 1;
            continue;
        }

        if peek == "actions" {
            return action_op(&route, method, segments, cursor, name, current_parent).await;
        }

        // Intermediate identifier: resolve it, then descend into the child
        // route that hangs off this resource.
        let resource = route.controller().get(current_parent, name).await?;
        let child = route.child(peek).ok_or_else(|| not_found(segments))?;
        if !child.resource_route {
            return Err(not_found(segments));
        }
        route = child.route.clone();
        cursor += 2;
        resolved = Some(resource);
    }
}

async fn collection_op(
    route: &Arc<Route>,
    map: &ResourceMap,
    method: &Method,
    segments: &[String],
    params: &BTreeMap<String, String>,
    body: Option<&Value>,
    parent: Option<&Model>,
) -> Result<Outcome, AppError> {
    let controller = route.controller();
    let hidden = controller.hidden_fields();
    if *method == Method::GET {
        if !route.allows(Verb::Filter) {
            return Err(not_found(segments));
        }
        let found = controller.filter(parent, params).await?;
        let packed = found
            .iter()
            .map(|m| pack(map, m, &hidden))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Outcome::Collection(Value::Array(packed)))
    } else if *method == Method::POST {
        if !route.allows(Verb::Create) {
            return Err(not_found(segments));
        }
        let body = body
            .ok_or_else(|| AppError::BadRequest("create requires a request body".to_string()))?;
        let init = unpack(map, controller.schema(), body).await?;
        let created = controller.create(parent, init).await?;
        Ok(Outcome::Created {
            location: map.uri_for(&created)?,
            body: pack(map, &created, &hidden)?,
        })
    } else {
        Err(not_found(segments))
    }
}

async fn resource_op(
    route: &Arc<Route>,
    map: &ResourceMap,
    method: &Method,
    segments: &[String],
    id: &str,
    body: Option<&Value>,
    parent: Option<&Model>,
) -> Result<Outcome, AppError> {
    let controller = route.controller();
    let hidden = controller.hidden_fields();
    if *method == Method::GET {
        if !route.allows(Verb::Get) {
            return Err(not_found(segments));
        }
        let found = controller.get(parent, id).await?;
        Ok(Outcome::Resource(pack(map, &found, &hidden)?))
    } else if *method == Method::PUT {
        if !route.allows(Verb::Update) {
            return Err(not_found(segments));
        }
        let body = body
            .ok_or_else(|| AppError::BadRequest("update requires a request body".to_string()))?;
        let init = unpack(map, controller.schema(), body).await?;
        let updated = controller.update(parent, id, init).await?;
        Ok(Outcome::Resource(pack(map, &updated, &hidden)?))
    } else if *method == Method::DELETE {
        if !route.allows(Verb::Delete) {
            return Err(not_found(segments));
        }
        controller.delete(parent, id).await?;
        Ok(Outcome::Deleted)
    } else {
        Err(not_found(segments))
    }
}

async fn action_op(
    route: &Arc<Route>,
    method: &Method,
    segments: &[String],
    cursor: usize,
    id: &str,
    parent: Option<&Model>,
) -> Result<Outcome, AppError> {
    let resource = route.controller().get(parent, id).await?;
    let action_name = segments
        .get(cursor + 2)
        .map(String::as_str)
        .ok_or_else(|| not_found(segments))?;
    let action = route
        .action(action_name)
        .ok_or_else(|| not_found(segments))?;
    let tail = segments.get(cursor + 3).map(String::as_str);
    if segments.len() > cursor + 4 {
        return Err(not_found(segments));
    }
    let runnable = match (action.invokable, tail) {
        (true, Some("invoke")) => {
            [Method::GET, Method::POST, Method::PUT].contains(method)
        }
        (false, None) => *method == Method::GET,
        _ => false,
    };
    if !runnable {
        return Err(not_found(segments));
    }
    Ok(Outcome::Action(action.handler.run(&resource).await?))
}
