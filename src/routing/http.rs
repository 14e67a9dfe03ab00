//! axum adapter: one wildcard route feeding the dispatcher.

use crate::routing::dispatch::{dispatch, Outcome};
use crate::routing::locator::ResourceMap;
use crate::routing::route::Route;
use axum::extract::{Query, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub root: Arc<Route>,
    pub map: Arc<ResourceMap>,
}

/// Every path funnels into the dispatcher; the route tree, not axum,
/// decides what exists.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", any(handle))
        .route("/*path", any(handle))
        .with_state(state)
}

async fn handle(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(params): Query<BTreeMap<String, String>>,
    body: Option<Json<Value>>,
) -> Response {
    let segments: Vec<String> = uri.path().split('/').skip(1).map(String::from).collect();
    let body = body.map(|Json(v)| v);
    tracing::debug!(method = %method, path = %uri.path(), "dispatch");
    let result = dispatch(
        &state.root,
        &state.map,
        &method,
        &segments,
        0,
        &params,
        body.as_ref(),
        None,
    )
    .await;
    match result {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => e.into_response(),
    }
}

fn outcome_response(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Collection(v) | Outcome::Resource(v) | Outcome::Action(v) => {
            (StatusCode::OK, Json(v)).into_response()
        }
        Outcome::Created { location, body } => (
            StatusCode::CREATED,
            [(header::LOCATION, location)],
            Json(body),
        )
            .into_response(),
        Outcome::Deleted => StatusCode::NO_CONTENT.into_response(),
    }
}
