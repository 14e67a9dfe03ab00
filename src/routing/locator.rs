//! Resource locators: outbound URI synthesis and URI-to-resource resolution.

use crate::error::{AppError, SchemaError};
use crate::model::Model;
use crate::routing::controller::Controller;
use crate::routing::route::{Route, Verb};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One piece of a URI template.
#[derive(Clone, Debug, PartialEq)]
pub enum Segment {
    Literal(String),
    /// An identifier slot for the named resource type.
    Placeholder(String),
}

/// URI template plus controller for one resource type. Placeholder count
/// equals the resource's nesting depth; the final placeholder is the
/// resource's own identifier.
pub struct ResourceLocator {
    segments: Vec<Segment>,
    controller: Arc<dyn Controller>,
}

impl ResourceLocator {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn controller(&self) -> &Arc<dyn Controller> {
        &self.controller
    }

    /// Does this template shape match the URI? Literals must agree; any
    /// value is accepted at placeholder positions.
    pub fn matches(&self, uri: &str) -> bool {
        let pieces: Vec<&str> = uri.split('/').skip(1).collect();
        if pieces.len() != self.segments.len() {
            return false;
        }
        pieces
            .iter()
            .zip(&self.segments)
            .all(|(piece, segment)| match segment {
                Segment::Literal(name) => piece == name,
                Segment::Placeholder(_) => true,
            })
    }
}

/// Resource-type to locator map, derived from the route tree in one pass.
pub struct ResourceMap {
    locators: BTreeMap<String, ResourceLocator>,
}

impl ResourceMap {
    /// Walk the route tree depth first, registering a locator for every
    /// route whose controller answers GET. A resource registered twice is a
    /// construction error.
    pub fn build(root: &Arc<Route>) -> Result<ResourceMap, SchemaError> {
        let mut locators = BTreeMap::new();
        collect(root, Vec::new(), &mut locators)?;
        Ok(ResourceMap { locators })
    }

    pub fn locator(&self, resource: &str) -> Option<&ResourceLocator> {
        self.locators.get(resource)
    }

    /// Synthesize the canonical URI for an instance, resolving each ancestor
    /// placeholder through the instance's parent chain.
    pub fn uri_for(&self, model: &Model) -> Result<String, AppError> {
        let resource = model.schema().name();
        let locator = self.locators.get(resource).ok_or_else(|| {
            AppError::NotFound(format!("no locator for resource '{}'", resource))
        })?;
        let mut parts = vec![identifier_segment(model)?];
        let mut owner: Option<Arc<Model>> = None;
        let ancestors = &locator.segments[..locator.segments.len() - 1];
        for segment in ancestors.iter().rev() {
            match segment {
                Segment::Literal(name) => parts.push(name.clone()),
                Segment::Placeholder(parent_type) => {
                    let parent = match &owner {
                        Some(m) => m.parent_of_type(parent_type)?,
                        None => model.parent_of_type(parent_type)?,
                    };
                    parts.push(identifier_segment(&parent)?);
                    owner = Some(parent);
                }
            }
        }
        parts.reverse();
        Ok(format!("/{}", parts.join("/")))
    }

    /// Collection URI for a resource type: the template without its final
    /// placeholder, closed with a trailing slash. Only resources nested at
    /// the top level have a parent-free collection URI.
    pub fn collection_uri(&self, resource: &str) -> Result<String, AppError> {
        let locator = self.locators.get(resource).ok_or_else(|| {
            AppError::NotFound(format!("no locator for resource '{}'", resource))
        })?;
        let mut parts = Vec::new();
        for segment in &locator.segments[..locator.segments.len() - 1] {
            match segment {
                Segment::Literal(name) => parts.push(name.as_str()),
                Segment::Placeholder(_) => {
                    return Err(AppError::BadRequest(format!(
                        "collection of '{}' is nested under a parent resource",
                        resource
                    )))
                }
            }
        }
        Ok(format!("/{}/", parts.join("/")))
    }

    /// Resolve a resource URI back to an instance through the matching
    /// locator's controller.
    pub async fn resolve_uri(&self, uri: &str) -> Result<Model, AppError> {
        let locator = self
            .locators
            .values()
            .find(|l| l.matches(uri))
            .ok_or_else(|| AppError::NotFound(format!("no locator matches '{}'", uri)))?;
        let id = uri
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::BadRequest(format!("'{}' is not a resource URI", uri)))?;
        locator.controller.get(None, id).await
    }
}

fn collect(
    route: &Arc<Route>,
    path: Vec<Segment>,
    locators: &mut BTreeMap<String, ResourceLocator>,
) -> Result<(), SchemaError> {
    let resource = route.controller().schema().name().to_string();

    if route.allows(Verb::Get) {
        let mut segments = path.clone();
        segments.push(Segment::Placeholder(resource.clone()));
        let locator = ResourceLocator {
            segments,
            controller: route.controller().clone(),
        };
        if locators.insert(resource.clone(), locator).is_some() {
            return Err(SchemaError::DuplicateLocator(resource));
        }
    }

    for (name, child) in route.children() {
        let mut child_path = path.clone();
        if child.resource_route {
            child_path.push(Segment::Placeholder(resource.clone()));
        }
        child_path.push(Segment::Literal(name.clone()));
        collect(&child.route, child_path, locators)?;
    }
    Ok(())
}

fn identifier_segment(model: &Model) -> Result<String, AppError> {
    match model.identifier() {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Ok(other.to_string()),
        None => Err(AppError::BadRequest(format!(
            "instance of '{}' has no identifier to address",
            model.schema().name()
        ))),
    }
}
