//! The static route tree, declared once at startup through an explicit builder.

use crate::error::SchemaError;
use crate::routing::controller::{ActionHandler, Controller};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Controller-level verbs. HTTP methods map onto these per route position:
/// a collection address takes Filter and Create, a resource address takes
/// Get, Update and Delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verb {
    Get,
    Filter,
    Create,
    Update,
    Delete,
}

impl Verb {
    pub fn all() -> [Verb; 5] {
        [Verb::Get, Verb::Filter, Verb::Create, Verb::Update, Verb::Delete]
    }
}

pub(crate) struct ChildRoute {
    pub(crate) route: Arc<Route>,
    /// A resource-route child hangs off one instance's identifier; a
    /// collection-route child extends the path with its segment only.
    pub(crate) resource_route: bool,
}

pub(crate) struct ActionDef {
    pub(crate) handler: Arc<dyn ActionHandler>,
    /// Invokable actions are called at `actions/<name>/invoke`; status
    /// actions answer a plain GET at `actions/<name>`.
    pub(crate) invokable: bool,
}

/// One node of the route tree. Immutable after build; safe to share.
pub struct Route {
    controller: Arc<dyn Controller>,
    allowed: BTreeSet<Verb>,
    children: BTreeMap<String, ChildRoute>,
    actions: BTreeMap<String, ActionDef>,
}

impl Route {
    pub fn builder(controller: Arc<dyn Controller>) -> RouteBuilder {
        RouteBuilder {
            controller,
            allowed: Verb::all().into(),
            children: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn controller(&self) -> &Arc<dyn Controller> {
        &self.controller
    }

    pub fn allows(&self, verb: Verb) -> bool {
        self.allowed.contains(&verb)
    }

    pub(crate) fn child(&self, name: &str) -> Option<&ChildRoute> {
        self.children.get(name)
    }

    pub(crate) fn children(&self) -> impl Iterator<Item = (&String, &ChildRoute)> {
        self.children.iter()
    }

    pub(crate) fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.get(name)
    }
}

pub struct RouteBuilder {
    controller: Arc<dyn Controller>,
    allowed: BTreeSet<Verb>,
    children: Vec<(String, ChildRoute)>,
    actions: Vec<(String, ActionDef)>,
}

impl RouteBuilder {
    /// Restrict the verb set; unlisted verbs dispatch as not found.
    pub fn allow(mut self, verbs: impl IntoIterator<Item = Verb>) -> Self {
        self.allowed = verbs.into_iter().collect();
        self
    }

    /// Child addressed beneath one instance: `/<id>/<name>/...`.
    pub fn resource_route(mut self, name: &str, route: Arc<Route>) -> Self {
        self.children.push((
            name.to_string(),
            ChildRoute {
                route,
                resource_route: true,
            },
        ));
        self
    }

    /// Child addressed directly beneath the collection: `/<name>/...`.
    pub fn collection_route(mut self, name: &str, route: Arc<Route>) -> Self {
        self.children.push((
            name.to_string(),
            ChildRoute {
                route,
                resource_route: false,
            },
        ));
        self
    }

    /// Read-only status probe at `actions/<name>`.
    pub fn action(mut self, name: &str, handler: Arc<dyn ActionHandler>) -> Self {
        self.actions.push((
            name.to_string(),
            ActionDef {
                handler,
                invokable: false,
            },
        ));
        self
    }

    /// Side-effecting action at `actions/<name>/invoke`.
    pub fn invoke_action(mut self, name: &str, handler: Arc<dyn ActionHandler>) -> Self {
        self.actions.push((
            name.to_string(),
            ActionDef {
                handler,
                invokable: true,
            },
        ));
        self
    }

    pub fn build(self) -> Result<Arc<Route>, SchemaError> {
        let mut children = BTreeMap::new();
        for (name, child) in self.children {
            if children.insert(name.clone(), child).is_some() {
                return Err(SchemaError::DuplicateRoute(name));
            }
        }
        let mut actions = BTreeMap::new();
        for (name, action) in self.actions {
            if actions.insert(name.clone(), action).is_some() {
                return Err(SchemaError::DuplicateAction(name));
            }
        }
        Ok(Arc::new(Route {
            controller: self.controller,
            allowed: self.allowed,
            children,
            actions,
        }))
    }
}
