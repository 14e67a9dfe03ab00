//! Nested REST routing: route tree, resource locators, dispatch, wire packing.

mod controller;
mod dispatch;
mod http;
mod locator;
mod packer;
mod route;

pub use controller::{ActionHandler, Controller};
pub use dispatch::{dispatch, Outcome};
pub use http::{router, AppState};
pub use locator::{ResourceLocator, ResourceMap, Segment};
pub use packer::{pack, unpack};
pub use route::{Route, RouteBuilder, Verb};
