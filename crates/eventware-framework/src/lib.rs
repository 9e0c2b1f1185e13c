//! # eventware framework
//!
//! Middleware-level building blocks on top of `eventware-core`.
//!
//! This layer provides:
//! - The [`Middleware`] trait and [`HandlerTable`] for declaring handler methods
//! - [`MiddlewareManager`] for adding and removing middleware as a unit
//! - [`Proxy`] handles that route method calls through the dispatcher

pub mod error;
pub mod manager;
pub mod middleware;
pub mod proxy;

pub use error::{InstanceDropped, MiddlewareError, MiddlewareResult};
pub use manager::{MethodInfo, MiddlewareId, MiddlewareManager};
pub use middleware::{HandlerTable, Middleware};
pub use proxy::Proxy;
