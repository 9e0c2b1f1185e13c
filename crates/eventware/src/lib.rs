//! # eventware
//!
//! An in-process event bus. Components register handlers for dot-delimited
//! event patterns; firing an event runs every matching handler in priority
//! order, with exactly one primary producing the result.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  add   ┌────────────────────┐ register ┌─────────────────┐
//! │  Middleware  │───────▶│ MiddlewareManager  │─────────▶│ HandlerRegistry │
//! └──────────────┘        └────────────────────┘          └─────────────────┘
//!                                   │ proxy / fire                 │ snapshot
//!                                   ▼                              ▼
//!                         ┌────────────────────┐  build   ┌─────────────────┐
//!                         │  EventDispatcher   │◀─────────│  ChainBuilder   │
//!                         └────────────────────┘          └─────────────────┘
//!                                   │
//!                    pre-observers → primary → post-observers
//! ```
//!
//! - **Patterns**: `a.*.c` matches any three-segment name with `a` and `c`
//!   at the ends; `*` stands for exactly one segment
//! - **Chains**: ascending priority, observers before the primary see no
//!   result, observers after it see the primary's return value
//! - **Middleware**: declares handler methods in a table and is registered
//!   and removed as a unit
//! - **Runtime**: figment configuration and tracing setup around a manager
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use eventware::prelude::*;
//!
//! struct Upper;
//!
//! impl Middleware for Upper {
//!     fn register(table: &mut HandlerTable<Self>) {
//!         table.implement("upper", "text.upper", 0, |_, s: &String| Ok(s.to_uppercase()));
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = EventwareRuntime::builder().build()?;
//!     let upper = Arc::new(Upper);
//!     let id = runtime.add(&upper)?;
//!
//!     let proxy = runtime.manager().proxy::<String, String>(id, "upper")?;
//!     assert_eq!(proxy.call("abc".into())?, "ABC");
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default): `eventware.toml` files
//! - `yaml-config`: `eventware.yaml` files
//! - `json-log`: JSON log output

pub use eventware_core as core;
pub use eventware_framework as framework;
pub use eventware_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use eventware::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use eventware_runtime::{EventwareConfig, EventwareRuntime, RuntimeError};

    // Middleware declaration and management
    pub use eventware_framework::{
        HandlerTable, Middleware, MiddlewareError, MiddlewareId, MiddlewareManager, Proxy,
    };

    // Dispatch
    pub use eventware_core::{
        DispatchError, EventContext, EventName, FireMode, HandlerResult, Pattern, Role,
    };

    pub use std::sync::Arc;

    // Logging macros
    pub use eventware_runtime::prelude::*;
}
