//! # eventware core
//!
//! The dispatch registry and firing protocol of eventware:
//!
//! - [`pattern`]: dot-delimited event names and single-segment wildcards
//! - [`registry`]: thread-safe storage of handler entries
//! - [`chain`]: priority-ordered chain construction and the single-primary rule
//! - [`dispatcher`]: firing, precondition checks and result propagation
//! - [`context`]: the per-fire context observers share
//!
//! Higher layers (middleware registration tables, method proxies,
//! configuration and logging setup) live in `eventware-framework` and
//! `eventware-runtime`.

pub mod chain;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod pattern;
pub mod registry;

pub use chain::{Chain, ChainBuilder, FireMode};
pub use context::EventContext;
pub use dispatcher::{DEFAULT_MAX_CACHED_CHAINS, DispatchOptions, EventDispatcher, FireState};
pub use error::{DispatchError, DispatchResult};
pub use handler::{
    AnyObserverFn, BoxError, Callback, ErasedObserver, ErasedPrimary, HandlerResult, Observed,
    ObserverFn, PrimaryFn, Role, TypeInfo,
};
pub use pattern::{EventName, Pattern, PatternError, Segment, matches, matches_str};
pub use registry::{
    HandlerEntry, HandlerId, HandlerRegistry, OwnerId, Registration, RegistrySnapshot,
};
