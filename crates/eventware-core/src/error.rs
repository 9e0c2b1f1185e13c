//! Error types for event dispatch.

use thiserror::Error;

use crate::handler::BoxError;
use crate::pattern::PatternError;

/// Errors returned by [`EventDispatcher::fire`](crate::EventDispatcher::fire)
/// and [`EventDispatcher::notify`](crate::EventDispatcher::notify).
///
/// Every variant except [`Handler`](Self::Handler) is raised before the first
/// handler of the chain runs.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A call-style fire resolved no primary handler.
    #[error("no primary handler registered for event '{event}'")]
    NoPrimary {
        /// The fired event name.
        event: String,
    },

    /// More than one primary handler matched the fired event.
    #[error("conflicting primary handlers for event '{event}': {}", .handlers.join(", "))]
    ConflictingPrimary {
        /// The fired event name.
        event: String,
        /// Labels of every matching primary.
        handlers: Vec<String>,
    },

    /// Two handlers in one chain share a priority while strict priorities are
    /// enabled.
    #[error("handlers {} share priority {priority} for event '{event}'", .handlers.join(", "))]
    DuplicatePriority {
        /// The fired event name.
        event: String,
        /// The shared priority.
        priority: i32,
        /// Labels of the handlers sharing it.
        handlers: Vec<String>,
    },

    /// The fired event name was malformed.
    #[error("invalid event name: {0}")]
    InvalidName(#[from] PatternError),

    /// The fired arguments do not have the type the primary, or a typed
    /// observer on a concrete pattern, accepts.
    #[error(
        "handler '{handler}' for event '{event}' expects arguments of type {expected}, got {found}"
    )]
    ArgumentType {
        /// The fired event name.
        event: String,
        /// Label of the mismatched handler.
        handler: String,
        /// Type the handler accepts.
        expected: &'static str,
        /// Type that was fired.
        found: &'static str,
    },

    /// The caller asked for a result type the primary does not produce.
    #[error("primary '{handler}' for event '{event}' returns {found}, caller expected {expected}")]
    ResultType {
        /// The fired event name.
        event: String,
        /// Label of the primary.
        handler: String,
        /// Type requested by the caller.
        expected: &'static str,
        /// Type the primary returns.
        found: &'static str,
    },

    /// A handler in the chain is bound to an instance that no longer exists.
    #[error("handler '{handler}' for event '{event}' outlived its owner")]
    OwnerDropped {
        /// The fired event name.
        event: String,
        /// Label of the orphaned handler.
        handler: String,
    },

    /// A handler returned an error; the rest of the chain was not run.
    #[error("handler '{handler}' failed while handling '{event}': {source}")]
    Handler {
        /// The fired event name.
        event: String,
        /// Label of the failing handler.
        handler: String,
        /// The error returned by the handler, unchanged.
        #[source]
        source: BoxError,
    },
}

impl DispatchError {
    pub(crate) fn handler(event: &str, handler: &str, source: BoxError) -> Self {
        Self::Handler {
            event: event.to_owned(),
            handler: handler.to_owned(),
            source,
        }
    }

    /// Returns the error raised by a handler, if this is a handler failure.
    pub fn handler_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Handler { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// Consumes the error and returns the handler's original error, if any.
    pub fn into_handler_error(self) -> Option<BoxError> {
        match self {
            Self::Handler { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Returns `true` if the error was raised before any handler ran.
    pub fn is_precondition(&self) -> bool {
        !matches!(self, Self::Handler { .. })
    }
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
