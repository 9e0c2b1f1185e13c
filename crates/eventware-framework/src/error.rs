//! Error types for the middleware layer.

use eventware_core::PatternError;
use thiserror::Error;

use crate::manager::MiddlewareId;

/// Returned by a bound handler whose middleware instance has been dropped.
#[derive(Debug, Clone, Error)]
#[error("middleware instance '{middleware}' has been dropped")]
pub struct InstanceDropped {
    /// Type name of the middleware.
    pub middleware: &'static str,
}

/// Errors raised while adding middleware or creating proxies.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    /// A declared handler pattern could not be parsed.
    #[error("invalid pattern for '{middleware}::{method}': {source}")]
    InvalidPattern {
        /// Name of the middleware.
        middleware: String,
        /// Name of the declaring method.
        method: &'static str,
        /// The parse error.
        #[source]
        source: PatternError,
    },

    /// Two primaries were declared for the same wildcard-free pattern.
    #[error("duplicate primary handlers for '{pattern}': '{first}' and '{second}'")]
    DuplicatePrimary {
        /// The shared pattern.
        pattern: String,
        /// Label of the handler registered first.
        first: String,
        /// Label of the rejected handler.
        second: String,
    },

    /// The middleware id is not installed in this manager.
    #[error("middleware {0} is not installed")]
    NotInstalled(MiddlewareId),

    /// The middleware has no method with the given name.
    #[error("middleware '{middleware}' declares no method '{method}'")]
    UnknownMethod {
        /// Name of the middleware.
        middleware: String,
        /// The requested method.
        method: String,
    },

    /// A proxy was requested for a method whose pattern contains a wildcard.
    #[error("method '{method}' is registered under wildcard pattern '{pattern}'")]
    WildcardMethod {
        /// Label of the method.
        method: String,
        /// Its pattern.
        pattern: String,
    },

    /// The proxy's argument or result type does not match the method.
    #[error("proxy for '{method}' uses {found}, method declares {expected}")]
    ProxySignature {
        /// Label of the method.
        method: String,
        /// Type declared by the method.
        expected: &'static str,
        /// Type requested for the proxy.
        found: &'static str,
    },
}

/// Result type for middleware operations.
pub type MiddlewareResult<T> = Result<T, MiddlewareError>;
