//! Runtime error types.

use eventware_framework::MiddlewareError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::logging::LoggingError;

/// Errors that can occur while building or driving a runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The subscriber could not be installed.
    #[error(transparent)]
    Logging(#[from] LoggingError),

    /// Middleware registration failed.
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
