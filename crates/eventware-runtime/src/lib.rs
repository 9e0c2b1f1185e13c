//! eventware runtime - configuration, logging and runtime assembly.
//!
//! This crate provides:
//! - Layered configuration loading with figment ([`config`])
//! - Subscriber setup over `tracing-subscriber` ([`logging`])
//! - [`EventwareRuntime`], a middleware manager configured from both
//!
//! ```rust,ignore
//! use eventware_runtime::EventwareRuntime;
//!
//! let runtime = EventwareRuntime::builder()
//!     .profile("production")
//!     .build()?;
//! runtime.add(&Arc::new(MyMiddleware))?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, EventwareConfig, Profile};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, LoggingError, SpanEvents};
pub use runtime::{EventwareRuntime, RuntimeBuilder, RuntimeStats};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and `Level` for span creation.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
