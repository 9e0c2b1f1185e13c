//! Runtime assembly.
//!
//! [`EventwareRuntime`] ties the pieces together: it loads and validates the
//! configuration, installs logging, and owns a [`MiddlewareManager`] whose
//! dispatcher is tuned by the `dispatch` section.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use eventware_runtime::EventwareRuntime;
//!
//! // Loads eventware.toml from the current directory, if any
//! let runtime = EventwareRuntime::builder().build()?;
//!
//! let calculator = Arc::new(Calculator::default());
//! let id = runtime.add(&calculator)?;
//! let add = runtime.manager().proxy::<(i64, i64), i64>(id, "add")?;
//! ```

use std::path::Path;
use std::sync::Arc;

use eventware_core::DispatchOptions;
use eventware_framework::{Middleware, MiddlewareId, MiddlewareManager};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ConfigLoader, EventwareConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging::{LoggingBuilder, LoggingError};

/// A configured middleware manager plus the configuration it came from.
pub struct EventwareRuntime {
    config: EventwareConfig,
    manager: Arc<MiddlewareManager>,
}

/// Counters describing a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Installed middleware.
    pub middleware: usize,
    /// Registered handlers.
    pub handlers: usize,
    /// Chains currently cached by the dispatcher.
    pub cached_chains: usize,
}

impl EventwareRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already validated configuration.
    ///
    /// Logging is not touched.
    pub fn from_config(config: EventwareConfig) -> Self {
        let options = DispatchOptions::from(&config.dispatch);
        let manager = Arc::new(MiddlewareManager::with_options(options));

        info!(
            cache_chains = options.cache_chains,
            strict_priorities = options.strict_priorities,
            max_cached_chains = options.max_cached_chains,
            "Runtime initialized from configuration"
        );

        Self { config, manager }
    }

    /// Returns the configuration in effect.
    pub fn config(&self) -> &EventwareConfig {
        &self.config
    }

    /// Returns the middleware manager.
    pub fn manager(&self) -> &Arc<MiddlewareManager> {
        &self.manager
    }

    /// Adds a middleware to the manager.
    pub fn add<M: Middleware>(&self, instance: &Arc<M>) -> RuntimeResult<MiddlewareId> {
        Ok(self.manager.add(instance)?)
    }

    /// Removes a middleware from the manager.
    pub fn remove(&self, id: MiddlewareId) -> bool {
        self.manager.remove(id)
    }

    /// Returns a snapshot of the manager and dispatcher counters.
    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            middleware: self.manager.middleware_count(),
            handlers: self.manager.handler_count(),
            cached_chains: self.manager.dispatcher().cached_chains(),
        }
    }
}

impl std::fmt::Debug for EventwareRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventwareRuntime")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .finish()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for an [`EventwareRuntime`].
///
/// ```rust,ignore
/// let runtime = EventwareRuntime::builder()
///     .config_file("config/eventware.toml")
///     .profile("production")
///     .init_logging(true)
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<EventwareConfig>,
    init_logging: bool,
}

impl RuntimeBuilder {
    /// Creates a builder that searches the current directory and installs
    /// logging.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            init_logging: true,
        }
    }

    /// Uses `config` as-is instead of loading one.
    pub fn config(mut self, config: EventwareConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Whether [`build`](Self::build) installs the global subscriber.
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Reads `EVENTWARE_`-prefixed environment variables.
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Ignores the environment.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Replaces the built-in defaults the loader starts from.
    pub fn merge(mut self, config: EventwareConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Overrides a single dotted key after every other source.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Loads, validates and applies the configuration.
    ///
    /// An already installed subscriber is left in place; a log file that
    /// cannot be opened is an error.
    pub fn build(self) -> RuntimeResult<EventwareRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging {
            match LoggingBuilder::from_config(&config.logging).try_init() {
                Ok(()) => debug!(level = %config.logging.level, "Logging initialized"),
                Err(LoggingError::Init(_)) => debug!("Subscriber already installed"),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(EventwareRuntime::from_config(config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
