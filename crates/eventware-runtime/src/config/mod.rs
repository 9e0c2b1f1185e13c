//! Configuration for eventware applications.
//!
//! Settings are layered with figment from defaults, TOML/YAML files,
//! `EVENTWARE_*` environment variables and programmatic overrides, then
//! checked by [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatchConfig, EventwareConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
