//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables `eventware.toml`
//! - `yaml-config`: enables `eventware.yaml` / `eventware.yml`
//!
//! Both can be enabled at once; each enabled format is searched.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults, or the base passed to [`ConfigLoader::merge`]
//! 2. Profile-specific file (`eventware.{profile}.toml` / `.yaml`)
//! 3. Main file (`eventware.toml` / `eventware.yaml`)
//! 4. Environment variables (`EVENTWARE_*`)
//! 5. Values passed to [`ConfigLoader::set`]
//!
//! # Environment Variable Mapping
//!
//! Variables use the `EVENTWARE_` prefix with `__` as the nesting separator:
//!
//! - `EVENTWARE_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `EVENTWARE_DISPATCH__STRICT_PRIORITIES=true` → `dispatch.strict_priorities = true`
//!
//! # Example
//!
//! ```rust,ignore
//! use eventware_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .search_path("./config")
//!     .set("dispatch.cache_chains", false)
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::EventwareConfig;

const ENV_PREFIX: &str = "EVENTWARE_";
const FILE_STEM: &str = "eventware";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    /// Returns the profile name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name; `dev` and `prod` are accepted as short forms.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `EVENTWARE_PROFILE`, defaulting to `Development`.
    pub fn from_env() -> Self {
        std::env::var("EVENTWARE_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Lowest layer.
    base: EventwareConfig,
    /// Highest layer, applied after the environment.
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Specific config file to load (disables search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader with the profile taken from the environment.
    pub fn new() -> Self {
        Self {
            base: EventwareConfig::default(),
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    /// Adds `<user config dir>/eventware` to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join(FILE_STEM))
        } else {
            self
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Replaces the built-in defaults with `config`.
    ///
    /// Files and the environment still override it.
    pub fn merge(mut self, config: EventwareConfig) -> Self {
        self.base = config;
        self
    }

    /// Overrides a single dotted key after every other source.
    ///
    /// ```rust,ignore
    /// ConfigLoader::new().set("logging.level", "debug");
    /// ```
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<EventwareConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: EventwareConfig = figment.extract()?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(&self.base));

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment.merge(self.overrides))
    }

    /// Merges a single file, dispatching on its extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(FILE_STEM));
        }
        paths
    }

    /// Searches one format across all search paths.
    ///
    /// For each path the profile file is merged first, then the main file.
    /// Stops at the first path holding a main file.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        extensions: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for ext in extensions {
                let profile_path =
                    search_path.join(format!("{FILE_STEM}.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(format!("{FILE_STEM}.{ext}"));
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    return (merge_fn(figment, &base_path), true);
                }
            }
        }
        (figment, false)
    }

    #[allow(unused_mut)]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(figment, &search_paths, &["toml"], |fig, path| {
                fig.merge(Toml::file(path))
            });
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) =
                self.load_format_files(figment, &search_paths, &["yaml", "yml"], |fig, path| {
                    fig.merge(Yaml::file(path))
                });
            figment = f;
            found |= ok;
        }

        if !found {
            warn!("No configuration file found, using defaults");
        }
        figment
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<EventwareConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from `path` plus the environment.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<EventwareConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogLevel, LogOutput};
    use figment::Jail;

    #[test]
    fn test_defaults_without_files() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config, EventwareConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("prod"), Profile::Production);
        assert_eq!(Profile::parse("Dev"), Profile::Development);
        assert_eq!(Profile::parse("staging").as_str(), "staging");
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("EVENTWARE_PROFILE", "production");
            assert_eq!(Profile::from_env(), Profile::Production);
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "eventware.staging.toml",
                r#"
                [logging]
                level = "trace"
                thread_ids = true
                "#,
            )?;
            jail.create_file(
                "eventware.toml",
                r#"
                [logging]
                level = "warn"
                output = "stderr"

                [dispatch]
                cache_chains = false
                "#,
            )?;
            jail.set_env("EVENTWARE_DISPATCH__STRICT_PRIORITIES", "true");
            jail.set_env("EVENTWARE_LOGGING__OUTPUT", "stdout");
            jail.set_env("EVENTWARE_DISPATCH__MAX_CACHED_CHAINS", "64");

            let config = ConfigLoader::new()
                .profile("staging")
                .search_path(jail.directory())
                .set("logging.output", "file")
                .load()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.logging.level, LogLevel::Warn);
            assert!(config.logging.thread_ids);
            assert!(!config.dispatch.cache_chains);
            assert!(config.dispatch.strict_priorities);
            assert!(config.dispatch.log_unmatched);
            assert_eq!(config.dispatch.max_cached_chains, 64);
            assert_eq!(config.logging.output, LogOutput::File);
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_explicit_file() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[logging]\nlevel = \"debug\"\n")?;

            let config = ConfigLoader::new()
                .file(jail.directory().join("custom.toml"))
                .without_env()
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.logging.level, LogLevel::Debug);

            let missing = ConfigLoader::new().file("absent.toml").load();
            assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));

            jail.create_file("custom.ini", "")?;
            let unsupported = ConfigLoader::new()
                .file(jail.directory().join("custom.ini"))
                .load();
            assert!(matches!(unsupported, Err(ConfigError::UnsupportedFormat(_))));
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_bad_value_is_extract_error() {
        Jail::expect_with(|jail| {
            jail.create_file("eventware.toml", "[logging]\nlevel = \"loud\"\n")?;
            let result = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load();
            assert!(matches!(result, Err(ConfigError::Extract(_))));
            Ok(())
        });
    }

    #[test]
    fn test_merge_replaces_defaults() {
        Jail::expect_with(|jail| {
            let mut base = EventwareConfig::default();
            base.logging.level = LogLevel::Error;
            jail.set_env("EVENTWARE_LOGGING__FILE_LOCATION", "true");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .merge(base)
                .load()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.logging.level, LogLevel::Error);
            assert!(config.logging.file_location);
            Ok(())
        });
    }
}
