//! Configuration validation utilities.

use tracing_subscriber::filter::Directive;

use super::error::{ConfigError, ConfigResult};
use super::schema::{EventwareConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
///
/// Level names are already enforced when the configuration is extracted;
/// this checks the combinations serde cannot express.
pub fn validate_config(config: &EventwareConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File {
        match &logging.file_path {
            None => return Err(ConfigError::missing_field("logging.file_path")),
            Some(path) if path.file_name().is_none() => {
                return Err(ConfigError::validation(format!(
                    "Log file path has no file name: {}",
                    path.display()
                )));
            }
            Some(_) => {}
        }
    }

    for (target, level) in &logging.filters {
        if target.trim().is_empty() {
            return Err(ConfigError::validation("Log filter target cannot be empty"));
        }
        let directive = format!("{target}={level}");
        if directive.parse::<Directive>().is_err() {
            return Err(ConfigError::validation(format!(
                "Invalid log filter directive: {directive}"
            )));
        }
    }

    Ok(())
}
