//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogFormat, LogOutput, LoggingConfig, MosaicConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &MosaicConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_plugin_sections(config)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::validation(
            "logging.format = \"json\" requires the `json-log` feature",
        ));
    }

    if logging.output == LogOutput::File {
        let Some(path) = &logging.file_path else {
            return Err(ConfigError::missing_field("logging.file_path"));
        };
        if path.file_name().is_none() {
            return Err(ConfigError::validation(format!(
                "logging.file_path must name a file: {}",
                path.display()
            )));
        }
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "logging.filters contains an empty target: '{target}'"
        )));
    }

    Ok(())
}

/// Section keys must be usable plugin identities.
fn validate_plugin_sections(config: &MosaicConfig) -> ConfigResult<()> {
    for id in config.plugins.keys() {
        if id.trim().is_empty() || id.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidPluginId(id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&MosaicConfig::default()).is_ok());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = MosaicConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.logging.file_path = Some(PathBuf::from("logs/mosaic.log"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_filter_target() {
        let mut config = MosaicConfig::default();
        config.logging.filters.insert(" ".into(), LogLevel::Debug);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_plugin_section_keys() {
        let mut config = MosaicConfig::default();
        config.plugins.insert("mailer".into(), json!({ "sender": "ops" }));
        assert!(validate_config(&config).is_ok());

        config.plugins.insert("bad id".into(), json!({}));
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidPluginId(id)) if id == "bad id"
        ));
    }

    #[cfg(not(feature = "json-log"))]
    #[test]
    fn test_json_format_needs_feature() {
        let mut config = MosaicConfig::default();
        config.logging.format = LogFormat::Json;
        assert!(validate_config(&config).is_err());
    }
}
