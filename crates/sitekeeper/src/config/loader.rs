use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

pub(crate) fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.site_name.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "siteName must not be empty".to_string(),
        });
    }

    let batch = &config.batch;
    for (name, value) in [
        ("rowsPerFetch", batch.rows_per_fetch),
        ("categoryFiles", batch.category_files),
        ("archiveFiles", batch.archive_files),
        ("archiveFilesAfterError", batch.archive_files_after_error),
        ("extractEntries", batch.extract_entries),
        ("restoreFiles", batch.restore_files),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation {
                message: format!("batch.{} must be at least 1", name),
            });
        }
    }

    if config.disk_space.critical_bytes > config.disk_space.low_bytes {
        return Err(ConfigError::Validation {
            message: "diskSpace.criticalBytes must not exceed diskSpace.lowBytes".to_string(),
        });
    }

    for pattern in &config.excluded_paths {
        if let Err(e) = glob::Pattern::new(pattern) {
            return Err(ConfigError::Validation {
                message: format!("Invalid excluded path pattern '{}': {}", pattern, e),
            });
        }
    }

    Ok(())
}
