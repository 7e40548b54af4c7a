//! Environment configuration handling.
//! This module loads `config.<env>.yaml` from an organization directory: the environment
//! metadata, optional packages, and the raw variable tree consumed by [`crate::variables`].

use crate::constants::{config_file_name, DEFAULT_SYSTEM_PREFIXES, DEV_VALIDATION_TYPE};
use crate::error::{ToolkitError, ToolkitResult};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENVIRONMENT_SCHEMA: LazyLock<serde_json::Value> = LazyLock::new(|| {
    json!({
        "type": "object",
        "required": ["name", "selected"],
        "properties": {
            "name": {"type": "string", "minLength": 1},
            "project": {"type": "string"},
            "validation-type": {"type": "string"},
            "selected": {"type": "array", "items": {"type": "string"}},
            "system-prefixes": {"type": "array", "items": {"type": "string"}}
        }
    })
});

fn default_validation_type() -> String {
    DEV_VALIDATION_TYPE.to_string()
}

fn default_system_prefixes() -> Vec<String> {
    DEFAULT_SYSTEM_PREFIXES.iter().map(|prefix| prefix.to_string()).collect()
}

/// The `environment` section of a config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub project: String,
    #[serde(default = "default_validation_type")]
    pub validation_type: String,
    #[serde(default)]
    pub selected: Vec<String>,
    #[serde(default = "default_system_prefixes")]
    pub system_prefixes: Vec<String>,
}

impl Environment {
    pub fn is_dev(&self) -> bool {
        self.validation_type == DEV_VALIDATION_TYPE
    }
}

/// A parsed `config.<env>.yaml`.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub filepath: PathBuf,
    pub environment: Environment,
    /// Package name to the module names or paths it groups
    pub packages: IndexMap<String, Vec<String>>,
    /// Raw variable tree; scoping is resolved against the discovered modules
    pub variables: serde_yaml::Value,
}

impl BuildConfig {
    /// Loads `config.<env>.yaml` from an organization directory.
    ///
    /// # Errors
    /// * `ToolkitError::ConfigError` if the file is missing, malformed, or names another
    ///   environment
    pub fn load_from_directory<P: AsRef<Path>>(
        organization_dir: P,
        env: &str,
    ) -> ToolkitResult<Self> {
        let filepath = organization_dir.as_ref().join(config_file_name(env));
        if !filepath.is_file() {
            return Err(ToolkitError::ConfigError(format!(
                "No configuration file found for environment '{}' (expected {})",
                env,
                filepath.display()
            )));
        }
        debug!("Loading configuration from {}", filepath.display());
        let content = std::fs::read_to_string(&filepath)?;
        let config = Self::parse(&content, filepath)?;
        if config.environment.name != env {
            return Err(ToolkitError::ConfigError(format!(
                "Expected environment '{}' in {}, but found '{}'",
                env,
                config.filepath.display(),
                config.environment.name
            )));
        }
        Ok(config)
    }

    /// Parses configuration content.
    ///
    /// # Errors
    /// * `ToolkitError::ConfigError` if parsing or schema validation fails
    pub fn parse(content: &str, filepath: PathBuf) -> ToolkitResult<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| {
            ToolkitError::ConfigError(format!("Invalid configuration format: {}", e))
        })?;
        let serde_yaml::Value::Mapping(mut raw) = raw else {
            return Err(ToolkitError::ConfigError(format!(
                "{} must be a mapping with an 'environment' section",
                filepath.display()
            )));
        };

        let environment = raw.remove("environment").ok_or_else(|| {
            ToolkitError::ConfigError(format!(
                "{} has no 'environment' section",
                filepath.display()
            ))
        })?;
        let environment = validate_environment(environment)?;

        let packages = match raw.remove("packages") {
            None | Some(serde_yaml::Value::Null) => IndexMap::new(),
            Some(packages) => serde_yaml::from_value(packages).map_err(|e| {
                ToolkitError::ConfigError(format!("Invalid 'packages' section: {}", e))
            })?,
        };

        let variables = match raw.remove("variables") {
            None | Some(serde_yaml::Value::Null) => serde_yaml::Value::Mapping(Default::default()),
            Some(variables @ serde_yaml::Value::Mapping(_)) => variables,
            Some(_) => {
                return Err(ToolkitError::ConfigError("'variables' must be a mapping".to_string()))
            }
        };

        Ok(Self { filepath, environment, packages, variables })
    }
}

fn validate_environment(environment: serde_yaml::Value) -> ToolkitResult<Environment> {
    let instance = serde_json::to_value(&environment)
        .map_err(|e| ToolkitError::ConfigError(format!("Invalid 'environment' section: {}", e)))?;
    let validator = jsonschema::validator_for(&ENVIRONMENT_SCHEMA)
        .map_err(|e| ToolkitError::ConfigError(format!("Invalid environment schema: {}", e)))?;
    let errors: Vec<String> = validator.iter_errors(&instance).map(|e| e.to_string()).collect();
    if !errors.is_empty() {
        return Err(ToolkitError::ConfigError(format!(
            "Invalid 'environment' section: {}",
            errors.join("; ")
        )));
    }
    serde_json::from_value(instance)
        .map_err(|e| ToolkitError::ConfigError(format!("Invalid 'environment' section: {}", e)))
}
