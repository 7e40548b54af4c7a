//! Common constants used throughout the build pipeline.
use regex::Regex;
use std::sync::LazyLock;

/// Directory under the organization directory that holds every module
pub const MODULES_DIR: &str = "modules";

/// Optional per-module metadata file
pub const MODULE_FILE: &str = "module.yaml";

/// Summary written at the root of the build directory
pub const BUILD_ENVIRONMENT_FILE: &str = "_build_environment.yaml";

/// Ignore file name, read from the organization directory
pub const IGNORE_FILE: &str = ".toolkitignore";

/// Validation type that allows dev-only modules
pub const DEV_VALIDATION_TYPE: &str = "dev";

/// Prefix of platform-provided resources every project implicitly has
pub const DEFAULT_SYSTEM_PREFIXES: [&str; 1] = ["cdf_"];

/// Folder whose sub-directories hold function code instead of templates
pub const FUNCTIONS_FOLDER: &str = "functions";

/// Placeholder in file metadata templates expanded once per file in the folder
pub const FILENAME_VARIABLE: &str = "$FILENAME";

/// File suffixes that go through variable substitution; everything else is copied as is.
pub const TEMPLATE_VARS_FILE_SUFFIXES: [&str; 10] =
    ["yaml", "yml", "sql", "csv", "json", "txt", "md", "html", "py", "graphql"];

/// Local ordering prefix such as `1.` or `02.` on source filenames
pub static INDEX_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.").expect("index pattern is valid"));

pub fn config_file_name(env: &str) -> String {
    format!("config.{env}.yaml")
}
