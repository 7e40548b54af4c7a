use std::io;

use cdf_build::error::ToolkitError;

#[test]
fn test_error_conversion() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
    let toolkit_err: ToolkitError = io_err.into();

    match toolkit_err {
        ToolkitError::IoError(_) => (),
        _ => panic!("Expected IoError variant"),
    }
    assert_eq!(toolkit_err.type_name(), "ToolkitIOError");
}

#[test]
fn test_error_display() {
    let err = ToolkitError::ConfigError("invalid config".to_string());
    assert_eq!(err.to_string(), "Configuration error: invalid config.");

    let err = ToolkitError::DependencyExtractionError {
        path: "assets/a.yaml".to_string(),
        element: " (element 2)".to_string(),
        message: "'parentExternalId' must be a string, got 3".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "Failed to extract dependencies from 'assets/a.yaml' (element 2): \
         'parentExternalId' must be a string, got 3."
    );
}

#[test]
fn test_type_names() {
    let err =
        ToolkitError::YamlFormatError { path: "a.yaml".to_string(), message: "bad".to_string() };
    assert_eq!(err.type_name(), "ToolkitYAMLFormatError");
    assert_eq!(ToolkitError::EmptySelectionError.type_name(), "ToolkitEmptySelectionError");
    let err = ToolkitError::AmbiguousResourceFileError {
        path: "m.yaml".to_string(),
        kinds: "View, Space".to_string(),
    };
    assert_eq!(err.type_name(), "AmbiguousResourceFileError");
}
