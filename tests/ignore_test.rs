use cdf_build::ignore::{is_ignored_dir, parse_ignore_file, IGNORE_FILE};
use std::path::Path;
use std::fs::File;
use std::io::Write;
use tempfile::TempDir;

#[test]
fn test_parse_ignore_file() {
    let temp_dir = TempDir::new().unwrap();

    // Test without .toolkitignore
    let glob_set = parse_ignore_file(temp_dir.path()).unwrap();
    assert!(glob_set.is_match("modules/a/.DS_Store")); // Default pattern
    assert!(!glob_set.is_match("modules/a/timeseries/ts.yaml"));

    // Test with .toolkitignore
    let mut file = File::create(temp_dir.path().join(IGNORE_FILE)).unwrap();
    writeln!(file, "# drafts are not built\n\nmodules/drafts/**\n*.bak").unwrap();

    let glob_set = parse_ignore_file(temp_dir.path()).unwrap();
    assert!(glob_set.is_match("modules/drafts/timeseries/ts.yaml"));
    assert!(glob_set.is_match("old.bak"));
    assert!(glob_set.is_match("modules/a/__pycache__/x.pyc")); // Default pattern still works
    assert!(!glob_set.is_match("modules/a/timeseries/ts.yaml"));
}

#[test]
fn test_invalid_pattern() {
    let temp_dir = TempDir::new().unwrap();
    let mut file = File::create(temp_dir.path().join(IGNORE_FILE)).unwrap();
    writeln!(file, "modules/[unclosed").unwrap();

    assert!(parse_ignore_file(temp_dir.path()).is_err());
}

#[test]
fn test_directory_pattern_matches_the_directory() {
    let temp_dir = TempDir::new().unwrap();
    let mut file = File::create(temp_dir.path().join(IGNORE_FILE)).unwrap();
    writeln!(file, "modules/drafts/**").unwrap();

    let glob_set = parse_ignore_file(temp_dir.path()).unwrap();
    assert!(!glob_set.is_match("modules/drafts"));
    assert!(is_ignored_dir(&glob_set, Path::new("modules/drafts")));
    assert!(is_ignored_dir(&glob_set, Path::new("modules/drafts/wip")));
    assert!(!is_ignored_dir(&glob_set, Path::new("modules/drafts_v2")));
}
