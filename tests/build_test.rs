use cdf_build::build::{BuildCommand, BuiltModuleList, SUCCESS_STATUS};
use cdf_build::console::{Console, QuietConsole};
use cdf_build::constants::BUILD_ENVIRONMENT_FILE;
use cdf_build::error::ToolkitError;
use cdf_build::loader::classic::TimeSeriesLoader;
use cdf_build::loader::{Identifier, LoaderKind, LoaderRegistry};
use cdf_build::lookup::StaticLookup;
use cdf_build::warning::ToolkitWarning;
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn config(selected: &[&str], variables: &str) -> String {
    let selected: Vec<String> = selected.iter().map(|s| format!("    - {s}\n")).collect();
    format!(
        concat!(
            "environment:\n  name: dev\n  project: test-project\n  validation-type: dev\n",
            "  selected:\n{}variables:\n{}",
        ),
        selected.concat(),
        variables
    )
}

fn quiet() -> BuildCommand {
    BuildCommand::new().with_console(Box::new(QuietConsole))
}

fn build(org: &Path, build_dir: &Path) -> BuiltModuleList {
    quiet().execute(org, build_dir, "dev", true).unwrap()
}

fn missing_dependencies(built: &BuiltModuleList) -> Vec<&ToolkitWarning> {
    built
        .warnings
        .iter()
        .filter(|w| matches!(w, ToolkitWarning::MissingDependency { .. }))
        .collect()
}

#[test_log::test]
fn test_end_to_end_single_module() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(
        &org,
        "modules/my_module/timeseries/ts1.TimeSeries.yaml",
        "externalId: \"{{ts_prefix}}_001\"\n",
    );
    write(
        &org,
        "config.dev.yaml",
        &config(&["my_module"], "  modules:\n    my_module:\n      ts_prefix: plant_a\n"),
    );
    let build_dir = temp_dir.path().join("build");

    let built = build(&org, &build_dir);

    assert_eq!(built.len(), 1);
    assert!(built.warnings.is_empty(), "{:?}", built.warnings);
    let module = built.get("my_module").unwrap();
    assert_eq!(module.status, SUCCESS_STATUS);
    assert_eq!(module.resource_count(), 1);
    let resource = &module.resources["timeseries"][0];
    assert_eq!(resource.identifier, Identifier::external_id("plant_a_001"));
    assert_eq!(resource.destination, build_dir.join("timeseries/1.ts1.TimeSeries.yaml"));

    let content = fs::read_to_string(&resource.destination).unwrap();
    assert!(content.contains("plant_a_001"));
    assert!(!content.contains("{{"));
}

#[test_log::test]
fn test_failed_module_does_not_stop_the_build() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(&org, "modules/a/timeseries/a.TimeSeries.yaml", "externalId: ts_a\n");
    write(&org, "modules/b/timeseries/b.TimeSeries.yaml", "externalId: {{undefined_var}}_001\n");
    write(&org, "modules/c/timeseries/c.TimeSeries.yaml", "externalId: ts_c\n");
    write(&org, "config.dev.yaml", &config(&["a", "b", "c"], "  modules: {}\n"));
    let build_dir = temp_dir.path().join("build");

    let built = build(&org, &build_dir);

    assert_eq!(built.len(), 3);
    assert!(built.get("a").unwrap().is_success());
    assert!(built.get("c").unwrap().is_success());
    let failed = built.get("b").unwrap();
    assert_eq!(failed.status, "ToolkitYAMLFormatError");
    assert_eq!(failed.resource_count(), 0);
    assert_eq!(built.failed().count(), 1);

    // Output of the failed module is rolled back.
    let mut names: Vec<String> = fs::read_dir(build_dir.join("timeseries"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["1.a.TimeSeries.yaml", "3.c.TimeSeries.yaml"]);
}

#[test_log::test]
fn test_dependency_sweep_reports_only_undefined_references() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(
        &org,
        "modules/a/assets/asset1.Asset.yaml",
        "externalId: asset1\nname: Asset 1\ndataSetExternalId: ds\n",
    );
    write(&org, "modules/a/data_sets/ds.DataSet.yaml", "externalId: ds\n");
    write(
        &org,
        "modules/b/timeseries/ts1.TimeSeries.yaml",
        "externalId: ts1\nassetExternalId: asset1\n",
    );
    write(
        &org,
        "modules/c/timeseries/ts2.TimeSeries.yaml",
        "externalId: ts2\nassetExternalId: does_not_exist\n",
    );
    write(&org, "config.dev.yaml", &config(&["a", "b", "c"], "  modules: {}\n"));
    let build_dir = temp_dir.path().join("build");

    let built = build(&org, &build_dir);

    let missing = missing_dependencies(&built);
    assert_eq!(missing.len(), 1, "{:?}", built.warnings);
    match missing[0] {
        ToolkitWarning::MissingDependency { kind, identifier, required_by } => {
            assert_eq!(*kind, LoaderKind::Asset);
            assert_eq!(identifier, &Identifier::external_id("does_not_exist"));
            assert_eq!(required_by.len(), 1);
            assert_eq!(required_by[0].0, Identifier::external_id("ts2"));
            assert!(required_by[0].1.ends_with("modules/c/timeseries/ts2.TimeSeries.yaml"));
        }
        other => panic!("Unexpected warning: {other}"),
    }
}

#[test_log::test]
fn test_existing_and_system_resources_are_not_missing() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(
        &org,
        "modules/m/timeseries/ts.TimeSeries.yaml",
        "- externalId: ts1\n  assetExternalId: remote_asset\n\
         - externalId: ts2\n  assetExternalId: sys_root\n\
         - externalId: ts3\n  assetExternalId: local_missing\n",
    );
    let content = config(&["m"], "  modules: {}\n")
        .replace("  selected:", "  system-prefixes: [sys_]\n  selected:");
    write(&org, "config.dev.yaml", &content);
    let build_dir = temp_dir.path().join("build");

    let lookup =
        StaticLookup::new().with(LoaderKind::Asset, Identifier::external_id("remote_asset"));
    let built =
        quiet().with_lookup(Box::new(lookup)).execute(&org, &build_dir, "dev", true).unwrap();

    let missing = missing_dependencies(&built);
    assert_eq!(missing.len(), 1);
    assert!(missing[0].to_string().contains("'local_missing'"));
}

#[test_log::test]
fn test_iterations_with_fixed_identifier_are_flagged() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(
        &org,
        "modules/templated/timeseries/ts.TimeSeries.yaml",
        "externalId: fixed_ts\nname: \"{{site}} flow\"\n",
    );
    write(&org, "modules/per_site/timeseries/ts.TimeSeries.yaml", "externalId: \"{{site}}_ts\"\n");
    write(
        &org,
        "config.dev.yaml",
        &config(
            &["templated", "per_site"],
            concat!(
                "  modules:\n",
                "    templated:\n      - site: oslo\n      - site: bergen\n",
                "    per_site:\n      - site: oslo\n      - site: bergen\n",
            ),
        ),
    );
    let build_dir = temp_dir.path().join("build");

    let built = build(&org, &build_dir);

    assert_eq!(built.len(), 4);
    let names: Vec<&str> = built.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["per_site_1", "per_site_2", "templated_1", "templated_2"]);
    assert_eq!(built.get("templated_2").unwrap().iteration, Some(2));

    let across: Vec<&ToolkitWarning> = built
        .warnings
        .iter()
        .filter(|w| matches!(w, ToolkitWarning::DuplicatedAcrossIterations { .. }))
        .collect();
    assert_eq!(across.len(), 1);
    match across[0] {
        ToolkitWarning::DuplicatedAcrossIterations { module, identifier, .. } => {
            assert_eq!(module, "templated");
            assert_eq!(identifier, &Identifier::external_id("fixed_ts"));
        }
        other => panic!("Unexpected warning: {other}"),
    }
    assert_eq!(built.get("templated_2").unwrap().warning_count, 1);

    // Each iteration writes its own file.
    let per_site_2 = &built.get("per_site_2").unwrap().resources["timeseries"][0];
    assert_eq!(per_site_2.identifier, Identifier::external_id("bergen_ts"));
    assert_eq!(per_site_2.destination, build_dir.join("timeseries/2.ts.TimeSeries.yaml"));
    assert!(build_dir.join("timeseries/4.ts.TimeSeries.yaml").is_file());
}

#[test_log::test]
fn test_rebuild_is_deterministic() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(
        &org,
        "modules/etl/transformations/1.load.Transformation.yaml",
        "externalId: load\nname: Load\n",
    );
    write(&org, "modules/etl/transformations/1.load.sql", "SELECT * FROM {{table}}\n");
    write(&org, "modules/etl/raw/tables.yaml", "dbName: ingest\ntableName: pumps\n");
    write(&org, "modules/core/data_sets/ds.DataSet.yaml", "externalId: ds\n");
    write(
        &org,
        "modules/core/timeseries/ts.TimeSeries.yaml",
        "externalId: ts\ndataSetExternalId: ds\n",
    );
    write(
        &org,
        "config.dev.yaml",
        &config(&["etl", "core"], "  modules:\n    etl:\n      table: ingest.pumps\n"),
    );

    let first = temp_dir.path().join("first");
    let second = temp_dir.path().join("second");
    let built = build(&org, &first);
    build(&org, &second);

    assert!(built.warnings.is_empty(), "{:?}", built.warnings);
    assert!(!dir_diff::is_different(&first, &second).unwrap());
    assert!(first.join("transformations/1.load.Transformation.yaml").is_file());
    assert!(first.join("transformations/1.load.sql").is_file());
    assert!(first.join("raw/1.tables.yaml").is_file());
}

#[test_log::test]
fn test_build_environment_summary() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(&org, "modules/my_module/data_sets/ds.DataSet.yaml", "externalId: ds\n");
    write(&org, "config.dev.yaml", &config(&["my_module"], "  modules: {}\n"));
    let build_dir = temp_dir.path().join("build");

    build(&org, &build_dir);

    let content = fs::read_to_string(build_dir.join(BUILD_ENVIRONMENT_FILE)).unwrap();
    let summary: serde_yaml::Value = serde_yaml::from_str(&content).unwrap();
    assert_eq!(summary["name"].as_str(), Some("dev"));
    assert_eq!(summary["project"].as_str(), Some("test-project"));
    let module = &summary["modules"][0];
    assert_eq!(module["name"].as_str(), Some("my_module"));
    assert_eq!(module["status"].as_str(), Some(SUCCESS_STATUS));
    let resource = &module["resources"]["data_sets"][0];
    assert_eq!(resource["identifier"].as_str(), Some("ds"));
    assert_eq!(resource["destination"].as_str(), Some("data_sets/1.ds.DataSet.yaml"));
}

#[test_log::test]
fn test_environment_advisories() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(&org, "modules/sandbox/data_sets/ds.DataSet.yaml", "externalId: ds\n");
    write(&org, "modules/sandbox/module.yaml", "dev_only: true\n");
    write(&org, "modules/sandbox/notes/readme.md", "# notes\n");
    let content = config(&["sandbox"], "  modules:\n    sandbox:\n      owner: <change_me>\n")
        .replace("validation-type: dev", "validation-type: prod");
    write(&org, "config.dev.yaml", &content);
    let build_dir = temp_dir.path().join("build");
    write(&build_dir, "stale.yaml", "a: 1\n");

    let built = quiet().execute(&org, &build_dir, "dev", false).unwrap();

    let kinds: Vec<&str> = built
        .warnings
        .iter()
        .map(|w| match w {
            ToolkitWarning::BuildDirectoryNotEmpty { .. } => "not_empty",
            ToolkitWarning::DevOnlyModule { .. } => "dev_only",
            ToolkitWarning::UnknownResourceFolder { .. } => "unknown_folder",
            ToolkitWarning::TemplateMarker { .. } => "marker",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["not_empty", "dev_only", "unknown_folder", "marker"]);
    assert!(build_dir.join("stale.yaml").exists());
}

#[test_log::test]
fn test_selection_errors_abort_the_build() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(&org, "modules/my_module/data_sets/ds.DataSet.yaml", "externalId: ds\n");
    write(&org, "config.dev.yaml", &config(&["not_a_module"], "  modules: {}\n"));

    let result = quiet().execute(&org, temp_dir.path().join("build"), "dev", true);
    assert!(matches!(result, Err(ToolkitError::MissingModuleError { .. })));

    let result = quiet().execute(&org, temp_dir.path().join("build"), "prod", true);
    assert!(matches!(result, Err(ToolkitError::ConfigError(_))));
}

#[test_log::test]
fn test_duplicate_identifier_is_built_once() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(&org, "modules/a/timeseries/flow.TimeSeries.yaml", "externalId: ts1\nname: Flow\n");
    write(&org, "modules/b/timeseries/flow.TimeSeries.yaml", "externalId: ts1\nname: Flow again\n");
    write(&org, "config.dev.yaml", &config(&["a", "b"], "  modules: {}\n"));
    let build_dir = temp_dir.path().join("build");

    let built = build(&org, &build_dir);

    let ts1: Vec<_> = built
        .iter()
        .flat_map(|module| module.resources.values().flatten())
        .filter(|resource| {
            resource.loader == LoaderKind::TimeSeries
                && resource.identifier == Identifier::external_id("ts1")
        })
        .collect();
    assert_eq!(ts1.len(), 1);
    assert!(ts1[0].source.path.ends_with("modules/a/timeseries/flow.TimeSeries.yaml"));

    let duplicated: Vec<&ToolkitWarning> = built
        .warnings
        .iter()
        .filter(|w| matches!(w, ToolkitWarning::DuplicatedItem { .. }))
        .collect();
    assert_eq!(duplicated.len(), 1);
    assert_eq!(built.get("b").unwrap().resource_count(), 0);
}

#[test_log::test]
fn test_flow_style_view_version_matches_definition() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(
        &org,
        "modules/dm/data_models/valve.View.yaml",
        "space: sp\nexternalId: Valve\nversion: 1.10 # bumped for the new properties\n",
    );
    write(
        &org,
        "modules/dm/transformations/t.Transformation.yaml",
        concat!(
            "externalId: t\nname: T\ndestination:\n  type: nodes\n",
            "  view: {space: sp, externalId: Valve, version: 1.10}\n",
        ),
    );
    write(&org, "config.dev.yaml", &config(&["dm"], "  modules: {}\n"));
    let build_dir = temp_dir.path().join("build");

    let built = build(&org, &build_dir);

    let view = built
        .iter()
        .flat_map(|module| module.resources.values().flatten())
        .find(|resource| resource.loader == LoaderKind::View)
        .unwrap();
    assert_eq!(view.identifier.to_string(), "sp:Valve(version=1.10)");
    let missing = missing_dependencies(&built);
    let missing_views: Vec<&&ToolkitWarning> = missing
        .iter()
        .filter(|w| matches!(w, ToolkitWarning::MissingDependency { kind: LoaderKind::View, .. }))
        .collect();
    assert!(missing_views.is_empty(), "{:?}", built.warnings);
}

#[derive(Clone, Default)]
struct RecordingConsole {
    messages: Rc<RefCell<Vec<String>>>,
}

impl Console for RecordingConsole {
    fn warn_group(&self, _source: Option<&Path>, _warnings: &[&ToolkitWarning]) {}

    fn info(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

#[test_log::test]
fn test_misplaced_variable_hint_is_shown_once() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(
        &org,
        "modules/a/timeseries/a.TimeSeries.yaml",
        "externalId: ts_a\nname: \"{{site}} a\"\n",
    );
    write(
        &org,
        "modules/b/timeseries/b.TimeSeries.yaml",
        "externalId: ts_b\nname: \"{{site}} b\"\n",
    );
    write(
        &org,
        "modules/c/timeseries/c.TimeSeries.yaml",
        "externalId: ts_c\nname: \"{{site}} c\"\n",
    );
    write(
        &org,
        "config.dev.yaml",
        &config(&["a", "b", "c"], "  modules:\n    a:\n      site: oslo\n"),
    );
    let build_dir = temp_dir.path().join("build");
    let console = RecordingConsole::default();

    let built = BuildCommand::new()
        .with_console(Box::new(console.clone()))
        .execute(&org, &build_dir, "dev", true)
        .unwrap();

    let unresolved = built
        .warnings
        .iter()
        .filter(|w| matches!(w, ToolkitWarning::UnresolvedVariable { .. }))
        .count();
    assert_eq!(unresolved, 2);
    let messages = console.messages.borrow();
    let hints: Vec<&String> =
        messages.iter().filter(|message| message.starts_with("Hint:")).collect();
    assert_eq!(hints.len(), 1, "{messages:?}");
    assert!(hints[0].contains("'site'"));
    assert!(hints[0].contains("module 'b'"));
}

#[test_log::test]
fn test_custom_registry_limits_resource_folders() {
    let temp_dir = TempDir::new().unwrap();
    let org = temp_dir.path().join("org");
    write(&org, "modules/m/timeseries/ts.TimeSeries.yaml", "externalId: ts\n");
    write(&org, "modules/m/assets/pump.Asset.yaml", "externalId: pump\nname: Pump\n");
    write(&org, "config.dev.yaml", &config(&["m"], "  modules: {}\n"));
    let build_dir = temp_dir.path().join("build");
    let mut registry = LoaderRegistry::new();
    registry.register(Box::new(TimeSeriesLoader));

    let built = quiet().with_registry(registry).execute(&org, &build_dir, "dev", true).unwrap();

    let module = built.get("m").unwrap();
    assert_eq!(module.resource_count(), 1);
    assert!(!build_dir.join("assets").exists());
    let unknown_folders: Vec<&ToolkitWarning> = built
        .warnings
        .iter()
        .filter(|w| matches!(w, ToolkitWarning::UnknownResourceFolder { .. }))
        .collect();
    assert_eq!(unknown_folders.len(), 1);
    assert!(unknown_folders[0].to_string().contains("assets"));
}
