use cdf_build::ignore::parse_ignore_file;
use cdf_build::loader::LoaderRegistry;
use cdf_build::modules::{ModuleDirectories, ModuleLocation};
use cdf_build::variables::{unresolved_tokens, BuildVariables};
use serde_yaml::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const VARIABLES: &str = r#"
modules:
  shared: root_value
  site: default_site
  sub:
    site: sub_site
    pumps:
      prefix: pump
  templated:
    - site: oslo
    - site: bergen
"#;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup() -> (TempDir, ModuleDirectories, BuildVariables) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "modules/sub/pumps/assets/a.yaml", "externalId: a\n");
    write(root, "modules/sub/valves/assets/b.yaml", "externalId: b\n");
    write(root, "modules/templated/timeseries/t.yaml", "externalId: t\n");
    write(root, "modules/plain/timeseries/p.yaml", "externalId: p\n");
    let ignore = parse_ignore_file(root).unwrap();
    let modules = ModuleDirectories::load(root, &LoaderRegistry::standard(), &ignore).unwrap();
    let raw: Value = serde_yaml::from_str(VARIABLES).unwrap();
    let variables = BuildVariables::load_raw(&raw, modules.iter());
    (temp_dir, modules, variables)
}

fn module<'a>(modules: &'a ModuleDirectories, name: &str) -> &'a ModuleLocation {
    modules.iter().find(|m| m.name == name).unwrap()
}

fn string(variables: &BuildVariables, key: &str) -> Option<String> {
    variables.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

#[test]
fn test_deeper_definition_shadows_shared_one() {
    let (_temp_dir, modules, variables) = setup();

    let pumps = variables.get_module_variables(module(&modules, "pumps"));
    assert_eq!(pumps.len(), 1);
    assert_eq!(string(&pumps[0], "site").as_deref(), Some("sub_site"));
    assert_eq!(string(&pumps[0], "prefix").as_deref(), Some("pump"));
    assert_eq!(string(&pumps[0], "shared").as_deref(), Some("root_value"));

    let plain = variables.get_module_variables(module(&modules, "plain"));
    assert_eq!(string(&plain[0], "site").as_deref(), Some("default_site"));
    assert!(plain[0].get("prefix").is_none());
}

#[test]
fn test_sibling_variables_are_not_visible() {
    let (_temp_dir, modules, variables) = setup();

    let valves = variables.get_module_variables(module(&modules, "valves"));
    assert!(valves[0].get("prefix").is_none());
    let content = valves[0].replace("name: {{prefix}}_valve", "yaml");
    assert_eq!(unresolved_tokens(&content), vec!["prefix".to_string()]);

    // The key is still known, so the build can hint where it lives.
    let locations = variables.key_locations();
    assert_eq!(locations["prefix"], vec!["modules/sub/pumps".to_string()]);
}

#[test]
fn test_list_of_mappings_creates_iterations() {
    let (_temp_dir, modules, variables) = setup();

    let iterations = variables.get_module_variables(module(&modules, "templated"));
    assert_eq!(iterations.len(), 2);
    assert_eq!(string(&iterations[0], "site").as_deref(), Some("oslo"));
    assert_eq!(string(&iterations[1], "site").as_deref(), Some("bergen"));
    assert_eq!(string(&iterations[1], "shared").as_deref(), Some("root_value"));
}

#[test]
fn test_variables_outside_modules_are_global() {
    let (_temp_dir, modules, _) = setup();
    let raw: Value =
        serde_yaml::from_str("env_name: dev\nmodules:\n  env_name: modules_dev\n").unwrap();
    let variables = BuildVariables::load_raw(&raw, modules.iter());

    let plain = variables.get_module_variables(module(&modules, "plain"));
    assert_eq!(string(&plain[0], "env_name").as_deref(), Some("modules_dev"));
}

#[test]
fn test_substituting_resolved_content_is_a_no_op() {
    let (_temp_dir, modules, variables) = setup();
    let pumps = &variables.get_module_variables(module(&modules, "pumps"))[0];

    let resolved = pumps.replace("externalId: '{{prefix}}_{{site}}'\n", "yaml");
    assert_eq!(resolved, "externalId: 'pump_sub_site'\n");
    assert!(unresolved_tokens(&resolved).is_empty());
    assert_eq!(pumps.replace(&resolved, "yaml"), resolved);
}
