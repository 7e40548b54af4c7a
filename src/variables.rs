//! Variable scoping and `{{key}}` substitution.
//!
//! Variables come from the `variables` tree of the environment config. A mapping whose key
//! path names a directory of the module tree is a scope; anything else is a variable.
//! A list of mappings at a module path turns that module into a template built once per
//! entry (an iteration).

use crate::modules::ModuleLocation;
use crate::warning::{ToolkitWarning, WarningList};
use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde_yaml::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// `{{ key }}` with the quote characters directly around it, if any.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(['"]?)\{\{\s*([^{}\s]+)\s*\}\}(['"]?)"#).expect("token pattern is valid")
});

/// Config values such as `<change_me>` that still need filling in.
static TEMPLATE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<.*>$").expect("marker pattern is valid"));

/// One variable definition.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildVariable {
    pub key: String,
    pub value: Value,
    /// Path segments of the scope that defines the variable, e.g. `["modules", "my_module"]`
    pub location: Vec<String>,
    /// 1-based iteration the definition belongs to, when the scope is a list
    pub iteration: Option<usize>,
}

impl BuildVariable {
    pub fn location_display(&self) -> String {
        if self.location.is_empty() {
            "<root>".to_string()
        } else {
            self.location.join("/")
        }
    }

    fn is_visible_from(&self, segments: &[String]) -> bool {
        segments.starts_with(&self.location)
    }
}

/// An ordered set of variable definitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildVariables(Vec<BuildVariable>);

impl BuildVariables {
    pub fn new(variables: Vec<BuildVariable>) -> Self {
        Self(variables)
    }

    /// Flattens the raw `variables` section of a config file.
    ///
    /// `modules` are the discovered modules; every directory on the path to a module is a
    /// scope, so `modules/sub/my_module` makes `modules`, `modules/sub` and the module itself
    /// scopes.
    pub fn load_raw<'a, I>(raw: &Value, modules: I) -> Self
    where
        I: IntoIterator<Item = &'a ModuleLocation>,
    {
        let mut scopes: BTreeSet<Vec<String>> = BTreeSet::new();
        for module in modules {
            let segments = module.path_segments();
            for depth in 1..=segments.len() {
                scopes.insert(segments[..depth].to_vec());
            }
        }
        let mut variables = Vec::new();
        if let Value::Mapping(mapping) = raw {
            collect(mapping, &[], None, &scopes, &mut variables);
        }
        Self(variables)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BuildVariable> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|variable| variable.key == key).map(|variable| &variable.value)
    }

    /// Variables visible to a module, one set per iteration.
    ///
    /// A definition deeper in the module tree shadows a shallower one with the same key,
    /// and within one scope an iteration value shadows a shared one.
    pub fn get_module_variables(&self, module: &ModuleLocation) -> Vec<BuildVariables> {
        let segments = module.path_segments();
        let visible: Vec<&BuildVariable> =
            self.0.iter().filter(|variable| variable.is_visible_from(&segments)).collect();

        let iterations: BTreeSet<usize> =
            visible.iter().filter_map(|variable| variable.iteration).collect();
        if iterations.is_empty() {
            return vec![resolve(visible.iter().copied())];
        }
        iterations
            .into_iter()
            .map(|iteration| {
                resolve(
                    visible
                        .iter()
                        .copied()
                        .filter(|variable| variable.iteration.map_or(true, |i| i == iteration)),
                )
            })
            .collect()
    }

    /// Module scopes defining each key, used to hint at misplaced variables.
    pub fn key_locations(&self) -> IndexMap<String, Vec<String>> {
        let mut locations: IndexMap<String, Vec<String>> = IndexMap::new();
        for variable in &self.0 {
            let entry = locations.entry(variable.key.clone()).or_default();
            let location = variable.location_display();
            if !entry.contains(&location) {
                entry.push(location);
            }
        }
        locations
    }

    /// Warns about values that are still `<...>` placeholders.
    pub fn template_markers(&self) -> WarningList {
        self.0
            .iter()
            .filter_map(|variable| match &variable.value {
                Value::String(value) if TEMPLATE_MARKER.is_match(value) => {
                    Some(ToolkitWarning::TemplateMarker {
                        variable: variable.key.clone(),
                        value: value.clone(),
                        location: variable.location_display(),
                    })
                }
                _ => None,
            })
            .collect()
    }

    /// Replaces every `{{key}}` token with a defined, non-null value.
    ///
    /// `file_suffix` is the extension of the file the content comes from. For `yaml`, `yml`
    /// and `json` a quoted token whose value is not a string loses its quotes so the value
    /// keeps its type.
    pub fn replace(&self, content: &str, file_suffix: &str) -> String {
        let is_data_file = matches!(file_suffix, "yaml" | "yml" | "json");
        TOKEN
            .replace_all(content, |caps: &Captures| {
                let (open, key, close) = (&caps[1], &caps[2], &caps[3]);
                let Some(value) = self.get(key) else {
                    return caps[0].to_string();
                };
                let Some(rendered) = render(value) else {
                    return caps[0].to_string();
                };
                let quoted = !open.is_empty() && open == close;
                if quoted && is_data_file && !is_string(value) {
                    rendered
                } else {
                    format!("{open}{rendered}{close}")
                }
            })
            .into_owned()
    }
}

impl<'a> IntoIterator for &'a BuildVariables {
    type Item = &'a BuildVariable;
    type IntoIter = std::slice::Iter<'a, BuildVariable>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Keys of every `{{...}}` token in `content`, in first-seen order.
pub fn unresolved_tokens(content: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for caps in TOKEN.captures_iter(content) {
        let key = &caps[2];
        if !keys.iter().any(|seen| seen == key) {
            keys.push(key.to_string());
        }
    }
    keys
}

fn collect(
    mapping: &serde_yaml::Mapping,
    path: &[String],
    iteration: Option<usize>,
    scopes: &BTreeSet<Vec<String>>,
    out: &mut Vec<BuildVariable>,
) {
    for (key, value) in mapping {
        let Some(key) = key_string(key) else {
            continue;
        };
        let mut child = path.to_vec();
        child.push(key.clone());
        if !scopes.contains(&child) {
            out.push(BuildVariable {
                key,
                value: value.clone(),
                location: path.to_vec(),
                iteration,
            });
            continue;
        }
        match value {
            Value::Mapping(inner) => collect(inner, &child, iteration, scopes, out),
            Value::Sequence(entries) => {
                for (index, entry) in entries.iter().enumerate() {
                    if let Value::Mapping(inner) = entry {
                        collect(inner, &child, Some(index + 1), scopes, out);
                    }
                }
            }
            _ => out.push(BuildVariable {
                key,
                value: value.clone(),
                location: path.to_vec(),
                iteration,
            }),
        }
    }
}

fn key_string(key: &Value) -> Option<String> {
    match key {
        Value::String(key) => Some(key.clone()),
        Value::Number(key) => Some(key.to_string()),
        Value::Bool(key) => Some(key.to_string()),
        _ => None,
    }
}

fn resolve<'a>(variables: impl Iterator<Item = &'a BuildVariable>) -> BuildVariables {
    let mut ordered: Vec<&BuildVariable> = variables.collect();
    // Stable sort: later entries win, so the most specific definition ends up last.
    ordered.sort_by_key(|variable| (variable.location.len(), variable.iteration.is_some()));
    let mut resolved: IndexMap<&str, &BuildVariable> = IndexMap::new();
    for variable in ordered {
        resolved.insert(&variable.key, variable);
    }
    BuildVariables(resolved.into_values().cloned().collect())
}

fn is_string(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Tagged(tagged) => is_string(&tagged.value),
        _ => false,
    }
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        Value::Sequence(_) | Value::Mapping(_) => serde_json::to_string(value).ok(),
        Value::Tagged(tagged) => render(&tagged.value),
    }
}
