//! Structured warnings collected during a build.
//!
//! Warnings never abort a build. Every operation returns the warnings it produced and the
//! orchestrator composes them into one ordered list for the whole invocation.

use crate::loader::{Identifier, LoaderKind};
use crate::validation::ParameterIssue;
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolkitWarning {
    /// `{{...}}` tokens left after substitution
    UnresolvedVariable { source: PathBuf, variables: Vec<String> },
    /// The same identifier defined in two different source files
    DuplicatedItem {
        source: PathBuf,
        kind: LoaderKind,
        identifier: Identifier,
        first_seen: PathBuf,
    },
    /// Iterations of one module produce the same identifier from the same file
    DuplicatedAcrossIterations { module: String, source: PathBuf, identifier: Identifier },
    MissingRequiredIdentifier { source: PathBuf, element: Option<usize>, message: String },
    UnknownResourceType { source: PathBuf, folder: String },
    UnknownResourceFolder { module: String, module_dir: PathBuf, folders: Vec<String> },
    ParameterMismatch {
        source: PathBuf,
        element: Option<usize>,
        kind: LoaderKind,
        issue: ParameterIssue,
    },
    MissingDataSet { source: PathBuf, element: Option<usize>, kind: LoaderKind },
    MissingDependency {
        kind: LoaderKind,
        identifier: Identifier,
        required_by: Vec<(Identifier, PathBuf)>,
    },
    DevOnlyModule { module: String, validation_type: String },
    BuildDirectoryNotEmpty { build_dir: PathBuf },
    /// A config variable still holds a `<...>` placeholder
    TemplateMarker { variable: String, value: String, location: String },
    Advisory { source: Option<PathBuf>, severity: Severity, message: String },
}

fn element(element: &Option<usize>) -> String {
    element.map(|index| format!(" in element {index}")).unwrap_or_default()
}

impl ToolkitWarning {
    /// The file the warning is about, used to group warnings when printing.
    pub fn source(&self) -> Option<&Path> {
        match self {
            ToolkitWarning::UnresolvedVariable { source, .. }
            | ToolkitWarning::DuplicatedItem { source, .. }
            | ToolkitWarning::DuplicatedAcrossIterations { source, .. }
            | ToolkitWarning::MissingRequiredIdentifier { source, .. }
            | ToolkitWarning::UnknownResourceType { source, .. }
            | ToolkitWarning::ParameterMismatch { source, .. }
            | ToolkitWarning::MissingDataSet { source, .. } => Some(source),
            ToolkitWarning::UnknownResourceFolder { module_dir, .. } => Some(module_dir),
            ToolkitWarning::Advisory { source, .. } => source.as_deref(),
            ToolkitWarning::MissingDependency { .. }
            | ToolkitWarning::DevOnlyModule { .. }
            | ToolkitWarning::BuildDirectoryNotEmpty { .. }
            | ToolkitWarning::TemplateMarker { .. } => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ToolkitWarning::UnresolvedVariable { .. }
            | ToolkitWarning::DuplicatedItem { .. }
            | ToolkitWarning::DuplicatedAcrossIterations { .. }
            | ToolkitWarning::MissingRequiredIdentifier { .. }
            | ToolkitWarning::MissingDependency { .. } => Severity::High,
            ToolkitWarning::UnknownResourceType { .. }
            | ToolkitWarning::UnknownResourceFolder { .. }
            | ToolkitWarning::ParameterMismatch { .. }
            | ToolkitWarning::MissingDataSet { .. }
            | ToolkitWarning::TemplateMarker { .. } => Severity::Medium,
            ToolkitWarning::DevOnlyModule { .. }
            | ToolkitWarning::BuildDirectoryNotEmpty { .. } => Severity::Low,
            ToolkitWarning::Advisory { severity, .. } => *severity,
        }
    }
}

impl fmt::Display for ToolkitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolkitWarning::UnresolvedVariable { variables, .. } => write!(
                f,
                "Variables {} are not replaced. \
                 Check that they are defined in the config file for this module.",
                variables.iter().map(|v| format!("'{{{{{v}}}}}'")).collect::<Vec<_>>().join(", ")
            ),
            ToolkitWarning::DuplicatedItem { kind, identifier, first_seen, .. } => write!(
                f,
                "Duplicated {kind} '{identifier}', it is already defined in '{}'.",
                first_seen.display()
            ),
            ToolkitWarning::DuplicatedAcrossIterations { module, identifier, .. } => write!(
                f,
                "Module '{module}' produces '{identifier}' in more than one iteration. \
                 Use an iteration specific variable in the identifier."
            ),
            ToolkitWarning::MissingRequiredIdentifier { element: index, message, .. } => {
                write!(f, "{message}{}.", element(index))
            }
            ToolkitWarning::UnknownResourceType { folder, .. } => write!(
                f,
                "Unsupported resource type in folder '{folder}', the file is not validated."
            ),
            ToolkitWarning::UnknownResourceFolder { module, folders, .. } => write!(
                f,
                "Module '{module}' has unrecognized folder(s) {}, they are skipped.",
                folders.join(", ")
            ),
            ToolkitWarning::ParameterMismatch { element: index, kind, issue, .. } => {
                write!(f, "{kind}: {issue}{}.", element(index))
            }
            ToolkitWarning::MissingDataSet { element: index, kind, .. } => {
                write!(
                    f,
                    "{kind} has no 'dataSetExternalId'{}, it is recommended to set one.",
                    element(index)
                )
            }
            ToolkitWarning::MissingDependency { kind, identifier, required_by } => {
                let required_by: Vec<String> = required_by
                    .iter()
                    .map(|(id, path)| format!("'{id}' in '{}'", path.display()))
                    .collect();
                write!(
                    f,
                    "The {kind} '{identifier}' is not defined in any module and does not exist. \
                     It is required by {}.",
                    required_by.join(", ")
                )
            }
            ToolkitWarning::DevOnlyModule { module, validation_type } => write!(
                f,
                "Module '{module}' is meant for development only, \
                 but the environment validation type is '{validation_type}'."
            ),
            ToolkitWarning::BuildDirectoryNotEmpty { build_dir } => write!(
                f,
                "Build directory '{}' is not empty. Existing files may be mixed with this build.",
                build_dir.display()
            ),
            ToolkitWarning::TemplateMarker { variable, value, location } => write!(
                f,
                "Variable '{variable}' in '{location}' still has the template value '{value}'."
            ),
            ToolkitWarning::Advisory { message, .. } => write!(f, "{message}"),
        }
    }
}

/// Ordered, append-only list of warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarningList(Vec<ToolkitWarning>);

impl WarningList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: ToolkitWarning) {
        self.0.push(warning);
    }

    pub fn extend(&mut self, other: WarningList) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ToolkitWarning> {
        self.0.iter()
    }

    /// Warnings grouped by the file they refer to, in first-seen order.
    pub fn group_by_source(&self) -> IndexMap<Option<&Path>, Vec<&ToolkitWarning>> {
        let mut groups: IndexMap<Option<&Path>, Vec<&ToolkitWarning>> = IndexMap::new();
        for warning in &self.0 {
            groups.entry(warning.source()).or_default().push(warning);
        }
        groups
    }
}

impl FromIterator<ToolkitWarning> for WarningList {
    fn from_iter<I: IntoIterator<Item = ToolkitWarning>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for WarningList {
    type Item = ToolkitWarning;
    type IntoIter = std::vec::IntoIter<ToolkitWarning>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a WarningList {
    type Item = &'a ToolkitWarning;
    type IntoIter = std::slice::Iter<'a, ToolkitWarning>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_source_keeps_order() {
        let mut warnings = WarningList::new();
        warnings.push(ToolkitWarning::UnknownResourceType {
            source: PathBuf::from("b.yaml"),
            folder: "x".to_string(),
        });
        warnings.push(ToolkitWarning::BuildDirectoryNotEmpty { build_dir: PathBuf::from("build") });
        warnings.push(ToolkitWarning::UnresolvedVariable {
            source: PathBuf::from("b.yaml"),
            variables: vec!["v".to_string()],
        });
        let groups = warnings.group_by_source();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups.get_index(1).map(|(source, _)| *source), Some(None));
    }

    #[test]
    fn test_unresolved_variable_message() {
        let warning = ToolkitWarning::UnresolvedVariable {
            source: PathBuf::from("a.yaml"),
            variables: vec!["ts_prefix".to_string()],
        };
        assert!(warning.to_string().starts_with("Variables '{{ts_prefix}}' are not replaced."));
        assert_eq!(warning.severity(), Severity::High);
    }
}
