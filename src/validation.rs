//! Structural validation of parsed resource items.
//!
//! A [`ParameterSpec`] lists the parameters a resource type accepts, their JSON types and
//! whether they are required. Validation never fails: it returns the mismatches so the
//! builder can report them as warnings.

use jsonschema::error::ValidationErrorKind;
use jsonschema::paths::{Location, LocationSegment};
use jsonschema::Validator;
use log::warn;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::OnceLock;

/// JSON type expected at a parameter path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParameterType {
    /// JSON Schema `type` keyword, `None` for [`ParameterType::Any`].
    fn json_type(self) -> Option<&'static str> {
        match self {
            ParameterType::Any => None,
            ParameterType::String => Some("string"),
            ParameterType::Integer => Some("integer"),
            ParameterType::Number => Some("number"),
            ParameterType::Boolean => Some("boolean"),
            ParameterType::Object => Some("object"),
            ParameterType::Array => Some("array"),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Object => "object",
            ParameterType::Array => "array",
            ParameterType::Any => "any",
        };
        write!(f, "{name}")
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One segment of a path into an item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldSegment {
    Key(String),
    Index(usize),
}

/// Path to a field inside an item, rendered as `capabilities[0].datasetScope`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FieldPath(Vec<FieldSegment>);

impl FieldPath {
    fn child(&self, segment: FieldSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.0.iter().enumerate() {
            match segment {
                FieldSegment::Key(key) if position == 0 => write!(f, "{key}")?,
                FieldSegment::Key(key) => write!(f, ".{key}")?,
                FieldSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// What is wrong at one field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterProblem {
    Unknown,
    WrongType { expected: ParameterType, actual: &'static str },
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterIssue {
    pub field: FieldPath,
    pub problem: ParameterProblem,
}

impl fmt::Display for ParameterIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            ParameterProblem::Unknown => write!(f, "unknown parameter '{}'", self.field),
            ParameterProblem::WrongType { expected, actual } => {
                write!(f, "parameter '{}' should be {expected}, got {actual}", self.field)
            }
            ParameterProblem::Missing => {
                write!(f, "required parameter '{}' is missing", self.field)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Parameter {
    path: Vec<String>,
    ty: ParameterType,
    required: bool,
}

impl Parameter {
    /// `*` matches any key or list element.
    fn matches(&self, path: &[FieldSegment]) -> bool {
        self.path.len() == path.len()
            && self.path.iter().zip(path).all(|(pattern, segment)| match segment {
                _ if pattern == "*" => true,
                FieldSegment::Key(key) => pattern == key,
                FieldSegment::Index(_) => false,
            })
    }
}

/// Parameters accepted by one resource type.
///
/// The parameters are compiled into a JSON Schema on first use. Every parameter also accepts
/// `null`, which stands for "not set".
#[derive(Debug, Clone, Default)]
pub struct ParameterSpec {
    parameters: Vec<Parameter>,
    validator: OnceLock<Option<Validator>>,
}

impl ParameterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required parameter at a dotted path such as `metadata.*`.
    pub fn required(mut self, path: &str, ty: ParameterType) -> Self {
        self.parameters.push(Parameter { path: split_path(path), ty, required: true });
        self
    }

    pub fn optional(mut self, path: &str, ty: ParameterType) -> Self {
        self.parameters.push(Parameter { path: split_path(path), ty, required: false });
        self
    }

    /// The JSON Schema these parameters compile to.
    pub fn schema(&self) -> Value {
        self.node_schema(&[], None)
    }

    /// Checks an item against these parameters and returns every mismatch, ordered by field.
    pub fn validate(&self, item: &Value) -> Vec<ParameterIssue> {
        let Some(validator) = self.validator() else {
            return Vec::new();
        };
        let mut issues = Vec::new();
        for error in validator.iter_errors(item) {
            let field = field_path(error.instance_path());
            match error.kind() {
                ValidationErrorKind::AdditionalProperties { unexpected } => {
                    issues.extend(unexpected.iter().map(|key| ParameterIssue {
                        field: field.child(FieldSegment::Key(key.clone())),
                        problem: ParameterProblem::Unknown,
                    }));
                }
                ValidationErrorKind::FalseSchema => {
                    issues.push(ParameterIssue { field, problem: ParameterProblem::Unknown });
                }
                ValidationErrorKind::Required { property } => {
                    let Some(name) = property.as_str() else { continue };
                    issues.push(ParameterIssue {
                        field: field.child(FieldSegment::Key(name.to_string())),
                        problem: ParameterProblem::Missing,
                    });
                }
                ValidationErrorKind::Type { .. } => {
                    let expected = self
                        .parameters
                        .iter()
                        .find(|parameter| parameter.matches(&field.0))
                        .map_or(ParameterType::Any, |parameter| parameter.ty);
                    let actual = json_type_name(error.instance());
                    issues.push(ParameterIssue {
                        field,
                        problem: ParameterProblem::WrongType { expected, actual },
                    });
                }
                _ => {}
            }
        }
        issues.sort_by(|left, right| left.field.cmp(&right.field));
        issues
    }

    fn validator(&self) -> Option<&Validator> {
        self.validator
            .get_or_init(|| match jsonschema::validator_for(&self.schema()) {
                Ok(validator) => Some(validator),
                Err(error) => {
                    warn!("Parameter schema does not compile: {error}");
                    None
                }
            })
            .as_ref()
    }

    fn node_schema(&self, prefix: &[String], ty: Option<ParameterType>) -> Value {
        let mut schema = Map::new();
        if let Some(name) = ty.and_then(|ty| ty.json_type()) {
            schema.insert("type".to_string(), json!([name, "null"]));
        }
        let children: Vec<&Parameter> = self
            .parameters
            .iter()
            .filter(|p| p.path.len() == prefix.len() + 1 && p.path.starts_with(prefix))
            .collect();
        if children.is_empty() {
            return Value::Object(schema);
        }

        let mut properties = Map::new();
        let mut required = Vec::new();
        let mut wildcard = None;
        for child in children {
            let child_schema = self.node_schema(&child.path, Some(child.ty));
            match child.path.last().map(String::as_str) {
                Some("*") => wildcard = Some(child_schema),
                Some(name) => {
                    if child.required {
                        required.push(Value::String(name.to_string()));
                    }
                    properties.insert(name.to_string(), child_schema);
                }
                None => {}
            }
        }
        let takes_keys = matches!(ty, None | Some(ParameterType::Object | ParameterType::Any));
        let takes_items = matches!(ty, Some(ParameterType::Array))
            || (ty == Some(ParameterType::Any) && wildcard.is_some());
        if takes_items {
            schema.insert("items".to_string(), wildcard.clone().unwrap_or(Value::Bool(false)));
        }
        if takes_keys {
            schema.insert("properties".to_string(), Value::Object(properties));
            if !required.is_empty() {
                schema.insert("required".to_string(), Value::Array(required));
            }
            schema.insert(
                "additionalProperties".to_string(),
                wildcard.unwrap_or(Value::Bool(false)),
            );
        }
        Value::Object(schema)
    }
}

fn field_path(location: &Location) -> FieldPath {
    FieldPath(
        location
            .iter()
            .map(|segment| match segment {
                LocationSegment::Property(key) => FieldSegment::Key(key.into_owned()),
                LocationSegment::Index(index) => FieldSegment::Index(index),
            })
            .collect(),
    )
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}
