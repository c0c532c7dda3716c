//! Descriptor compilation and value validation
//!
//! Mapping from descriptor to schema:
//! - missing type → any, optional
//! - one-element sequence → array of that element; longer → positional
//! - primitive tag → that primitive; `required` clears the optional flag
//! - object literal → object with field-wise recursion
//! - explicit rule → its type plus constraints and custom predicates
//!
//! Validation never stops at the first failure: every issue is
//! collected with its property path.

use std::sync::OnceLock;

use chrono::DateTime;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::store::values_equal;

use super::errors::{Reason, SchemaError, SchemaResult, ValidationIssue, ValidationReport};
use super::types::{CustomRule, Format, Primitive, Rule, TypeDescriptor};

/// Shape part of a compiled schema
#[derive(Debug, Clone)]
pub enum SchemaKind {
    Any,
    Primitive(Primitive),
    ArrayOf(Box<Schema>),
    Tuple(Vec<Schema>),
    /// `partial` objects skip absent properties instead of reporting them
    Object {
        properties: Vec<(String, Schema)>,
        partial: bool,
    },
    AnyOf(Vec<Schema>),
    AllOf(Vec<Schema>),
}

/// Value constraints checked once the type matches
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub equal: Option<Value>,
    pub not_equal: Option<Value>,
    pub one_of: Option<Vec<Value>>,
    pub pattern: Option<Regex>,
    pub format: Option<Format>,
    pub custom: Vec<CustomRule>,
}

/// Runtime schema
#[derive(Debug, Clone)]
pub struct Schema {
    pub kind: SchemaKind,
    pub optional: bool,
    pub constraints: Constraints,
}

impl Schema {
    fn of(kind: SchemaKind, optional: bool) -> Self {
        Self {
            kind,
            optional,
            constraints: Constraints::default(),
        }
    }

    /// Anything, including absence
    pub fn any() -> Self {
        Self::of(SchemaKind::Any, true)
    }

    pub fn object(properties: Vec<(String, Schema)>) -> Self {
        Self::of(
            SchemaKind::Object {
                properties,
                partial: false,
            },
            false,
        )
    }

    /// Object schema for patches: absent properties are fine
    pub fn partial_object(properties: Vec<(String, Schema)>) -> Self {
        Self::of(
            SchemaKind::Object {
                properties,
                partial: true,
            },
            false,
        )
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            SchemaKind::Any => "any",
            SchemaKind::Primitive(p) => p.type_name(),
            SchemaKind::ArrayOf(_) | SchemaKind::Tuple(_) => "array",
            SchemaKind::Object { .. } => "object",
            SchemaKind::AnyOf(_) => "anyOf",
            SchemaKind::AllOf(_) => "allOf",
        }
    }

    /// Property schema by name, for object schemas
    pub fn property(&self, name: &str) -> Option<&Schema> {
        match &self.kind {
            SchemaKind::Object { properties, .. } => {
                properties.iter().find(|(k, _)| k == name).map(|(_, s)| s)
            }
            _ => None,
        }
    }
}

/// Compiles descriptors and validates values against compiled schemas
pub struct Validator;

impl Validator {
    /// Compile a descriptor. `required` applies to the root.
    pub fn compile(descriptor: &TypeDescriptor, required: bool) -> SchemaResult<Schema> {
        compile_at(descriptor, required, "")
    }

    /// Validate a value; the root is reported as `$root`
    pub fn validate(schema: &Schema, value: &Value) -> ValidationReport {
        Self::validate_at(schema, value, "")
    }

    /// Validate a value whose paths should be reported under `path`
    pub fn validate_at(schema: &Schema, value: &Value, path: &str) -> ValidationReport {
        let mut issues = Vec::new();
        check(schema, Some(value), path, &mut issues);
        ValidationReport::from_issues(issues)
    }

    /// Compile and validate in one go
    pub fn check(descriptor: &TypeDescriptor, required: bool, value: &Value) -> SchemaResult<ValidationReport> {
        let schema = Self::compile(descriptor, required)?;
        Ok(Self::validate(&schema, value))
    }
}

fn compile_at(descriptor: &TypeDescriptor, required: bool, path: &str) -> SchemaResult<Schema> {
    let optional = !required;
    let schema = match descriptor {
        TypeDescriptor::Missing => Schema::any(),
        TypeDescriptor::Primitive(Primitive::Any) => Schema::of(SchemaKind::Any, optional),
        TypeDescriptor::Primitive(p) => Schema::of(SchemaKind::Primitive(*p), optional),
        TypeDescriptor::Sequence(items) => {
            let kind = match items.as_slice() {
                [] => SchemaKind::ArrayOf(Box::new(Schema::any())),
                [single] => SchemaKind::ArrayOf(Box::new(compile_at(single, true, &index_path(path, 0))?)),
                many => SchemaKind::Tuple(
                    many.iter()
                        .enumerate()
                        .map(|(i, d)| compile_at(d, true, &index_path(path, i)))
                        .collect::<SchemaResult<_>>()?,
                ),
            };
            Schema::of(kind, optional)
        }
        TypeDescriptor::Object(fields) => Schema::of(
            SchemaKind::Object {
                properties: compile_fields(fields, path)?,
                partial: false,
            },
            optional,
        ),
        TypeDescriptor::Rule(rule) => compile_rule(rule, required, path)?,
        TypeDescriptor::AnyOf(alts) => Schema::of(SchemaKind::AnyOf(compile_all(alts, required, path)?), optional),
        TypeDescriptor::AllOf(alts) => Schema::of(SchemaKind::AllOf(compile_all(alts, required, path)?), optional),
    };
    Ok(schema)
}

fn compile_fields(fields: &[(String, TypeDescriptor)], path: &str) -> SchemaResult<Vec<(String, Schema)>> {
    fields
        .iter()
        .map(|(name, d)| Ok((name.clone(), compile_at(d, false, &join_path(path, name))?)))
        .collect()
}

fn compile_all(alts: &[TypeDescriptor], required: bool, path: &str) -> SchemaResult<Vec<Schema>> {
    alts.iter().map(|d| compile_at(d, required, path)).collect()
}

fn compile_rule(rule: &Rule, required: bool, path: &str) -> SchemaResult<Schema> {
    let field = display_path(path).to_string();

    let kind = if let Some(properties) = &rule.properties {
        SchemaKind::Object {
            properties: compile_fields(properties, path)?,
            partial: false,
        }
    } else if let Some(items) = &rule.items {
        SchemaKind::ArrayOf(Box::new(compile_at(items, true, &index_path(path, 0))?))
    } else {
        match rule.kind {
            None | Some(Primitive::Any) => SchemaKind::Any,
            Some(p) => SchemaKind::Primitive(p),
        }
    };

    if let (Some(min), Some(max)) = (rule.min_length, rule.max_length) {
        if min > max {
            return Err(SchemaError::InvalidRule {
                field,
                reason: format!("min_length {} exceeds max_length {}", min, max),
            });
        }
    }
    if let (Some(min), Some(max)) = (rule.min, rule.max) {
        if min > max {
            return Err(SchemaError::InvalidRule {
                field,
                reason: format!("min {} exceeds max {}", min, max),
            });
        }
    }

    let pattern = match &rule.pattern {
        Some(p) => Some(Regex::new(p).map_err(|e| SchemaError::InvalidPattern {
            field: field.clone(),
            pattern: p.clone(),
            reason: e.to_string(),
        })?),
        None => None,
    };

    Ok(Schema {
        kind,
        optional: !(required || rule.required),
        constraints: Constraints {
            min_length: rule.min_length,
            max_length: rule.max_length,
            length: rule.length,
            min: rule.min,
            max: rule.max,
            equal: rule.equal.clone(),
            not_equal: rule.not_equal.clone(),
            one_of: rule.one_of.clone(),
            pattern,
            format: rule.format,
            custom: rule.custom.clone(),
        },
    })
}

fn check(schema: &Schema, value: Option<&Value>, path: &str, issues: &mut Vec<ValidationIssue>) {
    let field = display_path(path);

    let value = match value {
        None | Some(Value::Null) => {
            if !schema.optional {
                issues.push(ValidationIssue::new(
                    Reason::Required,
                    field,
                    "value to be present",
                    &Value::Null,
                    format!("The '{}' field is required.", field),
                ));
            }
            return;
        }
        Some(v) => v,
    };

    let type_ok = match &schema.kind {
        SchemaKind::Any => true,
        SchemaKind::Primitive(p) => {
            if p.accepts(value) {
                true
            } else {
                issues.push(type_issue(field, p.type_name(), value));
                false
            }
        }
        SchemaKind::ArrayOf(element) => match value.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    check(element, Some(item), &index_path(path, i), issues);
                }
                true
            }
            None => {
                issues.push(type_issue(field, "array", value));
                false
            }
        },
        SchemaKind::Tuple(positions) => match value.as_array() {
            Some(items) => {
                for (i, position) in positions.iter().enumerate() {
                    check(position, items.get(i), &index_path(path, i), issues);
                }
                true
            }
            None => {
                issues.push(type_issue(field, "array", value));
                false
            }
        },
        SchemaKind::Object { properties, partial } => match value.as_object() {
            Some(map) => {
                for (name, property) in properties {
                    let child = map.get(name);
                    if *partial && child.is_none() {
                        continue;
                    }
                    check(property, child, &join_path(path, name), issues);
                }
                true
            }
            None => {
                issues.push(type_issue(field, "object", value));
                false
            }
        },
        SchemaKind::AnyOf(alts) => {
            let matched = alts.iter().any(|alt| {
                let mut scratch = Vec::new();
                check(alt, Some(value), path, &mut scratch);
                scratch.is_empty()
            });
            if !matched {
                let names: Vec<&str> = alts.iter().map(Schema::type_name).collect();
                issues.push(ValidationIssue::new(
                    Reason::AnyOf,
                    field,
                    names.join(" | "),
                    value,
                    format!("The '{}' field matches none of the allowed schemas.", field),
                ));
            }
            matched
        }
        SchemaKind::AllOf(alts) => {
            let before = issues.len();
            for alt in alts {
                check(alt, Some(value), path, issues);
            }
            issues.len() == before
        }
    };

    if type_ok {
        check_constraints(&schema.constraints, value, field, issues);
    }
}

fn check_constraints(c: &Constraints, value: &Value, field: &str, issues: &mut Vec<ValidationIssue>) {
    let len = match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    };

    if let Some(len) = len {
        if let Some(min) = c.min_length {
            if len < min {
                issues.push(ValidationIssue::new(
                    Reason::MinLength,
                    field,
                    format!("length >= {}", min),
                    value,
                    format!("The '{}' field length must be greater than or equal to {}.", field, min),
                ));
            }
        }
        if let Some(max) = c.max_length {
            if len > max {
                issues.push(ValidationIssue::new(
                    Reason::MaxLength,
                    field,
                    format!("length <= {}", max),
                    value,
                    format!("The '{}' field length must be less than or equal to {}.", field, max),
                ));
            }
        }
        if let Some(exact) = c.length {
            if len != exact {
                issues.push(ValidationIssue::new(
                    Reason::Length,
                    field,
                    format!("length == {}", exact),
                    value,
                    format!("The '{}' field length must be {}.", field, exact),
                ));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = c.min {
            if n < min {
                issues.push(ValidationIssue::new(
                    Reason::Min,
                    field,
                    format!(">= {}", min),
                    value,
                    format!("The '{}' field must be greater than or equal to {}.", field, min),
                ));
            }
        }
        if let Some(max) = c.max {
            if n > max {
                issues.push(ValidationIssue::new(
                    Reason::Max,
                    field,
                    format!("<= {}", max),
                    value,
                    format!("The '{}' field must be less than or equal to {}.", field, max),
                ));
            }
        }
    }

    if let Some(expected) = &c.equal {
        if !values_equal(value, expected) {
            issues.push(ValidationIssue::new(
                Reason::Equal,
                field,
                expected.to_string(),
                value,
                format!("The '{}' field value must be equal to {}.", field, expected),
            ));
        }
    }

    if let Some(forbidden) = &c.not_equal {
        if values_equal(value, forbidden) {
            issues.push(ValidationIssue::new(
                Reason::NotEqual,
                field,
                format!("not {}", forbidden),
                value,
                format!("The '{}' field value can't be equal to {}.", field, forbidden),
            ));
        }
    }

    if let Some(allowed) = &c.one_of {
        if !allowed.iter().any(|a| values_equal(value, a)) {
            let list: Vec<String> = allowed.iter().map(ToString::to_string).collect();
            issues.push(ValidationIssue::new(
                Reason::Enum,
                field,
                list.join(", "),
                value,
                format!("The '{}' field value does not match any of the allowed values.", field),
            ));
        }
    }

    if let (Some(re), Some(s)) = (&c.pattern, value.as_str()) {
        if !re.is_match(s) {
            issues.push(ValidationIssue::new(
                Reason::Pattern,
                field,
                re.as_str(),
                value,
                format!("The '{}' field fails to match the required pattern.", field),
            ));
        }
    }

    if let Some(format) = c.format {
        let ok = value.as_str().map(|s| format_matches(format, s)).unwrap_or(false);
        if !ok {
            issues.push(ValidationIssue::new(
                Reason::Format,
                field,
                format.name(),
                value,
                format!("The '{}' field must be a valid {}.", field, format.name()),
            ));
        }
    }

    for rule in &c.custom {
        if !(rule.check)(value) {
            issues.push(ValidationIssue::new(
                Reason::Custom(rule.name.clone()),
                field,
                rule.name.clone(),
                value,
                rule.render(field, value),
            ));
        }
    }
}

fn type_issue(field: &str, expected: &str, actual: &Value) -> ValidationIssue {
    ValidationIssue::new(
        Reason::Type,
        field,
        expected,
        actual,
        format!("The '{}' field must be a {}.", field, expected),
    )
}

fn format_matches(format: Format, s: &str) -> bool {
    match format {
        Format::Email => email_re().is_some_and(|re| re.is_match(s)),
        Format::Url => url_re().is_some_and(|re| re.is_match(s)),
        Format::Uuid => Uuid::parse_str(s).is_ok(),
        Format::DateTime => DateTime::parse_from_rfc3339(s).is_ok(),
    }
}

fn email_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok()).as_ref()
}

fn url_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").ok()).as_ref()
}

/// Creates a field path from prefix and field name
fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

fn index_path(prefix: &str, index: usize) -> String {
    format!("{}[{}]", display_path(prefix), index)
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "$root"
    } else {
        path
    }
}
