//! Schema errors and validation reports

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Result type for schema compilation
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Raised while compiling a descriptor
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// `pattern` does not compile
    #[error("Invalid pattern '{pattern}' at '{field}': {reason}")]
    InvalidPattern {
        field: String,
        pattern: String,
        reason: String,
    },

    /// Constraint combination makes no sense (e.g. min > max)
    #[error("Invalid rule at '{field}': {reason}")]
    InvalidRule { field: String, reason: String },
}

/// Why a value was rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Reason {
    /// Missing or null while required
    Required,
    Type,
    MinLength,
    MaxLength,
    Length,
    Min,
    Max,
    Equal,
    NotEqual,
    Enum,
    Pattern,
    Format,
    /// No alternative of an any-of matched
    AnyOf,
    /// A user-supplied predicate failed
    Custom(String),
}

impl Reason {
    pub fn as_str(&self) -> &str {
        match self {
            Reason::Required => "optional",
            Reason::Type => "type",
            Reason::MinLength => "minLength",
            Reason::MaxLength => "maxLength",
            Reason::Length => "length",
            Reason::Min => "min",
            Reason::Max => "max",
            Reason::Equal => "eq",
            Reason::NotEqual => "ne",
            Reason::Enum => "enum",
            Reason::Pattern => "pattern",
            Reason::Format => "format",
            Reason::AnyOf => "anyOf",
            Reason::Custom(name) => name,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Reason> for String {
    fn from(reason: Reason) -> Self {
        reason.as_str().to_string()
    }
}

/// One validation failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub reason: Reason,
    /// Property path relative to the root (e.g. "author.tags[1]")
    pub field: String,
    /// Human-readable message
    pub message: String,
    /// Expected type or condition
    pub expected: String,
    /// Offending value (null when missing)
    pub actual: Value,
}

impl ValidationIssue {
    pub fn new(
        reason: Reason,
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: &Value,
        message: impl Into<String>,
    ) -> Self {
        Self {
            reason,
            field: field.into(),
            message: message.into(),
            expected: expected.into(),
            actual: actual.clone(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.reason, self.message)
    }
}

/// Outcome of validating one value
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn first(&self) -> Option<&ValidationIssue> {
        self.errors.first()
    }

    /// Issues whose path is exactly `field`
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationIssue> + 'a {
        self.errors.iter().filter(move |e| e.field == field)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            return f.write_str("valid");
        }
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}
