//! Declarative type descriptors
//!
//! Primitive tags:
//! - string, number (any JSON number), integer, boolean
//! - date: RFC 3339 string
//! - object, array, any
//!
//! A descriptor is what model authors write; [`Validator::compile`]
//! turns it into a runtime [`Schema`].
//!
//! [`Validator::compile`]: super::Validator::compile
//! [`Schema`]: super::Schema

use std::fmt;
use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primitive type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Object,
    Array,
    Any,
}

impl Primitive {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Number => "number",
            Primitive::Integer => "integer",
            Primitive::Boolean => "boolean",
            Primitive::Date => "date",
            Primitive::Object => "object",
            Primitive::Array => "array",
            Primitive::Any => "any",
        }
    }

    /// Whether `value` has this type. No coercion.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Primitive::String => value.is_string(),
            Primitive::Number => value.is_number(),
            Primitive::Integer => value.is_i64() || value.is_u64(),
            Primitive::Boolean => value.is_boolean(),
            Primitive::Date => value
                .as_str()
                .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false),
            Primitive::Object => value.is_object(),
            Primitive::Array => value.is_array(),
            Primitive::Any => true,
        }
    }
}

/// Named string formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Email,
    Url,
    Uuid,
    DateTime,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Email => "email",
            Format::Url => "url",
            Format::Uuid => "uuid",
            Format::DateTime => "date-time",
        }
    }
}

/// Predicate check
pub type CheckFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// User-supplied predicate with a templated failure message.
///
/// The message may use `{field}` and `{actual}` placeholders.
#[derive(Clone)]
pub struct CustomRule {
    pub name: String,
    pub message: String,
    pub check: CheckFn,
}

impl CustomRule {
    pub fn new<F>(name: impl Into<String>, message: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            message: message.into(),
            check: Arc::new(check),
        }
    }

    pub(crate) fn render(&self, field: &str, actual: &Value) -> String {
        self.message
            .replace("{field}", field)
            .replace("{actual}", &actual.to_string())
    }
}

impl fmt::Debug for CustomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomRule")
            .field("name", &self.name)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Explicit rule: an object literal that names its `type`
#[derive(Debug, Clone, Default)]
pub struct Rule {
    pub kind: Option<Primitive>,
    pub required: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub equal: Option<Value>,
    pub not_equal: Option<Value>,
    pub one_of: Option<Vec<Value>>,
    pub pattern: Option<String>,
    pub format: Option<Format>,
    pub items: Option<Box<TypeDescriptor>>,
    pub properties: Option<Vec<(String, TypeDescriptor)>>,
    pub custom: Vec<CustomRule>,
}

impl Rule {
    pub fn new(kind: Primitive) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn length(mut self, n: usize) -> Self {
        self.length = Some(n);
        self
    }

    pub fn min(mut self, n: f64) -> Self {
        self.min = Some(n);
        self
    }

    pub fn max(mut self, n: f64) -> Self {
        self.max = Some(n);
        self
    }

    pub fn equal(mut self, value: Value) -> Self {
        self.equal = Some(value);
        self
    }

    pub fn not_equal(mut self, value: Value) -> Self {
        self.not_equal = Some(value);
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.one_of = Some(values);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn items(mut self, items: TypeDescriptor) -> Self {
        self.items = Some(Box::new(items));
        self
    }

    pub fn properties(mut self, properties: Vec<(String, TypeDescriptor)>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn custom(mut self, rule: CustomRule) -> Self {
        self.custom.push(rule);
        self
    }
}

/// Declarative type descriptor
#[derive(Debug, Clone, Default)]
pub enum TypeDescriptor {
    /// No type given: anything, optional
    #[default]
    Missing,
    /// A bare primitive tag
    Primitive(Primitive),
    /// One element → array of that element; several → positional array
    Sequence(Vec<TypeDescriptor>),
    /// Object literal without a `type`: field-wise recursion
    Object(Vec<(String, TypeDescriptor)>),
    /// Object literal with a `type`
    Rule(Rule),
    /// Valid when any alternative is
    AnyOf(Vec<TypeDescriptor>),
    /// Valid when every alternative is
    AllOf(Vec<TypeDescriptor>),
}

impl TypeDescriptor {
    pub fn string() -> Self {
        TypeDescriptor::Primitive(Primitive::String)
    }

    pub fn number() -> Self {
        TypeDescriptor::Primitive(Primitive::Number)
    }

    pub fn integer() -> Self {
        TypeDescriptor::Primitive(Primitive::Integer)
    }

    pub fn boolean() -> Self {
        TypeDescriptor::Primitive(Primitive::Boolean)
    }

    pub fn date() -> Self {
        TypeDescriptor::Primitive(Primitive::Date)
    }

    pub fn array_of(element: TypeDescriptor) -> Self {
        TypeDescriptor::Sequence(vec![element])
    }

    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, TypeDescriptor)>,
        K: Into<String>,
    {
        TypeDescriptor::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, TypeDescriptor::Missing)
    }

    /// Short name for reflection output
    pub fn type_name(&self) -> &'static str {
        match self {
            TypeDescriptor::Missing => "any",
            TypeDescriptor::Primitive(p) => p.type_name(),
            TypeDescriptor::Sequence(_) => "array",
            TypeDescriptor::Object(_) => "object",
            TypeDescriptor::Rule(rule) => rule.kind.map(|k| k.type_name()).unwrap_or("any"),
            TypeDescriptor::AnyOf(_) => "anyOf",
            TypeDescriptor::AllOf(_) => "allOf",
        }
    }
}

impl From<Primitive> for TypeDescriptor {
    fn from(p: Primitive) -> Self {
        TypeDescriptor::Primitive(p)
    }
}

impl From<Rule> for TypeDescriptor {
    fn from(rule: Rule) -> Self {
        TypeDescriptor::Rule(rule)
    }
}
