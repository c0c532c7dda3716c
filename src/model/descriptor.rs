//! Field descriptors
//!
//! A descriptor field says what a document field looks like (`kind`),
//! where its value comes from (`data`), how it is written back
//! (`mutation`), what it defaults to on create, and free-form `meta`.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::query::RawData;
use crate::schema::TypeDescriptor;

use super::plan::MutationPlan;

/// Projects raw data to a value
pub type DataFn = Arc<dyn Fn(&RawData) -> Value + Send + Sync>;

/// Default for a field on create (and on bulk mutations when absent)
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    /// Evaluated once per call, before validation
    Producer(Arc<dyn Fn() -> Value + Send + Sync>),
    /// Computed from the incoming data
    FromInput(Arc<dyn Fn(&Value) -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn resolve(&self, input: &Value) -> Value {
        match self {
            DefaultValue::Value(value) => value.clone(),
            DefaultValue::Producer(f) => f(),
            DefaultValue::FromInput(f) => f(input),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            DefaultValue::Producer(_) => f.write_str("Producer(..)"),
            DefaultValue::FromInput(_) => f.write_str("FromInput(..)"),
        }
    }
}

/// One field of a model's logical document
#[derive(Clone)]
pub struct FieldDescriptor {
    pub kind: TypeDescriptor,
    pub required: bool,
    pub data: Option<DataFn>,
    pub mutation: Option<MutationPlan>,
    pub default: Option<DefaultValue>,
    pub meta: Option<Value>,
    /// `false` keeps a field with a mutation plan out of every write path
    pub modify: bool,
}

impl FieldDescriptor {
    pub fn new(kind: impl Into<TypeDescriptor>) -> Self {
        Self {
            kind: kind.into(),
            required: false,
            data: None,
            mutation: None,
            default: None,
            meta: None,
            modify: true,
        }
    }

    /// Field without a declared type
    pub fn untyped() -> Self {
        Self::new(TypeDescriptor::Missing)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn data<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawData) -> Value + Send + Sync + 'static,
    {
        self.data = Some(Arc::new(f));
        self
    }

    /// Project the value found at a dotted raw path (`"post.title"`)
    pub fn data_path(self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.data(move |raw| raw.at(&path))
    }

    pub fn mutation(mut self, plan: MutationPlan) -> Self {
        self.mutation = Some(plan);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Value(value));
        self
    }

    pub fn default_with<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Producer(Arc::new(f)));
        self
    }

    pub fn default_from_input<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::FromInput(Arc::new(f)));
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.modify = false;
        self
    }

    /// Declares a mutation and does not opt out of modification
    pub fn is_modifiable(&self) -> bool {
        self.mutation.is_some() && self.modify
    }

    /// Type the field's patches are validated against
    pub fn mutation_type(&self) -> &TypeDescriptor {
        self.mutation
            .as_ref()
            .and_then(|plan| plan.kind.as_ref())
            .unwrap_or(&self.kind)
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("data", &self.data.is_some())
            .field("mutation", &self.mutation)
            .field("default", &self.default)
            .field("meta", &self.meta)
            .field("modify", &self.modify)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Primitive;
    use serde_json::json;

    #[test]
    fn test_default_resolution() {
        assert_eq!(DefaultValue::Value(json!(1)).resolve(&json!({})), json!(1));
        let producer = DefaultValue::Producer(Arc::new(|| json!("now")));
        assert_eq!(producer.resolve(&json!(null)), json!("now"));
        let derived = DefaultValue::FromInput(Arc::new(|input: &Value| input["title"].clone()));
        assert_eq!(derived.resolve(&json!({"title": "x"})), json!("x"));
    }

    #[test]
    fn test_modifiable_requires_mutation() {
        let plain = FieldDescriptor::new(Primitive::String);
        assert!(!plain.is_modifiable());

        let field = FieldDescriptor::new(Primitive::String).mutation(MutationPlan::assign("post", "title"));
        assert!(field.is_modifiable());
        assert!(!field.clone().read_only().is_modifiable());
    }

    #[test]
    fn test_mutation_type_prefers_plan_type() {
        let field = FieldDescriptor::new(Primitive::String)
            .mutation(MutationPlan::assign("post", "author").typed(Primitive::Number));
        assert_eq!(field.mutation_type().type_name(), "number");

        let field = FieldDescriptor::new(Primitive::String).mutation(MutationPlan::assign("post", "title"));
        assert_eq!(field.mutation_type().type_name(), "string");
    }

    #[test]
    fn test_data_path() {
        let field = FieldDescriptor::untyped().data_path("post.title");
        let raw = RawData::from_value(json!({"post": {"title": "Hello"}})).unwrap();
        assert_eq!((field.data.unwrap())(&raw), json!("Hello"));
    }
}
