//! Write plans
//!
//! Mutation, initializer and remove plans share one building block: a
//! [`PlanStep`] naming a source and turning the incoming value plus the
//! current raw data into source operations.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::query::RawData;
use crate::schema::TypeDescriptor;
use crate::source::SourceOp;

/// `(value, raw) → operations`
pub type OperationsFn = Arc<dyn Fn(&Value, &RawData) -> Vec<SourceOp> + Send + Sync>;

/// Remaps raw data after a step has written
pub type ResultFn = Arc<dyn Fn(RawData) -> RawData + Send + Sync>;

/// Writes against one source
#[derive(Clone)]
pub struct PlanStep {
    pub source: String,
    operations: OperationsFn,
    result: Option<ResultFn>,
}

impl PlanStep {
    pub fn new<F>(source: impl Into<String>, operations: F) -> Self
    where
        F: Fn(&Value, &RawData) -> Vec<SourceOp> + Send + Sync + 'static,
    {
        Self {
            source: source.into(),
            operations: Arc::new(operations),
            result: None,
        }
    }

    pub fn with_result<F>(mut self, f: F) -> Self
    where
        F: Fn(RawData) -> RawData + Send + Sync + 'static,
    {
        self.result = Some(Arc::new(f));
        self
    }

    pub fn operations(&self, value: &Value, raw: &RawData) -> Vec<SourceOp> {
        (self.operations)(value, raw)
    }

    pub fn remap(&self, raw: RawData) -> RawData {
        match &self.result {
            Some(f) => f(raw),
            None => raw,
        }
    }
}

impl fmt::Debug for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanStep")
            .field("source", &self.source)
            .field("result", &self.result.is_some())
            .finish_non_exhaustive()
    }
}

/// Rewrites portions of the underlying sources
#[derive(Debug, Clone, Default)]
pub struct MutationPlan {
    pub sources: Vec<PlanStep>,
    /// Validation type; falls back to the descriptor field's type
    pub kind: Option<TypeDescriptor>,
}

impl MutationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan that updates `field` on `source` with the incoming value
    pub fn assign(source: impl Into<String>, field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new().source(source, move |value, _| {
            let mut patch = Map::new();
            patch.insert(field.clone(), value.clone());
            vec![SourceOp::update(Value::Object(patch))]
        })
    }

    pub fn source<F>(self, source: impl Into<String>, operations: F) -> Self
    where
        F: Fn(&Value, &RawData) -> Vec<SourceOp> + Send + Sync + 'static,
    {
        self.step(PlanStep::new(source, operations))
    }

    pub fn step(mut self, step: PlanStep) -> Self {
        self.sources.push(step);
        self
    }

    pub fn typed(mut self, kind: impl Into<TypeDescriptor>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// How `create` builds the underlying records
#[derive(Debug, Clone, Default)]
pub struct InitializerPlan {
    pub sources: Vec<PlanStep>,
    /// Query whose input constructor names the new document
    pub query: Option<String>,
    /// Per-field validation types overriding the descriptor's
    pub types: Vec<(String, TypeDescriptor)>,
}

impl InitializerPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source<F>(self, source: impl Into<String>, operations: F) -> Self
    where
        F: Fn(&Value, &RawData) -> Vec<SourceOp> + Send + Sync + 'static,
    {
        self.step(PlanStep::new(source, operations))
    }

    pub fn step(mut self, step: PlanStep) -> Self {
        self.sources.push(step);
        self
    }

    pub fn query(mut self, name: impl Into<String>) -> Self {
        self.query = Some(name.into());
        self
    }

    pub fn field_type(mut self, field: impl Into<String>, kind: impl Into<TypeDescriptor>) -> Self {
        self.types.push((field.into(), kind.into()));
        self
    }

    pub fn step_for(&self, source: &str) -> Option<&PlanStep> {
        self.sources.iter().find(|s| s.source == source)
    }

    pub fn type_for(&self, field: &str) -> Option<&TypeDescriptor> {
        self.types.iter().find(|(name, _)| name == field).map(|(_, kind)| kind)
    }
}

/// Replaces the bound-source sweep of `del`
#[derive(Debug, Clone, Default)]
pub struct RemovePlan {
    pub sources: Vec<PlanStep>,
}

impl RemovePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source<F>(mut self, source: impl Into<String>, operations: F) -> Self
    where
        F: Fn(&Value, &RawData) -> Vec<SourceOp> + Send + Sync + 'static,
    {
        self.sources.push(PlanStep::new(source, operations));
        self
    }
}
