//! Model-backed source
//!
//! Lets one model feed another. The selector handed to a model source
//! is the inner model's input:
//! - `read` runs the inner default query and yields its data
//! - `create` runs the inner initializer
//! - `update` runs the inner bulk mutation
//! - `remove` runs the inner `del`

use serde_json::Value;

use crate::document::Document;
use crate::errors::{ModelError, ModelResult};
use crate::model::{Model, QueryOutput};
use crate::query::{Operation, DEFAULT_QUERY};
use crate::store::Selector;

use super::{Source, SourceFuture, SourceOp, SourceOpKind};

/// Wraps a model so it can be registered as a source
#[derive(Clone)]
pub struct ModelSource {
    model: Model,
}

impl ModelSource {
    pub fn new(model: Model) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    async fn fetch_documents(&self, operation: Operation, selector: &Selector) -> ModelResult<Value> {
        let input = input_of(selector)?;
        let output = match operation {
            Operation::Read | Operation::ReadMany => self.model.query(DEFAULT_QUERY, input).await?,
            other => {
                return Err(ModelError::Structural(format!(
                    "cannot fetch model '{}' with operation '{}'",
                    self.model.name(),
                    other
                )))
            }
        };

        Ok(match (operation, output) {
            (Operation::Read, QueryOutput::Single(doc)) => data_of(&doc),
            (Operation::Read, QueryOutput::Many(docs)) => docs.first().map(data_of).unwrap_or(Value::Null),
            (_, QueryOutput::Single(doc)) => match doc.data() {
                Some(data) => Value::Array(vec![data]),
                None => Value::Array(Vec::new()),
            },
            (_, QueryOutput::Many(docs)) => Value::Array(docs.iter().map(data_of).collect()),
        })
    }

    async fn apply(&self, operations: Vec<SourceOp>) -> ModelResult<Vec<Value>> {
        let mut results = Vec::with_capacity(operations.len());
        for op in operations {
            let result = match op.kind {
                SourceOpKind::Create => {
                    let data = op.data.unwrap_or(Value::Null);
                    data_of(&self.model.create(data).await?)
                }
                SourceOpKind::Update => {
                    let input = self.selector_input(op.selector, op.kind)?;
                    let data = op.data.unwrap_or_else(|| Value::Object(Default::default()));
                    data_of(&self.model.mutate(input, DEFAULT_QUERY, data, None).await?)
                }
                SourceOpKind::Remove => {
                    let input = self.selector_input(op.selector, op.kind)?;
                    let reports = self.model.del(input, DEFAULT_QUERY).await?;
                    Value::Array(reports.iter().map(|r| r.to_value()).collect())
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    fn selector_input(&self, selector: Option<Selector>, kind: SourceOpKind) -> ModelResult<Value> {
        let selector = selector.ok_or_else(|| {
            ModelError::Structural(format!("{} on model '{}' needs an input", kind, self.model.name()))
        })?;
        input_of(&selector)
    }
}

impl Source for ModelSource {
    fn fetch<'a>(&'a self, operation: Operation, selector: &'a Selector) -> SourceFuture<'a, Value> {
        Box::pin(self.fetch_documents(operation, selector))
    }

    fn mutate<'a>(&'a self, operations: Vec<SourceOp>) -> SourceFuture<'a, Vec<Value>> {
        Box::pin(self.apply(operations))
    }

    fn kind(&self) -> &'static str {
        "model"
    }
}

fn input_of(selector: &Selector) -> ModelResult<Value> {
    selector.as_query().cloned().ok_or_else(|| {
        ModelError::Structural("a model source takes a plain value as its input".into())
    })
}

fn data_of(doc: &Document) -> Value {
    doc.data().unwrap_or(Value::Null)
}
