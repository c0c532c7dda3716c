//! Store-backed source: one collection of one store

use std::sync::Arc;

use serde_json::Value;

use crate::errors::{ModelError, ModelResult};
use crate::query::Operation;
use crate::store::{Selector, Store};

use super::{Source, SourceFuture, SourceOp, SourceOpKind};

/// Binds a source name to `(store, collection)`
#[derive(Clone)]
pub struct StoreSource {
    store: Arc<dyn Store>,
    collection: String,
}

impl StoreSource {
    pub fn new(store: Arc<dyn Store>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn fetch_records(&self, operation: Operation, selector: &Selector) -> ModelResult<Value> {
        match operation {
            Operation::Read => {
                let records = self.store.read(&self.collection, selector).await?;
                Ok(records.into_iter().next().unwrap_or(Value::Null))
            }
            Operation::ReadMany => {
                let records = self.store.read(&self.collection, selector).await?;
                Ok(Value::Array(records))
            }
            other => Err(ModelError::Structural(format!(
                "cannot fetch '{}' with operation '{}'",
                self.collection, other
            ))),
        }
    }

    async fn apply(&self, operations: Vec<SourceOp>) -> ModelResult<Vec<Value>> {
        let mut results = Vec::with_capacity(operations.len());
        for op in operations {
            let result = match op.kind {
                SourceOpKind::Create => {
                    let data = op.data.ok_or_else(|| {
                        ModelError::Structural(format!("create on '{}' needs data", self.collection))
                    })?;
                    self.store.create(&self.collection, data).await?
                }
                SourceOpKind::Update => {
                    let selector = self.require_selector(op.selector, op.kind)?;
                    let patch = op.data.unwrap_or_else(|| Value::Object(Default::default()));
                    Value::Array(self.store.update(&self.collection, &selector, &patch).await?)
                }
                SourceOpKind::Remove => {
                    let selector = self.require_selector(op.selector, op.kind)?;
                    Value::Array(self.store.delete(&self.collection, &selector).await?)
                }
            };
            results.push(result);
        }
        Ok(results)
    }

    fn require_selector(&self, selector: Option<Selector>, kind: SourceOpKind) -> ModelResult<Selector> {
        selector.ok_or_else(|| {
            ModelError::Structural(format!("{} on '{}' needs a selector", kind, self.collection))
        })
    }
}

impl Source for StoreSource {
    fn fetch<'a>(&'a self, operation: Operation, selector: &'a Selector) -> SourceFuture<'a, Value> {
        Box::pin(self.fetch_records(operation, selector))
    }

    fn mutate<'a>(&'a self, operations: Vec<SourceOp>) -> SourceFuture<'a, Vec<Value>> {
        Box::pin(self.apply(operations))
    }

    fn kind(&self) -> &'static str {
        "store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn source() -> StoreSource {
        let store = MemoryStore::from_json(json!({
            "posts": [
                {"id": 1, "title": "Post 1"},
                {"id": 2, "title": "Post 2"}
            ]
        }))
        .unwrap();
        StoreSource::new(Arc::new(store), "posts")
    }

    #[tokio::test]
    async fn test_read_returns_first_or_null() {
        let source = source();
        let found = source.fetch(Operation::Read, &Selector::all()).await.unwrap();
        assert_eq!(found["id"], 1);

        let missing = source
            .fetch(Operation::Read, &json!({"id": 9}).into())
            .await
            .unwrap();
        assert!(missing.is_null());
    }

    #[tokio::test]
    async fn test_read_many_returns_sequence() {
        let source = source();
        let all = source.fetch(Operation::ReadMany, &Selector::all()).await.unwrap();
        assert_eq!(all.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_rejects_write_operations() {
        let source = source();
        let err = source.fetch(Operation::Update, &Selector::all()).await.unwrap_err();
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn test_mutate_results_align_with_operations() {
        let source = source();
        let results = source
            .mutate(vec![
                SourceOp::create(json!({"id": 3, "title": "Post 3"})),
                SourceOp::update(json!({"title": "Renamed"})).with_selector(json!({"id": 1})),
                SourceOp::remove().with_selector(json!({"id": 2})),
            ])
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["id"], 3);
        assert_eq!(results[1][0]["title"], "Renamed");
        assert_eq!(results[2][0]["id"], 2);
    }

    #[tokio::test]
    async fn test_update_without_selector_is_structural() {
        let source = source();
        let err = source.mutate(vec![SourceOp::update(json!({"title": "x"}))]).await.unwrap_err();
        assert!(matches!(err, ModelError::Structural(_)));
    }
}
