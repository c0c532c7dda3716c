//! Materialized documents
//!
//! A [`Document`] is the projected data of one query execution together
//! with the raw records, input and query that produced it. Writes go
//! back through the model and return a fresh document; the original is
//! left as it was.

use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::{ModelError, ModelResult};
use crate::model::Model;
use crate::query::{QueryResult, RawData};
use crate::store::Selector;

/// Change to apply to a document
#[derive(Debug, Clone)]
pub enum Patch {
    /// Bulk patch over modifiable fields
    Fields(Value),
    /// One named mutation with its value
    Named { name: String, value: Value },
}

impl Patch {
    pub fn fields(data: Value) -> Self {
        Patch::Fields(data)
    }

    pub fn named(name: impl Into<String>, value: Value) -> Self {
        Patch::Named {
            name: name.into(),
            value,
        }
    }
}

impl From<Value> for Patch {
    fn from(data: Value) -> Self {
        Patch::Fields(data)
    }
}

/// Records one source lost when a document was removed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovalReport {
    pub source: String,
    pub deleted: Vec<Value>,
}

impl RemovalReport {
    /// Flattens per-operation results (each a sequence of removed records)
    pub(crate) fn new(source: &str, results: Vec<Value>) -> Self {
        let mut deleted = Vec::new();
        for result in results {
            match result {
                Value::Array(records) => deleted.extend(records),
                Value::Null => {}
                other => deleted.push(other),
            }
        }
        Self {
            source: source.to_string(),
            deleted,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({"source": self.source, "deleted": self.deleted})
    }
}

/// Projected data plus everything needed to write it back
#[derive(Debug, Clone)]
pub struct Document {
    model: Model,
    query: String,
    result: QueryResult,
    data: Option<Value>,
    is_new: bool,
    removed: bool,
}

impl Document {
    pub(crate) fn new(model: Model, query: impl Into<String>, result: QueryResult, data: Option<Value>) -> Self {
        Self {
            model,
            query: query.into(),
            result,
            data,
            is_new: false,
            removed: false,
        }
    }

    /// Mark as created and not yet committed
    pub(crate) fn into_new(mut self) -> Self {
        self.is_new = true;
        self
    }

    /// Copy of the projected data; `None` when a required source was absent
    pub fn data(&self) -> Option<Value> {
        self.data.clone()
    }

    /// One top-level field of the projected data
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(field))
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    pub fn input(&self) -> &Value {
        &self.result.input
    }

    pub fn raw(&self) -> &RawData {
        &self.result.raw
    }

    pub fn selectors(&self) -> &[(String, Option<Selector>)] {
        &self.result.selectors
    }

    pub fn query_result(&self) -> &QueryResult {
        &self.result
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Write `patch` and return the re-materialized document
    pub async fn mutate(&self, patch: impl Into<Patch>) -> ModelResult<Document> {
        self.ensure_live()?;
        let raw = Some(self.result.raw.clone());
        match patch.into() {
            Patch::Fields(data) => {
                self.model
                    .mutate(self.input().clone(), &self.query, data, raw)
                    .await
            }
            Patch::Named { name, value } => {
                self.model
                    .named_mutate(&name, self.input().clone(), &self.query, value, raw)
                    .await
            }
        }
    }

    /// Delete the document's records; the document is dead afterwards
    pub async fn remove(&mut self) -> ModelResult<Vec<RemovalReport>> {
        self.ensure_live()?;
        let reports = self.model.del(self.input().clone(), &self.query).await?;
        self.removed = true;
        Ok(reports)
    }

    /// Re-read the document through its query and clear `is_new`
    pub async fn commit(&mut self) -> ModelResult<()> {
        self.ensure_live()?;
        let fresh = self.model.query_one(&self.query, self.input().clone()).await?;
        self.result = fresh.result;
        self.data = fresh.data;
        self.is_new = false;
        Ok(())
    }

    fn ensure_live(&self) -> ModelResult<()> {
        if self.removed {
            return Err(ModelError::RemovedDocument);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removal_report_flattens() {
        let report = RemovalReport::new(
            "tagLinks",
            vec![json!([{"id": 1}, {"id": 2}]), json!([]), json!([{"id": 3}])],
        );
        assert_eq!(report.deleted.len(), 3);
        assert_eq!(report.to_value()["source"], "tagLinks");
    }

    #[test]
    fn test_patch_from_value() {
        assert!(matches!(Patch::from(json!({"title": "x"})), Patch::Fields(_)));
        assert!(matches!(Patch::named("title", json!("x")), Patch::Named { .. }));
    }
}
