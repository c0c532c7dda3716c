//! Mutation pipeline
//!
//! Bulk patches run in three phases:
//! 1. Filter to modifiable fields, fill defaults, validate (no write on failure)
//! 2. Collapse every field's operations into one write per
//!    `(source, operation)`, merging data shallowly (later fields win)
//! 3. Dispatch groups in source declaration order, then re-query
//!
//! Nothing is rolled back when a write fails part way.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::document::Document;
use crate::errors::{ModelError, ModelResult};
use crate::observability::{log_event, Event};
use crate::query::RawData;
use crate::schema::{ValidationReport, Validator};
use crate::source::{SourceOp, SourceOpKind};
use crate::store::Selector;

use super::model::Model;

/// Merged write for one `(source, operation)` pair
#[derive(Debug, Default)]
pub(crate) struct WriteGroup {
    pub(crate) selector: Option<Selector>,
    pub(crate) data: Option<Value>,
}

impl WriteGroup {
    fn absorb(&mut self, op: SourceOp) {
        if op.selector.is_some() {
            self.selector = op.selector;
        }
        self.data = match (self.data.take(), op.data) {
            (Some(Value::Object(mut merged)), Some(Value::Object(next))) => {
                merged.extend(next);
                Some(Value::Object(merged))
            }
            (current, None) => current,
            (_, next) => next,
        };
    }
}

/// `(source index, operation) → merged write`, iterated in dispatch order
pub(crate) type WriteTable = BTreeMap<(usize, SourceOpKind), WriteGroup>;

impl Model {
    /// Apply a bulk patch and return the re-materialized document.
    ///
    /// Keys that are not modifiable fields are dropped. `raw_doc` is the
    /// raw data of the document being patched; without it the query is
    /// executed first.
    pub async fn mutate(
        &self,
        input: Value,
        query_name: &str,
        data: Value,
        raw_doc: Option<RawData>,
    ) -> ModelResult<Document> {
        let query = self.query_def(query_name)?;
        let Value::Object(patch) = data else {
            return Err(ModelError::Structural("mutate expects a mapping".into()));
        };

        // Phase 1: filter, defaults, validate
        let patch = self.prepare_patch(patch);
        let candidate = Value::Object(patch.clone());
        let report = Validator::validate(&self.inner.mutation_schema, &candidate);
        if !report.is_valid() {
            return Err(self.reject(report));
        }

        let mut raw = match raw_doc {
            Some(raw) => raw,
            None => query.exec(self, input.clone()).await?.raw,
        };
        if raw.input().is_null() {
            raw.set_input(input.clone());
        }

        // Phase 2: group
        let table = self.group_writes(&patch, &raw)?;

        // Phase 3: dispatch, then re-query
        for ((index, kind), group) in table {
            let source = self.inner.sources[index].name.clone();
            let op = SourceOp {
                kind,
                selector: group.selector,
                data: group.data,
            };
            let ops = self.bind_ops(&source, vec![op], &raw)?;
            self.dispatch(&source, ops).await?;
        }

        let fields: Vec<&str> = patch.keys().map(String::as_str).collect();
        let fields = fields.join(",");
        log_event(
            Event::MutationComplete,
            &[("fields", fields.as_str()), ("model", self.name())],
        );
        self.query_one(query_name, input).await
    }

    /// Run one named mutation (registered, or the mutation of a
    /// descriptor field) with `value`, then re-query
    pub async fn named_mutate(
        &self,
        name: &str,
        input: Value,
        query_name: &str,
        value: Value,
        raw_doc: Option<RawData>,
    ) -> ModelResult<Document> {
        let query = self.query_def(query_name)?;
        let mutation = match self.named(name) {
            Some(m) if !m.modifiable => return Err(ModelError::ImmutableField(name.to_string())),
            Some(m) => m,
            None if self.inner.fields.iter().any(|(field, _)| field == name) => {
                return Err(ModelError::ImmutableField(name.to_string()))
            }
            None => return Err(ModelError::UnknownMutation(name.to_string())),
        };

        let report = Validator::validate_at(&mutation.schema, &value, name);
        if !report.is_valid() {
            return Err(self.reject(report));
        }

        let mut raw = match raw_doc {
            Some(raw) => raw,
            None => query.exec(self, input.clone()).await?.raw,
        };
        if raw.input().is_null() {
            raw.set_input(input.clone());
        }

        // Steps run in declaration order, each seeing what the previous wrote
        for step in &mutation.plan.sources {
            self.run_step(step, &value, &mut raw).await?;
        }

        log_event(
            Event::MutationComplete,
            &[("model", self.name()), ("mutation", name)],
        );
        self.query_one(query_name, input).await
    }

    /// Keep modifiable fields, then fill defaults for modifiable fields
    /// the patch leaves out
    fn prepare_patch(&self, patch: Map<String, Value>) -> Map<String, Value> {
        let source = Value::Object(patch.clone());
        let mut prepared = Map::new();
        for (name, field) in &self.inner.fields {
            if !field.is_modifiable() {
                continue;
            }
            if let Some(value) = patch.get(name) {
                prepared.insert(name.clone(), value.clone());
            } else if let Some(default) = &field.default {
                prepared.insert(name.clone(), default.resolve(&source));
            }
        }
        prepared
    }

    /// Collapse the operations of every patched field into the write table
    pub(crate) fn group_writes(&self, patch: &Map<String, Value>, raw: &RawData) -> ModelResult<WriteTable> {
        let mut table = WriteTable::new();
        for (name, field) in &self.inner.fields {
            let (Some(value), Some(plan)) = (patch.get(name), &field.mutation) else {
                continue;
            };
            for step in &plan.sources {
                let index = self
                    .inner
                    .sources
                    .iter()
                    .position(|s| s.name == step.source)
                    .ok_or_else(|| ModelError::UnknownSource(step.source.clone()))?;
                for op in step.operations(value, raw) {
                    table.entry((index, op.kind)).or_default().absorb(op);
                }
            }
        }
        Ok(table)
    }

    fn reject(&self, report: ValidationReport) -> ModelError {
        self.inner.metrics.increment_validation_failures();
        let first = report.first().map(|e| e.field.clone()).unwrap_or_default();
        let count = report.errors.len().to_string();
        log_event(
            Event::MutationRejected,
            &[("errors", count.as_str()), ("field", first.as_str()), ("model", self.name())],
        );
        ModelError::Validation(report)
    }
}
