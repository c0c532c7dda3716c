//! Model orchestration
//!
//! A [`Model`] owns its sources, queries, plans and compiled schemas.
//! It is a cheap handle: clones share one registry, so documents and
//! model-backed sources can each hold one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::document::Document;
use crate::errors::{ModelError, ModelResult};
use crate::observability::{log_event, EngineMetrics, Event};
use crate::query::{Query, QueryResult, RawData, SourceBinding, SourceLookup, DEFAULT_QUERY};
use crate::schema::Schema;
use crate::source::{Source, SourceOp, SourceOpKind};
use crate::store::Selector;

use super::builder::ModelBuilder;
use super::descriptor::{DataFn, FieldDescriptor};
use super::plan::{InitializerPlan, MutationPlan, PlanStep, RemovePlan};

/// A registered source
pub struct SourceEntry {
    pub name: String,
    pub source: Arc<dyn Source>,
    /// Absent data short-circuits queries
    pub required: bool,
    /// Raw data is a sequence
    pub many: bool,
    /// Records are deleted when the document is removed
    pub bound: bool,
}

/// Mutation addressable by name: registered directly or derived from a
/// descriptor field
pub(crate) struct NamedMutation {
    pub(crate) name: String,
    pub(crate) plan: MutationPlan,
    pub(crate) schema: Schema,
    pub(crate) modifiable: bool,
}

pub(crate) struct ModelInner {
    pub(crate) name: String,
    pub(crate) sources: Vec<SourceEntry>,
    pub(crate) queries: BTreeMap<String, Query>,
    pub(crate) mutations: Vec<NamedMutation>,
    pub(crate) initializer: Option<InitializerPlan>,
    pub(crate) remove: Option<RemovePlan>,
    pub(crate) fields: Vec<(String, FieldDescriptor)>,
    pub(crate) data_map: Option<DataFn>,
    /// Partial object schema over every modifiable field
    pub(crate) mutation_schema: Schema,
    /// Object schema `create` validates its input against
    pub(crate) create_schema: Schema,
    pub(crate) config: EngineConfig,
    pub(crate) metrics: Arc<EngineMetrics>,
}

/// Result of [`Model::query`]
#[derive(Debug)]
pub enum QueryOutput {
    Single(Document),
    /// One document per element of a multi-document query
    Many(Vec<Document>),
}

impl QueryOutput {
    pub fn into_single(self) -> Option<Document> {
        match self {
            QueryOutput::Single(doc) => Some(doc),
            QueryOutput::Many(_) => None,
        }
    }

    /// Every document, single results included
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            QueryOutput::Single(doc) => vec![doc],
            QueryOutput::Many(docs) => docs,
        }
    }
}

/// Composable data model
#[derive(Clone)]
pub struct Model {
    pub(crate) inner: Arc<ModelInner>,
}

impl Model {
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.inner.metrics
    }

    pub fn fields(&self) -> &[(String, FieldDescriptor)] {
        &self.inner.fields
    }

    pub fn source(&self, name: &str) -> ModelResult<&SourceEntry> {
        self.inner
            .sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ModelError::UnknownSource(name.to_string()))
    }

    pub fn query_def(&self, name: &str) -> ModelResult<&Query> {
        self.inner
            .queries
            .get(name)
            .ok_or_else(|| ModelError::UnknownQuery(name.to_string()))
    }

    pub fn default_query(&self) -> ModelResult<&Query> {
        self.query_def(DEFAULT_QUERY)
    }

    /// Apply the data map to raw data
    pub fn project(&self, raw: &RawData) -> Value {
        if let Some(map) = &self.inner.data_map {
            return map(raw);
        }

        let mut projected = Map::new();
        let mut any = false;
        for (name, field) in &self.inner.fields {
            if let Some(data) = &field.data {
                projected.insert(name.clone(), data(raw));
                any = true;
            }
        }
        if any {
            return Value::Object(projected);
        }

        // No projection declared: expose the fetched sources as-is
        let sources = raw
            .sources()
            .map(|name| (name.to_string(), raw.source(name).clone()))
            .collect();
        Value::Object(sources)
    }

    /// Execute a named query and materialize its document(s)
    pub async fn query(&self, name: &str, input: Value) -> ModelResult<QueryOutput> {
        let query = self.query_def(name)?;
        log_event(
            Event::QueryStart,
            &[("model", self.name()), ("query", name)],
        );
        self.inner.metrics.increment_queries();

        let result = query.exec(self, input).await?;

        if let Some(missing) = &result.missing {
            log_event(
                Event::QueryShortCircuit,
                &[("model", self.name()), ("query", name), ("source", missing.as_str())],
            );
            return Ok(QueryOutput::Single(Document::new(self.clone(), name, result, None)));
        }

        let output = match query.split_documents(&result.raw) {
            Some(elements) => QueryOutput::Many(self.split(name, elements)?),
            None => {
                let data = self.project(&result.raw);
                QueryOutput::Single(Document::new(self.clone(), name, result, Some(data)))
            }
        };

        let count = match &output {
            QueryOutput::Single(_) => 1,
            QueryOutput::Many(docs) => docs.len(),
        }
        .to_string();
        log_event(
            Event::QueryComplete,
            &[("documents", count.as_str()), ("model", self.name()), ("query", name)],
        );
        Ok(output)
    }

    /// Like [`query`](Self::query) for queries that yield one document
    pub async fn query_one(&self, name: &str, input: Value) -> ModelResult<Document> {
        match self.query(name, input).await? {
            QueryOutput::Single(doc) => Ok(doc),
            QueryOutput::Many(_) => Err(ModelError::Structural(format!(
                "query '{}' returns several documents",
                name
            ))),
        }
    }

    /// The default query
    pub async fn get(&self, input: Value) -> ModelResult<Document> {
        self.query_one(DEFAULT_QUERY, input).await
    }

    /// One document per element of a multi-document query. Each element
    /// is re-keyed through the default query so later operations on the
    /// document use it.
    fn split(&self, name: &str, elements: Value) -> ModelResult<Vec<Document>> {
        let Value::Array(elements) = elements else {
            return Err(ModelError::NotASequence(name.to_string()));
        };
        let default = self.default_query()?;

        let mut docs = Vec::with_capacity(elements.len());
        for element in elements {
            let mut raw =
                RawData::from_value(element).ok_or_else(|| ModelError::NotASequence(name.to_string()))?;
            let input = default.construct_input(&raw);
            raw.set_input(input.clone());
            let selectors = default.selectors_for(&raw)?;
            let data = self.project(&raw);
            let result = QueryResult {
                input,
                selectors,
                raw,
                missing: None,
            };
            docs.push(Document::new(self.clone(), DEFAULT_QUERY, result, Some(data)));
        }
        Ok(docs)
    }

    /// Selector the default query would use for `source` given `raw`
    pub(crate) fn default_selector(&self, source: &str, raw: &RawData) -> ModelResult<Option<Selector>> {
        Ok(self
            .default_query()?
            .population_for(source)
            .and_then(|p| p.resolve(raw)))
    }

    /// Fill in missing selectors from the default query and expand
    /// sequence selectors into one operation per element
    pub(crate) fn bind_ops(&self, source: &str, ops: Vec<SourceOp>, raw: &RawData) -> ModelResult<Vec<SourceOp>> {
        let mut bound = Vec::with_capacity(ops.len());
        for op in ops {
            if op.kind == SourceOpKind::Create {
                bound.push(op);
                continue;
            }
            let selector = match op.selector {
                Some(selector) => selector,
                None => self.default_selector(source, raw)?.ok_or_else(|| {
                    ModelError::Structural(format!(
                        "no selector for {} on source '{}'",
                        op.kind, source
                    ))
                })?,
            };
            match selector.to_sequence() {
                Some(items) => bound.extend(items.into_iter().map(|item| SourceOp {
                    kind: op.kind,
                    selector: Some(item),
                    data: op.data.clone(),
                })),
                None => bound.push(SourceOp {
                    kind: op.kind,
                    selector: Some(selector),
                    data: op.data,
                }),
            }
        }
        Ok(bound)
    }

    /// Send operations to a source, counting and logging each write
    pub(crate) async fn dispatch(&self, source: &str, ops: Vec<SourceOp>) -> ModelResult<Vec<Value>> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        let entry = self.source(source)?;
        let count = ops.len();
        let kinds: Vec<&str> = ops.iter().map(|op| op.kind.as_str()).collect();
        let kinds = kinds.join(",");

        let results = entry.source.mutate(ops).await?;

        for _ in 0..count {
            self.inner.metrics.increment_writes();
        }
        log_event(
            Event::MutationDispatch,
            &[("model", self.name()), ("ops", kinds.as_str()), ("source", source)],
        );
        Ok(results)
    }

    /// Run one plan step: build its operations, write, then fold created
    /// records into `raw` and apply the step's remap
    pub(crate) async fn run_step(&self, step: &PlanStep, value: &Value, raw: &mut RawData) -> ModelResult<Vec<Value>> {
        let ops = step.operations(value, raw);
        let creates: Vec<bool> = ops.iter().map(|op| op.kind == SourceOpKind::Create).collect();
        let ops = self.bind_ops(&step.source, ops, raw)?;
        let aligned = ops.len() == creates.len();
        let results = self.dispatch(&step.source, ops).await?;

        // Selector expansion changes alignment only for updates/removes,
        // so created records are recoverable when nothing was expanded
        if aligned && creates.iter().any(|c| *c) {
            // A create with a sequence of records answers with a sequence
            let mut created: Vec<Value> = Vec::new();
            for (result, _) in results.iter().zip(&creates).filter(|(_, is_create)| **is_create) {
                match result {
                    Value::Array(records) => created.extend(records.iter().cloned()),
                    record => created.push(record.clone()),
                }
            }
            let many = self.source(&step.source)?.many;
            let value = if many || created.len() > 1 {
                Value::Array(created)
            } else {
                created.into_iter().next().unwrap_or(Value::Null)
            };
            raw.insert(step.source.clone(), value);
        }

        *raw = step.remap(std::mem::take(raw));
        Ok(results)
    }

    pub(crate) fn named(&self, name: &str) -> Option<&NamedMutation> {
        self.inner.mutations.iter().find(|m| m.name == name)
    }
}

impl SourceLookup for Model {
    fn binding(&self, name: &str) -> ModelResult<SourceBinding<'_>> {
        let entry = self.source(name)?;
        Ok(SourceBinding {
            source: entry.source.as_ref(),
            required: entry.required,
        })
    }

    fn parallel_fan_out(&self) -> bool {
        self.inner.config.parallel_fan_out
    }

    fn record_fetches(&self, count: u64) {
        self.inner.metrics.add_fetches(count);
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.name)
            .field("sources", &self.inner.sources.iter().map(|s| &s.name).collect::<Vec<_>>())
            .field("queries", &self.inner.queries.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
