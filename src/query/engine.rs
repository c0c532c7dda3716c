//! Query execution
//!
//! Execution flow (strict order):
//! 1. Order populations by their `require` edges (cycle → error, before any fetch)
//! 2. Start the accumulator as `{input}`
//! 3. For each population: resolve its selector against the accumulator,
//!    record it, fetch (once per element for sequence selectors), store
//! 4. Stop early when a required source comes back absent
//! 5. Return the input, selectors and raw data

use std::fmt;
use std::sync::{Arc, OnceLock};

use futures_util::future::try_join_all;
use serde_json::Value;

use crate::errors::ModelResult;
use crate::observability::{log_event, Event};
use crate::source::Source;
use crate::store::Selector;

use super::order::{topological_order, CycleError};
use super::population::{Operation, Population};
use super::raw::RawData;

/// Rebuilds a query input from raw data
pub type InputConstructor = Arc<dyn Fn(&RawData) -> Value + Send + Sync>;

/// Splits the raw data of a multi-document query into one raw mapping
/// per document
pub type DocumentMapping = Arc<dyn Fn(&RawData) -> Value + Send + Sync>;

/// A source as seen by the engine
pub struct SourceBinding<'a> {
    pub source: &'a dyn Source,
    /// Absent data short-circuits the query
    pub required: bool,
}

/// Resolves population names to sources
pub trait SourceLookup: Sync {
    fn binding(&self, name: &str) -> ModelResult<SourceBinding<'_>>;

    /// Issue the fetches of a sequence selector concurrently
    fn parallel_fan_out(&self) -> bool {
        false
    }

    fn record_fetches(&self, _count: u64) {}
}

/// Outcome of one execution
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub input: Value,
    /// Resolved selector per population, in execution order
    pub selectors: Vec<(String, Option<Selector>)>,
    pub raw: RawData,
    /// First required source that came back absent
    pub missing: Option<String>,
}

impl QueryResult {
    pub fn selector(&self, source: &str) -> Option<&Selector> {
        self.selectors
            .iter()
            .find(|(name, _)| name == source)
            .and_then(|(_, s)| s.as_ref())
    }

    pub fn is_short_circuited(&self) -> bool {
        self.missing.is_some()
    }
}

/// Declarative plan: populations, input reconstruction and an optional
/// per-document splitter
#[derive(Default)]
pub struct Query {
    populations: Vec<Population>,
    input_constructor: Option<InputConstructor>,
    document_mapping: Option<DocumentMapping>,
    order: OnceLock<Result<Vec<usize>, CycleError>>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_population`](Self::add_population)
    pub fn population(mut self, population: Population) -> Self {
        self.add_population(population);
        self
    }

    pub fn add_population(&mut self, population: Population) {
        self.populations.push(population);
        self.order = OnceLock::new();
    }

    /// Builder form of [`set_input_constructor`](Self::set_input_constructor)
    pub fn input_constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawData) -> Value + Send + Sync + 'static,
    {
        self.set_input_constructor(f);
        self
    }

    pub fn set_input_constructor<F>(&mut self, f: F)
    where
        F: Fn(&RawData) -> Value + Send + Sync + 'static,
    {
        self.input_constructor = Some(Arc::new(f));
    }

    /// Make this a multi-document query. `f` must return a sequence of
    /// raw mappings, one per document.
    pub fn map_document<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawData) -> Value + Send + Sync + 'static,
    {
        self.document_mapping = Some(Arc::new(f));
        self
    }

    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    pub fn population_for(&self, source: &str) -> Option<&Population> {
        self.populations.iter().find(|p| p.name == source)
    }

    pub fn is_multi_document(&self) -> bool {
        self.document_mapping.is_some()
    }

    pub fn has_input_constructor(&self) -> bool {
        self.input_constructor.is_some()
    }

    /// Input for `raw`; without a constructor, the stored input
    pub fn construct_input(&self, raw: &RawData) -> Value {
        match &self.input_constructor {
            Some(f) => f(raw),
            None => raw.input().clone(),
        }
    }

    /// Raw mappings of a multi-document query, or `None` for single-document
    pub fn split_documents(&self, raw: &RawData) -> Option<Value> {
        self.document_mapping.as_ref().map(|f| f(raw))
    }

    /// Population indices in execution order, computed once
    pub fn order(&self) -> Result<&[usize], CycleError> {
        self.order
            .get_or_init(|| topological_order(&self.populations))
            .as_ref()
            .map(Vec::as_slice)
            .map_err(Clone::clone)
    }

    /// Resolve every population's selector against `raw`, in execution order
    pub fn selectors_for(&self, raw: &RawData) -> ModelResult<Vec<(String, Option<Selector>)>> {
        Ok(self
            .order()?
            .iter()
            .map(|&i| {
                let p = &self.populations[i];
                (p.name.clone(), p.resolve(raw))
            })
            .collect())
    }

    /// Run the query for `input`
    pub async fn exec<L: SourceLookup>(&self, sources: &L, input: Value) -> ModelResult<QueryResult> {
        // Step 1: order first so a cycle is reported before any fetch
        let order = self.order()?;

        // Step 2: accumulator
        let mut raw = RawData::new(input.clone());
        let mut selectors = Vec::with_capacity(order.len());
        let mut missing = None;

        // Step 3: populate
        for &i in order {
            let population = &self.populations[i];
            let binding = sources.binding(&population.name)?;

            let selector = population.resolve(&raw);
            let value = match &selector {
                Some(selector) => {
                    let (value, fetches) = fetch(
                        binding.source,
                        population.operation,
                        selector,
                        sources.parallel_fan_out(),
                    )
                    .await?;
                    sources.record_fetches(fetches);
                    let fetched = fetches.to_string();
                    log_event(
                        Event::PopulationFetch,
                        &[
                            ("fetches", fetched.as_str()),
                            ("operation", population.operation.as_str()),
                            ("source", population.name.as_str()),
                        ],
                    );
                    value
                }
                None => Value::Null,
            };

            let absent = value.is_null();
            selectors.push((population.name.clone(), selector));
            raw.insert(population.name.clone(), value);

            // Step 4: short-circuit
            if binding.required && absent {
                missing = Some(population.name.clone());
                break;
            }
        }

        // Step 5
        Ok(QueryResult {
            input,
            selectors,
            raw,
            missing,
        })
    }
}

/// Fetch once, or once per element of a sequence selector. Returns the
/// value and the number of fetches issued.
pub(crate) async fn fetch(
    source: &dyn Source,
    operation: Operation,
    selector: &Selector,
    parallel: bool,
) -> ModelResult<(Value, u64)> {
    let Some(items) = selector.to_sequence() else {
        return Ok((source.fetch(operation, selector).await?, 1));
    };

    let count = items.len() as u64;
    let values = if parallel {
        try_join_all(items.iter().map(|item| source.fetch(operation, item))).await?
    } else {
        let mut values = Vec::with_capacity(items.len());
        for item in &items {
            values.push(source.fetch(operation, item).await?);
        }
        values
    };
    Ok((Value::Array(values), count))
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("populations", &self.populations)
            .field("multi_document", &self.is_multi_document())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ModelError;
    use crate::source::{SourceFuture, SourceOp};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock source answering from a fixed table and recording every fetch
    struct MockSource {
        name: &'static str,
        records: Vec<Value>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Source for MockSource {
        fn fetch<'a>(&'a self, _operation: Operation, selector: &'a Selector) -> SourceFuture<'a, Value> {
            Box::pin(async move {
                let id = selector.as_query().and_then(|q| q.get("id")).cloned().unwrap_or(Value::Null);
                self.log.lock().unwrap().push(format!("{}:{}", self.name, id));
                Ok(self
                    .records
                    .iter()
                    .find(|r| r["id"] == id)
                    .cloned()
                    .unwrap_or(Value::Null))
            })
        }

        fn mutate<'a>(&'a self, _operations: Vec<SourceOp>) -> SourceFuture<'a, Vec<Value>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn kind(&self) -> &'static str {
            "mock"
        }
    }

    struct MockLookup {
        sources: HashMap<&'static str, (MockSource, bool)>,
        parallel: bool,
    }

    impl SourceLookup for MockLookup {
        fn binding(&self, name: &str) -> ModelResult<SourceBinding<'_>> {
            let (source, required) = self
                .sources
                .get(name)
                .ok_or_else(|| ModelError::UnknownSource(name.to_string()))?;
            Ok(SourceBinding {
                source,
                required: *required,
            })
        }

        fn parallel_fan_out(&self) -> bool {
            self.parallel
        }
    }

    fn lookup(parallel: bool) -> (MockLookup, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sources = HashMap::new();
        sources.insert(
            "post",
            (
                MockSource {
                    name: "post",
                    records: vec![json!({"id": 1, "author": 9, "tags": [2, 1]})],
                    log: log.clone(),
                },
                true,
            ),
        );
        sources.insert(
            "author",
            (
                MockSource {
                    name: "author",
                    records: vec![json!({"id": 9, "name": "Ada"})],
                    log: log.clone(),
                },
                false,
            ),
        );
        sources.insert(
            "tags",
            (
                MockSource {
                    name: "tags",
                    records: vec![json!({"id": 1, "label": "one"}), json!({"id": 2, "label": "two"})],
                    log: log.clone(),
                },
                false,
            ),
        );
        (MockLookup { sources, parallel }, log)
    }

    fn chain_query() -> Query {
        Query::new()
            .population(
                Population::read_many("tags", |raw| {
                    let ids = raw.path("post.tags")?.as_array()?.clone();
                    Some(Selector::many(ids.into_iter().map(|id| json!({"id": id}))))
                })
                .require(["post"]),
            )
            .population(
                Population::read("author", |raw| Some(json!({"id": raw.at("post.author")}).into()))
                    .require(["post"]),
            )
            .population(Population::read("post", |raw| Some(json!({"id": raw.input()}).into())))
    }

    #[tokio::test]
    async fn test_exec_follows_dependencies() {
        let (sources, log) = lookup(false);
        let result = chain_query().exec(&sources, json!(1)).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["post:1", "tags:2", "tags:1", "author:9"]
        );
        assert_eq!(result.raw.at("author.name"), json!("Ada"));
        assert_eq!(result.raw.at("tags.0.label"), json!("two"));
        assert_eq!(result.raw.at("tags.1.label"), json!("one"));
        assert_eq!(result.selectors.len(), 3);
        assert_eq!(result.selectors[0].0, "post");
        assert!(result.missing.is_none());
    }

    #[tokio::test]
    async fn test_parallel_fan_out_keeps_order() {
        let (sources, _) = lookup(true);
        let result = chain_query().exec(&sources, json!(1)).await.unwrap();
        let labels: Vec<Value> = result.raw.source("tags").as_array().unwrap().iter().map(|t| t["label"].clone()).collect();
        assert_eq!(labels, vec![json!("two"), json!("one")]);
    }

    #[tokio::test]
    async fn test_required_source_short_circuits() {
        let (sources, log) = lookup(false);
        let result = chain_query().exec(&sources, json!(404)).await.unwrap();
        assert_eq!(result.missing.as_deref(), Some("post"));
        assert_eq!(*log.lock().unwrap(), vec!["post:404"]);
        assert_eq!(result.input, json!(404));
    }

    #[tokio::test]
    async fn test_none_selector_stores_null() {
        let (sources, log) = lookup(false);
        let query = Query::new().population(Population::read("author", |_| None));
        let result = query.exec(&sources, json!(1)).await.unwrap();
        assert!(result.raw.get("author").unwrap().is_null());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_rejected_before_fetch() {
        let (sources, log) = lookup(false);
        let query = Query::new()
            .population(Population::read("post", |_| Some(json!({"id": 1}).into())).require(["author"]))
            .population(Population::read("author", |_| Some(json!({"id": 9}).into())).require(["post"]));
        let err = query.exec(&sources, json!(1)).await.unwrap_err();
        assert!(matches!(err, ModelError::Cycle(_)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_input_constructor_defaults_to_input() {
        let raw = RawData::new(json!(5));
        assert_eq!(Query::new().construct_input(&raw), json!(5));
        let query = Query::new().input_constructor(|raw| raw.at("post.id"));
        let raw = RawData::from_value(json!({"post": {"id": 3}})).unwrap();
        assert_eq!(query.construct_input(&raw), json!(3));
    }

    #[test]
    fn test_selectors_for() {
        let query = chain_query();
        let raw = RawData::from_value(json!({"input": 1, "post": {"id": 1, "author": 9, "tags": [5]}})).unwrap();
        let selectors = query.selectors_for(&raw).unwrap();
        let names: Vec<&str> = selectors.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["post", "tags", "author"]);
        assert_eq!(selectors[1].1.as_ref().unwrap().to_value(), json!([{"id": 5}]));
    }
}
