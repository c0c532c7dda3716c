//! Model assembly
//!
//! Registration calls collect into a [`ModelBuilder`]; `build()` checks
//! the structure and compiles every schema once:
//! - a `default` query exists
//! - populations name declared sources, once per query, and require
//!   only populations of the same query
//! - plan steps name declared sources; mutation steps also need a
//!   population in the default query to derive selectors from
//! - mutation names are unique across named and field mutations
//!
//! Population cycles are not checked here; they surface when the query
//! first executes.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::errors::{ModelError, ModelResult};
use crate::observability::EngineMetrics;
use crate::query::{Query, RawData, DEFAULT_QUERY, INPUT_KEY};
use crate::schema::{Schema, TypeDescriptor, Validator};
use crate::source::Source;

use super::descriptor::{DataFn, FieldDescriptor};
use super::model::{Model, ModelInner, NamedMutation, SourceEntry};
use super::plan::{InitializerPlan, MutationPlan, PlanStep, RemovePlan};

/// Collects sources, queries, plans and the descriptor of a model
pub struct ModelBuilder {
    name: String,
    sources: Vec<SourceEntry>,
    bind: Vec<String>,
    queries: Vec<(String, Query)>,
    mutations: Vec<(String, MutationPlan)>,
    initializer: Option<InitializerPlan>,
    remove: Option<RemovePlan>,
    fields: Vec<(String, FieldDescriptor)>,
    data_map: Option<DataFn>,
    config: EngineConfig,
    metrics: Option<Arc<EngineMetrics>>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            bind: Vec::new(),
            queries: Vec::new(),
            mutations: Vec::new(),
            initializer: None,
            remove: None,
            fields: Vec::new(),
            data_map: None,
            config: EngineConfig::default(),
            metrics: None,
        }
    }

    /// Optional, single-record source
    pub fn source<S: Source + 'static>(self, name: impl Into<String>, source: S) -> Self {
        self.add_source(name, source, false, false)
    }

    pub fn add_source<S: Source + 'static>(
        mut self,
        name: impl Into<String>,
        source: S,
        required: bool,
        many: bool,
    ) -> Self {
        self.sources.push(SourceEntry {
            name: name.into(),
            source: Arc::new(source),
            required,
            many,
            bound: false,
        });
        self
    }

    /// Source whose records go when the document is removed
    pub fn bound_source<S: Source + 'static>(
        mut self,
        name: impl Into<String>,
        source: S,
        required: bool,
        many: bool,
    ) -> Self {
        self.sources.push(SourceEntry {
            name: name.into(),
            source: Arc::new(source),
            required,
            many,
            bound: true,
        });
        self
    }

    /// Mark already-declared sources as bound
    pub fn bind_sources<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bind.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn query(mut self, name: impl Into<String>, query: Query) -> Self {
        self.queries.push((name.into(), query));
        self
    }

    pub fn mutation(mut self, name: impl Into<String>, plan: MutationPlan) -> Self {
        self.mutations.push((name.into(), plan));
        self
    }

    pub fn initializer(mut self, plan: InitializerPlan) -> Self {
        self.initializer = Some(plan);
        self
    }

    pub fn remove(mut self, plan: RemovePlan) -> Self {
        self.remove = Some(plan);
        self
    }

    pub fn field(mut self, name: impl Into<String>, field: FieldDescriptor) -> Self {
        self.fields.push((name.into(), field));
        self
    }

    pub fn describe<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldDescriptor)>,
        K: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(|(k, f)| (k.into(), f)));
        self
    }

    /// Replace the descriptor-derived data map
    pub fn map<F>(mut self, f: F) -> Self
    where
        F: Fn(&RawData) -> Value + Send + Sync + 'static,
    {
        self.data_map = Some(Arc::new(f));
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a metrics registry (e.g. between composed models)
    pub fn metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> ModelResult<Model> {
        self.config.validate()?;
        let mut sources = self.sources;
        check_sources(&sources)?;

        for name in &self.bind {
            let entry = sources
                .iter_mut()
                .find(|s| s.name == *name)
                .ok_or_else(|| ModelError::UnknownSource(name.clone()))?;
            entry.bound = true;
        }

        let mut queries = BTreeMap::new();
        for (name, query) in self.queries {
            check_query(&name, &query, &sources)?;
            if queries.insert(name.clone(), query).is_some() {
                return Err(ModelError::Structural(format!("duplicate query '{}'", name)));
            }
        }
        let default = queries
            .get(DEFAULT_QUERY)
            .ok_or_else(|| ModelError::UnknownQuery(DEFAULT_QUERY.to_string()))?;

        // Named mutations first, then one per field that declares one
        let mut mutations = Vec::new();
        let mut seen = HashSet::new();
        for (name, plan) in self.mutations {
            check_mutation_steps(&name, &plan.sources, &sources, default)?;
            let kind = plan.kind.clone().unwrap_or_default();
            let schema = Validator::compile(&kind, false)?;
            if !seen.insert(name.clone()) {
                return Err(ModelError::Structural(format!("duplicate mutation '{}'", name)));
            }
            mutations.push(NamedMutation {
                name,
                plan,
                schema,
                modifiable: true,
            });
        }
        for (name, field) in &self.fields {
            let Some(plan) = &field.mutation else {
                continue;
            };
            check_mutation_steps(name, &plan.sources, &sources, default)?;
            if !seen.insert(name.clone()) {
                return Err(ModelError::Structural(format!("duplicate mutation '{}'", name)));
            }
            mutations.push(NamedMutation {
                name: name.clone(),
                plan: plan.clone(),
                schema: Validator::compile(field.mutation_type(), field.required)?,
                modifiable: field.modify,
            });
        }

        if let Some(init) = &self.initializer {
            check_steps(&init.sources, &sources)?;
            let query_name = init.query.as_deref().unwrap_or(DEFAULT_QUERY);
            let query = queries
                .get(query_name)
                .ok_or_else(|| ModelError::UnknownQuery(query_name.to_string()))?;
            // A created document is keyed only through the constructor
            if !query.has_input_constructor() {
                return Err(ModelError::Structural(format!(
                    "initializer query '{}' has no input constructor",
                    query_name
                )));
            }
            for (field, _) in &init.types {
                if !self.fields.iter().any(|(name, _)| name == field) {
                    return Err(ModelError::Structural(format!(
                        "initializer types unknown field '{}'",
                        field
                    )));
                }
            }
        }
        if let Some(remove) = &self.remove {
            check_steps(&remove.sources, &sources)?;
        }

        let mutation_schema = mutation_schema(&self.fields)?;
        let create_schema = create_schema(&self.fields, self.initializer.as_ref())?;

        Ok(Model {
            inner: Arc::new(ModelInner {
                name: self.name,
                sources,
                queries,
                mutations,
                initializer: self.initializer,
                remove: self.remove,
                fields: self.fields,
                data_map: self.data_map,
                mutation_schema,
                create_schema,
                config: self.config,
                metrics: self.metrics.unwrap_or_default(),
            }),
        })
    }
}

fn check_sources(sources: &[SourceEntry]) -> ModelResult<()> {
    let mut names = HashSet::new();
    for entry in sources {
        if entry.name == INPUT_KEY {
            return Err(ModelError::Structural(format!(
                "'{}' is reserved and cannot name a source",
                INPUT_KEY
            )));
        }
        if !names.insert(entry.name.as_str()) {
            return Err(ModelError::Structural(format!("duplicate source '{}'", entry.name)));
        }
    }
    Ok(())
}

fn check_query(name: &str, query: &Query, sources: &[SourceEntry]) -> ModelResult<()> {
    let mut populated = HashSet::new();
    for population in query.populations() {
        if !sources.iter().any(|s| s.name == population.name) {
            return Err(ModelError::UnknownSource(population.name.clone()));
        }
        if !populated.insert(population.name.as_str()) {
            return Err(ModelError::Structural(format!(
                "query '{}' populates '{}' twice",
                name, population.name
            )));
        }
    }
    for population in query.populations() {
        for dep in &population.require {
            if !populated.contains(dep.as_str()) {
                return Err(ModelError::Structural(format!(
                    "population '{}' of query '{}' requires '{}', which the query never populates",
                    population.name, name, dep
                )));
            }
        }
    }
    Ok(())
}

fn check_steps(steps: &[PlanStep], sources: &[SourceEntry]) -> ModelResult<()> {
    for step in steps {
        if !sources.iter().any(|s| s.name == step.source) {
            return Err(ModelError::UnknownSource(step.source.clone()));
        }
    }
    Ok(())
}

fn check_mutation_steps(name: &str, steps: &[PlanStep], sources: &[SourceEntry], default: &Query) -> ModelResult<()> {
    check_steps(steps, sources)?;
    for step in steps {
        if default.population_for(&step.source).is_none() {
            return Err(ModelError::Structural(format!(
                "mutation '{}' writes '{}', which the default query never populates",
                name, step.source
            )));
        }
    }
    Ok(())
}

/// Partial object over every modifiable field
fn mutation_schema(fields: &[(String, FieldDescriptor)]) -> ModelResult<Schema> {
    let mut properties = Vec::new();
    for (name, field) in fields.iter().filter(|(_, f)| f.is_modifiable()) {
        properties.push((name.clone(), Validator::compile(field.mutation_type(), field.required)?));
    }
    Ok(Schema::partial_object(properties))
}

/// Full object over every field, initializer types taking precedence
fn create_schema(fields: &[(String, FieldDescriptor)], init: Option<&InitializerPlan>) -> ModelResult<Schema> {
    let mut properties = Vec::new();
    for (name, field) in fields {
        let kind: &TypeDescriptor = init.and_then(|i| i.type_for(name)).unwrap_or(&field.kind);
        properties.push((name.clone(), Validator::compile(kind, field.required)?));
    }
    Ok(Schema::object(properties))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Population;
    use crate::source::{SourceOp, StoreSource};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn store_source(collection: &str) -> StoreSource {
        StoreSource::new(Arc::new(MemoryStore::new()), collection)
    }

    fn default_query() -> Query {
        Query::new().population(Population::read("post", |raw| Some(json!({"id": raw.input()}).into())))
    }

    #[test]
    fn test_build_minimal_model() {
        let model = Model::builder("post")
            .source("post", store_source("posts"))
            .query(DEFAULT_QUERY, default_query())
            .build()
            .unwrap();
        assert_eq!(model.name(), "post");
        assert!(model.default_query().is_ok());
    }

    #[test]
    fn test_initializer_query_needs_input_constructor() {
        let init = || InitializerPlan::new().source("post", |data, _| vec![SourceOp::create(data.clone())]);
        let err = Model::builder("post")
            .source("post", store_source("posts"))
            .query(DEFAULT_QUERY, default_query())
            .initializer(init())
            .build()
            .unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("input constructor"));

        let model = Model::builder("post")
            .source("post", store_source("posts"))
            .query(DEFAULT_QUERY, default_query().input_constructor(|raw| raw.at("post.id")))
            .initializer(init())
            .build();
        assert!(model.is_ok());
    }

    #[test]
    fn test_missing_default_query() {
        let err = Model::builder("post")
            .source("post", store_source("posts"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownQuery(q) if q == "default"));
    }

    #[test]
    fn test_population_must_name_declared_source() {
        let err = Model::builder("post")
            .query(DEFAULT_QUERY, default_query())
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownSource(s) if s == "post"));
    }

    #[test]
    fn test_require_must_be_populated() {
        let query = default_query().population(
            Population::read("author", |_| None).require(["tags"]),
        );
        let err = Model::builder("post")
            .source("post", store_source("posts"))
            .source("author", store_source("authors"))
            .query(DEFAULT_QUERY, query)
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::Structural(_)));
    }

    #[test]
    fn test_mutation_source_must_be_in_default_query() {
        let err = Model::builder("post")
            .source("post", store_source("posts"))
            .source("audit", store_source("audit"))
            .query(DEFAULT_QUERY, default_query())
            .mutation("touch", MutationPlan::assign("audit", "at"))
            .build()
            .unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("audit"));
    }

    #[test]
    fn test_unknown_bound_source() {
        let err = Model::builder("post")
            .source("post", store_source("posts"))
            .query(DEFAULT_QUERY, default_query())
            .bind_sources(["tags"])
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownSource(s) if s == "tags"));
    }

    #[test]
    fn test_reserved_source_name() {
        let err = Model::builder("post")
            .source("input", store_source("posts"))
            .query(DEFAULT_QUERY, Query::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::Structural(_)));
    }

    #[test]
    fn test_duplicate_mutation_name() {
        let err = Model::builder("post")
            .source("post", store_source("posts"))
            .query(DEFAULT_QUERY, default_query())
            .mutation("title", MutationPlan::assign("post", "title"))
            .field(
                "title",
                FieldDescriptor::new(TypeDescriptor::string()).mutation(MutationPlan::assign("post", "title")),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate mutation"));
    }

    #[test]
    fn test_cycles_are_left_to_execution() {
        let query = Query::new()
            .population(Population::read("post", |_| None).require(["author"]))
            .population(Population::read("author", |_| None).require(["post"]));
        let model = Model::builder("post")
            .source("post", store_source("posts"))
            .source("author", store_source("authors"))
            .query(DEFAULT_QUERY, query)
            .build();
        assert!(model.is_ok());
    }
}
