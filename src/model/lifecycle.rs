//! Document creation and removal

use serde_json::{Map, Value};

use crate::document::{Document, RemovalReport};
use crate::errors::{ModelError, ModelResult};
use crate::observability::{log_event, Event};
use crate::query::{fetch, QueryResult, RawData, SourceLookup, DEFAULT_QUERY};
use crate::schema::Validator;
use crate::source::SourceOp;

use super::model::Model;

impl Model {
    /// Create the underlying records for a new document.
    ///
    /// 1. Merge defaults under `data`, resolving producers now
    /// 2. Validate against the create schema
    /// 3. Walk the default query's populations in order: sources the
    ///    initializer covers are created, the rest are read
    /// 4. Run initializer steps for sources outside the default query
    /// 5. Rebuild the input and project the new document
    ///
    /// Writes are sequential and not rolled back on failure.
    pub async fn create(&self, data: Value) -> ModelResult<Document> {
        let init = self
            .inner
            .initializer
            .as_ref()
            .ok_or_else(|| ModelError::NoInitializer(self.name().to_string()))?;
        let Value::Object(given) = data else {
            return Err(ModelError::Structural("create expects a mapping".into()));
        };

        // Step 1: defaults
        let data = self.with_defaults(given);

        // Step 2: validate
        let report = Validator::validate(&self.inner.create_schema, &data);
        if !report.is_valid() {
            self.inner.metrics.increment_validation_failures();
            let count = report.errors.len().to_string();
            log_event(
                Event::MutationRejected,
                &[("errors", count.as_str()), ("model", self.name()), ("op", "create")],
            );
            return Err(ModelError::Validation(report));
        }

        // Step 3: default query order
        let default = self.default_query()?;
        let mut raw = RawData::new(Value::Null);
        for &i in default.order()? {
            let population = &default.populations()[i];
            if let Some(step) = init.step_for(&population.name) {
                self.run_step(step, &data, &mut raw).await?;
                continue;
            }
            let value = match population.resolve(&raw) {
                Some(selector) => {
                    let entry = self.source(&population.name)?;
                    let (value, fetches) = fetch(
                        entry.source.as_ref(),
                        population.operation,
                        &selector,
                        self.parallel_fan_out(),
                    )
                    .await?;
                    self.record_fetches(fetches);
                    value
                }
                None => Value::Null,
            };
            raw.insert(population.name.clone(), value);
        }

        // Step 4: the rest of the plan
        for step in &init.sources {
            if default.population_for(&step.source).is_none() {
                self.run_step(step, &data, &mut raw).await?;
            }
        }

        // Step 5: materialize
        let query_name = init.query.as_deref().unwrap_or(DEFAULT_QUERY);
        let query = self.query_def(query_name)?;
        let input = query.construct_input(&raw);
        raw.set_input(input.clone());
        let selectors = query.selectors_for(&raw)?;
        let projected = self.project(&raw);

        self.inner.metrics.increment_created();
        let rendered = input.to_string();
        log_event(
            Event::CreateComplete,
            &[("input", rendered.as_str()), ("model", self.name())],
        );

        let result = QueryResult {
            input,
            selectors,
            raw,
            missing: None,
        };
        Ok(Document::new(self.clone(), query_name, result, Some(projected)).into_new())
    }

    /// Remove the document `input` names.
    ///
    /// With a remove plan, its steps run in order; otherwise every bound
    /// source is swept using the default query's selector for it.
    pub async fn del(&self, input: Value, query_name: &str) -> ModelResult<Vec<RemovalReport>> {
        let query = self.query_def(query_name)?;
        let mut raw = query.exec(self, input.clone()).await?.raw;

        let mut reports = Vec::new();
        if let Some(plan) = &self.inner.remove {
            for step in &plan.sources {
                let results = self.run_step(step, &input, &mut raw).await?;
                reports.push(RemovalReport::new(&step.source, results));
            }
        } else {
            for entry in self.inner.sources.iter().filter(|s| s.bound) {
                if self.default_selector(&entry.name, &raw)?.is_none() {
                    continue;
                }
                let ops = self.bind_ops(&entry.name, vec![SourceOp::remove()], &raw)?;
                let results = self.dispatch(&entry.name, ops).await?;
                reports.push(RemovalReport::new(&entry.name, results));
            }
        }

        self.inner.metrics.increment_removed();
        let sources: Vec<&str> = reports.iter().map(|r| r.source.as_str()).collect();
        let sources = sources.join(",");
        log_event(
            Event::RemoveComplete,
            &[("model", self.name()), ("sources", sources.as_str())],
        );
        Ok(reports)
    }

    /// `data` over resolved defaults
    fn with_defaults(&self, given: Map<String, Value>) -> Value {
        let source = Value::Object(given.clone());
        let mut merged = Map::new();
        for (name, field) in &self.inner.fields {
            if given.contains_key(name) {
                continue;
            }
            if let Some(default) = &field.default {
                merged.insert(name.clone(), default.resolve(&source));
            }
        }
        merged.extend(given);
        Value::Object(merged)
    }
}
