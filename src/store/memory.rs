//! In-memory store
//!
//! Collections are ordered vectors of JSON records held behind a tokio
//! `RwLock`. Insertion order is preserved by every operation. Each call
//! takes the lock once, so a single call is atomic with respect to other
//! calls; nothing spans calls.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock as StdRwLock};

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::observability::{log_event, Event};

use super::errors::{StoreError, StoreResult};
use super::matcher::{json_type_name, QueryMatcher, WherePredicates};
use super::selector::Selector;
use super::update::{apply_patch, validate_patch};
use super::{Store, StoreFuture};

/// Maps collection -> ordered records
type Collections = HashMap<String, Vec<Value>>;

/// Process-local store for tests, fixtures and composition
pub struct MemoryStore {
    config: StoreConfig,
    collections: RwLock<Collections>,
    wheres: StdRwLock<WherePredicates>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            collections: RwLock::new(HashMap::new()),
            wheres: StdRwLock::new(HashMap::new()),
        }
    }

    /// Build a store pre-populated from `{collection: [records]}`.
    /// Records are stored as given; keys are not generated.
    pub fn from_json(fixture: Value) -> StoreResult<Self> {
        Ok(Self {
            config: StoreConfig::default(),
            collections: RwLock::new(parse_fixture(fixture)?),
            wheres: StdRwLock::new(HashMap::new()),
        })
    }

    pub fn key_field(&self) -> &str {
        &self.config.key_field
    }

    /// Make a predicate available to query documents as `{"$where": name}`
    pub fn register_where<F>(&self, name: impl Into<String>, predicate: F) -> StoreResult<()>
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let mut wheres = self
            .wheres
            .write()
            .map_err(|_| StoreError::Internal("Lock poisoned".into()))?;
        wheres.insert(name.into(), Arc::new(predicate));
        Ok(())
    }

    fn where_snapshot(&self) -> StoreResult<WherePredicates> {
        self.wheres
            .read()
            .map(|w| w.clone())
            .map_err(|_| StoreError::Internal("Lock poisoned".into()))
    }

    /// Append records to a collection as-is
    pub async fn seed(&self, collection: &str, records: Vec<Value>) -> StoreResult<()> {
        for record in &records {
            if !record.is_object() {
                return Err(StoreError::InvalidRecord(format!(
                    "expected mapping, got {}",
                    json_type_name(record)
                )));
            }
        }
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default().extend(records);
        Ok(())
    }

    /// Copy of every collection as `{collection: [records]}`
    pub async fn snapshot(&self) -> Value {
        let collections = self.collections.read().await;
        let mut out = Map::new();
        let mut names: Vec<&String> = collections.keys().collect();
        names.sort();
        for name in names {
            out.insert(name.clone(), Value::Array(collections[name].clone()));
        }
        Value::Object(out)
    }

    /// Number of records in a collection
    pub async fn count(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map(Vec::len).unwrap_or(0)
    }

    /// Replace all collections with the contents of a JSON fixture file
    pub async fn load_json_file(&self, path: impl AsRef<Path>) -> StoreResult<usize> {
        let text = tokio::fs::read_to_string(path).await?;
        let fixture: Value = serde_json::from_str(&text)?;
        let parsed = parse_fixture(fixture)?;
        let total = parsed.values().map(Vec::len).sum();

        let mut collections = self.collections.write().await;
        *collections = parsed;
        Ok(total)
    }

    /// Write all collections to a JSON fixture file
    pub async fn save_json_file(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let snapshot = self.snapshot().await;
        let text = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, text).await?;
        Ok(())
    }

    fn materialize_key(&self, record: Value) -> StoreResult<Value> {
        let mut map = match record {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::InvalidRecord(format!(
                    "expected mapping, got {}",
                    json_type_name(&other)
                )))
            }
        };
        let key = &self.config.key_field;
        if map.get(key).map(Value::is_null).unwrap_or(true) {
            map.insert(key.clone(), Value::String(Uuid::new_v4().to_string()));
        }
        Ok(Value::Object(map))
    }

    async fn create_records(&self, collection: &str, data: Value) -> StoreResult<Value> {
        let (records, many) = match data {
            Value::Array(items) => (items, true),
            single => (vec![single], false),
        };
        let records = records
            .into_iter()
            .map(|r| self.materialize_key(r))
            .collect::<StoreResult<Vec<_>>>()?;

        {
            let mut collections = self.collections.write().await;
            let existing = collections.entry(collection.to_string()).or_default();
            let key = &self.config.key_field;
            for (i, record) in records.iter().enumerate() {
                let id = &record[key];
                let taken = existing.iter().any(|r| &r[key] == id)
                    || records[..i].iter().any(|r| &r[key] == id);
                if taken {
                    return Err(StoreError::InvalidRecord(format!(
                        "duplicate key {} in '{}'",
                        id, collection
                    )));
                }
            }
            existing.extend(records.iter().cloned());
        }

        let count = records.len().to_string();
        log_event(Event::StoreWrite, &[("collection", collection), ("op", "create"), ("count", count.as_str())]);

        if many {
            Ok(Value::Array(records))
        } else {
            Ok(records.into_iter().next().unwrap_or(Value::Null))
        }
    }

    async fn read_records(&self, collection: &str, selector: &Selector) -> StoreResult<Vec<Value>> {
        let wheres = self.where_snapshot()?;
        let matcher = QueryMatcher::new(&wheres);
        let collections = self.collections.read().await;

        let mut out = Vec::new();
        if let Some(records) = collections.get(collection) {
            for record in records {
                if matcher.matches(record, selector)? {
                    out.push(record.clone());
                }
            }
        }
        Ok(out)
    }

    async fn update_records(
        &self,
        collection: &str,
        selector: &Selector,
        patch: &Value,
    ) -> StoreResult<Vec<Value>> {
        validate_patch(patch)?;
        let wheres = self.where_snapshot()?;
        let matcher = QueryMatcher::new(&wheres);

        let mut updated = Vec::new();
        {
            let mut collections = self.collections.write().await;
            if let Some(records) = collections.get_mut(collection) {
                // Patch copies first; nothing is written back unless every
                // matched record accepts the patch
                let mut staged = Vec::new();
                for (idx, record) in records.iter().enumerate() {
                    if !matcher.matches(record, selector)? {
                        continue;
                    }
                    let mut next = record.as_object().cloned().unwrap_or_default();
                    apply_patch(&mut next, patch)?;
                    staged.push((idx, Value::Object(next)));
                }
                for (idx, next) in staged {
                    records[idx] = next.clone();
                    updated.push(next);
                }
            }
        }

        let count = updated.len().to_string();
        log_event(Event::StoreWrite, &[("collection", collection), ("op", "update"), ("count", count.as_str())]);
        Ok(updated)
    }

    async fn delete_records(&self, collection: &str, selector: &Selector) -> StoreResult<Vec<Value>> {
        let wheres = self.where_snapshot()?;
        let matcher = QueryMatcher::new(&wheres);

        let mut removed = Vec::new();
        {
            let mut collections = self.collections.write().await;
            if let Some(records) = collections.get_mut(collection) {
                let hits = records
                    .iter()
                    .map(|record| matcher.matches(record, selector))
                    .collect::<StoreResult<Vec<bool>>>()?;
                let mut kept = Vec::with_capacity(records.len());
                for (record, hit) in records.drain(..).zip(hits) {
                    if hit {
                        removed.push(record);
                    } else {
                        kept.push(record);
                    }
                }
                *records = kept;
            }
        }

        let count = removed.len().to_string();
        log_event(Event::StoreWrite, &[("collection", collection), ("op", "delete"), ("count", count.as_str())]);
        Ok(removed)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn create<'a>(&'a self, collection: &'a str, data: Value) -> StoreFuture<'a, Value> {
        Box::pin(self.create_records(collection, data))
    }

    fn read<'a>(&'a self, collection: &'a str, selector: &'a Selector) -> StoreFuture<'a, Vec<Value>> {
        Box::pin(self.read_records(collection, selector))
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        selector: &'a Selector,
        patch: &'a Value,
    ) -> StoreFuture<'a, Vec<Value>> {
        Box::pin(self.update_records(collection, selector, patch))
    }

    fn delete<'a>(&'a self, collection: &'a str, selector: &'a Selector) -> StoreFuture<'a, Vec<Value>> {
        Box::pin(self.delete_records(collection, selector))
    }
}

fn parse_fixture(fixture: Value) -> StoreResult<Collections> {
    let Value::Object(map) = fixture else {
        return Err(StoreError::InvalidRecord(
            "fixture must be a mapping of collection -> records".into(),
        ));
    };

    let mut collections = HashMap::new();
    for (name, records) in map {
        let Value::Array(records) = records else {
            return Err(StoreError::InvalidRecord(format!(
                "collection '{}' must be an array",
                name
            )));
        };
        if let Some(bad) = records.iter().find(|r| !r.is_object()) {
            return Err(StoreError::InvalidRecord(format!(
                "collection '{}' holds a {}",
                name,
                json_type_name(bad)
            )));
        }
        collections.insert(name, records);
    }
    Ok(collections)
}
