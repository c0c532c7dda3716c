//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use docmodel::query::{Population, Query};
use docmodel::store::{MemoryStore, Selector, Store, StoreFuture};
use serde_json::{json, Value};

pub const T: &str = "2024-01-01T00:00:00Z";

/// Blog fixture: posts with an author, tags and tag links
pub fn blog_fixture() -> Value {
    json!({
        "posts": [
            {"id": 1, "title": "Post 1", "content": "first", "dateCreated": T, "author": 1, "tags": [1, 2]},
            {"id": 2, "title": "Post 2", "content": "second", "dateCreated": T, "author": 2, "tags": []}
        ],
        "authors": [
            {"id": 1, "name": "Ada"},
            {"id": 2, "name": "Grace"}
        ],
        "tags": [
            {"id": 1, "label": "rust"},
            {"id": 2, "label": "db"}
        ],
        "tagLinks": [
            {"id": 1, "post": 1, "tag": 1},
            {"id": 2, "post": 1, "tag": 2},
            {"id": 3, "post": 2, "tag": 1}
        ]
    })
}

/// Memory store that records every call it receives
pub struct RecordingStore {
    inner: MemoryStore,
    calls: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new(fixture: Value) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::from_json(fixture).unwrap(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls of one kind ("read", "create", "update", "delete")
    pub fn calls_of(&self, kind: &str) -> Vec<String> {
        let prefix = format!("{}:", kind);
        self.calls().into_iter().filter(|c| c.starts_with(&prefix)).collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Store for RecordingStore {
    fn create<'a>(&'a self, collection: &'a str, data: Value) -> StoreFuture<'a, Value> {
        self.record(format!("create:{}:{}", collection, data));
        self.inner.create(collection, data)
    }

    fn read<'a>(&'a self, collection: &'a str, selector: &'a Selector) -> StoreFuture<'a, Vec<Value>> {
        self.record(format!("read:{}:{}", collection, selector.to_value()));
        self.inner.read(collection, selector)
    }

    fn update<'a>(
        &'a self,
        collection: &'a str,
        selector: &'a Selector,
        patch: &'a Value,
    ) -> StoreFuture<'a, Vec<Value>> {
        self.record(format!("update:{}:{}:{}", collection, selector.to_value(), patch));
        self.inner.update(collection, selector, patch)
    }

    fn delete<'a>(&'a self, collection: &'a str, selector: &'a Selector) -> StoreFuture<'a, Vec<Value>> {
        self.record(format!("delete:{}:{}", collection, selector.to_value()));
        self.inner.delete(collection, selector)
    }
}

/// `post` by input id
pub fn post_population() -> Population {
    Population::read("post", |raw| Some(json!({"id": raw.input()}).into()))
}

/// `author` through `post.author`
pub fn author_population() -> Population {
    Population::read("author", |raw| {
        let id = raw.path("post.author")?.clone();
        Some(json!({ "id": id }).into())
    })
    .require(["post"])
}

/// `tags` fanned out over `post.tags`
pub fn tags_population() -> Population {
    Population::read("tags", |raw| {
        let ids = raw.path("post.tags")?.as_array()?.clone();
        Some(Selector::many(ids.into_iter().map(|id| json!({ "id": id }))))
    })
    .require(["post"])
}

/// Every `tagLinks` record of the post
pub fn tag_links_population() -> Population {
    Population::read_many("tagLinks", |raw| {
        let id = raw.path("post.id")?.clone();
        Some(json!({ "post": id }).into())
    })
    .require(["post"])
}

/// Default blog query: post → author, tags, tagLinks; input is the post id
pub fn blog_query() -> Query {
    Query::new()
        .population(post_population())
        .population(author_population())
        .population(tags_population())
        .population(tag_links_population())
        .input_constructor(|raw| raw.at("post.id"))
}
