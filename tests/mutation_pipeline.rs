//! Mutation Pipeline Tests
//!
//! - Bulk patches collapse into one write per (source, operation)
//! - Validation failures issue no writes
//! - A mutation returns what a fresh query would
//! - Named mutations, immutable fields and unknown names
//! - A step's result remap is what later steps see

mod common;

use std::sync::Arc;

use common::{author_population, blog_fixture, post_population, RecordingStore};
use docmodel::model::{FieldDescriptor, Model, MutationPlan, PlanStep};
use docmodel::query::{Query, DEFAULT_QUERY};
use docmodel::schema::TypeDescriptor;
use docmodel::source::{SourceOp, StoreSource};
use docmodel::{ModelError, Patch};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn post_query() -> Query {
    Query::new()
        .population(post_population())
        .population(author_population())
        .input_constructor(|raw| raw.at("post.id"))
}

fn editable_model(store: &Arc<RecordingStore>) -> Model {
    Model::builder("post")
        .add_source("post", StoreSource::new(store.clone(), "posts"), true, false)
        .source("author", StoreSource::new(store.clone(), "authors"))
        .query(DEFAULT_QUERY, post_query())
        .field(
            "title",
            FieldDescriptor::new(TypeDescriptor::string())
                .data_path("post.title")
                .mutation(MutationPlan::assign("post", "title")),
        )
        .field(
            "content",
            FieldDescriptor::new(TypeDescriptor::string())
                .data_path("post.content")
                .mutation(MutationPlan::assign("post", "content")),
        )
        .field(
            "author",
            FieldDescriptor::untyped()
                .data_path("post.author")
                .mutation(MutationPlan::assign("post", "author").typed(TypeDescriptor::number())),
        )
        .field(
            "authorName",
            FieldDescriptor::new(TypeDescriptor::string())
                .data_path("author.name")
                .mutation(MutationPlan::assign("author", "name")),
        )
        .field(
            "slug",
            FieldDescriptor::new(TypeDescriptor::string())
                .data_path("post.slug")
                .mutation(MutationPlan::assign("post", "slug"))
                .read_only(),
        )
        .field("created", FieldDescriptor::untyped().data_path("post.dateCreated"))
        .mutation(
            "touch",
            MutationPlan::assign("post", "touched").typed(TypeDescriptor::boolean()),
        )
        .build()
        .unwrap()
}

/// Data part of a recorded `update:collection:selector:data` call
fn update_data(call: &str, prefix: &str) -> Value {
    let rest = call.strip_prefix(prefix).unwrap();
    serde_json::from_str(rest).unwrap()
}

// =============================================================================
// Grouped bulk mutation
// =============================================================================

#[tokio::test]
async fn test_bulk_mutation_issues_one_grouped_update() {
    let store = RecordingStore::new(blog_fixture());
    let model = editable_model(&store);
    let doc = model.get(json!(1)).await.unwrap();
    store.clear();

    let updated = doc.mutate(json!({"title": "T", "content": "C"})).await.unwrap();

    let updates = store.calls_of("update");
    assert_eq!(updates.len(), 1, "{:?}", updates);
    let prefix = r#"update:posts:{"id":1}:"#;
    assert!(updates[0].starts_with(prefix), "{}", updates[0]);
    assert_eq!(update_data(&updates[0], prefix), json!({"title": "T", "content": "C"}));

    assert_eq!(updated.get("title"), Some(&json!("T")));
    assert_eq!(updated.get("content"), Some(&json!("C")));

    // The original document is left as it was
    assert_eq!(doc.get("title"), Some(&json!("Post 1")));
}

#[tokio::test]
async fn test_groups_dispatch_in_source_order() {
    let store = RecordingStore::new(blog_fixture());
    let model = editable_model(&store);
    let doc = model.get(json!(1)).await.unwrap();
    store.clear();

    let updated = doc
        .mutate(json!({"authorName": "Ada L.", "title": "T"}))
        .await
        .unwrap();

    let updates = store.calls_of("update");
    assert_eq!(updates.len(), 2);
    assert!(updates[0].starts_with("update:posts:"));
    assert!(updates[1].starts_with(r#"update:authors:{"id":1}:"#));
    assert_eq!(updated.get("authorName"), Some(&json!("Ada L.")));
    assert_eq!(model.metrics().snapshot().writes_issued, 2);
}

// =============================================================================
// Validation rejection
// =============================================================================

#[tokio::test]
async fn test_validation_rejection_leaves_store_unchanged() {
    let store = RecordingStore::new(blog_fixture());
    let model = editable_model(&store);
    let doc = model.get(json!(1)).await.unwrap();
    let before = store.memory().snapshot().await;
    store.clear();

    let err = doc.mutate(json!({"author": "bob"})).await.unwrap_err();
    assert!(matches!(err, ModelError::Validation(_)));
    assert!(!err.is_structural());
    let report = err.report().unwrap();
    assert!(!report.is_valid());
    assert_eq!(report.first().unwrap().field, "author");
    assert_eq!(report.first().unwrap().actual, json!("bob"));

    assert!(store.calls_of("update").is_empty());
    assert_eq!(store.memory().snapshot().await, before);
    assert_eq!(model.metrics().snapshot().validation_failures, 1);
}

/// Defaults take part in validation even when the patch itself is fine
#[tokio::test]
async fn test_invalid_default_blocks_every_write() {
    let store = RecordingStore::new(blog_fixture());
    let model = Model::builder("post")
        .source("post", StoreSource::new(store.clone(), "posts"))
        .query(DEFAULT_QUERY, Query::new().population(post_population()))
        .field(
            "title",
            FieldDescriptor::new(TypeDescriptor::string())
                .data_path("post.title")
                .mutation(MutationPlan::assign("post", "title")),
        )
        .field(
            "views",
            FieldDescriptor::new(TypeDescriptor::number())
                .mutation(MutationPlan::assign("post", "views"))
                .default_value(json!("many")),
        )
        .build()
        .unwrap();
    let doc = model.get(json!(1)).await.unwrap();
    store.clear();

    let err = doc.mutate(json!({"title": "fine"})).await.unwrap_err();
    assert!(matches!(err, ModelError::Validation(_)));
    assert!(store.calls().iter().all(|c| !c.starts_with("update:")));
}

// =============================================================================
// Re-materialization
// =============================================================================

#[tokio::test]
async fn test_mutation_equals_write_then_query() {
    let store = RecordingStore::new(blog_fixture());
    let model = editable_model(&store);
    let doc = model.get(json!(1)).await.unwrap();

    let updated = doc.mutate(json!({"title": "Fresh", "author": 2})).await.unwrap();
    let fresh = model.query_one(doc.query(), doc.input().clone()).await.unwrap();

    assert_eq!(updated.data(), fresh.data());
    assert_eq!(updated.get("authorName"), Some(&json!("Grace")));
    assert_eq!(updated.input(), doc.input());
}

#[tokio::test]
async fn test_mutate_without_document_raw() {
    let store = RecordingStore::new(blog_fixture());
    let model = editable_model(&store);

    let updated = model
        .mutate(json!(2), DEFAULT_QUERY, json!({"content": "edited"}), None)
        .await
        .unwrap();
    assert_eq!(updated.get("content"), Some(&json!("edited")));
    assert_eq!(store.calls_of("update"), vec![
        r#"update:posts:{"id":2}:{"content":"edited"}"#.to_string()
    ]);
}

// =============================================================================
// Filtering and defaults
// =============================================================================

#[tokio::test]
async fn test_non_modifiable_keys_are_dropped() {
    let store = RecordingStore::new(blog_fixture());
    let model = editable_model(&store);
    let doc = model.get(json!(1)).await.unwrap();
    store.clear();

    let updated = doc
        .mutate(json!({"title": "Kept", "slug": "hack", "created": "never", "bogus": 1}))
        .await
        .unwrap();

    let updates = store.calls_of("update");
    assert_eq!(updates.len(), 1);
    let prefix = r#"update:posts:{"id":1}:"#;
    assert_eq!(update_data(&updates[0], prefix), json!({"title": "Kept"}));
    assert_eq!(updated.get("slug"), Some(&Value::Null));
}

#[tokio::test]
async fn test_defaults_fill_absent_modifiable_fields() {
    let store = RecordingStore::new(blog_fixture());
    let model = Model::builder("post")
        .source("post", StoreSource::new(store.clone(), "posts"))
        .query(DEFAULT_QUERY, Query::new().population(post_population()))
        .field(
            "title",
            FieldDescriptor::new(TypeDescriptor::string())
                .data_path("post.title")
                .mutation(MutationPlan::assign("post", "title")),
        )
        .field(
            "dateUpdated",
            FieldDescriptor::new(TypeDescriptor::string())
                .data_path("post.dateUpdated")
                .mutation(MutationPlan::assign("post", "dateUpdated"))
                .default_value(json!("2024-06-01")),
        )
        .build()
        .unwrap();
    let doc = model.get(json!(1)).await.unwrap();
    store.clear();

    let updated = doc.mutate(json!({"title": "x"})).await.unwrap();
    let updates = store.calls_of("update");
    assert_eq!(updates.len(), 1);
    let prefix = r#"update:posts:{"id":1}:"#;
    assert_eq!(
        update_data(&updates[0], prefix),
        json!({"title": "x", "dateUpdated": "2024-06-01"})
    );
    assert_eq!(updated.get("dateUpdated"), Some(&json!("2024-06-01")));

    // A given value wins over the default
    let again = updated
        .mutate(json!({"dateUpdated": "2025-01-01"}))
        .await
        .unwrap();
    assert_eq!(again.get("dateUpdated"), Some(&json!("2025-01-01")));
}

#[tokio::test]
async fn test_mutate_rejects_non_mapping() {
    let store = RecordingStore::new(blog_fixture());
    let model = editable_model(&store);
    let doc = model.get(json!(1)).await.unwrap();

    let err = doc.mutate(json!(["title"])).await.unwrap_err();
    assert!(err.is_structural());
}

// =============================================================================
// Named mutations
// =============================================================================

#[tokio::test]
async fn test_named_field_mutation() {
    let store = RecordingStore::new(blog_fixture());
    let model = editable_model(&store);
    let doc = model.get(json!(1)).await.unwrap();

    let updated = doc.mutate(Patch::named("title", json!("Named"))).await.unwrap();
    assert_eq!(updated.get("title"), Some(&json!("Named")));
}

#[tokio::test]
async fn test_registered_mutation() {
    let store = RecordingStore::new(blog_fixture());
    let model = editable_model(&store);
    let doc = model.get(json!(1)).await.unwrap();
    store.clear();

    let updated = doc.mutate(Patch::named("touch", json!(true))).await.unwrap();
    assert_eq!(updated.raw().at("post.touched"), json!(true));
    assert_eq!(
        store.calls_of("update"),
        vec![r#"update:posts:{"id":1}:{"touched":true}"#.to_string()]
    );

    let err = doc.mutate(Patch::named("touch", json!("yes"))).await.unwrap_err();
    assert!(matches!(err, ModelError::Validation(_)));
    assert_eq!(err.report().unwrap().first().unwrap().field, "touch");
}

#[tokio::test]
async fn test_named_mutation_errors() {
    let store = RecordingStore::new(blog_fixture());
    let model = editable_model(&store);
    let doc = model.get(json!(1)).await.unwrap();

    // Read-only field
    let err = doc.mutate(Patch::named("slug", json!("x"))).await.unwrap_err();
    assert!(matches!(err, ModelError::ImmutableField(ref f) if f == "slug"));

    // Field without a mutation plan
    let err = doc.mutate(Patch::named("created", json!(T_LATER))).await.unwrap_err();
    assert!(matches!(err, ModelError::ImmutableField(ref f) if f == "created"));

    // Neither a field nor a registered mutation
    let err = doc.mutate(Patch::named("publish", json!(true))).await.unwrap_err();
    assert!(matches!(err, ModelError::UnknownMutation(ref m) if m == "publish"));
    assert!(err.is_structural());

    assert!(store.calls_of("update").is_empty());
}

const T_LATER: &str = "2025-01-01T00:00:00Z";

#[tokio::test]
async fn test_named_mutation_type_check() {
    let store = RecordingStore::new(blog_fixture());
    let model = editable_model(&store);
    let doc = model.get(json!(1)).await.unwrap();

    let err = doc.mutate(Patch::named("author", json!("bob"))).await.unwrap_err();
    let issue = err.report().unwrap().first().unwrap().clone();
    assert_eq!(issue.field, "author");
    assert!(store.calls_of("update").is_empty());
}

/// The first step's remap records the outgoing author; the second step
/// renames that author through it
#[tokio::test]
async fn test_step_result_feeds_later_steps() {
    let store = RecordingStore::new(blog_fixture());
    let handover = MutationPlan::new()
        .step(
            PlanStep::new("post", |value, _| vec![SourceOp::update(json!({ "author": value }))]).with_result(
                |mut raw| {
                    let previous = raw.at("post.author");
                    raw.insert("previousAuthor", previous);
                    raw
                },
            ),
        )
        .step(PlanStep::new("author", |_, raw| {
            vec![SourceOp::update(json!({"name": "former"})).with_selector(json!({"id": raw.at("previousAuthor")}))]
        }))
        .typed(TypeDescriptor::number());
    let model = Model::builder("post")
        .add_source("post", StoreSource::new(store.clone(), "posts"), true, false)
        .source("author", StoreSource::new(store.clone(), "authors"))
        .query(DEFAULT_QUERY, post_query())
        .field("authorName", FieldDescriptor::untyped().data_path("author.name"))
        .mutation("handover", handover)
        .build()
        .unwrap();
    let doc = model.get(json!(1)).await.unwrap();
    store.clear();

    let updated = doc.mutate(Patch::named("handover", json!(2))).await.unwrap();

    assert_eq!(
        store.calls_of("update"),
        vec![
            r#"update:posts:{"id":1}:{"author":2}"#.to_string(),
            r#"update:authors:{"id":1}:{"name":"former"}"#.to_string(),
        ]
    );
    assert_eq!(updated.get("authorName"), Some(&json!("Grace")));
    let snapshot = store.memory().snapshot().await;
    assert_eq!(snapshot["authors"][0]["name"], "former");
}
