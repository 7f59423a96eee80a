//! Integration tests for relationship evaluation.
//!
//! These tests exercise the full walk over a small blog domain: posts with
//! comments (nested), comment authors (nested), and tags (leaf). Fetches run
//! against in-memory sources so every load can be observed.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::json;
use sideload::prelude::*;

fn post(id: i64, author_id: i64) -> SharedRecord {
    JsonRecord::shared("Post", json!({"id": id, "author_id": author_id}))
}

fn comment(id: i64, post_id: i64, author_id: i64) -> SharedRecord {
    JsonRecord::shared(
        "Comment",
        json!({"id": id, "post_id": post_id, "author_id": author_id}),
    )
}

fn user(id: i64) -> SharedRecord {
    JsonRecord::shared("User", json!({"id": id}))
}

fn tag(id: i64, post_id: i64) -> SharedRecord {
    JsonRecord::shared("Tag", json!({"id": id, "post_id": post_id}))
}

struct Fixture {
    comments: Arc<MemorySource>,
    users: Arc<MemorySource>,
    tags: Arc<MemorySource>,
    post_def: Arc<WrapperDef>,
    engine: Engine,
}

fn fixture() -> Fixture {
    let comments = MemorySource::new(
        "comments",
        "post_id",
        vec![comment(1, 10, 100), comment(2, 10, 101), comment(3, 20, 100)],
    );
    let users = MemorySource::keyed_by_id("users", vec![user(100), user(101)]);
    let tags = MemorySource::new("tags", "post_id", vec![tag(7, 10)]);

    let comment_def = WrapperDef::new("CommentWrapper")
        .relationship(RelationshipSpec::nested("author", "author_id", users.clone()))
        .build();
    let user_def = WrapperDef::new("UserWrapper").build();
    let post_def = WrapperDef::new("PostWrapper")
        .relationship(RelationshipSpec::nested("comments", "id", comments.clone()))
        .relationship(RelationshipSpec::nested("author", "author_id", users.clone()))
        .relationship(RelationshipSpec::leaf("tags", "id", tags.clone()))
        .build();

    let mut wrappers = WrapperRegistry::new();
    wrappers.register("Post", post_def.clone());
    wrappers.register("Comment", comment_def);
    wrappers.register("User", user_def);

    Fixture {
        comments,
        users,
        tags,
        post_def,
        engine: Engine::new(wrappers),
    }
}

fn include(spec: &str) -> Arc<IncludeTree> {
    Arc::new(IncludeTree::parse(spec).unwrap())
}

/// Scenario: `comments.author` loads comments and their authors, never tags.
#[tokio::test]
async fn test_nested_descent_with_pruned_directive() {
    let fx = fixture();
    let evaluation = fx
        .engine
        .evaluate(WrapperInstance::new(
            fx.post_def.clone(),
            post(10, 100),
            include("comments.author"),
        ))
        .await
        .unwrap();

    let root = evaluation.root().unwrap();
    let comments = root.nested("comments").unwrap();
    assert_eq!(comments.len(), 2);

    for node in comments {
        let authors = node.nested("author").unwrap();
        assert_eq!(authors.len(), 1);
        // Sub-directive for author is empty: authors resolve nothing further.
        assert_eq!(authors[0].relationships().len(), 0);
    }

    // The tags relationship was declared but never requested.
    assert!(root.relationship("tags").is_none());
    assert_eq!(fx.tags.fetch_calls(), 0);
    assert_eq!(fx.comments.fetch_calls(), 1);
    assert_eq!(fx.users.fetch_calls(), 1);
}

/// Scenario: the empty directive loads nothing at all.
#[tokio::test]
async fn test_empty_directive_is_noop() {
    let fx = fixture();
    let evaluation = fx
        .engine
        .evaluate(WrapperInstance::new(
            fx.post_def.clone(),
            post(10, 100),
            Arc::new(IncludeTree::new()),
        ))
        .await
        .unwrap();

    assert!(evaluation.root().unwrap().relationships().is_empty());
    assert_eq!(fx.comments.fetch_calls(), 0);
    assert_eq!(fx.users.fetch_calls(), 0);
    assert_eq!(fx.tags.fetch_calls(), 0);
}

/// Scenario: a relationship resolving to zero records creates no wrappers
/// and raises no error.
#[tokio::test]
async fn test_empty_resolution_short_circuits() {
    let fx = fixture();
    let evaluation = fx
        .engine
        .evaluate(WrapperInstance::new(
            fx.post_def.clone(),
            post(30, 100), // no comments, no tags for post 30
            include("comments.author,tags"),
        ))
        .await
        .unwrap();

    let root = evaluation.root().unwrap();
    assert_eq!(root.nested("comments").unwrap().len(), 0);
    assert_eq!(root.records("tags").unwrap().len(), 0);
    // Comments resolved empty, so no author pass happened at all.
    assert_eq!(fx.users.fetch_calls(), 0);
}

/// Cardinality: k resolved records yield exactly k wrappers, in fetch order.
#[tokio::test]
async fn test_cardinality_and_order_preserved() {
    let fx = fixture();
    let evaluation = fx
        .engine
        .evaluate(WrapperInstance::new(
            fx.post_def.clone(),
            post(10, 100),
            include("comments"),
        ))
        .await
        .unwrap();

    let ids: Vec<_> = evaluation
        .root()
        .unwrap()
        .nested("comments")
        .unwrap()
        .iter()
        .map(|node| node.record().id())
        .collect();
    assert_eq!(ids, vec![KeyValue::Int(1), KeyValue::Int(2)]);
}

/// Leaf relationships resolve to records, never to wrapped nodes.
#[tokio::test]
async fn test_leaf_relationship_yields_records() {
    let fx = fixture();
    let evaluation = fx
        .engine
        .evaluate(WrapperInstance::new(
            fx.post_def.clone(),
            post(10, 100),
            include("tags"),
        ))
        .await
        .unwrap();

    let root = evaluation.root().unwrap();
    let records = root.records("tags").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id(), KeyValue::Int(7));
    assert!(root.nested("tags").is_none());
}

/// A directive entry with no matching declaration is silently ignored.
#[tokio::test]
async fn test_unknown_relationship_is_not_an_error() {
    let fx = fixture();
    let evaluation = fx
        .engine
        .evaluate(WrapperInstance::new(
            fx.post_def.clone(),
            post(10, 100),
            include("reactions.author,comments"),
        ))
        .await
        .unwrap();

    let root = evaluation.root().unwrap();
    assert!(root.relationship("reactions").is_none());
    assert!(root.nested("comments").is_some());
}

/// Multiple roots evaluated in one pass, mixed relationship outcomes.
#[tokio::test]
async fn test_evaluate_many_roots() {
    let fx = fixture();
    let instances = vec![
        WrapperInstance::new(fx.post_def.clone(), post(10, 100), include("comments")),
        WrapperInstance::new(fx.post_def.clone(), post(20, 101), include("comments")),
    ];

    let evaluation = fx.engine.evaluate_many(instances).await.unwrap();
    assert_eq!(evaluation.roots().len(), 2);
    assert_eq!(evaluation.roots()[0].nested("comments").unwrap().len(), 2);
    assert_eq!(evaluation.roots()[1].nested("comments").unwrap().len(), 1);
}

#[derive(Debug)]
struct FailingSource;

#[async_trait]
impl FetchSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch_batch(
        &self,
        _keys: &[KeyValue],
    ) -> SideloadResult<IndexMap<KeyValue, Vec<SharedRecord>>> {
        Err(SideloadError::load_failed("backend unavailable"))
    }
}

fn failing_fixture() -> (Engine, Arc<WrapperDef>, Arc<MemorySource>) {
    let comments = MemorySource::new("comments", "post_id", vec![comment(1, 10, 100)]);

    let comment_def = WrapperDef::new("CommentWrapper")
        .relationship(RelationshipSpec::nested(
            "author",
            "author_id",
            Arc::new(FailingSource),
        ))
        .build();
    let post_def = WrapperDef::new("PostWrapper")
        .relationship(RelationshipSpec::nested("comments", "id", comments.clone()))
        .build();

    let mut wrappers = WrapperRegistry::new();
    wrappers.register("Post", post_def.clone());
    wrappers.register("Comment", comment_def);

    (Engine::new(wrappers), post_def, comments)
}

/// Scenario: the author load fails; the comments branch is unaffected and
/// the reported failure identifies the relationship and the owner.
#[tokio::test]
async fn test_failure_identifies_relationship_and_owner() {
    let (engine, post_def, _comments) = failing_fixture();

    let err = engine
        .evaluate(WrapperInstance::new(
            post_def,
            post(10, 100),
            include("comments.author"),
        ))
        .await
        .unwrap_err();

    assert!(err.is_branches_failed());
    assert_eq!(err.relationship.as_deref(), Some("author"));
    assert_eq!(err.owner_type.as_deref(), Some("Comment"));
    assert_eq!(err.owner_key, Some(KeyValue::Int(1)));
}

/// Under partial-result tolerance, sibling branches keep their results and
/// failures are listed instead of failing the pass.
#[tokio::test]
async fn test_tolerate_mode_keeps_sibling_results() {
    let (engine, post_def, comments) = failing_fixture();
    let engine = engine.with_failure_mode(FailureMode::Tolerate);

    let evaluation = engine
        .evaluate(WrapperInstance::new(
            post_def,
            post(10, 100),
            include("comments.author"),
        ))
        .await
        .unwrap();

    // Comments resolved before the author failure and are still wrapped.
    let root = evaluation.root().unwrap();
    let nodes = root.nested("comments").unwrap();
    assert_eq!(nodes.len(), 1);
    assert!(nodes[0].relationship("author").is_none());
    assert_eq!(comments.fetch_calls(), 1);

    assert_eq!(evaluation.failures().len(), 1);
    let failure = &evaluation.failures()[0];
    assert_eq!(failure.relationship, "author");
    assert_eq!(failure.owner_type, "Comment");
    assert!(failure.error.is_load_failed());
}

/// A failing relationship does not disturb a sibling relationship of the
/// same owner.
#[tokio::test]
async fn test_sibling_relationship_unaffected_by_failure() {
    let comments = MemorySource::new("comments", "post_id", vec![comment(1, 10, 100)]);
    let comment_def = WrapperDef::new("CommentWrapper").build();
    let post_def = WrapperDef::new("PostWrapper")
        .relationship(RelationshipSpec::nested("comments", "id", comments.clone()))
        .relationship(RelationshipSpec::nested(
            "author",
            "author_id",
            Arc::new(FailingSource),
        ))
        .build();

    let mut wrappers = WrapperRegistry::new();
    wrappers.register("Post", post_def.clone());
    wrappers.register("Comment", comment_def);

    let engine = Engine::new(wrappers).with_failure_mode(FailureMode::Tolerate);
    let evaluation = engine
        .evaluate(WrapperInstance::new(
            post_def,
            post(10, 100),
            include("comments,author"),
        ))
        .await
        .unwrap();

    let root = evaluation.root().unwrap();
    assert_eq!(root.nested("comments").unwrap().len(), 1);
    assert!(root.relationship("author").is_none());
    assert_eq!(evaluation.failures().len(), 1);
    assert_eq!(evaluation.failures()[0].relationship, "author");
    assert_eq!(evaluation.failures()[0].owner_type, "Post");
}

/// A null foreign key resolves empty without touching the source.
#[tokio::test]
async fn test_null_foreign_key_resolves_empty() {
    let users = MemorySource::keyed_by_id("users", vec![user(100)]);
    let post_def = WrapperDef::new("PostWrapper")
        .relationship(RelationshipSpec::nested("author", "author_id", users.clone()))
        .build();
    let user_def = WrapperDef::new("UserWrapper").build();

    let mut wrappers = WrapperRegistry::new();
    wrappers.register("Post", post_def.clone());
    wrappers.register("User", user_def);

    let orphan = JsonRecord::shared("Post", json!({"id": 1, "author_id": null}));
    let engine = Engine::new(wrappers);
    let evaluation = engine
        .evaluate(WrapperInstance::new(post_def, orphan, include("author")))
        .await
        .unwrap();

    assert_eq!(
        evaluation.root().unwrap().nested("author").unwrap().len(),
        0
    );
    assert_eq!(users.fetch_calls(), 0);
}
