//! Publishing built indexes to an external vector backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use corpus_search::backend::{
    ARTICLE_COLLECTION, AUTHOR_COLLECTION, BackendRecord, CollectionSchema, IndexBackend,
    IndexParams, InMemoryBackend, STAGING_SUFFIX, SearchParams,
};
use corpus_search::vector::SearchHit;
use corpus_search::{
    BackendError, EntityKind, IndexKind, IvfParams, MAX_TITLE_LENGTH, ReplacePolicy, StoreConfig,
    StoreError,
};

use crate::common::{
    article, author, create_store_with, create_test_store, dim, random_corpus, random_vectors,
};

#[test]
fn test_build_publishes_both_collections() {
    let backend = Arc::new(InMemoryBackend::new());
    let store = create_test_store(4).with_backend(backend.clone());
    store.ingest(random_corpus(6, 3, 4, 41), ReplacePolicy::Reject);

    let stats = store.build().unwrap();

    assert!(stats.published);
    assert_eq!(backend.flushed_len(ARTICLE_COLLECTION).unwrap(), 18);
    assert_eq!(backend.flushed_len(AUTHOR_COLLECTION).unwrap(), 6);
}

#[test]
fn test_backend_results_match_store_results() {
    let backend = Arc::new(InMemoryBackend::new());
    let store = create_test_store(5).with_backend(backend.clone());
    store.ingest(random_corpus(8, 4, 5, 42), ReplacePolicy::Reject);
    store.build().unwrap();

    for query in random_vectors(4, 5, 43) {
        let local = store.search(query.clone(), EntityKind::Article, 6).unwrap();
        let remote = backend
            .search(
                ARTICLE_COLLECTION,
                &query,
                SearchParams::default(),
                6,
                &["title", "author_id"],
            )
            .unwrap();

        let remote_ids: Vec<&str> = remote.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(local.ids(), remote_ids);
        for hit in &remote {
            assert!(hit.payload.contains_key("title"));
            assert!(hit.payload.contains_key("author_id"));
        }

        let local_authors = store.search(query.clone(), EntityKind::Author, 3).unwrap();
        let remote_authors = backend
            .search(AUTHOR_COLLECTION, &query, SearchParams::default(), 3, &["name"])
            .unwrap();
        let remote_author_ids: Vec<&str> = remote_authors.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(local_authors.ids(), remote_author_ids);
    }
}

#[test]
fn test_rebuild_replaces_published_collection() {
    let backend = Arc::new(InMemoryBackend::new());
    let store = create_test_store(2).with_backend(backend.clone());
    store.ingest(
        vec![author("a", vec![article("a1", vec![1.0, 0.0])])],
        ReplacePolicy::Reject,
    );
    store.build().unwrap();

    store.ingest(
        vec![author(
            "b",
            vec![article("b1", vec![0.0, 1.0]), article("b2", vec![0.5, 0.5])],
        )],
        ReplacePolicy::Reject,
    );
    store.build().unwrap();

    assert_eq!(backend.flushed_len(ARTICLE_COLLECTION).unwrap(), 3);
    assert_eq!(backend.flushed_len(AUTHOR_COLLECTION).unwrap(), 2);
}

#[test]
fn test_empty_authors_are_not_published() {
    let backend = Arc::new(InMemoryBackend::new());
    let store = create_test_store(2).with_backend(backend.clone());
    store.ingest(
        vec![
            author("with", vec![article("w1", vec![1.0, 0.0])]),
            author("without", vec![]),
        ],
        ReplacePolicy::Reject,
    );

    let stats = store.build().unwrap();

    assert_eq!(stats.skipped_authors.len(), 1);
    assert_eq!(stats.skipped_authors[0].as_str(), "without");
    assert_eq!(backend.flushed_len(AUTHOR_COLLECTION).unwrap(), 1);
}

#[test]
fn test_ivf_backend_searching_every_list_matches_store() {
    let backend = Arc::new(InMemoryBackend::new());
    let store = create_store_with(StoreConfig::new(dim(6)).with_index_kind(
        IndexKind::Ivf,
        IvfParams {
            nlist: Some(4),
            nprobe: 4,
            seed: 5,
        },
    ))
    .with_backend(backend.clone());
    store.ingest(random_corpus(10, 4, 6, 44), ReplacePolicy::Reject);
    store.build().unwrap();

    for query in random_vectors(3, 6, 45) {
        let local = store.search(query.clone(), EntityKind::Article, 8).unwrap();
        let remote = backend
            .search(
                ARTICLE_COLLECTION,
                &query,
                SearchParams { nprobe: Some(4) },
                8,
                &[],
            )
            .unwrap();
        let remote_ids: Vec<&str> = remote.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(local.ids(), remote_ids);
        assert!(remote.iter().all(|h| h.payload.is_empty()));
    }
}

/// In-memory backend whose author inserts fail while `failing` is set.
#[derive(Default)]
struct FlakyBackend {
    inner: InMemoryBackend,
    failing: AtomicBool,
}

impl IndexBackend for FlakyBackend {
    fn has_collection(&self, name: &str) -> Result<bool, BackendError> {
        self.inner.has_collection(name)
    }

    fn create_collection(&self, schema: CollectionSchema) -> Result<(), BackendError> {
        self.inner.create_collection(schema)
    }

    fn drop_collection(&self, name: &str) -> Result<(), BackendError> {
        self.inner.drop_collection(name)
    }

    fn rename_collection(&self, from: &str, to: &str) -> Result<(), BackendError> {
        self.inner.rename_collection(from, to)
    }

    fn insert(&self, collection: &str, records: Vec<BackendRecord>) -> Result<usize, BackendError> {
        if self.failing.load(Ordering::SeqCst) && collection.starts_with(AUTHOR_COLLECTION) {
            return Err(BackendError::Unavailable("connection reset".to_string()));
        }
        self.inner.insert(collection, records)
    }

    fn flush(&self, collection: &str) -> Result<(), BackendError> {
        self.inner.flush(collection)
    }

    fn create_index(&self, collection: &str, params: IndexParams) -> Result<(), BackendError> {
        self.inner.create_index(collection, params)
    }

    fn search(
        &self,
        collection: &str,
        query: &[f32],
        params: SearchParams,
        top_k: usize,
        output_fields: &[&str],
    ) -> Result<Vec<SearchHit>, BackendError> {
        self.inner
            .search(collection, query, params, top_k, output_fields)
    }
}

#[test]
fn test_oversized_title_is_skipped_and_rest_publishes() {
    let backend = Arc::new(InMemoryBackend::new());
    let store = create_test_store(2).with_backend(backend.clone());
    let mut long = article("long", vec![0.0, 1.0]);
    long.title = "x".repeat(MAX_TITLE_LENGTH + 76);

    let report = store.ingest(
        vec![author(
            "a",
            vec![
                article("a1", vec![1.0, 0.0]),
                long,
                article("a2", vec![0.5, 0.5]),
            ],
        )],
        ReplacePolicy::Reject,
    );

    assert_eq!(report.authors, 1);
    assert_eq!(report.articles, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, EntityKind::Article);
    assert_eq!(report.failures[0].id, "long");
    assert_eq!(report.failures[0].error.status_code(), "INVALID_RECORD");

    let stats = store.build().unwrap();
    assert!(stats.published);
    assert_eq!(backend.flushed_len(ARTICLE_COLLECTION).unwrap(), 2);
    assert_eq!(backend.flushed_len(AUTHOR_COLLECTION).unwrap(), 1);
    let results = store
        .search(vec![0.0f32, 1.0], EntityKind::Article, 5)
        .unwrap();
    assert_eq!(results.ids(), ["a2", "a1"]);
}

#[test]
fn test_failed_publish_leaves_previous_build_in_place() {
    let backend = Arc::new(FlakyBackend::default());
    let store = create_test_store(2).with_backend(backend.clone());
    store.ingest(
        vec![author("a", vec![article("a1", vec![1.0, 0.0])])],
        ReplacePolicy::Reject,
    );
    store.build().unwrap();

    store.ingest(
        vec![author("b", vec![article("b1", vec![2.0, 0.0])])],
        ReplacePolicy::Reject,
    );
    backend.failing.store(true, Ordering::SeqCst);

    let err = store.build().unwrap_err();
    assert!(matches!(
        err,
        StoreError::Backend(BackendError::Unavailable(_))
    ));

    let query = vec![1.0f32, 0.0];
    let articles = store.search(query.clone(), EntityKind::Article, 5).unwrap();
    assert_eq!(articles.ids(), ["a1"]);
    let authors = store.search(query.clone(), EntityKind::Author, 5).unwrap();
    assert_eq!(authors.ids(), ["a"]);
    assert_eq!(backend.inner.flushed_len(ARTICLE_COLLECTION).unwrap(), 1);
    assert_eq!(backend.inner.flushed_len(AUTHOR_COLLECTION).unwrap(), 1);
    for live in [ARTICLE_COLLECTION, AUTHOR_COLLECTION] {
        let staging = format!("{live}{STAGING_SUFFIX}");
        assert!(!backend.has_collection(&staging).unwrap());
    }

    backend.failing.store(false, Ordering::SeqCst);
    store.build().unwrap();

    let articles = store.search(query, EntityKind::Article, 5).unwrap();
    assert_eq!(articles.ids(), ["b1", "a1"]);
    assert_eq!(backend.inner.flushed_len(ARTICLE_COLLECTION).unwrap(), 2);
    assert_eq!(backend.inner.flushed_len(AUTHOR_COLLECTION).unwrap(), 2);
}

#[test]
fn test_backend_lifecycle_errors() {
    let backend = Arc::new(InMemoryBackend::new());
    let query = [1.0f32, 0.0];

    assert_eq!(
        backend.search(ARTICLE_COLLECTION, &query, SearchParams::default(), 1, &[]),
        Err(BackendError::UnknownCollection(ARTICLE_COLLECTION.to_string()))
    );

    let mut drafts = CollectionSchema::articles(dim(2));
    drafts.name = "drafts".to_string();
    backend.create_collection(drafts).unwrap();
    backend
        .insert("drafts", vec![BackendRecord::new("d1", vec![1.0, 0.0])])
        .unwrap();
    backend.flush("drafts").unwrap();
    assert_eq!(
        backend.search("drafts", &query, SearchParams::default(), 1, &[]),
        Err(BackendError::IndexNotBuilt("drafts".to_string()))
    );

    let store = create_test_store(2).with_backend(backend.clone());
    store.ingest(
        vec![author("a", vec![article("a1", vec![1.0, 0.0])])],
        ReplacePolicy::Reject,
    );
    store.build().unwrap();
    assert!(matches!(
        backend.search(
            ARTICLE_COLLECTION,
            &query,
            SearchParams::default(),
            1,
            &["abstract"],
        ),
        Err(BackendError::UnknownField { .. })
    ));
}
