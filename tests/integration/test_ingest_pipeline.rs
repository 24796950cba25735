//! Loading record directories, persistence and citation enrichment.

use corpus_search::{
    ArticleId, AuthorId, EntityKind, LookupError, RecordStore, ReplacePolicy, StoreError,
};

use crate::common::{
    TestCorpus, article, author, create_test_store, random_corpus, random_vectors,
};

#[test]
fn test_directory_load_isolates_bad_records() {
    let corpus = TestCorpus::new();
    corpus.add_author(&author(
        "good",
        vec![article("g1", vec![1.0, 0.0]), article("g2", vec![0.0, 1.0])],
    ));
    corpus.add_author(&author(
        "mixed",
        vec![
            article("m1", vec![0.5, 0.5]),
            article("m2", vec![0.5, 0.5, 0.5]),
        ],
    ));
    corpus.add_raw("broken.json", "{ \"id\": \"broken\", ");
    corpus.add_raw("notes.txt", "not a record");

    let store = create_test_store(2);
    let report = store
        .ingest_from(&corpus.records(), ReplacePolicy::Reject)
        .unwrap();

    assert_eq!(report.authors, 2);
    assert_eq!(report.articles, 3);
    assert_eq!(report.failures.len(), 2);

    let bad_article = report
        .failures
        .iter()
        .find(|f| f.kind == EntityKind::Article)
        .expect("dimension failure reported");
    assert_eq!(bad_article.id, "m2");
    assert!(matches!(
        bad_article.error,
        StoreError::DimensionMismatch {
            expected: 2,
            actual: 3
        }
    ));

    let bad_file = report
        .failures
        .iter()
        .find(|f| f.kind == EntityKind::Author)
        .expect("parse failure reported");
    assert_eq!(bad_file.id, "broken");
    assert_eq!(bad_file.error.status_code(), "INVALID_RECORD");

    assert_eq!(
        store.articles_of(&AuthorId::new("mixed").unwrap()).len(),
        1
    );
    store.check_integrity().unwrap();
}

#[test]
fn test_missing_directory_is_an_error() {
    let corpus = TestCorpus::new();
    let store = create_test_store(2);

    let result = store.ingest_from(
        &RecordStore::new(corpus.path().join("absent")),
        ReplacePolicy::Reject,
    );

    assert!(matches!(result, Err(StoreError::Persistence { .. })));
}

#[test]
fn test_duplicate_author_across_batches() {
    let store = create_test_store(2);
    store.ingest(
        vec![author("dup", vec![article("d1", vec![1.0, 0.0])])],
        ReplacePolicy::Reject,
    );

    let rejected = store.ingest(
        vec![author("dup", vec![article("d2", vec![0.0, 1.0])])],
        ReplacePolicy::Reject,
    );
    assert_eq!(rejected.authors, 0);
    assert!(matches!(
        rejected.failures[0].error,
        StoreError::DuplicateIdentity { .. }
    ));

    let replaced = store.ingest(
        vec![author("dup", vec![article("d2", vec![0.0, 1.0])])],
        ReplacePolicy::Replace,
    );
    assert!(replaced.is_clean());
    let ids: Vec<String> = store
        .articles_of(&AuthorId::new("dup").unwrap())
        .iter()
        .map(|a| a.id().to_string())
        .collect();
    assert_eq!(ids, ["d2"]);
    store.check_integrity().unwrap();
}

#[test]
fn test_persist_then_reload_round_trip() {
    let source = create_test_store(4);
    source.ingest(random_corpus(5, 3, 4, 21), ReplacePolicy::Reject);
    source
        .update_citation_count(&ArticleId::new("10.5555/a1.2").unwrap(), Some(17))
        .unwrap();

    let corpus = TestCorpus::new();
    let written = source.persist(&corpus.records()).unwrap();
    assert_eq!(written, 5);

    let reloaded = create_test_store(4);
    let report = reloaded
        .ingest_from(&corpus.records(), ReplacePolicy::Reject)
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(report.articles, 15);

    let article = reloaded
        .article(&ArticleId::new("10.5555/a1.2").unwrap())
        .unwrap();
    assert_eq!(article.citation_count(), Some(17));
    assert_eq!(article.abstract_text(), "Abstract of 10.5555/a1.2");

    source.build().unwrap();
    reloaded.build().unwrap();
    let query = random_vectors(1, 4, 22).remove(0);
    assert_eq!(
        source.search(query.clone(), EntityKind::Article, 15).unwrap(),
        reloaded.search(query, EntityKind::Article, 15).unwrap()
    );
}

#[test]
fn test_record_patch_rewrites_whole_file() {
    let corpus = TestCorpus::new();
    corpus.add_author(&author("p", vec![article("p1", vec![1.0, 0.0])]));
    let records = corpus.records();
    let id = AuthorId::new("p").unwrap();

    let patched = records
        .patch(&id, |mut record| {
            record.articles[0].cited_by = Some(3);
            Ok(record)
        })
        .unwrap();
    assert_eq!(patched.articles[0].cited_by, Some(3));
    assert_eq!(records.load(&id).unwrap(), patched);

    let renamed = records.patch(&id, |mut record| {
        record.id = "q".to_string();
        Ok(record)
    });
    assert!(matches!(renamed, Err(StoreError::InvalidRecord { .. })));
    assert_eq!(records.list_ids().unwrap(), ["p"]);
}

#[test]
fn test_enrichment_keeps_stale_counts_on_miss_or_error() {
    let store = create_test_store(2);
    let mut known = article("known", vec![1.0, 0.0]);
    known.cited_by = Some(5);
    let mut missing = article("missing", vec![1.0, 0.0]);
    missing.cited_by = Some(8);
    let mut failing = article("failing", vec![1.0, 0.0]);
    failing.cited_by = Some(13);
    store.ingest(
        vec![author("e", vec![known, missing, failing])],
        ReplacePolicy::Reject,
    );

    let source = |id: &ArticleId| -> Result<Option<u32>, LookupError> {
        match id.as_str() {
            "known" => Ok(Some(40)),
            "missing" => Ok(None),
            _ => Err(LookupError::new(id, "registry timed out")),
        }
    };
    let report = store.enrich_citations(&source);

    assert_eq!(report.updated, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].article_id, "failing");

    let count = |doi: &str| {
        store
            .article(&ArticleId::new(doi).unwrap())
            .and_then(|a| a.citation_count())
    };
    assert_eq!(count("known"), Some(40));
    assert_eq!(count("missing"), Some(8));
    assert_eq!(count("failing"), Some(13));
}

#[test]
fn test_searches_run_while_rebuilding() {
    let store = create_test_store(6);
    store.ingest(random_corpus(12, 4, 6, 31), ReplacePolicy::Reject);
    store.build().unwrap();
    let queries = random_vectors(8, 6, 32);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..5 {
                store.build().unwrap();
            }
        });
        for _ in 0..3 {
            scope.spawn(|| {
                for query in &queries {
                    let articles = store
                        .search(query.clone(), EntityKind::Article, 5)
                        .unwrap();
                    assert_eq!(articles.len(), 5);
                    let authors = store.search(query.clone(), EntityKind::Author, 3).unwrap();
                    assert_eq!(authors.len(), 3);
                }
            });
        }
    });
}
