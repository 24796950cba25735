//! Ranking contract of article search over a built store.

use std::collections::HashSet;

use corpus_search::vector::normalized;
use corpus_search::{EntityKind, IndexKind, IvfParams, ReplacePolicy, StoreConfig};

use crate::common::{
    article, author, create_store_with, create_test_store, dim, dot, random_corpus,
    random_vectors,
};

#[test]
fn test_scores_sorted_and_exactly_top_k() {
    let store = create_test_store(8);
    let corpus = random_corpus(10, 5, 8, 1);
    let known: HashSet<String> = corpus
        .iter()
        .flat_map(|a| a.articles.iter().map(|r| r.doi.clone()))
        .collect();
    store.ingest(corpus, ReplacePolicy::Reject);
    store.build().unwrap();

    for (q, query) in random_vectors(5, 8, 99).into_iter().enumerate() {
        let results = store.search(query, EntityKind::Article, 7).unwrap();

        assert_eq!(results.len(), 7, "query {q}");
        let scores = results.scores();
        assert!(
            scores.windows(2).all(|w| w[0] >= w[1]),
            "scores not descending for query {q}: {scores:?}"
        );
        assert!(results.ids().iter().all(|id| known.contains(*id)));
    }
}

#[test]
fn test_top_k_beyond_size_returns_everything_once() {
    let store = create_test_store(4);
    store.ingest(random_corpus(3, 4, 4, 2), ReplacePolicy::Reject);
    store.build().unwrap();

    let results = store
        .search(vec![0.5f32, -0.5, 0.25, 1.0], EntityKind::Article, 100)
        .unwrap();

    let ids = results.ids();
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 12);
    assert_eq!(unique.len(), 12);
}

#[test]
fn test_self_similarity_is_self_inner_product() {
    let store = create_test_store(6);
    let corpus = random_corpus(4, 3, 6, 3);
    let target = corpus[2].articles[1].clone();
    store.ingest(corpus, ReplacePolicy::Reject);
    store.build().unwrap();

    let results = store
        .search(target.embedding.clone(), EntityKind::Article, 12)
        .unwrap();

    let position = results
        .ids()
        .iter()
        .position(|id| *id == target.doi)
        .expect("article finds itself");
    let expected = dot(&target.embedding, &target.embedding);
    assert!((results.scores()[position] - expected).abs() < 1e-5);
}

#[test]
fn test_build_twice_is_idempotent() {
    let store = create_test_store(5);
    store.ingest(random_corpus(6, 4, 5, 4), ReplacePolicy::Reject);
    let query = random_vectors(1, 5, 5).remove(0);

    store.build().unwrap();
    let first = store.search(query.clone(), EntityKind::Article, 10).unwrap();
    let first_authors = store.search(query.clone(), EntityKind::Author, 6).unwrap();

    store.build().unwrap();
    let second = store.search(query.clone(), EntityKind::Article, 10).unwrap();
    let second_authors = store.search(query, EntityKind::Author, 6).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_authors, second_authors);
}

#[test]
fn test_equal_scores_keep_insertion_order() {
    let store = create_test_store(2);
    store.ingest(
        vec![
            author("a", vec![article("first", vec![1.0, 0.0])]),
            author(
                "b",
                vec![
                    article("second", vec![1.0, 0.0]),
                    article("third", vec![1.0, 0.0]),
                ],
            ),
        ],
        ReplacePolicy::Reject,
    );
    store.build().unwrap();

    let results = store
        .search(vec![1.0f32, 0.0], EntityKind::Article, 3)
        .unwrap();
    assert_eq!(results.ids(), ["first", "second", "third"]);
}

#[test]
fn test_normalization_changes_ranking() {
    // A long vector wins on raw inner product, the better-aligned one wins
    // once both are unit length.
    let long = vec![3.0f32, 0.0];
    let aligned = vec![0.6f32, 0.8];
    let query = vec![0.5f32, 0.866];

    let raw = create_test_store(2);
    raw.ingest(
        vec![author(
            "a",
            vec![article("long", long.clone()), article("aligned", aligned.clone())],
        )],
        ReplacePolicy::Reject,
    );
    raw.build().unwrap();

    let unit = create_test_store(2);
    unit.ingest(
        vec![author(
            "a",
            vec![
                article("long", normalized(&long)),
                article("aligned", normalized(&aligned)),
            ],
        )],
        ReplacePolicy::Reject,
    );
    unit.build().unwrap();

    let raw_top = raw.search(query.clone(), EntityKind::Article, 1).unwrap();
    let unit_top = unit.search(query, EntityKind::Article, 1).unwrap();
    assert_eq!(raw_top.ids(), ["long"]);
    assert_eq!(unit_top.ids(), ["aligned"]);
}

#[test]
fn test_ivf_searching_every_list_matches_flat() {
    let corpus = random_corpus(20, 5, 8, 6);
    let flat = create_test_store(8);
    let ivf = create_store_with(StoreConfig::new(dim(8)).with_index_kind(
        IndexKind::Ivf,
        IvfParams {
            nlist: Some(6),
            nprobe: 6,
            seed: 11,
        },
    ));
    flat.ingest(corpus.clone(), ReplacePolicy::Reject);
    ivf.ingest(corpus, ReplacePolicy::Reject);
    flat.build().unwrap();
    ivf.build().unwrap();

    for query in random_vectors(5, 8, 7) {
        let expected = flat.search(query.clone(), EntityKind::Article, 10).unwrap();
        let actual = ivf.search(query, EntityKind::Article, 10).unwrap();
        assert_eq!(expected.ids(), actual.ids());
    }
}

#[test]
fn test_ivf_searching_few_lists_keeps_contract() {
    let ivf = create_store_with(StoreConfig::new(dim(8)).with_index_kind(
        IndexKind::Ivf,
        IvfParams {
            nlist: Some(8),
            nprobe: 1,
            seed: 3,
        },
    ));
    ivf.ingest(random_corpus(20, 5, 8, 8), ReplacePolicy::Reject);
    ivf.build().unwrap();

    for query in random_vectors(5, 8, 9) {
        let results = ivf.search(query, EntityKind::Article, 5).unwrap();
        assert!(results.len() <= 5);
        let scores = results.scores();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }
}
