//! Centroid and weighted author ranking through the store.

use std::sync::Arc;

use corpus_search::{
    Aggregator, Article, ArticleWeight, AuthorId, CitationWeight, EntityKind,
    HashEmbeddingProvider, RelevanceShaping, ReplacePolicy, SearchResults, Settings, Store,
    StoreConfig, StoreError, UniformWeight, WeightingKind,
};

use crate::common::{article, author, create_store_with, create_test_store, dim};

#[test]
fn test_centroid_is_midpoint_of_two_articles() {
    let store = create_test_store(3);
    store.ingest(
        vec![author(
            "a",
            vec![
                article("v1", vec![1.0, 2.0, -1.0]),
                article("v2", vec![3.0, 0.0, 1.0]),
            ],
        )],
        ReplacePolicy::Reject,
    );

    let centroid = store.centroid(&AuthorId::new("a").unwrap()).unwrap();

    assert_eq!(centroid, vec![2.0, 1.0, 0.0]);
}

#[test]
fn test_centroid_of_author_without_articles() {
    let store = create_test_store(3);
    store.ingest(vec![author("lonely", vec![])], ReplacePolicy::Reject);

    let err = store.centroid(&AuthorId::new("lonely").unwrap()).unwrap_err();

    assert_eq!(
        err,
        StoreError::EmptyAuthor {
            author_id: "lonely".to_string()
        }
    );
    assert_eq!(err.status_code(), "EMPTY_AUTHOR");
}

#[test]
fn test_weighted_sum_ranks_two_half_matches_above_one_strong_match() {
    let store = create_test_store(2);
    store.ingest(
        vec![
            author("A", vec![article("a1", vec![0.9, 0.1])]),
            author(
                "B",
                vec![
                    article("b1", vec![0.5, 0.2]),
                    article("b2", vec![0.5, -0.2]),
                ],
            ),
        ],
        ReplacePolicy::Reject,
    );

    let ranked = store.weighted_search_author(vec![1.0f32, 0.0], 2).unwrap();

    let ids: Vec<&str> = ranked.iter().map(|h| h.author.id().as_str()).collect();
    assert_eq!(ids, ["B", "A"]);
    assert!((ranked[0].score - 1.0).abs() < 1e-6);
    assert!((ranked[1].score - 0.9).abs() < 1e-6);
}

#[test]
fn test_weighted_search_reads_live_catalog() {
    let store = create_test_store(2);
    store.ingest(
        vec![author("A", vec![article("a1", vec![1.0, 0.0])])],
        ReplacePolicy::Reject,
    );
    store.build().unwrap();

    // Not built: the author index does not know B, weighted search does
    store.ingest(
        vec![author("B", vec![article("b1", vec![2.0, 0.0])])],
        ReplacePolicy::Reject,
    );

    let indexed = store
        .search(vec![1.0f32, 0.0], EntityKind::Author, 5)
        .unwrap();
    assert_eq!(indexed.ids(), ["A"]);

    let live = store.weighted_search_author(vec![1.0f32, 0.0], 5).unwrap();
    assert_eq!(live[0].author.id().as_str(), "B");
    assert_eq!(live.len(), 2);
}

#[test]
fn test_custom_weight_closure() {
    let store = create_test_store(2);
    let mut recent = article("recent", vec![0.4, 0.0]);
    recent.publication_year = Some(2024);
    let mut old = article("old", vec![0.9, 0.0]);
    old.publication_year = Some(1990);
    store.ingest(
        vec![author("new", vec![recent]), author("veteran", vec![old])],
        ReplacePolicy::Reject,
    );

    let recency: Arc<dyn ArticleWeight> =
        Arc::new(|article: &Article| -> f32 {
            match article.publication_year() {
                Some(year) if year >= 2020 => 1.0,
                _ => 0.1,
            }
        });
    let ranked = store
        .weighted_search_author_with(vec![1.0f32, 0.0], 1, recency)
        .unwrap();

    assert_eq!(ranked[0].author.id().as_str(), "new");
}

#[test]
fn test_author_hits_carry_attributes() {
    let store = create_store_with(StoreConfig::new(dim(2)).with_worker_threads(1));
    store.ingest(
        vec![author("0000-0002", vec![article("x", vec![0.0, 1.0])])],
        ReplacePolicy::Reject,
    );
    store.build().unwrap();

    let SearchResults::Authors(hits) = store
        .search(vec![0.0f32, 1.0], EntityKind::Author, 1)
        .unwrap()
    else {
        panic!("expected author hits");
    };

    let found = &hits[0].author;
    assert_eq!(found.display_name(), "Jordan Doe-0000-0002");
    assert_eq!(found.email(), Some("0000-0002@example.org"));
    assert_eq!(found.community(), Some("Mathematics"));
    assert_eq!(found.articles().len(), 1);
}

#[test]
fn test_citation_weighting_from_settings() {
    let mut settings = Settings::default();
    settings.index.dimension = 2;
    settings.ingest.worker_threads = 1;
    settings.weighting.kind = WeightingKind::Citations;
    let store = Store::from_settings(&settings, Arc::new(HashEmbeddingProvider::new(dim(2))))
        .unwrap();

    let mut cited = article("cited", vec![0.5, 0.0]);
    cited.cited_by = Some(100);
    let mut uncited = article("uncited", vec![0.9, 0.0]);
    uncited.cited_by = Some(0);
    store.ingest(
        vec![author("c", vec![cited]), author("u", vec![uncited])],
        ReplacePolicy::Reject,
    );

    let ranked = store.weighted_search_author(vec![1.0f32, 0.0], 2).unwrap();

    // 0.5 * (1 + ln 101) outweighs 0.9 * 1
    assert_eq!(ranked[0].author.id().as_str(), "c");
    assert!((ranked[1].score - 0.9).abs() < 1e-6);
}

#[test]
fn test_similarity_cutoff_ignores_weak_matches() {
    let many_weak = author(
        "weak",
        (0..5)
            .map(|i| article(&format!("w{i}"), vec![0.3, 0.0]))
            .collect(),
    );
    let mut strong_article = article("s1", vec![0.8, 0.0]);
    strong_article.cited_by = Some(0);
    let one_strong = author("strong", vec![strong_article]);
    let query = vec![1.0f32, 0.0];

    let plain = create_test_store(2);
    plain.ingest(
        vec![many_weak.clone(), one_strong.clone()],
        ReplacePolicy::Reject,
    );
    let ranked = plain.weighted_search_author(query.clone(), 2).unwrap();
    assert_eq!(ranked[0].author.id().as_str(), "weak");

    let shaped = create_test_store(2).with_aggregator(Aggregator::new(
        Arc::new(UniformWeight),
        RelevanceShaping {
            min_similarity: Some(0.5),
            exponent: 1,
        },
    ));
    shaped.ingest(vec![many_weak, one_strong], ReplacePolicy::Reject);

    let ranked = shaped.weighted_search_author(query.clone(), 2).unwrap();
    let ids: Vec<&str> = ranked.iter().map(|h| h.author.id().as_str()).collect();
    assert_eq!(ids, ["strong", "weak"]);
    assert!((ranked[0].score - 0.8).abs() < 1e-6);
    assert_eq!(ranked[1].score, 0.0);

    // An explicit weight keeps the configured cutoff
    let ranked = shaped
        .weighted_search_author_with(query, 2, Arc::new(CitationWeight))
        .unwrap();
    assert_eq!(ranked[0].author.id().as_str(), "strong");
    assert!((ranked[0].score - 0.8).abs() < 1e-6);
    assert_eq!(ranked[1].score, 0.0);
}
