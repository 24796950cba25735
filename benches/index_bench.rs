//! Search latency of the flat and IVF article indexes.

use corpus_search::vector::{FlatIndex, IndexEntry, IvfIndex, IvfParams, VectorIndex};
use corpus_search::{
    ArticleRecord, AuthorRecord, HashEmbeddingProvider, ReplacePolicy, Store, StoreConfig,
    VectorDimension,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::sync::Arc;

const DIM: usize = 128;

fn random_vectors(n: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..DIM).map(|_| rng.random_range(-1.0f32..=1.0)).collect())
        .collect()
}

fn entries(n: usize) -> Vec<IndexEntry> {
    random_vectors(n, 7)
        .into_iter()
        .enumerate()
        .map(|(i, v)| IndexEntry::new(format!("10.5555/bench.{i}"), v))
        .collect()
}

fn built<I: VectorIndex>(mut index: I, n: usize) -> I {
    index.insert_batch(entries(n)).unwrap();
    index.build().unwrap();
    index
}

fn bench_index_search(c: &mut Criterion) {
    let dimension = VectorDimension::new(DIM).unwrap();
    let queries = random_vectors(16, 11);
    let mut group = c.benchmark_group("article_search_top10");

    for n in [1_000, 10_000] {
        let flat = built(FlatIndex::new(dimension), n);
        group.bench_with_input(BenchmarkId::new("flat", n), &n, |b, _| {
            b.iter(|| {
                for q in &queries {
                    black_box(flat.search(black_box(q), 10).unwrap());
                }
            });
        });

        let ivf = built(
            IvfIndex::new(
                dimension,
                IvfParams {
                    nlist: None,
                    nprobe: 4,
                    seed: 1,
                },
            ),
            n,
        );
        group.bench_with_input(BenchmarkId::new("ivf_nprobe4", n), &n, |b, _| {
            b.iter(|| {
                for q in &queries {
                    black_box(ivf.search(black_box(q), 10).unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_ivf_build(c: &mut Criterion) {
    let dimension = VectorDimension::new(DIM).unwrap();
    let data = entries(5_000);
    c.bench_function("ivf_build_5000", |b| {
        b.iter(|| {
            let mut index = IvfIndex::new(dimension, IvfParams::default());
            index.insert_batch(data.clone()).unwrap();
            index.build().unwrap();
            black_box(index.indexed_len());
        });
    });
}

fn bench_weighted_author_search(c: &mut Criterion) {
    let dimension = VectorDimension::new(DIM).unwrap();
    let mut vectors = random_vectors(2_000, 13).into_iter();
    let records: Vec<AuthorRecord> = (0..200)
        .map(|a| AuthorRecord {
            id: format!("0000-{a:04}"),
            first_name: "Bench".to_string(),
            last_name: format!("Author {a}"),
            email: None,
            community: None,
            articles: (0..10)
                .map(|i| ArticleRecord {
                    doi: format!("10.5555/w{a}.{i}"),
                    title: format!("Article {i}"),
                    abstract_text: String::new(),
                    embedding: vectors.next().unwrap_or_default(),
                    cited_by: Some(i),
                    publication_year: None,
                    author_id: None,
                })
                .collect(),
        })
        .collect();

    let store = Store::new(
        StoreConfig::new(dimension),
        Arc::new(HashEmbeddingProvider::new(dimension)),
    )
    .unwrap();
    store.ingest(records, ReplacePolicy::Reject);
    let query = random_vectors(1, 17).remove(0);

    c.bench_function("weighted_author_search_2000_articles", |b| {
        b.iter(|| black_box(store.weighted_search_author(query.clone(), 10).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_index_search,
    bench_ivf_build,
    bench_weighted_author_search
);
criterion_main!(benches);
