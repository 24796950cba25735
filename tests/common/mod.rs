#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use corpus_search::{
    ArticleRecord, AuthorRecord, HashEmbeddingProvider, RecordStore, Store, StoreConfig,
    VectorDimension,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

/// A temporary data directory holding author JSON files.
pub struct TestCorpus {
    pub dir: TempDir,
}

impl TestCorpus {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn records(&self) -> RecordStore {
        RecordStore::new(self.dir.path())
    }

    pub fn add_author(&self, record: &AuthorRecord) {
        self.records().save(record).expect("Failed to write record");
    }

    pub fn add_raw(&self, file_name: &str, content: &str) {
        std::fs::write(self.dir.path().join(file_name), content).expect("Failed to write file");
    }
}

pub fn dim(d: usize) -> VectorDimension {
    VectorDimension::new(d).expect("non-zero dimension")
}

pub fn article(doi: &str, embedding: Vec<f32>) -> ArticleRecord {
    ArticleRecord {
        doi: doi.to_string(),
        title: format!("Article {doi}"),
        abstract_text: format!("<p>Abstract of <i>{doi}</i></p>"),
        embedding,
        cited_by: None,
        publication_year: Some(2022),
        author_id: None,
    }
}

pub fn author(id: &str, articles: Vec<ArticleRecord>) -> AuthorRecord {
    AuthorRecord {
        id: id.to_string(),
        first_name: "Jordan".to_string(),
        last_name: format!("Doe-{id}"),
        email: Some(format!("{id}@example.org")),
        community: Some("Mathematics".to_string()),
        articles,
    }
}

/// Store with a flat index and a hash embedder of the same dimension.
pub fn create_test_store(d: usize) -> Store {
    create_store_with(StoreConfig::new(dim(d)).with_worker_threads(2))
}

pub fn create_store_with(config: StoreConfig) -> Store {
    let embedder = Arc::new(HashEmbeddingProvider::new(config.dimension));
    Store::new(config, embedder).expect("Failed to create store")
}

/// Random vectors with components in [-1, 1], reproducible per seed.
pub fn random_vectors(n: usize, d: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..d).map(|_| rng.random_range(-1.0f32..=1.0)).collect())
        .collect()
}

/// `authors` authors with `per_author` random articles each.
pub fn random_corpus(authors: usize, per_author: usize, d: usize, seed: u64) -> Vec<AuthorRecord> {
    let mut vectors = random_vectors(authors * per_author, d, seed).into_iter();
    (0..authors)
        .map(|a| {
            let articles = (0..per_author)
                .map(|i| {
                    let embedding = vectors.next().expect("enough vectors");
                    article(&format!("10.5555/a{a}.{i}"), embedding)
                })
                .collect();
            author(&format!("0000-{a:04}"), articles)
        })
        .collect()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
