//! Parallel packaging, sequential merge.
//!
//! Ingestion runs in two phases. Packaging validates each source record on
//! the worker pool: every worker turns one record into one package and
//! shares nothing mutable with the others. Merging then inserts the packages
//! into the catalog one at a time, in input order, under the caller's write
//! lock. A bad record becomes a [`RecordFailure`]; it never aborts the batch.

use std::fmt;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{StoreError, StoreResult};
use crate::records::{
    Article, ArticleRecord, Author, AuthorId, AuthorRecord, Catalog, EntityKind, RecordFailure,
    ReplacePolicy,
};
use crate::vector::VectorDimension;

/// Fixed-size pool shared by ingestion and enrichment.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .finish()
    }
}

impl WorkerPool {
    /// Starts `threads` workers; zero means one per CPU.
    pub fn new(threads: usize) -> StoreResult<Self> {
        let threads = if threads == 0 { num_cpus::get() } else { threads };
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("corpus-worker-{i}"))
            .build()
            .map_err(|e| StoreError::WorkerPool(e.to_string()))?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Applies `f` to every item on the pool. Output order matches input.
    pub fn map<T, U, F>(&self, items: Vec<T>, f: F) -> Vec<U>
    where
        T: Send,
        U: Send,
        F: Fn(T) -> U + Send + Sync,
    {
        self.pool.install(|| items.into_par_iter().map(f).collect())
    }
}

/// Outcome of one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub authors: usize,
    pub articles: usize,
    pub failures: Vec<RecordFailure>,
}

impl IngestReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Folds another report into this one.
    pub fn absorb(&mut self, other: IngestReport) {
        self.authors += other.authors;
        self.articles += other.articles;
        self.failures.extend(other.failures);
    }
}

/// A validated author record ready to merge.
#[derive(Debug)]
pub struct AuthorPackage {
    source_id: String,
    contents: StoreResult<(Author, Vec<(String, StoreResult<Article>)>)>,
}

/// A validated standalone article ready to merge.
#[derive(Debug)]
pub struct ArticlePackage {
    source_id: String,
    article: StoreResult<Article>,
}

/// Validates author records on the pool.
pub fn package_authors(
    pool: &WorkerPool,
    records: Vec<AuthorRecord>,
    dimension: VectorDimension,
) -> Vec<AuthorPackage> {
    pool.map(records, |record| AuthorPackage {
        source_id: record.id.clone(),
        contents: Author::split_record(record, dimension),
    })
}

/// Validates standalone article records on the pool. Each record must name
/// its owning author.
pub fn package_articles(
    pool: &WorkerPool,
    records: Vec<ArticleRecord>,
    dimension: VectorDimension,
) -> Vec<ArticlePackage> {
    pool.map(records, |mut record| {
        let source_id = record.doi.clone();
        let article = match record.author_id.take() {
            Some(owner) => AuthorId::new(owner)
                .and_then(|owner| Article::from_record(record, owner, dimension)),
            None => Err(StoreError::InvalidRecord {
                id: source_id.clone(),
                reason: "standalone article does not name its author".to_string(),
            }),
        };
        ArticlePackage { source_id, article }
    })
}

/// Inserts author packages into the catalog in order.
pub fn merge_authors(
    catalog: &mut Catalog,
    packages: Vec<AuthorPackage>,
    policy: ReplacePolicy,
) -> IngestReport {
    let mut report = IngestReport::default();

    for package in packages {
        let (author, articles) = match package.contents {
            Ok(contents) => contents,
            Err(error) => {
                tracing::warn!("Rejected author '{}': {error}", package.source_id);
                report.failures.push(RecordFailure::new(
                    EntityKind::Author,
                    package.source_id,
                    error,
                ));
                continue;
            }
        };

        let mut valid = Vec::with_capacity(articles.len());
        for (source_id, article) in articles {
            match article {
                Ok(article) => valid.push(article),
                Err(error) => {
                    tracing::warn!("Rejected article '{source_id}': {error}");
                    report
                        .failures
                        .push(RecordFailure::new(EntityKind::Article, source_id, error));
                }
            }
        }

        let offered = valid.len();
        match catalog.insert_author_with_articles(author, valid, policy) {
            Ok(failures) => {
                report.authors += 1;
                report.articles += offered - failures.len();
                report.failures.extend(failures);
            }
            Err(error) => {
                tracing::warn!("Rejected author '{}': {error}", package.source_id);
                report.failures.push(RecordFailure::new(
                    EntityKind::Author,
                    package.source_id,
                    error,
                ));
            }
        }
    }

    tracing::debug!(
        "Merged {} authors and {} articles ({} failures)",
        report.authors,
        report.articles,
        report.failures.len()
    );
    report
}

/// Inserts article packages into the catalog in order.
pub fn merge_articles(
    catalog: &mut Catalog,
    packages: Vec<ArticlePackage>,
    policy: ReplacePolicy,
) -> IngestReport {
    let mut report = IngestReport::default();
    for package in packages {
        let result = package
            .article
            .and_then(|article| catalog.insert_article(article, policy));
        match result {
            Ok(()) => report.articles += 1,
            Err(error) => {
                tracing::warn!("Rejected article '{}': {error}", package.source_id);
                report.failures.push(RecordFailure::new(
                    EntityKind::Article,
                    package.source_id,
                    error,
                ));
            }
        }
    }
    report
}
