//! The store: catalog, indexes and the operations over them.
//!
//! Lock layout:
//!
//! - the catalog sits behind its own `RwLock`; ingestion and enrichment
//!   take the write side only for their sequential merge step;
//! - each index is a [`SharedIndex`], so searches share a read lock and
//!   index writes are serialized;
//! - `build` holds a dedicated mutex for its whole run, so two concurrent
//!   builds cannot publish snapshots out of order.
//!
//! Index contents only change on `build`. Between builds, searches see the
//! last built state while weighted author search always reads the live
//! catalog.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::aggregate::{Aggregator, ArticleWeight, AuthorScore};
use crate::backend::{CollectionSchema, IndexBackend, IndexParams, publish_collections};
use crate::config::Settings;
use crate::enrich::{CitationSource, EnrichReport, apply_lookups, lookup_all};
use crate::error::{StoreError, StoreResult};
use crate::ingest::{
    IngestReport, WorkerPool, merge_articles, merge_authors, package_articles, package_authors,
};
use crate::records::{
    Article, ArticleId, ArticleRecord, Author, AuthorId, AuthorRecord, Catalog, EntityKind,
    RecordStore, ReplacePolicy,
};
use crate::vector::{
    EmbeddingProvider, IndexEntry, IndexKind, IvfParams, SearchHit, SharedIndex, VectorDimension,
    VectorIndex, create_index,
};

/// Everything a store needs besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub dimension: VectorDimension,
    pub index_kind: IndexKind,
    pub ivf: IvfParams,
    /// Maintain the centroid author index.
    pub author_index: bool,
    /// Worker threads; zero means one per CPU.
    pub worker_threads: usize,
}

impl StoreConfig {
    /// Flat index, author index enabled, one worker per CPU.
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            index_kind: IndexKind::Flat,
            ivf: IvfParams::default(),
            author_index: true,
            worker_threads: 0,
        }
    }

    pub fn from_settings(settings: &Settings) -> StoreResult<Self> {
        Ok(Self {
            dimension: settings.index.vector_dimension()?,
            index_kind: settings.index.kind,
            ivf: settings.index.ivf_params(),
            author_index: settings.index.author_index,
            worker_threads: settings.ingest.worker_threads,
        })
    }

    #[must_use]
    pub fn with_index_kind(mut self, kind: IndexKind, ivf: IvfParams) -> Self {
        self.index_kind = kind;
        self.ivf = ivf;
        self
    }

    #[must_use]
    pub fn without_author_index(mut self) -> Self {
        self.author_index = false;
        self
    }

    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }
}

/// A query is either text to embed or a ready vector.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Text(String),
    Vector(Vec<f32>),
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<f32>> for Query {
    fn from(vector: Vec<f32>) -> Self {
        Self::Vector(vector)
    }
}

impl From<&[f32]> for Query {
    fn from(vector: &[f32]) -> Self {
        Self::Vector(vector.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArticleHit {
    pub article: Article,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorHit {
    pub author: Author,
    pub score: f32,
}

/// Ranked results, best first.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResults {
    Articles(Vec<ArticleHit>),
    Authors(Vec<AuthorHit>),
}

impl SearchResults {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Articles(hits) => hits.len(),
            Self::Authors(hits) => hits.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Result identities in rank order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::Articles(hits) => hits.iter().map(|h| h.article.id().as_str()).collect(),
            Self::Authors(hits) => hits.iter().map(|h| h.author.id().as_str()).collect(),
        }
    }

    /// Scores in rank order.
    #[must_use]
    pub fn scores(&self) -> Vec<f32> {
        match self {
            Self::Articles(hits) => hits.iter().map(|h| h.score).collect(),
            Self::Authors(hits) => hits.iter().map(|h| h.score).collect(),
        }
    }
}

/// What one `build` produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildStats {
    pub articles_indexed: usize,
    /// `None` when the author index is disabled.
    pub authors_indexed: Option<usize>,
    /// Authors without articles, left out of the author index.
    pub skipped_authors: Vec<AuthorId>,
    pub published: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub dimension: usize,
    pub index_kind: IndexKind,
    pub authors: usize,
    pub articles: usize,
    pub indexed_articles: usize,
    pub indexed_authors: Option<usize>,
}

pub struct Store {
    config: StoreConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    catalog: RwLock<Catalog>,
    articles: SharedIndex,
    authors: Option<SharedIndex>,
    aggregator: Aggregator,
    pool: WorkerPool,
    backend: Option<Arc<dyn IndexBackend>>,
    build_lock: Mutex<()>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("aggregator", &self.aggregator)
            .field("pool", &self.pool)
            .field("has_backend", &self.backend.is_some())
            .finish()
    }
}

fn article_entry(article: &Article) -> IndexEntry {
    IndexEntry::new(article.id().as_str(), article.embedding().to_vec())
        .with_field("title", article.title())
        .with_field("author_id", article.author_id().as_str())
}

fn author_entry(author: &Author, centroid: Vec<f32>) -> IndexEntry {
    let mut entry =
        IndexEntry::new(author.id().as_str(), centroid).with_field("name", author.display_name());
    if let Some(email) = author.email() {
        entry = entry.with_field("email", email);
    }
    if let Some(community) = author.community() {
        entry = entry.with_field("community", community);
    }
    entry
}

impl Store {
    /// Creates an empty store. The provider must embed into the configured
    /// dimension.
    pub fn new(config: StoreConfig, embedder: Arc<dyn EmbeddingProvider>) -> StoreResult<Self> {
        if embedder.dimension() != config.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: config.dimension.get(),
                actual: embedder.dimension().get(),
            });
        }

        let articles = SharedIndex::new(create_index(
            config.index_kind,
            config.dimension,
            config.ivf,
        ));
        let authors = config.author_index.then(|| {
            SharedIndex::new(create_index(
                config.index_kind,
                config.dimension,
                config.ivf,
            ))
        });
        let pool = WorkerPool::new(config.worker_threads)?;

        tracing::debug!(
            "Store created: dimension {}, {:?} index, {} workers",
            config.dimension,
            config.index_kind,
            pool.threads()
        );

        Ok(Self {
            config,
            embedder,
            catalog: RwLock::new(Catalog::new()),
            articles,
            authors,
            aggregator: Aggregator::default(),
            pool,
            backend: None,
            build_lock: Mutex::new(()),
        })
    }

    /// Store configured from settings, weighting included.
    pub fn from_settings(
        settings: &Settings,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> StoreResult<Self> {
        let aggregator = Aggregator::new(
            settings.weighting.kind.into_weight(),
            settings.weighting.shaping(),
        );
        Ok(Self::new(StoreConfig::from_settings(settings)?, embedder)?.with_aggregator(aggregator))
    }

    /// Publishes every build to `backend`.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn IndexBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replaces the default weighting used by weighted author search.
    #[must_use]
    pub fn with_aggregator(mut self, aggregator: Aggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.config.dimension
    }

    /// Validates and packages `records` on the worker pool, then merges
    /// them into the catalog.
    pub fn ingest(&self, records: Vec<AuthorRecord>, policy: ReplacePolicy) -> IngestReport {
        let packages = package_authors(&self.pool, records, self.config.dimension);
        let report = merge_authors(&mut self.catalog.write(), packages, policy);
        tracing::info!(
            "Ingested {} authors and {} articles ({} failures)",
            report.authors,
            report.articles,
            report.failures.len()
        );
        report
    }

    /// Ingests every record file in `records`. Unreadable files are
    /// reported alongside validation failures.
    pub fn ingest_from(
        &self,
        records: &RecordStore,
        policy: ReplacePolicy,
    ) -> StoreResult<IngestReport> {
        let loaded = records.load_all()?;
        let mut report = IngestReport {
            failures: loaded.failures,
            ..IngestReport::default()
        };
        report.absorb(self.ingest(loaded.records, policy));
        Ok(report)
    }

    /// Ingests standalone articles for authors already in the store.
    pub fn ingest_articles(
        &self,
        records: Vec<ArticleRecord>,
        policy: ReplacePolicy,
    ) -> IngestReport {
        let packages = package_articles(&self.pool, records, self.config.dimension);
        merge_articles(&mut self.catalog.write(), packages, policy)
    }

    pub fn update_citation_count(
        &self,
        id: &ArticleId,
        citation_count: Option<u32>,
    ) -> StoreResult<()> {
        self.catalog.write().set_citation_count(id, citation_count)
    }

    /// Refreshes citation counts of every article from `source`.
    pub fn enrich_citations(&self, source: &dyn CitationSource) -> EnrichReport {
        let ids: Vec<ArticleId> = self
            .catalog
            .read()
            .articles()
            .map(|a| a.id().clone())
            .collect();
        let lookups = lookup_all(&self.pool, source, ids);
        apply_lookups(&mut self.catalog.write(), lookups)
    }

    /// Writes every author with its articles to `records`.
    pub fn persist(&self, records: &RecordStore) -> StoreResult<usize> {
        let snapshot: Vec<AuthorRecord> = {
            let catalog = self.catalog.read();
            catalog
                .authors()
                .filter_map(|author| catalog.author_record(author.id()))
                .collect()
        };
        for record in &snapshot {
            records.save(record)?;
        }
        tracing::debug!(
            "Persisted {} authors to {}",
            snapshot.len(),
            records.dir().display()
        );
        Ok(snapshot.len())
    }

    /// Rebuilds the article index and, when enabled, the centroid author
    /// index from the current catalog. Running it twice without changes in
    /// between yields identical search results.
    ///
    /// Fresh indexes are built aside and published to the backend first;
    /// searches only switch to them once everything succeeded. A failed
    /// build leaves both the local indexes and the backend as they were.
    pub fn build(&self) -> StoreResult<BuildStats> {
        let _guard = self.build_lock.lock();
        let wants_authors = self.authors.is_some() || self.backend.is_some();

        let (article_entries, author_entries, skipped_authors) = {
            let catalog = self.catalog.read();
            let articles: Vec<IndexEntry> = catalog.articles().map(article_entry).collect();

            let mut authors = Vec::new();
            let mut skipped = Vec::new();
            if wants_authors {
                for author in catalog.authors() {
                    match self.aggregator.centroid(&catalog, author) {
                        Ok(centroid) => authors.push(author_entry(author, centroid)),
                        Err(StoreError::EmptyAuthor { .. }) => skipped.push(author.id().clone()),
                        Err(other) => return Err(other),
                    }
                }
            }
            (articles, authors, skipped)
        };

        if !skipped_authors.is_empty() {
            tracing::debug!(
                "{} authors without articles left out of the author index",
                skipped_authors.len()
            );
        }

        let mut stats = BuildStats {
            articles_indexed: article_entries.len(),
            authors_indexed: None,
            skipped_authors,
            published: false,
        };

        let published = self
            .backend
            .as_ref()
            .map(|_| (article_entries.clone(), author_entries.clone()));

        let fresh_articles = self.index_over(article_entries)?;
        let fresh_authors = match &self.authors {
            Some(_) => {
                stats.authors_indexed = Some(author_entries.len());
                Some(self.index_over(author_entries)?)
            }
            None => None,
        };

        if let (Some(backend), Some((articles, authors))) = (&self.backend, published) {
            let params = IndexParams {
                kind: self.config.index_kind,
                ivf: self.config.ivf,
            };
            publish_collections(
                backend.as_ref(),
                vec![
                    (
                        CollectionSchema::articles(self.config.dimension),
                        articles.into_iter().map(Into::into).collect(),
                    ),
                    (
                        CollectionSchema::authors(self.config.dimension),
                        authors.into_iter().map(Into::into).collect(),
                    ),
                ],
                params,
            )?;
            stats.published = true;
        }

        self.articles.replace(fresh_articles);
        if let (Some(index), Some(fresh)) = (&self.authors, fresh_authors) {
            index.replace(fresh);
        }

        tracing::info!(
            "Built indexes: {} articles, {} authors",
            stats.articles_indexed,
            stats
                .authors_indexed
                .map_or_else(|| "no".to_string(), |n| n.to_string())
        );
        Ok(stats)
    }

    /// A built index over `entries`, not yet visible to searches.
    fn index_over(&self, entries: Vec<IndexEntry>) -> StoreResult<Box<dyn VectorIndex>> {
        let mut index = create_index(
            self.config.index_kind,
            self.config.dimension,
            self.config.ivf,
        );
        index.rebuild(entries)?;
        Ok(index)
    }

    /// Turns a query into a vector of the store dimension.
    fn query_vector<'q>(&self, query: &'q Query) -> StoreResult<Cow<'q, [f32]>> {
        let vector = match query {
            Query::Text(text) => Cow::Owned(
                self.embedder
                    .embed(text)
                    .map_err(StoreError::EmbeddingUnavailable)?,
            ),
            Query::Vector(vector) => Cow::Borrowed(vector.as_slice()),
        };
        self.config.dimension.validate_vector(&vector)?;
        Ok(vector)
    }

    /// Top-k articles or authors for `query` from the last build.
    pub fn search(
        &self,
        query: impl Into<Query>,
        kind: EntityKind,
        top_k: usize,
    ) -> StoreResult<SearchResults> {
        let query = query.into();
        let vector = self.query_vector(&query)?;

        match kind {
            EntityKind::Article => {
                let hits = self.articles.search(&vector, top_k)?;
                self.resolve_articles(hits).map(SearchResults::Articles)
            }
            EntityKind::Author => {
                let index = self.authors.as_ref().ok_or(StoreError::AuthorIndexDisabled)?;
                let hits = index.search(&vector, top_k)?;
                self.resolve_authors(hits).map(SearchResults::Authors)
            }
        }
    }

    /// Authors ranked by weighted summed article similarity, computed from
    /// live catalog data with the configured weight.
    pub fn weighted_search_author(
        &self,
        query: impl Into<Query>,
        top_k: usize,
    ) -> StoreResult<Vec<AuthorHit>> {
        self.weighted_search(&self.aggregator, query.into(), top_k)
    }

    /// Like [`Store::weighted_search_author`] with an explicit weight.
    pub fn weighted_search_author_with(
        &self,
        query: impl Into<Query>,
        top_k: usize,
        weight: Arc<dyn ArticleWeight>,
    ) -> StoreResult<Vec<AuthorHit>> {
        self.weighted_search(&self.aggregator.with_weight(weight), query.into(), top_k)
    }

    fn weighted_search(
        &self,
        aggregator: &Aggregator,
        query: Query,
        top_k: usize,
    ) -> StoreResult<Vec<AuthorHit>> {
        let vector = self.query_vector(&query)?;
        let catalog = self.catalog.read();
        aggregator
            .weighted_search_author(&catalog, &vector, top_k)?
            .into_iter()
            .map(|AuthorScore { author_id, score }| -> StoreResult<AuthorHit> {
                let author = catalog.author(&author_id).cloned().ok_or_else(|| {
                    StoreError::UnknownIdentity {
                        kind: EntityKind::Author,
                        id: author_id.to_string(),
                    }
                })?;
                Ok(AuthorHit { author, score })
            })
            .collect()
    }

    fn resolve_articles(&self, hits: Vec<SearchHit>) -> StoreResult<Vec<ArticleHit>> {
        let catalog = self.catalog.read();
        hits.into_iter()
            .map(|hit| -> StoreResult<ArticleHit> {
                let article = ArticleId::new(hit.id.as_str())
                    .ok()
                    .and_then(|id| catalog.article(&id).cloned())
                    .ok_or_else(|| StoreError::UnknownIdentity {
                        kind: EntityKind::Article,
                        id: hit.id.clone(),
                    })?;
                Ok(ArticleHit {
                    article,
                    score: hit.score,
                })
            })
            .collect()
    }

    fn resolve_authors(&self, hits: Vec<SearchHit>) -> StoreResult<Vec<AuthorHit>> {
        let catalog = self.catalog.read();
        hits.into_iter()
            .map(|hit| -> StoreResult<AuthorHit> {
                let author = AuthorId::new(hit.id.as_str())
                    .ok()
                    .and_then(|id| catalog.author(&id).cloned())
                    .ok_or_else(|| StoreError::UnknownIdentity {
                        kind: EntityKind::Author,
                        id: hit.id.clone(),
                    })?;
                Ok(AuthorHit {
                    author,
                    score: hit.score,
                })
            })
            .collect()
    }

    /// Centroid of one author's articles from the live catalog.
    pub fn centroid(&self, id: &AuthorId) -> StoreResult<Vec<f32>> {
        let catalog = self.catalog.read();
        let author = catalog
            .author(id)
            .ok_or_else(|| StoreError::UnknownIdentity {
                kind: EntityKind::Author,
                id: id.to_string(),
            })?;
        self.aggregator.centroid(&catalog, author)
    }

    #[must_use]
    pub fn author(&self, id: &AuthorId) -> Option<Author> {
        self.catalog.read().author(id).cloned()
    }

    #[must_use]
    pub fn article(&self, id: &ArticleId) -> Option<Article> {
        self.catalog.read().article(id).cloned()
    }

    /// Articles owned by an author, in insertion order.
    #[must_use]
    pub fn articles_of(&self, id: &AuthorId) -> Vec<Article> {
        let catalog = self.catalog.read();
        catalog
            .author(id)
            .map(|author| catalog.articles_of(author).cloned().collect())
            .unwrap_or_default()
    }

    pub fn check_integrity(&self) -> StoreResult<()> {
        self.catalog.read().check_integrity()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let (authors, articles) = {
            let catalog = self.catalog.read();
            (catalog.author_count(), catalog.article_count())
        };
        StoreStats {
            dimension: self.config.dimension.get(),
            index_kind: self.config.index_kind,
            authors,
            articles,
            indexed_articles: self.articles.indexed_len(),
            indexed_authors: self.authors.as_ref().map(SharedIndex::indexed_len),
        }
    }
}
