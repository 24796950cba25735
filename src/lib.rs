//! Embedding-backed search over research authors and their articles.

pub mod aggregate;
pub mod backend;
pub mod config;
pub mod display;
pub mod enrich;
pub mod error;
pub mod ingest;
pub mod records;
pub mod store;
pub mod vector;

// Explicit exports for better API clarity
pub use aggregate::{
    Aggregator, ArticleWeight, AuthorScore, CitationWeight, RelevanceShaping, UniformWeight,
    WeightingKind,
};
pub use backend::{BackendError, IndexBackend, InMemoryBackend};
pub use config::Settings;
pub use enrich::{CitationSource, EnrichReport, LookupError};
pub use error::{StoreError, StoreResult};
pub use ingest::{IngestReport, WorkerPool};
pub use records::{
    Article, ArticleId, ArticleRecord, Author, AuthorId, AuthorRecord, Catalog, EntityKind,
    MAX_ID_LENGTH, MAX_LABEL_LENGTH, MAX_TITLE_LENGTH, RecordFailure, RecordStore, ReplacePolicy,
};
pub use store::{
    ArticleHit, AuthorHit, BuildStats, Query, SearchResults, Store, StoreConfig, StoreStats,
};
pub use vector::{
    EmbeddingProvider, FastEmbedProvider, HashEmbeddingProvider, IndexKind, IvfParams,
    VectorDimension, VectorIndex,
};
