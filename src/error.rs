//! Error types for the corpus search engine
//!
//! Layer-local errors (`VectorError`, `EmbeddingError`, `BackendError`) are
//! folded into [`StoreError`] at the store boundary, so callers match on a
//! single enum whose variants name what went wrong with their input.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;
use crate::records::EntityKind;
use crate::vector::{EmbeddingError, VectorError};

/// Main error type for store, ingestion and record operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Vector length differs from the store dimension
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}. All vectors in a store must come from the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector contains a non-finite value at position {position}")]
    NonFiniteVector { position: usize },

    /// Centroid requested for an author without articles
    #[error("Author '{author_id}' owns no articles, so no centroid can be derived")]
    EmptyAuthor { author_id: String },

    /// An index hit names an entity the catalog does not hold
    #[error("Index references unknown {kind} '{id}'. Rebuild the index after replacing records")]
    UnknownIdentity { kind: EntityKind, id: String },

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(EmbeddingError),

    #[error("Duplicate {kind} identity '{id}'. Use replace semantics to overwrite")]
    DuplicateIdentity { kind: EntityKind, id: String },

    /// Article back-reference names a missing author
    #[error("Article '{article_id}' references author '{author_id}', which is not in the store")]
    DanglingReference {
        article_id: String,
        author_id: String,
    },

    #[error("Invalid record '{id}': {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error("Invalid top_k {0}: at least one result must be requested")]
    InvalidTopK(usize),

    #[error(
        "Author index is not configured; enable index.author_index or use weighted author search"
    )]
    AuthorIndexDisabled,

    /// Index construction failures (clustering, empty input)
    #[error("Index operation failed: {0}")]
    Index(String),

    #[error("Failed to persist '{path}': {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("Remote index backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<VectorError> for StoreError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            VectorError::NonFinite { position } => Self::NonFiniteVector { position },
            VectorError::InvalidTopK(k) => Self::InvalidTopK(k),
            other => Self::Index(other.to_string()),
        }
    }
}

impl StoreError {
    /// Get a stable status code for this error type.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::NonFiniteVector { .. } => "NON_FINITE_VECTOR",
            Self::EmptyAuthor { .. } => "EMPTY_AUTHOR",
            Self::UnknownIdentity { .. } => "UNKNOWN_IDENTITY",
            Self::EmbeddingUnavailable(_) => "EMBEDDING_UNAVAILABLE",
            Self::DuplicateIdentity { .. } => "DUPLICATE_IDENTITY",
            Self::DanglingReference { .. } => "DANGLING_REFERENCE",
            Self::InvalidRecord { .. } => "INVALID_RECORD",
            Self::InvalidTopK(_) => "INVALID_TOP_K",
            Self::AuthorIndexDisabled => "AUTHOR_INDEX_DISABLED",
            Self::Index(_) => "INDEX_ERROR",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::Backend(_) => "BACKEND_ERROR",
            Self::WorkerPool(_) => "WORKER_POOL_ERROR",
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::DimensionMismatch { .. } | Self::NonFiniteVector { .. } => vec![
                "Re-embed the record with the model configured in index.dimension",
                "Check that query vectors come from the same model as the articles",
            ],
            Self::EmptyAuthor { .. } => {
                vec!["Skip authors without articles or ingest their articles first"]
            }
            Self::UnknownIdentity { .. } => {
                vec!["Call build() after replacing or re-ingesting records"]
            }
            Self::EmbeddingUnavailable(_) => vec![
                "Retry the search once the embedding provider is reachable",
                "Pass a query vector instead of text",
            ],
            Self::DuplicateIdentity { .. } => {
                vec!["Ingest with ReplacePolicy::Replace to overwrite existing records"]
            }
            Self::DanglingReference { .. } => {
                vec!["Ingest the owning author before its articles"]
            }
            Self::AuthorIndexDisabled => vec![
                "Set index.author_index = true and rebuild",
                "Use weighted author search, which needs no author index",
            ],
            Self::Persistence { .. } => vec![
                "Check that the data directory exists and is writable",
                "Check disk space",
            ],
            _ => Vec::new(),
        }
    }
}
