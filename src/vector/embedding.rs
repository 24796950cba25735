//! Text → vector conversion at the edge of the core.
//!
//! The store never embeds text itself. It calls an [`EmbeddingProvider`]
//! handed to it at construction and treats any failure as "embedding
//! unavailable". Two providers ship with the crate:
//!
//! - [`FastEmbedProvider`] runs a local fastembed model.
//! - [`HashEmbeddingProvider`] hashes tokens into a fixed number of buckets.
//!   It has no notion of meaning, but it is deterministic and offline, which
//!   makes it the provider of choice for tests and smoke runs.

use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use thiserror::Error;

use crate::vector::math::normalized;
use crate::vector::{VectorDimension, VectorError};

/// Errors raised by embedding providers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error(
        "Failed to initialize embedding model: {0}\nSuggestion: Ensure you have internet connection for first-time model download"
    )]
    ModelInit(String),

    #[error("Unknown embedding model '{0}'\nSuggestion: Use one of AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, MultilingualE5Small")]
    UnknownModel(String),

    #[error("Failed to generate embedding: {0}")]
    Generation(String),

    #[error("Embedding provider returned a malformed vector: {0}")]
    Malformed(#[from] VectorError),
}

/// Converts text into vectors of a fixed dimension.
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embeds several texts, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Dimension of every vector this provider returns.
    fn dimension(&self) -> VectorDimension;
}

/// Directory fastembed caches downloaded models in.
#[must_use]
pub fn models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("corpus-search")
        .join("models")
}

/// Maps a configuration string onto a fastembed model.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, EmbeddingError> {
    match name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        other => Err(EmbeddingError::UnknownModel(other.to_string())),
    }
}

/// Local fastembed model behind a mutex (fastembed needs `&mut` to embed).
pub struct FastEmbedProvider {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl FastEmbedProvider {
    /// Loads (downloading on first use) the named model.
    ///
    /// The dimension is measured with a throwaway embedding so that any model
    /// fastembed supports works without a lookup table.
    pub fn new(model_name: &str, show_download_progress: bool) -> Result<Self, EmbeddingError> {
        let model = parse_embedding_model(model_name)?;
        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(models_dir())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

        let sample = text_model
            .embed(vec!["dimension check"], None)
            .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;
        let width = sample.first().map(Vec::len).unwrap_or_default();
        let dimension = VectorDimension::new(width)?;

        tracing::info!("Loaded embedding model {model_name} ({dimension} dimensions)");

        Ok(Self {
            model: Mutex::new(text_model),
            dimension,
        })
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("dimension", &self.dimension)
            .field("model", &"<TextEmbedding>")
            .finish()
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Generation("model returned no vector".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();
        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                EmbeddingError::Generation(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(text_strings, None)
            .map_err(|e| EmbeddingError::Generation(e.to_string()))?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Deterministic feature-hashing provider.
///
/// Each lowercase alphanumeric token is hashed (FNV-1a) into one of
/// `dimension` buckets with a hash-derived sign; the result is normalized to
/// unit length. Texts sharing tokens get positive inner products.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbeddingProvider {
    dimension: VectorDimension,
}

impl HashEmbeddingProvider {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let d = self.dimension.get();
        let mut vector = vec![0.0f32; d];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (hash % d as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        Ok(normalized(&vector))
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}
