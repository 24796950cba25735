//! Vector primitives and similarity indexes.
//!
//! Everything here is ignorant of authors and articles: vectors come in with
//! a string identity and a small payload, and ranked hits come out.
//!
//! # Architecture
//! Similarity is the inner product. Two index strategies implement
//! [`VectorIndex`]: an exact [`FlatIndex`] and an [`IvfIndex`] that
//! partitions rows with K-means clustering and scans only the lists nearest
//! to the query. [`SharedIndex`] adds reader/writer locking on top.

mod clustering;
mod embedding;
mod index;
pub mod math;
mod types;

pub use clustering::{ClusteringError, KMeansResult, assign_to_nearest_centroid, kmeans_clustering};
pub use embedding::{
    EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashEmbeddingProvider, models_dir,
    parse_embedding_model,
};
pub use index::{
    FlatIndex, IndexEntry, IndexKind, IvfIndex, IvfParams, Payload, SearchHit, SharedIndex,
    VectorIndex, create_index,
};
pub use math::{add, dot, mean, normalized, scale};
pub use types::{ClusterId, VECTOR_DIMENSION_384, VectorDimension, VectorError};
