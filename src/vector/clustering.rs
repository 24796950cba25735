//! K-means clustering used to partition vectors into IVF lists.
//!
//! Partitioning uses cosine similarity between vectors and unit-length
//! centroids, with K-means++ seeding. Ranking inside a list is still done by
//! inner product; clustering only decides which list a vector lives in.
//!
//! # Algorithm Details
//! - Distance metric: cosine similarity
//! - Initialization: K-means++ driven by a caller-provided RNG
//! - Max iterations: 100
//! - Convergence tolerance: 1e-4
//!
//! # Performance Characteristics
//! - O(n * k * d * iterations) time complexity
//! - O(k * d) space for centroids

use crate::vector::math::{cosine_similarity, normalized};
use crate::vector::types::ClusterId;
use rand::Rng;
use thiserror::Error;

/// Maximum number of iterations for K-means clustering.
const MAX_ITERATIONS: usize = 100;

/// Convergence tolerance for centroid updates.
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

/// Epsilon for floating-point comparisons.
const EPSILON: f32 = 1e-10;

/// Result of K-means clustering operation.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Unit-length cluster centroids.
    pub centroids: Vec<Vec<f32>>,

    /// Cluster assignment for each input vector.
    pub assignments: Vec<ClusterId>,

    /// Number of iterations until convergence.
    pub iterations: usize,
}

/// Errors that can occur during clustering operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusteringError {
    #[error(
        "Empty vector set provided for clustering\nSuggestion: Insert entries before building the index"
    )]
    EmptyVectorSet,

    #[error("Invalid cluster count: {0}\nSuggestion: Use k between 1 and the number of vectors")]
    InvalidClusterCount(usize),

    #[error(
        "Dimension mismatch in vectors\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch,

    #[error(
        "Failed to initialize centroids\nSuggestion: Check that vectors contain valid floating-point values"
    )]
    InitializationFailed,
}

/// Performs K-means clustering on a set of vectors.
///
/// # Arguments
/// * `vectors` - Input vectors (non-empty, same dimension)
/// * `k` - Number of clusters (`1 <= k <= vectors.len()`)
/// * `rng` - Random source for seeding; a seeded RNG makes the result
///   reproducible
///
/// Fewer than `k` centroids may come back when the input holds fewer than
/// `k` distinct directions.
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans_clustering<R: Rng + ?Sized>(
    vectors: &[&[f32]],
    k: usize,
    rng: &mut R,
) -> Result<KMeansResult, ClusteringError> {
    if vectors.is_empty() {
        return Err(ClusteringError::EmptyVectorSet);
    }

    if k == 0 || k > vectors.len() {
        return Err(ClusteringError::InvalidClusterCount(k));
    }

    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }

    let mut centroids = initialize_centroids_kmeans_plus_plus(vectors, k, rng)?;
    let mut assignments = vec![ClusterId::from_index(0); vectors.len()];
    let mut iterations = 0;

    loop {
        iterations += 1;

        let centroid_refs: Vec<&[f32]> = centroids.iter().map(|c| c.as_slice()).collect();
        let new_assignments: Vec<ClusterId> = vectors
            .iter()
            .map(|vector| assign_to_nearest_centroid(vector, &centroid_refs))
            .collect();

        let converged = iterations > 1 && new_assignments == assignments;
        assignments = new_assignments;

        if converged || iterations >= MAX_ITERATIONS {
            break;
        }

        let new_centroids = update_centroids(vectors, &assignments, centroids.len(), rng);
        let centroid_movement = calculate_centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        if centroid_movement < CONVERGENCE_TOLERANCE {
            // Keep assignments consistent with the final centroids
            let centroid_refs: Vec<&[f32]> = centroids.iter().map(|c| c.as_slice()).collect();
            assignments = vectors
                .iter()
                .map(|vector| assign_to_nearest_centroid(vector, &centroid_refs))
                .collect();
            break;
        }
    }

    if iterations >= MAX_ITERATIONS {
        tracing::warn!("K-means did not fully converge after {MAX_ITERATIONS} iterations");
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
    })
}

/// Assigns a vector to the most similar centroid.
///
/// Ties go to the lower cluster ID.
pub fn assign_to_nearest_centroid(vector: &[f32], centroids: &[&[f32]]) -> ClusterId {
    let mut best_similarity = f32::NEG_INFINITY;
    let mut best_cluster = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let similarity = cosine_similarity(vector, centroid);
        if similarity > best_similarity {
            best_similarity = similarity;
            best_cluster = i;
        }
    }

    ClusterId::from_index(best_cluster)
}

/// Updates centroids as the normalized mean of their assigned vectors.
fn update_centroids<R: Rng + ?Sized>(
    vectors: &[&[f32]],
    assignments: &[ClusterId],
    k: usize,
    rng: &mut R,
) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut new_centroids = vec![vec![0.0; dimension]; k];
    let mut cluster_sizes = vec![0usize; k];

    for (vector, cluster_id) in vectors.iter().zip(assignments.iter()) {
        let cluster_idx = cluster_id.index();
        for (sum, &value) in new_centroids[cluster_idx].iter_mut().zip(vector.iter()) {
            *sum += value;
        }
        cluster_sizes[cluster_idx] += 1;
    }

    for (centroid, &size) in new_centroids.iter_mut().zip(cluster_sizes.iter()) {
        if size == 0 {
            // Empty cluster: reseed from a random input vector
            let random_idx = rng.random_range(0..vectors.len());
            *centroid = normalized(vectors[random_idx]);
        } else {
            for value in centroid.iter_mut() {
                *value /= size as f32;
            }
            *centroid = normalized(centroid);
        }
    }

    new_centroids
}

/// Initializes centroids using the K-means++ algorithm.
fn initialize_centroids_kmeans_plus_plus<R: Rng + ?Sized>(
    vectors: &[&[f32]],
    k: usize,
    rng: &mut R,
) -> Result<Vec<Vec<f32>>, ClusteringError> {
    let mut centroids = Vec::with_capacity(k);

    let first_idx = rng.random_range(0..vectors.len());
    centroids.push(normalized(vectors[first_idx]));

    for _ in 1..k {
        let mut distances = vec![0.0f32; vectors.len()];
        let mut total_distance = 0.0f32;

        for (i, vector) in vectors.iter().enumerate() {
            let min_distance = centroids
                .iter()
                .map(|centroid| 1.0 - cosine_similarity(vector, centroid))
                .fold(f32::MAX, f32::min)
                .max(0.0);

            distances[i] = min_distance * min_distance;
            total_distance += distances[i];
        }

        if total_distance < EPSILON {
            // Every remaining point coincides with an existing centroid
            break;
        }

        let target = rng.random::<f32>() * total_distance;
        let mut cumulative = 0.0;
        let mut chosen = None;

        for (i, &distance) in distances.iter().enumerate() {
            cumulative += distance;
            if distance > 0.0 && cumulative >= target {
                chosen = Some(i);
                break;
            }
        }

        // Rounding can leave the target just past the final sum
        let chosen = chosen
            .or_else(|| distances.iter().rposition(|&d| d > 0.0))
            .ok_or(ClusteringError::InitializationFailed)?;
        centroids.push(normalized(vectors[chosen]));
    }

    if centroids.is_empty() {
        return Err(ClusteringError::InitializationFailed);
    }

    Ok(centroids)
}

/// Mean cosine distance travelled by the centroids between iterations.
fn calculate_centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(old_c, new_c)| 1.0 - cosine_similarity(old_c, new_c))
        .sum::<f32>()
        / old.len() as f32
}
