//! Vector arithmetic used for scoring and aggregation.
//!
//! Similarity throughout the crate is the plain inner product. Nothing in
//! here normalizes implicitly: a vector with twice the magnitude scores twice
//! as high. Use [`normalized`] on the caller side when cosine behavior is
//! wanted.

use crate::vector::VectorError;

/// Epsilon below which a norm is treated as zero.
const EPSILON: f32 = 1e-10;

fn check_same_len(a: &[f32], b: &[f32]) -> Result<(), VectorError> {
    if a.len() != b.len() {
        return Err(VectorError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

/// Inner product of two vectors of the same dimension.
pub fn dot(a: &[f32], b: &[f32]) -> Result<f32, VectorError> {
    check_same_len(a, b)?;
    Ok(dot_unchecked(a, b))
}

/// Inner product without the length check.
///
/// Only for hot loops where both operands were validated against the same
/// [`VectorDimension`](crate::vector::VectorDimension) beforehand.
#[inline]
pub(crate) fn dot_unchecked(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Element-wise `w * v`.
#[must_use]
pub fn scale(v: &[f32], w: f32) -> Vec<f32> {
    v.iter().map(|x| x * w).collect()
}

/// Element-wise sum of two vectors of the same dimension.
pub fn add(a: &[f32], b: &[f32]) -> Result<Vec<f32>, VectorError> {
    check_same_len(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x + y).collect())
}

/// Unweighted element-wise mean of a non-empty set of vectors.
pub fn mean<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Vec<f32>, VectorError> {
    let first = vectors.first().ok_or(VectorError::EmptyInput)?.as_ref();
    let mut sum = first.to_vec();
    for vector in &vectors[1..] {
        let vector = vector.as_ref();
        check_same_len(&sum, vector)?;
        for (acc, value) in sum.iter_mut().zip(vector) {
            *acc += value;
        }
    }
    Ok(scale(&sum, 1.0 / vectors.len() as f32))
}

/// Euclidean norm.
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Returns a unit-length copy of `v`. Zero vectors are returned unchanged.
#[must_use]
pub fn normalized(v: &[f32]) -> Vec<f32> {
    let n = norm(v);
    if n > EPSILON { scale(v, 1.0 / n) } else { v.to_vec() }
}

/// Cosine similarity in `[-1, 1]`; zero when either vector has zero norm.
///
/// Used only to partition vectors into IVF lists, never for ranking.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = norm(a);
    let norm_b = norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_unchecked(a, b) / (norm_a * norm_b)
    }
}
