/// Embedder trait and shared types for text embedding.
///
/// The embedding model itself is an external collaborator; implementations
/// adapt it behind [`Embedder`]. L2 normalization is a pipeline
/// responsibility, applied once over the full corpus via [`normalize_rows`].
pub mod http;
pub mod mock;

use thiserror::Error;

/// Divisor substituted for an exactly-zero norm so the zero vector
/// normalizes to itself instead of producing NaN.
const ZERO_NORM_EPSILON: f32 = 1e-10;

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedding backend unreachable: {0}")]
    Unreachable(String),

    #[error("embedding request failed: {0}")]
    RequestFailed(String),

    #[error("embedding backend returned {got} vectors for {expected} inputs")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, one per input, in order.
    /// Empty input returns an empty vector, not an error.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// L2-normalize each row in place.
///
/// Rows with an exactly-zero norm are divided by a small epsilon instead,
/// which leaves them unchanged.
pub fn normalize_rows(rows: &mut [Vec<f32>]) {
    for row in rows.iter_mut() {
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        let divisor = if norm == 0.0 { ZERO_NORM_EPSILON } else { norm };
        for v in row.iter_mut() {
            *v /= divisor;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_norm() {
        let mut rows = vec![vec![3.0, 4.0]];
        normalize_rows(&mut rows);
        let norm: f32 = rows[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "expected unit norm, got {norm}");
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut rows = vec![vec![0.0, 0.0]];
        normalize_rows(&mut rows);
        assert_eq!(rows[0], vec![0.0, 0.0]);
        assert!(rows[0].iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_normalize_empty_input() {
        let mut rows: Vec<Vec<f32>> = Vec::new();
        normalize_rows(&mut rows);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_normalize_multiple_rows() {
        let mut rows = vec![vec![1.0, 0.0], vec![0.0, 2.0], vec![0.0, 0.0]];
        normalize_rows(&mut rows);
        assert_eq!(rows[0], vec![1.0, 0.0]);
        assert_eq!(rows[1], vec![0.0, 1.0]);
        assert_eq!(rows[2], vec![0.0, 0.0]);
    }
}
