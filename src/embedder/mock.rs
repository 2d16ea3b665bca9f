/// Mock embedder for tests and offline smoke runs.
///
/// Produces deterministic, L2-normalized vectors seeded from a text hash,
/// so identical inputs always map to identical vectors without any model.
use std::hash::{DefaultHasher, Hash, Hasher};

use super::{Embedder, EmbedderError};

pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl Embedder for MockEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish().to_le_bytes();

        let mut vector = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            // Cycle through the seed bytes, offset by position so the
            // vector is not periodic with period 8.
            let byte = seed[i % 8].wrapping_add((i / 8) as u8);
            vector.push(f32::from(byte) / 255.0);
        }

        let norm_sq: f32 = vector.iter().map(|v| v * v).sum();
        if norm_sq > 0.0 {
            let inv = 1.0 / norm_sq.sqrt();
            for v in &mut vector {
                *v *= inv;
            }
        }

        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
