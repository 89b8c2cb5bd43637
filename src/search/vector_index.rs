//! Exact inner-product nearest-neighbor index
//!
//! Vectors are stored contiguously, row-major, in insertion order. Cosine
//! similarity comes from storing unit vectors; search normalizes only the
//! query.

use super::embedding::inner_product;
use crate::error::{IndexError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Build an index from rows, all of which must share `dimension`
    pub fn build<I, V>(dimension: usize, vectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: AsRef<[f32]>,
    {
        let mut index = Self::new(dimension);
        for v in vectors {
            index.push(v.as_ref())?;
        }
        Ok(index)
    }

    /// Reassemble an index from a flat row-major buffer
    pub fn from_flat(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 && !data.is_empty() {
            return Err(IndexError::DimensionMismatch {
                expected: 0,
                actual: data.len(),
            });
        }
        if dimension > 0 && data.len() % dimension != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: data.len() % dimension,
            });
        }
        Ok(Self { dimension, data })
    }

    fn push(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Top-`k` positions by inner product with the normalized query, best
    /// first, ties going to the lower position. A query of the wrong
    /// dimension matches nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 || self.is_empty() || query.len() != self.dimension {
            return Vec::new();
        }

        let norm = inner_product(query, query).sqrt();
        let normalized: Vec<f32>;
        let query = if norm > 0.0 && (norm - 1.0).abs() > 1e-6 {
            normalized = query.iter().map(|x| x / norm).collect();
            &normalized[..]
        } else {
            query
        };

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| (position, inner_product(query, row)))
            .collect();

        // Stable sort keeps insertion order among equal scores. NaN rows
        // rank below everything else.
        scored.sort_by(|a, b| rank_key(b.1).total_cmp(&rank_key(a.1)));
        scored.truncate(k);
        scored
    }
}

fn rank_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}
