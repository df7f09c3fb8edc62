use crate::embeddings::cosine_similarity;
use crate::error::{Result, VectorStoreError};
use std::collections::HashMap;

/// Brute-force vector index keyed by entry id
pub struct FlatIndex {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Add or replace a vector
    pub fn add(&mut self, id: &str, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;
        self.vectors.insert(id.to_string(), vector.to_vec());
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.vectors.remove(id).is_some()
    }

    /// Top `k` ids by cosine similarity among those `accept` admits.
    /// Ties break on id so results are stable.
    pub fn search<F>(&self, query: &[f32], k: usize, mut accept: F) -> Result<Vec<(String, f32)>>
    where
        F: FnMut(&str) -> bool,
    {
        self.check_dimension(query)?;

        let mut scores: Vec<(&String, f32)> = self
            .vectors
            .iter()
            .filter(|(id, _)| accept(id))
            .map(|(id, vector)| (id, cosine_similarity(query, vector)))
            .collect();

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        scores.truncate(k);

        Ok(scores.into_iter().map(|(id, score)| (id.clone(), score)).collect())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}
