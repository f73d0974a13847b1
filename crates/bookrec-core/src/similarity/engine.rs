use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;

use crate::error::{BookrecError, Result};
use crate::features::FeatureMatrix;
use crate::models::{BookId, Dataset};
use crate::similarity::{HybridWeights, SimilarityMatrix, SimilarityMode};

/// A ranked candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Recommendation {
    pub book: BookId,
    pub score: f32,
}

/// Every signal for one ordered pair of books.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComponentScores {
    pub title: f32,
    pub genre: f32,
    pub rating: f32,
    pub year: f32,
    /// 1 when both books carry the same cluster label, else 0.
    pub same_cluster: f32,
}

/// Similarity matrices computed from one frozen dataset. Rebuild on change.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    title: SimilarityMatrix,
    genre: SimilarityMatrix,
    rating: SimilarityMatrix,
    year: SimilarityMatrix,
    clusters: Vec<Option<usize>>,
    rating_counts: Vec<u64>,
    title_keys: Vec<String>,
    weights: HybridWeights,
}

impl SimilarityEngine {
    pub fn build(dataset: &Dataset, features: &FeatureMatrix, weights: HybridWeights) -> Result<Self> {
        if dataset.len() != features.len() {
            return Err(BookrecError::SchemaMismatch(format!(
                "{} feature rows for {} books",
                features.len(),
                dataset.len()
            )));
        }

        let books = dataset.books();
        let ratings: Vec<Option<f64>> = books.iter().map(|b| b.rating).collect();
        let years: Vec<Option<f64>> = books.iter().map(|b| b.year.map(f64::from)).collect();

        let engine = Self {
            title: SimilarityMatrix::cosine(&features.text),
            genre: SimilarityMatrix::cosine_dense(&features.genre),
            rating: SimilarityMatrix::scalar_closeness(&ratings),
            year: SimilarityMatrix::scalar_closeness(&years),
            clusters: books.iter().map(|b| b.cluster).collect(),
            rating_counts: books.iter().map(|b| b.rating_count).collect(),
            title_keys: books.iter().map(|b| b.key.title.clone()).collect(),
            weights: weights.normalized(),
        };
        debug!(books = engine.len(), "built similarity matrices");
        Ok(engine)
    }

    pub fn len(&self) -> usize {
        self.title.len()
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
    }

    /// Normalized weights in effect.
    pub fn weights(&self) -> HybridWeights {
        self.weights
    }

    fn check(&self, id: BookId) -> Result<()> {
        if id.0 < self.len() {
            Ok(())
        } else {
            Err(BookrecError::BookNotFound(id.0))
        }
    }

    pub fn components(&self, a: BookId, b: BookId) -> Result<ComponentScores> {
        self.check(a)?;
        self.check(b)?;
        Ok(self.components_unchecked(a.0, b.0))
    }

    fn components_unchecked(&self, a: usize, b: usize) -> ComponentScores {
        let same_cluster = match (self.clusters[a], self.clusters[b]) {
            (Some(x), Some(y)) if x == y => 1.0,
            _ => 0.0,
        };
        ComponentScores {
            title: self.title.get(a, b),
            genre: self.genre.get(a, b),
            rating: self.rating.get(a, b),
            year: self.year.get(a, b),
            same_cluster,
        }
    }

    fn hybrid(&self, c: &ComponentScores) -> f32 {
        let w = &self.weights;
        let score = w.title * c.title as f64
            + w.genre * c.genre as f64
            + w.rating * c.rating as f64
            + w.year * c.year as f64
            + w.cluster * c.same_cluster as f64;
        (score as f32).clamp(0.0, 1.0)
    }

    fn score_unchecked(&self, mode: SimilarityMode, a: usize, b: usize) -> f32 {
        match mode {
            SimilarityMode::Title => self.title.get(a, b),
            SimilarityMode::Genre => self.genre.get(a, b),
            SimilarityMode::Rating => self.rating.get(a, b),
            SimilarityMode::Year => self.year.get(a, b),
            SimilarityMode::Hybrid => self.hybrid(&self.components_unchecked(a, b)),
        }
    }

    pub fn score(&self, mode: SimilarityMode, a: BookId, b: BookId) -> Result<f32> {
        self.check(a)?;
        self.check(b)?;
        Ok(self.score_unchecked(mode, a.0, b.0))
    }

    /// Every other book ranked against `id`: score descending, then rating
    /// count descending, then title, then id.
    pub fn rank(&self, id: BookId, mode: SimilarityMode) -> Result<Vec<Recommendation>> {
        self.check(id)?;
        let mut ranked: Vec<Recommendation> = (0..self.len())
            .filter(|&j| j != id.0)
            .map(|j| Recommendation {
                book: BookId(j),
                score: self.score_unchecked(mode, id.0, j),
            })
            .collect();
        ranked.sort_by(|a, b| self.compare(a, b));
        Ok(ranked)
    }

    pub fn recommend(
        &self,
        id: BookId,
        mode: SimilarityMode,
        top_n: usize,
    ) -> Result<Vec<Recommendation>> {
        let mut ranked = self.rank(id, mode)?;
        ranked.truncate(top_n);
        Ok(ranked)
    }

    fn compare(&self, a: &Recommendation, b: &Recommendation) -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then_with(|| self.rating_counts[b.book.0].cmp(&self.rating_counts[a.book.0]))
            .then_with(|| self.title_keys[a.book.0].cmp(&self.title_keys[b.book.0]))
            .then_with(|| a.book.cmp(&b.book))
    }
}
