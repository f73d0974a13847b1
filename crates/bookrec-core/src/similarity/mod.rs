//! Similarity Engine: per-signal matrices and hybrid top-N lookup.

pub mod engine;
pub mod matrix;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BookrecError;

pub use engine::{ComponentScores, Recommendation, SimilarityEngine};
pub use matrix::SimilarityMatrix;

/// Which signal ranks recommendations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMode {
    Title,
    Genre,
    Rating,
    Year,
    #[default]
    Hybrid,
}

impl SimilarityMode {
    pub const ALL: [SimilarityMode; 5] = [
        Self::Hybrid,
        Self::Title,
        Self::Genre,
        Self::Rating,
        Self::Year,
    ];

    /// Next mode in [`Self::ALL`] order, wrapping around.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Genre => "genre",
            Self::Rating => "rating",
            Self::Year => "year",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for SimilarityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMode {
    type Err = BookrecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BookrecError::ConfigError(format!("unknown similarity mode: {s}")))
    }
}

/// Weights of the hybrid score. Normalized to sum 1 before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridWeights {
    pub title: f64,
    pub genre: f64,
    pub rating: f64,
    pub year: f64,
    /// Bonus for candidates in the query book's cluster.
    pub cluster: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            title: 0.45,
            genre: 0.25,
            rating: 0.15,
            year: 0.10,
            cluster: 0.05,
        }
    }
}

impl HybridWeights {
    pub fn total(&self) -> f64 {
        self.title + self.genre + self.rating + self.year + self.cluster
    }

    /// Negative weights are clamped to zero; all-zero weights stay zero.
    pub fn normalized(&self) -> Self {
        let clamped = Self {
            title: self.title.max(0.0),
            genre: self.genre.max(0.0),
            rating: self.rating.max(0.0),
            year: self.year.max(0.0),
            cluster: self.cluster.max(0.0),
        };
        let total = clamped.total();
        if total <= 0.0 {
            return clamped;
        }
        Self {
            title: clamped.title / total,
            genre: clamped.genre / total,
            rating: clamped.rating / total,
            year: clamped.year / total,
            cluster: clamped.cluster / total,
        }
    }
}
