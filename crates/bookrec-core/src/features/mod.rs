//! Feature Builder: feature text, one-hot genres and TF-IDF rows.

pub mod genre;
pub mod sparse;
pub mod stop_words;
pub mod tfidf;

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::FeatureConfig;
use crate::error::{BookrecError, Result};
use crate::models::{BookRecord, Dataset};

pub use genre::GenreVocabulary;
pub use sparse::SparseVector;
pub use tfidf::{TfidfModel, TfidfVectorizer};

/// Vocabulary size presets for the text vectorizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorizerPreset {
    /// Large vocabulary for offline analysis.
    #[default]
    Analysis,
    /// Small vocabulary bounding memory and latency in the app.
    Interactive,
}

impl std::fmt::Display for VectorizerPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analysis => f.write_str("analysis"),
            Self::Interactive => f.write_str("interactive"),
        }
    }
}

impl FromStr for VectorizerPreset {
    type Err = BookrecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "analysis" => Ok(Self::Analysis),
            "interactive" | "app" => Ok(Self::Interactive),
            other => Err(BookrecError::ConfigError(format!(
                "unknown vectorizer preset: {other}"
            ))),
        }
    }
}

/// Normalized title, author and genre tokens joined by single spaces.
pub fn feature_text(book: &BookRecord) -> String {
    let mut parts: Vec<&str> = vec![book.title.as_str(), book.author.as_str()];
    parts.extend(book.genres.iter().map(String::as_str));
    parts
        .join(" ")
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// All derived feature rows for a frozen dataset, indexed by `BookId`.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub texts: Vec<String>,
    pub text: Vec<SparseVector>,
    pub genre: Vec<Vec<f32>>,
    pub vocabulary: GenreVocabulary,
    pub tfidf: TfidfModel,
    pub preset: VectorizerPreset,
    genre_weight: f32,
}

impl FeatureMatrix {
    pub fn build(dataset: &Dataset, config: &FeatureConfig) -> Result<Self> {
        let vocabulary = GenreVocabulary::build(dataset, config.genre_vocabulary_size);
        Self::build_with_vocabulary(dataset, config, vocabulary)
    }

    /// Build against a previously persisted genre vocabulary.
    pub fn build_with_vocabulary(
        dataset: &Dataset,
        config: &FeatureConfig,
        vocabulary: GenreVocabulary,
    ) -> Result<Self> {
        if dataset.is_empty() {
            return Err(BookrecError::EmptyDataset);
        }

        let texts: Vec<String> = dataset.books().iter().map(feature_text).collect();
        let vectorizer = TfidfVectorizer::new(config.max_features(config.preset));
        let (tfidf, text) = vectorizer.fit_transform(&texts);
        let genre = dataset.books().iter().map(|b| vocabulary.vector(b)).collect();

        info!(
            books = dataset.len(),
            terms = tfidf.len(),
            genres = vocabulary.len(),
            preset = %config.preset,
            "built feature matrix"
        );

        Ok(Self {
            texts,
            text,
            genre,
            vocabulary,
            tfidf,
            preset: config.preset,
            genre_weight: config.genre_weight,
        })
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// `[tfidf | genre_weight · one-hot]` per book.
    pub fn combined(&self) -> Vec<SparseVector> {
        self.text
            .iter()
            .zip(&self.genre)
            .map(|(t, g)| t.concat(&SparseVector::from_dense(g).scaled(self.genre_weight)))
            .collect()
    }

    pub fn combined_dense(&self) -> Vec<Vec<f32>> {
        self.combined().iter().map(SparseVector::to_dense).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut hobbit = BookRecord::new("The Hobbit", "J.R.R. Tolkien");
        hobbit.genres = vec!["fantasy".into(), "fiction".into()];
        let mut dune = BookRecord::new("Dune", "Frank Herbert");
        dune.genres = vec!["science fiction".into()];
        let bare = BookRecord::new("Untitled Notes", "Anon");
        Dataset::new(vec![hobbit, dune, bare]).unwrap()
    }

    #[test]
    fn test_feature_text() {
        let ds = sample();
        assert_eq!(
            feature_text(&ds.books()[0]),
            "the hobbit j r r tolkien fantasy fiction"
        );
    }

    #[test]
    fn test_build_shapes() {
        let ds = sample();
        let fm = FeatureMatrix::build(&ds, &FeatureConfig::default()).unwrap();
        assert_eq!(fm.len(), 3);
        assert!(fm.genre.iter().all(|g| g.len() == fm.vocabulary.len()));
        assert_eq!(fm.genre[2], vec![0.0; fm.vocabulary.len()]);

        let combined = fm.combined();
        assert_eq!(combined[0].dim(), fm.tfidf.len() + fm.vocabulary.len());
    }

    #[test]
    fn test_interactive_preset_bounds_vocabulary() {
        let ds = sample();
        let mut cfg = FeatureConfig::default();
        cfg.interactive_max_features = 2;
        let fm = FeatureMatrix::build(&ds, &cfg.with_preset(VectorizerPreset::Interactive)).unwrap();
        assert_eq!(fm.tfidf.len(), 2);
        assert_eq!(fm.preset, VectorizerPreset::Interactive);
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let ds = Dataset::new(vec![]).unwrap();
        assert!(matches!(
            FeatureMatrix::build(&ds, &FeatureConfig::default()),
            Err(BookrecError::EmptyDataset)
        ));
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!("Interactive".parse::<VectorizerPreset>().unwrap(), VectorizerPreset::Interactive);
        assert!("huge".parse::<VectorizerPreset>().is_err());
    }
}
