//! TF-IDF text vectorization with a bounded vocabulary.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::features::sparse::SparseVector;
use crate::features::stop_words;

/// Configuration for fitting a [`TfidfModel`].
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    max_features: usize,
    stop_words: &'static HashSet<&'static str>,
}

/// A fitted vocabulary and its inverse document frequencies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TfidfModel {
    vocabulary: Vec<String>,
    index: HashMap<String, u32>,
    idf: Vec<f32>,
}

impl TfidfVectorizer {
    /// English stop words removed, at most `max_features` terms.
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features,
            stop_words: &*stop_words::ENGLISH,
        }
    }

    /// Lowercased runs of ≥2 alphanumeric characters, stop words removed.
    pub fn tokenize(&self, doc: &str) -> Vec<String> {
        doc.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2)
            .map(str::to_lowercase)
            .filter(|t| !self.stop_words.contains(t.as_str()))
            .collect()
    }

    /// Learn the vocabulary: the `max_features` most frequent terms across
    /// the corpus, ties broken alphabetically; columns in alphabetical order.
    pub fn fit<S: AsRef<str>>(&self, docs: &[S]) -> TfidfModel {
        let mut term_freq: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in docs {
            let tokens = self.tokenize(doc.as_ref());
            let mut seen = HashSet::new();
            for token in tokens {
                if seen.insert(token.clone()) {
                    *doc_freq.entry(token.clone()).or_default() += 1;
                }
                *term_freq.entry(token).or_default() += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = term_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.max_features);

        let mut vocabulary: Vec<String> = ranked.into_iter().map(|(t, _)| t).collect();
        vocabulary.sort();

        let n = docs.len() as f32;
        let idf = vocabulary
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        let index = vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();

        TfidfModel {
            vocabulary,
            index,
            idf,
        }
    }

    pub fn fit_transform<S: AsRef<str>>(&self, docs: &[S]) -> (TfidfModel, Vec<SparseVector>) {
        let model = self.fit(docs);
        let rows = docs
            .iter()
            .map(|doc| model.transform(self, doc.as_ref()))
            .collect();
        (model, rows)
    }
}

impl TfidfModel {
    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn idf(&self, term: &str) -> Option<f32> {
        self.index.get(term).map(|&i| self.idf[i as usize])
    }

    /// L2-normalized TF-IDF row; out-of-vocabulary terms are ignored.
    pub fn transform(&self, vectorizer: &TfidfVectorizer, doc: &str) -> SparseVector {
        let pairs: Vec<(u32, f32)> = vectorizer
            .tokenize(doc)
            .into_iter()
            .filter_map(|t| self.index.get(&t).copied())
            .map(|i| (i, 1.0))
            .collect();
        let counts = SparseVector::from_pairs(self.len(), pairs);
        let weighted = SparseVector::from_pairs(
            self.len(),
            counts
                .iter()
                .map(|(i, tf)| (i, tf * self.idf[i as usize]))
                .collect(),
        );
        let norm = weighted.norm();
        if norm == 0.0 {
            weighted
        } else {
            weighted.scaled(1.0 / norm)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stop_words_and_short_tokens() {
        let v = TfidfVectorizer::new(100);
        assert_eq!(
            v.tokenize("The Lord of the Rings: J. R. R. Tolkien"),
            vec!["lord", "rings", "tolkien"]
        );
    }

    #[test]
    fn test_vocabulary_capped_by_frequency_then_alphabet() {
        let docs = ["dragon magic", "dragon quest", "magic school", "zebra"];
        let model = TfidfVectorizer::new(2).fit(&docs);
        assert_eq!(model.vocabulary(), ["dragon", "magic"]);

        let model = TfidfVectorizer::new(3).fit(&docs);
        // "quest", "school" and "zebra" tie at 1; "quest" wins alphabetically.
        assert_eq!(model.vocabulary(), ["dragon", "magic", "quest"]);
    }

    #[test]
    fn test_smoothed_idf() {
        let docs = ["dragon magic", "dragon"];
        let model = TfidfVectorizer::new(10).fit(&docs);
        assert!((model.idf("dragon").unwrap() - 1.0).abs() < 1e-6);
        let expected = (3.0f32 / 2.0).ln() + 1.0;
        assert!((model.idf("magic").unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_rows_are_l2_normalized() {
        let docs = ["hobbit tolkien fantasy", "dune herbert science fiction", "the"];
        let v = TfidfVectorizer::new(50);
        let (_, rows) = v.fit_transform(&docs);
        for row in &rows[..2] {
            assert!((row.norm() - 1.0).abs() < 1e-5);
        }
        assert!(rows[2].is_zero());
    }
}
