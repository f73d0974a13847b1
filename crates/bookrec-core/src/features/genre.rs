use serde::{Deserialize, Serialize};

use crate::models::{BookRecord, Dataset};

/// The most frequent genre tags, fixed once computed. Column `i` of every
/// one-hot vector corresponds to `tags()[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreVocabulary {
    tags: Vec<String>,
}

impl GenreVocabulary {
    /// Top `size` tags by number of books carrying them; ties alphabetical.
    pub fn build(dataset: &Dataset, size: usize) -> Self {
        let tags = dataset
            .genre_counts()
            .into_iter()
            .take(size)
            .map(|(tag, _)| tag)
            .collect();
        Self { tags }
    }

    pub fn from_tags(tags: Vec<String>) -> Self {
        Self { tags }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn index_of(&self, tag: &str) -> Option<usize> {
        self.tags.iter().position(|t| t == tag)
    }

    /// Binary indicator vector; zero vector for books without known tags.
    pub fn vector(&self, book: &BookRecord) -> Vec<f32> {
        self.tags
            .iter()
            .map(|tag| if book.has_genre(tag) { 1.0 } else { 0.0 })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, genres: &[&str]) -> BookRecord {
        let mut b = BookRecord::new(title, "someone");
        b.genres = genres.iter().map(|g| g.to_string()).collect();
        b
    }

    #[test]
    fn test_top_k_with_alphabetical_ties() {
        let ds = Dataset::new(vec![
            book("a", &["fantasy", "fiction"]),
            book("b", &["fiction", "romance"]),
            book("c", &["horror", "fiction"]),
        ])
        .unwrap();

        let vocab = GenreVocabulary::build(&ds, 3);
        assert_eq!(vocab.tags(), ["fiction", "fantasy", "horror"]);
    }

    #[test]
    fn test_vector_is_binary_and_fixed_width() {
        let vocab = GenreVocabulary::from_tags(vec!["fantasy".into(), "fiction".into(), "horror".into()]);
        assert_eq!(vocab.vector(&book("x", &["horror", "poetry"])), vec![0.0, 0.0, 1.0]);
        assert_eq!(vocab.vector(&book("y", &[])), vec![0.0, 0.0, 0.0]);
    }
}
