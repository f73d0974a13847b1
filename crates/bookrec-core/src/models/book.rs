use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BookrecError, Result};
use crate::models::SourceKind;

/// Position of a book in a frozen [`Dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub usize);

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a book: case-folded, whitespace-collapsed title and author.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BookKey {
    pub title: String,
    pub author: String,
}

impl BookKey {
    pub fn new(title: &str, author: &str) -> Self {
        Self {
            title: Self::fold(title),
            author: Self::fold(author),
        }
    }

    /// Case-fold and collapse whitespace, the same way key fields are built.
    pub fn fold(s: &str) -> String {
        s.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

// ─── BookRecord ─────────────────────────────────────────────

/// One cleaned, merged row of the book table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub key: BookKey,

    /// Display title: trimmed, whitespace collapsed, original casing.
    pub title: String,
    pub author: String,

    /// Genre tokens as parsed, before synonym mapping.
    #[serde(default)]
    pub raw_genres: Vec<String>,

    /// Normalized, sorted, unique genre tags.
    #[serde(default)]
    pub genres: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,

    #[serde(default)]
    pub rating_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(default)]
    pub sources: Vec<SourceKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<usize>,
}

impl BookRecord {
    pub fn new(title: &str, author: &str) -> Self {
        Self {
            key: BookKey::new(title, author),
            title: title.split_whitespace().collect::<Vec<_>>().join(" "),
            author: author.split_whitespace().collect::<Vec<_>>().join(" "),
            raw_genres: Vec::new(),
            genres: Vec::new(),
            rating: None,
            rating_count: 0,
            year: None,
            source_url: None,
            sources: Vec::new(),
            cluster: None,
        }
    }

    pub fn has_genre(&self, tag: &str) -> bool {
        self.genres.iter().any(|g| g == tag)
    }

    /// Number of populated optional fields; used to pick among duplicates.
    pub fn completeness(&self) -> usize {
        let mut score = 0;
        if !self.genres.is_empty() {
            score += 1;
        }
        if self.rating.is_some() {
            score += 1;
        }
        if self.rating_count > 0 {
            score += 1;
        }
        if self.year.is_some() {
            score += 1;
        }
        if self.source_url.is_some() {
            score += 1;
        }
        score
    }
}

// ─── Dataset ────────────────────────────────────────────────

/// The frozen merged table. Stages return new snapshots instead of mutating.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    books: Vec<BookRecord>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Dataset {
    /// Build a dataset, rejecting duplicate identity keys.
    pub fn new(books: Vec<BookRecord>) -> Result<Self> {
        let mut seen: HashMap<&BookKey, usize> = HashMap::with_capacity(books.len());
        for (idx, book) in books.iter().enumerate() {
            if let Some(prev) = seen.insert(&book.key, idx) {
                return Err(BookrecError::SchemaMismatch(format!(
                    "rows {prev} and {idx} share key ({}, {})",
                    book.key.title, book.key.author
                )));
            }
        }
        Ok(Self {
            books,
            created_at: Some(Utc::now()),
        })
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn books(&self) -> &[BookRecord] {
        &self.books
    }

    pub fn get(&self, id: BookId) -> Result<&BookRecord> {
        self.books.get(id.0).ok_or(BookrecError::BookNotFound(id.0))
    }

    pub fn ids(&self) -> impl Iterator<Item = BookId> + '_ {
        (0..self.books.len()).map(BookId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BookId, &BookRecord)> + '_ {
        self.books.iter().enumerate().map(|(i, b)| (BookId(i), b))
    }

    pub fn find_key(&self, key: &BookKey) -> Option<BookId> {
        self.books.iter().position(|b| &b.key == key).map(BookId)
    }

    /// A new snapshot with one cluster label per book.
    pub fn with_clusters(&self, labels: &[usize]) -> Result<Self> {
        if labels.len() != self.books.len() {
            return Err(BookrecError::SchemaMismatch(format!(
                "{} cluster labels for {} books",
                labels.len(),
                self.books.len()
            )));
        }
        let books = self
            .books
            .iter()
            .zip(labels)
            .map(|(book, &label)| BookRecord {
                cluster: Some(label),
                ..book.clone()
            })
            .collect();
        Ok(Self {
            books,
            created_at: self.created_at,
        })
    }

    /// Sorted distinct genre tags with the number of books carrying each.
    pub fn genre_counts(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for book in &self.books {
            for tag in &book.genres {
                *counts.entry(tag.as_str()).or_default() += 1;
            }
        }
        let mut out: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(tag, n)| (tag.to_string(), n))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}
