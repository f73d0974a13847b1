use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a record was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Listing,
    OpenLibrary,
    GoogleBooks,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::OpenLibrary => "openlibrary",
            Self::GoogleBooks => "googlebooks",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar field as it arrived: a JSON number or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Genres as delivered by a source: one delimited string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawGenres {
    List(Vec<String>),
    Text(String),
}

impl Default for RawGenres {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl From<&str> for RawGenres {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Vec<String>> for RawGenres {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

/// One loosely structured row emitted by the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: SourceKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default)]
    pub genres: RawGenres,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_count: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "Utc::now")]
    pub collected_at: DateTime<Utc>,
}

impl RawRecord {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            title: None,
            author: None,
            genres: RawGenres::default(),
            rating: None,
            rating_count: None,
            year: None,
            url: None,
            collected_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_genres(mut self, genres: impl Into<RawGenres>) -> Self {
        self.genres = genres.into();
        self
    }

    pub fn with_rating(mut self, rating: impl Into<RawValue>) -> Self {
        self.rating = Some(rating.into());
        self
    }

    pub fn with_rating_count(mut self, count: impl Into<RawValue>) -> Self {
        self.rating_count = Some(count.into());
        self
    }

    pub fn with_year(mut self, year: impl Into<RawValue>) -> Self {
        self.year = Some(year.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}
