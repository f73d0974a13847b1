use async_trait::async_trait;
use bookrec_core::{RawRecord, SourceKind};
use reqwest::Url;

use crate::error::{CollectError, Result};

pub mod google_books;
pub mod listing;
pub mod openlibrary;

pub use google_books::GoogleBooksSource;
pub use listing::{BookDetails, ListingEntry, ListingSource};
pub use openlibrary::OpenLibrarySource;

/// A per-book metadata API queried by title and author.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Best match for the book, or `None` when the API knows nothing of it.
    async fn lookup(&self, title: &str, author: &str) -> Result<Option<RawRecord>>;
}

pub(crate) fn parse_base_url(base_url: &str) -> Result<Url> {
    Url::parse(base_url).map_err(|e| CollectError::Parse(format!("invalid URL {base_url}: {e}")))
}

pub(crate) fn cache_key(kind: SourceKind, title: &str, author: &str) -> String {
    format!(
        "{kind}:{}:{}",
        title.trim().to_lowercase(),
        author.trim().to_lowercase()
    )
}
