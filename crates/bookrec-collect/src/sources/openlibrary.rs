use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bookrec_core::{RawGenres, RawRecord, SourceKind};
use serde_json::Value;

use crate::error::{CollectError, Result};
use crate::http::{DiskCache, RateLimitedClient};
use crate::sources::{MetadataSource, cache_key, parse_base_url};

const BASE_URL: &str = "https://openlibrary.org";
/// Open Library attaches hundreds of subjects to popular works; only the
/// leading ones carry genre signal.
const MAX_SUBJECTS: usize = 10;

pub struct OpenLibrarySource {
    client: RateLimitedClient,
    cache: DiskCache,
    base_url: String,
}

impl OpenLibrarySource {
    pub fn new(client: RateLimitedClient, cache_root: &Path, cache_ttl: Duration) -> Self {
        Self {
            client,
            cache: DiskCache::new(cache_root, "openlibrary", cache_ttl),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn search_url(&self, title: &str, author: &str) -> Result<String> {
        let mut url = parse_base_url(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| CollectError::Parse("invalid Open Library base URL".to_string()))?
            .pop_if_empty()
            .push("search.json");
        url.query_pairs_mut()
            .append_pair("title", title)
            .append_pair("author", author)
            .append_pair(
                "fields",
                "key,title,author_name,subject,first_publish_year,ratings_average,ratings_count",
            )
            .append_pair("limit", "1");
        Ok(url.to_string())
    }

    /// Map one `docs[]` entry of `search.json` to a raw record.
    pub fn record_from_doc(&self, doc: &Value) -> Option<RawRecord> {
        let title = doc.get("title").and_then(Value::as_str)?;
        let mut record = RawRecord::new(SourceKind::OpenLibrary).with_title(title);

        if let Some(author) = doc
            .get("author_name")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(Value::as_str)
        {
            record = record.with_author(author);
        }

        let subjects: Vec<String> = doc
            .get("subject")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .take(MAX_SUBJECTS)
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        record.genres = RawGenres::List(subjects);

        if let Some(year) = doc.get("first_publish_year").and_then(Value::as_i64) {
            record = record.with_year(year);
        }
        if let Some(avg) = doc.get("ratings_average").and_then(Value::as_f64) {
            record = record.with_rating(avg);
        }
        if let Some(count) = doc.get("ratings_count").and_then(Value::as_i64) {
            record = record.with_rating_count(count);
        }
        if let Some(key) = doc.get("key").and_then(Value::as_str) {
            record = record.with_url(format!("{}{key}", self.base_url.trim_end_matches('/')));
        }
        Some(record)
    }
}

#[async_trait]
impl MetadataSource for OpenLibrarySource {
    fn kind(&self) -> SourceKind {
        SourceKind::OpenLibrary
    }

    async fn lookup(&self, title: &str, author: &str) -> Result<Option<RawRecord>> {
        let key = cache_key(self.kind(), title, author);
        if let Some(cached) = self.cache.get::<Option<RawRecord>>(&key).await {
            return Ok(cached);
        }

        let json: Value = self.client.get_json(&self.search_url(title, author)?).await?;
        let record = json
            .get("docs")
            .and_then(Value::as_array)
            .and_then(|docs| docs.first())
            .and_then(|doc| self.record_from_doc(doc));

        self.cache.set(&key, &record).await;
        Ok(record)
    }
}
