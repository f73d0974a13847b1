use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bookrec_core::{RawGenres, RawRecord, SourceKind};
use serde_json::Value;

use crate::error::{CollectError, Result};
use crate::http::{DiskCache, RateLimitedClient};
use crate::sources::{MetadataSource, cache_key, parse_base_url};

const BASE_URL: &str = "https://www.googleapis.com";

pub struct GoogleBooksSource {
    client: RateLimitedClient,
    cache: DiskCache,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBooksSource {
    pub fn new(client: RateLimitedClient, cache_root: &Path, cache_ttl: Duration) -> Self {
        Self {
            client,
            cache: DiskCache::new(cache_root, "google_books", cache_ttl),
            base_url: BASE_URL.to_string(),
            api_key: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Optional key; anonymous requests share a small daily quota.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    fn volumes_url(&self, title: &str, author: &str) -> Result<String> {
        let mut url = parse_base_url(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| CollectError::Parse("invalid Google Books base URL".to_string()))?
            .pop_if_empty()
            .extend(["books", "v1", "volumes"]);
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("q", &format!("intitle:{title} inauthor:{author}"))
                .append_pair("maxResults", "1")
                .append_pair("printType", "books");
            if let Some(key) = &self.api_key {
                query.append_pair("key", key);
            }
        }
        Ok(url.to_string())
    }

    /// Map the `volumeInfo` object of one `items[]` entry to a raw record.
    pub fn record_from_volume(info: &Value) -> Option<RawRecord> {
        let title = info.get("title").and_then(Value::as_str)?;
        let mut record = RawRecord::new(SourceKind::GoogleBooks).with_title(title);

        if let Some(author) = info
            .get("authors")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(Value::as_str)
        {
            record = record.with_author(author);
        }

        let categories: Vec<String> = info
            .get("categories")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        record.genres = RawGenres::List(categories);

        if let Some(date) = info.get("publishedDate").and_then(Value::as_str) {
            record = record.with_year(date);
        }
        if let Some(avg) = info.get("averageRating").and_then(Value::as_f64) {
            record = record.with_rating(avg);
        }
        if let Some(count) = info.get("ratingsCount").and_then(Value::as_i64) {
            record = record.with_rating_count(count);
        }
        if let Some(link) = info.get("infoLink").and_then(Value::as_str) {
            record = record.with_url(link);
        }
        Some(record)
    }
}

#[async_trait]
impl MetadataSource for GoogleBooksSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GoogleBooks
    }

    async fn lookup(&self, title: &str, author: &str) -> Result<Option<RawRecord>> {
        let key = cache_key(self.kind(), title, author);
        if let Some(cached) = self.cache.get::<Option<RawRecord>>(&key).await {
            return Ok(cached);
        }

        let json: Value = self.client.get_json(&self.volumes_url(title, author)?).await?;
        let record = json
            .get("items")
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("volumeInfo"))
            .and_then(Self::record_from_volume);

        self.cache.set(&key, &record).await;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use bookrec_core::RawValue;

    fn source(dir: &TempDir, base_url: &str) -> GoogleBooksSource {
        let client = RateLimitedClient::new(
            Duration::from_millis(1),
            Duration::from_secs(5),
            0,
            "bookrec-test",
        )
        .unwrap();
        GoogleBooksSource::new(client, dir.path(), Duration::from_secs(60)).with_base_url(base_url)
    }

    #[test]
    fn parses_volume_info() {
        let info = json!({
            "title": "Emma",
            "authors": ["Jane Austen"],
            "categories": ["Fiction / Romance / General"],
            "publishedDate": "1815-12-23",
            "averageRating": 4.0,
            "ratingsCount": 87,
            "infoLink": "https://books.google.com/books?id=abc"
        });

        let record = GoogleBooksSource::record_from_volume(&info).unwrap();
        assert_eq!(record.author.as_deref(), Some("Jane Austen"));
        assert_eq!(record.year, Some(RawValue::Text("1815-12-23".into())));
        assert_eq!(record.rating_count, Some(RawValue::Number(87.0)));
        assert_eq!(
            record.genres,
            RawGenres::List(vec!["Fiction / Romance / General".into()])
        );
    }

    #[tokio::test]
    async fn lookup_sends_key_and_query() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/books/v1/volumes")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("q".into(), "intitle:Emma inauthor:Jane Austen".into()),
                Matcher::UrlEncoded("key".into(), "secret".into()),
            ]))
            .with_body(
                json!({"items": [{"volumeInfo": {"title": "Emma", "authors": ["Jane Austen"]}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let src = source(&dir, &server.url()).with_api_key(Some("secret".into()));
        let record = src.lookup("Emma", "Jane Austen").await.unwrap().unwrap();
        assert_eq!(record.source, SourceKind::GoogleBooks);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/books/v1/volumes")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let src = source(&dir, &server.url());
        assert!(matches!(
            src.lookup("Emma", "Jane Austen").await,
            Err(CollectError::ApiError(..))
        ));
    }
}
