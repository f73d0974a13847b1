use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use bookrec_core::{RawGenres, RawRecord, SourceKind};

use crate::error::{CollectError, Result};
use crate::http::RateLimitedClient;
use crate::sources::parse_base_url;

static MINIRATING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*avg rating\W*([\d][\d,.\s]*)\s*ratings?").expect("valid regex")
});

const ROW_SELECTOR: &str = r#"tr[itemtype="http://schema.org/Book"]"#;
const TITLE_SELECTOR: &str = r#"a.bookTitle span[itemprop="name"]"#;
const LINK_SELECTOR: &str = "a.bookTitle";
const AUTHOR_SELECTOR: &str = r#"a.authorName span[itemprop="name"]"#;
const RATING_SELECTOR: &str = "span.minirating";
const GENRE_SELECTOR: &str = r#"[data-testid="genresList"] .BookPageMetadataSection__genreButton .Button__labelItem, a.bookPageGenreLink"#;
const PUBLICATION_SELECTOR: &str = r#"[data-testid="publicationInfo"], #details .row"#;

/// One parsed row of a listing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub title: String,
    pub author: Option<String>,
    pub rating: Option<String>,
    pub rating_count: Option<String>,
    pub url: Option<String>,
}

/// Fields only present on a book's own page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookDetails {
    pub genres: Vec<String>,
    /// Publication line, e.g. "First published September 21, 1937".
    pub published: Option<String>,
}

impl ListingEntry {
    pub fn to_record(&self, details: Option<&BookDetails>) -> RawRecord {
        let mut record = RawRecord::new(SourceKind::Listing).with_title(&self.title);
        record.author = self.author.clone();
        record.rating = self.rating.as_deref().map(Into::into);
        record.rating_count = self.rating_count.as_deref().map(Into::into);
        record.url = self.url.clone();
        if let Some(details) = details {
            record.genres = RawGenres::List(details.genres.clone());
            record.year = details.published.as_deref().map(Into::into);
        }
        record
    }
}

/// Scraper for a paginated "best books" style list.
pub struct ListingSource {
    client: RateLimitedClient,
    list_url: String,
}

impl ListingSource {
    pub fn new(client: RateLimitedClient, list_url: impl Into<String>) -> Self {
        Self {
            client,
            list_url: list_url.into(),
        }
    }

    pub fn page_url(&self, page: u32) -> Result<Url> {
        let mut url = parse_base_url(&self.list_url)?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        Ok(url)
    }

    /// Fetch one listing page. Also returns how many rows could not be parsed.
    pub async fn fetch_page(&self, page: u32) -> Result<(Vec<ListingEntry>, usize)> {
        let url = self.page_url(page)?;
        let html = self.client.get(url.as_str()).await?;
        let parsed = parse_listing(&html, &url)?;
        debug!(page, rows = parsed.0.len(), unparsed = parsed.1, "parsed listing page");
        Ok(parsed)
    }

    pub async fn fetch_details(&self, book_url: &str) -> Result<BookDetails> {
        let html = self.client.get(book_url).await?;
        parse_book_page(&html)
    }
}

fn parse_selector(input: &str) -> Result<Selector> {
    Selector::parse(input).map_err(|e| CollectError::Selector(format!("{input}: {e}")))
}

fn element_text(element: &ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(row: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector)
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
}

/// Split "4.28 avg rating — 3,812,920 ratings" into rating and count text.
pub fn parse_minirating(text: &str) -> (Option<String>, Option<String>) {
    match MINIRATING_RE.captures(text) {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str().to_string()),
            caps.get(2).map(|m| m.as_str().trim().to_string()),
        ),
        None => (None, None),
    }
}

/// Parse listing rows; rows without a title are counted, not returned.
pub fn parse_listing(html: &str, page_url: &Url) -> Result<(Vec<ListingEntry>, usize)> {
    let row_sel = parse_selector(ROW_SELECTOR)?;
    let title_sel = parse_selector(TITLE_SELECTOR)?;
    let link_sel = parse_selector(LINK_SELECTOR)?;
    let author_sel = parse_selector(AUTHOR_SELECTOR)?;
    let rating_sel = parse_selector(RATING_SELECTOR)?;

    let document = Html::parse_document(html);
    let mut entries = Vec::new();
    let mut unparsed = 0;

    for row in document.select(&row_sel) {
        let Some(title) = first_text(&row, &title_sel) else {
            unparsed += 1;
            continue;
        };
        let url = row
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| page_url.join(href).ok())
            .map(|u| u.to_string());
        let (rating, rating_count) = first_text(&row, &rating_sel)
            .map(|t| parse_minirating(&t))
            .unwrap_or((None, None));

        entries.push(ListingEntry {
            title,
            author: first_text(&row, &author_sel),
            rating,
            rating_count,
            url,
        });
    }

    Ok((entries, unparsed))
}

pub fn parse_book_page(html: &str) -> Result<BookDetails> {
    let genre_sel = parse_selector(GENRE_SELECTOR)?;
    let published_sel = parse_selector(PUBLICATION_SELECTOR)?;
    let document = Html::parse_document(html);

    let mut genres: Vec<String> = Vec::new();
    for el in document.select(&genre_sel) {
        let text = element_text(&el);
        if !text.is_empty() && !genres.contains(&text) {
            genres.push(text);
        }
    }

    let published = document
        .select(&published_sel)
        .map(|el| element_text(&el))
        .find(|t| t.to_lowercase().contains("publish"));

    Ok(BookDetails { genres, published })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bookrec_core::RawValue;
    use mockito::Matcher;

    use super::*;

    const LISTING: &str = include_str!("fixtures/listing_page.html");
    const BOOK_PAGE: &str = include_str!("fixtures/book_page.html");

    fn base() -> Url {
        Url::parse("https://www.goodreads.com/list/show/1.Best_Books_Ever?page=1").unwrap()
    }

    #[test]
    fn parses_listing_rows() {
        let (entries, unparsed) = parse_listing(LISTING, &base()).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(unparsed, 1);

        let hobbit = &entries[1];
        assert_eq!(hobbit.title, "The Hobbit");
        assert_eq!(hobbit.author.as_deref(), Some("J.R.R. Tolkien"));
        assert_eq!(hobbit.rating.as_deref(), Some("4.29"));
        assert_eq!(hobbit.rating_count.as_deref(), Some("4,123,456"));
        assert_eq!(
            hobbit.url.as_deref(),
            Some("https://www.goodreads.com/book/show/5907.The_Hobbit")
        );
    }

    #[test]
    fn minirating_with_prefix_text() {
        assert_eq!(
            parse_minirating("really liked it 4.28 avg rating — 4,321 ratings"),
            (Some("4.28".into()), Some("4,321".into()))
        );
        assert_eq!(parse_minirating("no rating yet"), (None, None));
    }

    #[test]
    fn parses_book_page_genres_and_year() {
        let details = parse_book_page(BOOK_PAGE).unwrap();
        assert_eq!(details.genres, vec!["Fantasy", "Classics", "Fiction", "Young Adult"]);
        assert_eq!(
            details.published.as_deref(),
            Some("First published September 21, 1937")
        );
    }

    #[test]
    fn entry_to_record_carries_details() {
        let (entries, _) = parse_listing(LISTING, &base()).unwrap();
        let details = parse_book_page(BOOK_PAGE).unwrap();
        let record = entries[1].to_record(Some(&details));
        assert_eq!(record.source, SourceKind::Listing);
        assert_eq!(record.rating, Some(RawValue::Text("4.29".into())));
        assert!(matches!(record.genres, RawGenres::List(ref g) if g.len() == 4));

        let bare = entries[0].to_record(None);
        assert_eq!(bare.genres, RawGenres::default());
        assert!(bare.year.is_none());
    }

    #[tokio::test]
    async fn fetch_page_appends_page_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/list/show/1.Best_Books_Ever")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_body(LISTING)
            .create_async()
            .await;

        let client = RateLimitedClient::new(
            Duration::from_millis(1),
            Duration::from_secs(5),
            0,
            "bookrec-test",
        )
        .unwrap();
        let source = ListingSource::new(client, format!("{}/list/show/1.Best_Books_Ever", server.url()));
        let (entries, _) = source.fetch_page(2).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].url.as_deref().unwrap().starts_with(&server.url()));
        mock.assert_async().await;
    }
}
