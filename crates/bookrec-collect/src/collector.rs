use std::path::Path;
use std::time::Duration;

use bookrec_core::RawRecord;
use bookrec_core::config::CollectConfig;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::http::RateLimitedClient;
use crate::sources::{GoogleBooksSource, ListingSource, MetadataSource, OpenLibrarySource};

/// What a collection run fetched and what it had to skip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectReport {
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub listing_rows: usize,
    pub rows_unparsed: usize,
    pub details_fetched: usize,
    pub details_failed: usize,
    pub lookups_matched: usize,
    pub lookups_missed: usize,
    pub lookups_failed: usize,
    pub records: usize,
}

impl CollectReport {
    pub fn failures(&self) -> usize {
        self.pages_failed + self.details_failed + self.lookups_failed
    }
}

#[derive(Debug, Clone)]
pub struct CollectOutput {
    pub records: Vec<RawRecord>,
    pub report: CollectReport,
}

/// Walks the listing pages and enriches every row from the metadata APIs,
/// one request at a time.
pub struct Collector {
    listing: ListingSource,
    enrichers: Vec<Box<dyn MetadataSource>>,
    pages: u32,
    fetch_details: bool,
}

impl Collector {
    pub fn new(listing: ListingSource, enrichers: Vec<Box<dyn MetadataSource>>, pages: u32, fetch_details: bool) -> Self {
        Self {
            listing,
            enrichers,
            pages,
            fetch_details,
        }
    }

    /// Build every source from config. The Google Books key is read from the
    /// environment variable named in `google_api_key_env`.
    pub fn from_config(config: &CollectConfig, cache_dir: &Path) -> Result<Self> {
        let client = || {
            RateLimitedClient::new(
                Duration::from_millis(config.delay_ms),
                Duration::from_secs(config.timeout_secs),
                config.max_retries,
                &config.user_agent,
            )
        };
        let ttl = Duration::from_secs(config.cache_ttl_hours * 60 * 60);

        let mut enrichers: Vec<Box<dyn MetadataSource>> = Vec::new();
        if config.openlibrary {
            enrichers.push(Box::new(OpenLibrarySource::new(client()?, cache_dir, ttl)));
        }
        if config.google_books {
            let key = std::env::var(&config.google_api_key_env).ok();
            enrichers.push(Box::new(
                GoogleBooksSource::new(client()?, cache_dir, ttl).with_api_key(key),
            ));
        }

        Ok(Self::new(
            ListingSource::new(client()?, config.list_url.clone()),
            enrichers,
            config.pages,
            config.fetch_details,
        ))
    }

    pub fn with_pages(mut self, pages: u32) -> Self {
        self.pages = pages;
        self
    }

    /// Fetch and parse failures are logged and counted; the run never aborts.
    pub async fn run(&self) -> CollectOutput {
        let mut report = CollectReport::default();
        let mut records = Vec::new();

        for page in 1..=self.pages {
            let entries = match self.listing.fetch_page(page).await {
                Ok((entries, unparsed)) => {
                    report.pages_fetched += 1;
                    report.rows_unparsed += unparsed;
                    entries
                }
                Err(e) => {
                    warn!(page, error = %e, "skipping listing page");
                    report.pages_failed += 1;
                    continue;
                }
            };
            if entries.is_empty() {
                info!(page, "listing exhausted");
                break;
            }
            report.listing_rows += entries.len();

            for entry in entries {
                let details = match (&entry.url, self.fetch_details) {
                    (Some(url), true) => match self.listing.fetch_details(url).await {
                        Ok(details) => {
                            report.details_fetched += 1;
                            Some(details)
                        }
                        Err(e) => {
                            warn!(title = %entry.title, error = %e, "skipping book page");
                            report.details_failed += 1;
                            None
                        }
                    },
                    _ => None,
                };
                records.push(entry.to_record(details.as_ref()));

                let Some(author) = entry.author.as_deref() else {
                    continue;
                };
                for source in &self.enrichers {
                    match source.lookup(&entry.title, author).await {
                        Ok(Some(mut record)) => {
                            // The listing row is the identity; APIs only contribute fields.
                            record.title = Some(entry.title.clone());
                            record.author = Some(author.to_string());
                            report.lookups_matched += 1;
                            records.push(record);
                        }
                        Ok(None) => report.lookups_missed += 1,
                        Err(e) => {
                            warn!(source = %source.kind(), title = %entry.title, error = %e, "lookup failed");
                            report.lookups_failed += 1;
                        }
                    }
                }
            }
        }

        report.records = records.len();
        info!(
            pages = report.pages_fetched,
            rows = report.listing_rows,
            records = report.records,
            failures = report.failures(),
            "collection finished"
        );
        CollectOutput { records, report }
    }
}
