//! Cleaner/Merger: raw multi-source rows → one frozen row per (title, author).

pub mod fields;
pub mod genres;

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{BookKey, BookRecord, Dataset, RawRecord};

pub use fields::{normalize_string, parse_count, parse_rating, parse_year};
pub use genres::{normalize_tag, normalize_tags, parse_genre_field};

/// Counters describing what cleaning did to the input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub skipped_missing_title: usize,
    pub skipped_missing_author: usize,
    pub duplicates_merged: usize,
    pub ratings_nulled: usize,
    pub rating_counts_nulled: usize,
    pub years_nulled: usize,
}

impl CleanReport {
    pub fn skipped(&self) -> usize {
        self.skipped_missing_title + self.skipped_missing_author
    }
}

#[derive(Debug, Clone)]
pub struct CleanOutput {
    pub dataset: Dataset,
    pub report: CleanReport,
}

/// Clean a single raw row. Returns `None` when the row must be skipped.
pub fn clean_record(raw: &RawRecord, report: &mut CleanReport) -> Option<BookRecord> {
    let Some(title) = raw.title.as_deref().and_then(normalize_string) else {
        report.skipped_missing_title += 1;
        return None;
    };
    let Some(author) = raw.author.as_deref().and_then(normalize_string) else {
        report.skipped_missing_author += 1;
        return None;
    };

    let mut book = BookRecord::new(&title, &author);
    book.raw_genres = parse_genre_field(&raw.genres);
    book.genres = normalize_tags(&book.raw_genres);
    book.sources = vec![raw.source];
    book.source_url = raw.url.as_deref().and_then(normalize_string);

    if let Some(value) = &raw.rating {
        book.rating = parse_rating(value);
        if book.rating.is_none() {
            report.ratings_nulled += 1;
        }
    }
    if let Some(value) = &raw.rating_count {
        match parse_count(value) {
            Some(count) => book.rating_count = count,
            None => report.rating_counts_nulled += 1,
        }
    }
    if let Some(value) = &raw.year {
        book.year = parse_year(value);
        if book.year.is_none() {
            report.years_nulled += 1;
        }
    }

    Some(book)
}

/// Clean and merge rows from all sources into one frozen dataset.
///
/// Duplicates by [`BookKey`] collapse into the most complete record (the
/// earliest one on ties); its gaps are filled from the others and genre
/// tags are unioned. Output keeps first-appearance order of keys.
pub fn clean_records(raw: &[RawRecord]) -> Result<CleanOutput> {
    let mut report = CleanReport {
        input_rows: raw.len(),
        ..Default::default()
    };

    let mut order: Vec<BookKey> = Vec::new();
    let mut groups: HashMap<BookKey, Vec<BookRecord>> = HashMap::new();
    for row in raw {
        let Some(book) = clean_record(row, &mut report) else {
            warn!(source = %row.source, title = ?row.title, "skipping row without title or author");
            continue;
        };
        let entry = groups.entry(book.key.clone()).or_default();
        if entry.is_empty() {
            order.push(book.key.clone());
        }
        entry.push(book);
    }

    let mut books = Vec::with_capacity(order.len());
    for key in &order {
        let Some(group) = groups.remove(key) else {
            continue;
        };
        report.duplicates_merged += group.len() - 1;
        books.push(merge_group(group));
    }

    report.output_rows = books.len();
    info!(
        input = report.input_rows,
        output = report.output_rows,
        skipped = report.skipped(),
        merged = report.duplicates_merged,
        "cleaned records"
    );

    Ok(CleanOutput {
        dataset: Dataset::new(books)?,
        report,
    })
}

fn merge_group(mut group: Vec<BookRecord>) -> BookRecord {
    let best_idx = choose_best_index(&group);
    let mut merged = group.remove(best_idx);
    for other in &group {
        merge_into(&mut merged, other);
    }
    merged
}

fn choose_best_index(group: &[BookRecord]) -> usize {
    let mut best_idx = 0usize;
    let mut best_score = group[0].completeness();
    for (idx, book) in group.iter().enumerate().skip(1) {
        let score = book.completeness();
        if score > best_score {
            best_score = score;
            best_idx = idx;
        }
    }
    best_idx
}

fn merge_into(target: &mut BookRecord, other: &BookRecord) {
    if target.rating.is_none() {
        target.rating = other.rating;
    }
    if target.rating_count == 0 {
        target.rating_count = other.rating_count;
    }
    if target.year.is_none() {
        target.year = other.year;
    }
    if target.source_url.is_none() {
        target.source_url = other.source_url.clone();
    }

    for token in &other.raw_genres {
        if !target.raw_genres.contains(token) {
            target.raw_genres.push(token.clone());
        }
    }
    for tag in &other.genres {
        if !target.genres.contains(tag) {
            target.genres.push(tag.clone());
        }
    }
    target.genres.sort();

    for source in &other.sources {
        if !target.sources.contains(source) {
            target.sources.push(*source);
        }
    }
    target.sources.sort();
}
