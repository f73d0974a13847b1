//! Query surface over a loaded dataset: search, filters, recommendations.

use std::path::{Path, PathBuf};

use nucleo_matcher::pattern::{AtomKind, CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Config, Matcher, Utf32Str};
use serde::Serialize;
use tracing::{debug, info};

use crate::clean::genres::normalize_tag;
use crate::config::AppConfig;
use crate::error::{BookrecError, Result};
use crate::features::{FeatureMatrix, VectorizerPreset};
use crate::models::{BookId, BookKey, BookRecord, Dataset};
use crate::similarity::{SimilarityEngine, SimilarityMode};
use crate::storage::{DatasetMeta, load_dataset};

/// Display row for one book.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookView {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub rating: Option<f64>,
    pub rating_count: u64,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub cluster: Option<usize>,
    pub source_url: Option<String>,
}

impl BookView {
    pub fn new(id: BookId, book: &BookRecord) -> Self {
        Self {
            id,
            title: book.title.clone(),
            author: book.author.clone(),
            rating: book.rating,
            rating_count: book.rating_count,
            year: book.year,
            genres: book.genres.clone(),
            cluster: book.cluster,
            source_url: book.source_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationView {
    #[serde(flatten)]
    pub book: BookView,
    pub score: f32,
}

/// Recommendations for one resolved query book.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationSet {
    pub query: BookView,
    pub mode: SimilarityMode,
    pub results: Vec<RecommendationView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub book: BookId,
    pub score: u32,
    /// Found by the fuzzy fallback rather than a substring match.
    pub fuzzy: bool,
}

/// Everything the presentation layer lets a user set.
#[derive(Debug, Clone, PartialEq)]
pub struct BookQuery {
    pub text: String,
    pub mode: SimilarityMode,
    pub limit: usize,
    pub min_rating: Option<f64>,
    pub genre: Option<String>,
}

impl BookQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: SimilarityMode::default(),
            limit: 10,
            min_rating: None,
            genre: None,
        }
    }

    pub fn with_mode(mut self, mode: SimilarityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_min_rating(mut self, min_rating: f64) -> Self {
        self.min_rating = Some(min_rating);
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }
}

/// Dataset summary for `stats` and the TUI header.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub books: usize,
    pub rated: usize,
    pub with_year: usize,
    pub vocabulary: Vec<String>,
    pub top_genres: Vec<(String, usize)>,
    pub cluster_sizes: Vec<(usize, usize)>,
    pub meta: DatasetMeta,
}

/// A loaded dataset with derived features and similarity matrices.
pub struct Catalog {
    path: PathBuf,
    preset: VectorizerPreset,
    config: AppConfig,
    dataset: Dataset,
    features: FeatureMatrix,
    engine: SimilarityEngine,
    meta: DatasetMeta,
}

impl Catalog {
    /// Read the dataset at `path` and re-derive features and similarities.
    pub fn load(path: &Path, preset: VectorizerPreset, config: &AppConfig) -> Result<Self> {
        let stored = load_dataset(path)?;
        let features = FeatureMatrix::build_with_vocabulary(
            &stored.dataset,
            &config.features.with_preset(preset),
            stored.vocabulary,
        )?;
        let engine = SimilarityEngine::build(&stored.dataset, &features, config.similarity.weights)?;
        info!(books = stored.dataset.len(), %preset, path = %path.display(), "catalog loaded");

        Ok(Self {
            path: path.to_path_buf(),
            preset,
            config: config.clone(),
            dataset: stored.dataset,
            features,
            engine,
            meta: stored.meta,
        })
    }

    /// Re-read the dataset file, replacing every derived artifact.
    pub fn reload(&mut self) -> Result<()> {
        *self = Self::load(&self.path, self.preset, &self.config)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    pub fn engine(&self) -> &SimilarityEngine {
        &self.engine
    }

    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn view(&self, id: BookId) -> Result<BookView> {
        Ok(BookView::new(id, self.dataset.get(id)?))
    }

    /// Case-folded substring match over title, author and genre tags,
    /// falling back to fuzzy matching when nothing matches.
    pub fn search(&self, text: &str) -> Vec<SearchHit> {
        let needle = BookKey::fold(text);
        if needle.is_empty() {
            return self
                .dataset
                .ids()
                .map(|book| SearchHit {
                    book,
                    score: 0,
                    fuzzy: false,
                })
                .collect();
        }

        let mut hits: Vec<SearchHit> = self
            .dataset
            .iter()
            .filter_map(|(id, book)| {
                let score = if book.key.title.contains(&needle) {
                    2
                } else if book.key.author.contains(&needle) {
                    1
                } else if book.genres.iter().any(|g| g.contains(&needle)) {
                    0
                } else {
                    return None;
                };
                Some(SearchHit {
                    book: id,
                    score,
                    fuzzy: false,
                })
            })
            .collect();

        if hits.is_empty() {
            hits = self.fuzzy_search(&needle);
            debug!(query = %needle, hits = hits.len(), "fuzzy fallback");
        }

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| {
                    let ca = self.dataset.books()[a.book.0].rating_count;
                    let cb = self.dataset.books()[b.book.0].rating_count;
                    cb.cmp(&ca)
                })
                .then_with(|| a.book.cmp(&b.book))
        });
        hits
    }

    fn fuzzy_search(&self, needle: &str) -> Vec<SearchHit> {
        let mut matcher = Matcher::new(Config::DEFAULT);
        let pattern = Pattern::new(needle, CaseMatching::Ignore, Normalization::Smart, AtomKind::Fuzzy);
        let mut buf = Vec::new();

        self.dataset
            .iter()
            .filter_map(|(id, book)| {
                let searchable = format!("{} {} {}", book.title, book.author, book.genres.join(" "));
                let haystack = Utf32Str::new(&searchable, &mut buf);
                pattern.score(haystack, &mut matcher).map(|score| SearchHit {
                    book: id,
                    score,
                    fuzzy: true,
                })
            })
            .collect()
    }

    /// First book whose title contains `text`, else the best search hit.
    pub fn resolve(&self, text: &str) -> Result<BookId> {
        let needle = BookKey::fold(text);
        if needle.is_empty() {
            return Err(BookrecError::NoMatch(text.to_string()));
        }
        if let Some((id, _)) = self.dataset.iter().find(|(_, b)| b.key.title.contains(&needle)) {
            return Ok(id);
        }
        self.search(&needle)
            .first()
            .map(|hit| hit.book)
            .ok_or_else(|| BookrecError::NoMatch(text.to_string()))
    }

    /// Resolve the query text, rank with the chosen mode, filter, truncate.
    pub fn recommend_for(&self, query: &BookQuery) -> Result<RecommendationSet> {
        let id = self.resolve(&query.text)?;
        self.recommend_id(id, query)
    }

    /// Same as [`Self::recommend_for`] for an already resolved book.
    pub fn recommend_id(&self, id: BookId, query: &BookQuery) -> Result<RecommendationSet> {
        let limit = query.limit.min(self.config.ui.max_limit);
        let genre = match &query.genre {
            Some(g) => Some(normalize_tag(g).ok_or_else(|| BookrecError::NoMatch(g.clone()))?),
            None => None,
        };

        let results = self
            .engine
            .rank(id, query.mode)?
            .into_iter()
            .filter_map(|rec| {
                let book = &self.dataset.books()[rec.book.0];
                if let Some(min) = query.min_rating {
                    if book.rating.is_none_or(|r| r < min) {
                        return None;
                    }
                }
                if let Some(tag) = &genre {
                    if !book.has_genre(tag) {
                        return None;
                    }
                }
                Some(RecommendationView {
                    book: BookView::new(rec.book, book),
                    score: rec.score,
                })
            })
            .take(limit)
            .collect();

        Ok(RecommendationSet {
            query: self.view(id)?,
            mode: query.mode,
            results,
        })
    }

    pub fn stats(&self) -> CatalogStats {
        let books = self.dataset.books();
        let mut cluster_sizes: Vec<(usize, usize)> = Vec::new();
        for label in books.iter().filter_map(|b| b.cluster) {
            match cluster_sizes.iter_mut().find(|(l, _)| *l == label) {
                Some((_, n)) => *n += 1,
                None => cluster_sizes.push((label, 1)),
            }
        }
        cluster_sizes.sort();

        CatalogStats {
            books: books.len(),
            rated: books.iter().filter(|b| b.rating.is_some()).count(),
            with_year: books.iter().filter(|b| b.year.is_some()).count(),
            vocabulary: self.features.vocabulary.tags().to_vec(),
            top_genres: self.dataset.genre_counts().into_iter().take(10).collect(),
            cluster_sizes,
            meta: self.meta.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::save_dataset;
    use tempfile::TempDir;

    fn book(title: &str, author: &str, genres: &[&str], rating: Option<f64>, count: u64) -> BookRecord {
        let mut b = BookRecord::new(title, author);
        b.genres = genres.iter().map(|g| g.to_string()).collect();
        b.rating = rating;
        b.rating_count = count;
        b
    }

    fn catalog(dir: &TempDir) -> Catalog {
        let ds = Dataset::new(vec![
            book("The Hobbit", "J.R.R. Tolkien", &["fantasy", "fiction"], Some(4.3), 300),
            book("The Fellowship of the Ring", "J.R.R. Tolkien", &["fantasy", "fiction"], Some(4.4), 200),
            book("The Two Towers", "J.R.R. Tolkien", &["fantasy"], Some(3.9), 150),
            book("Dune", "Frank Herbert", &["science fiction"], Some(4.2), 250),
            book("Emma", "Jane Austen", &["classics", "romance"], None, 90),
        ])
        .unwrap()
        .with_clusters(&[0, 0, 0, 1, 2])
        .unwrap();

        let config = AppConfig::default();
        let features = FeatureMatrix::build(&ds, &config.features).unwrap();
        let path = dir.path().join("books.db");
        save_dataset(&path, &ds, &features, Some(3)).unwrap();
        Catalog::load(&path, VectorizerPreset::Interactive, &config).unwrap()
    }

    #[test]
    fn test_search_substring_prefers_title() {
        let dir = TempDir::new().unwrap();
        let cat = catalog(&dir);

        let hits = cat.search("tolkien");
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| !h.fuzzy));

        let hits = cat.search("ROMANCE");
        assert_eq!(hits[0].book, BookId(4));
    }

    #[test]
    fn test_search_falls_back_to_fuzzy() {
        let dir = TempDir::new().unwrap();
        let cat = catalog(&dir);
        let hits = cat.search("hbbt");
        assert!(!hits.is_empty());
        assert!(hits[0].fuzzy);
        assert_eq!(hits[0].book, BookId(0));
    }

    #[test]
    fn test_resolve_prefers_first_title_match() {
        let dir = TempDir::new().unwrap();
        let cat = catalog(&dir);
        assert_eq!(cat.resolve("the").unwrap(), BookId(0));
        assert_eq!(cat.resolve("  DUNE ").unwrap(), BookId(3));
        assert!(matches!(cat.resolve("zzzzqqq"), Err(BookrecError::NoMatch(_))));
        assert!(cat.resolve("").is_err());
    }

    #[test]
    fn test_query_whitespace_is_collapsed() {
        let dir = TempDir::new().unwrap();
        let cat = catalog(&dir);
        assert_eq!(cat.resolve("the  two\tTowers").unwrap(), BookId(2));

        let hits = cat.search("  two   towers ");
        assert_eq!(hits.len(), 1);
        assert!(!hits[0].fuzzy);
        assert_eq!(hits[0].book, BookId(2));
    }

    #[test]
    fn test_recommend_for_excludes_query_and_limits() {
        let dir = TempDir::new().unwrap();
        let cat = catalog(&dir);
        let set = cat
            .recommend_for(&BookQuery::new("hobbit").with_limit(2))
            .unwrap();
        assert_eq!(set.query.title, "The Hobbit");
        assert_eq!(set.results.len(), 2);
        assert!(set.results.iter().all(|r| r.book.id != BookId(0)));
        assert!(set.results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[test]
    fn test_filters_apply_before_truncation() {
        let dir = TempDir::new().unwrap();
        let cat = catalog(&dir);

        let set = cat
            .recommend_for(&BookQuery::new("hobbit").with_min_rating(4.0).with_limit(10))
            .unwrap();
        let titles: Vec<&str> = set.results.iter().map(|r| r.book.title.as_str()).collect();
        assert!(titles.contains(&"The Fellowship of the Ring"));
        assert!(titles.contains(&"Dune"));
        assert!(!titles.contains(&"The Two Towers"));
        assert!(!titles.contains(&"Emma"));

        let set = cat
            .recommend_for(
                &BookQuery::new("dune")
                    .with_mode(SimilarityMode::Genre)
                    .with_genre("Sci-Fi"),
            )
            .unwrap();
        assert!(set.results.is_empty());

        let set = cat
            .recommend_for(&BookQuery::new("dune").with_genre("Fantasy"))
            .unwrap();
        assert_eq!(set.results.len(), 3);
    }

    #[test]
    fn test_stats_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut cat = catalog(&dir);
        let stats = cat.stats();
        assert_eq!(stats.books, 5);
        assert_eq!(stats.rated, 4);
        assert_eq!(stats.cluster_sizes, vec![(0, 3), (1, 1), (2, 1)]);
        assert_eq!(stats.meta.k, Some(3));

        cat.reload().unwrap();
        assert_eq!(cat.dataset().len(), 5);
    }
}
