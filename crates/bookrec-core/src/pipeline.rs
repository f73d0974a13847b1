//! Offline build: raw records → cleaned, featurized, clustered dataset file.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::clean::{CleanReport, clean_records};
use crate::cluster::{KMeans, assign_clusters};
use crate::config::AppConfig;
use crate::error::Result;
use crate::features::{FeatureMatrix, VectorizerPreset};
use crate::models::{Dataset, RawRecord};
use crate::storage::save_dataset;

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub clean: CleanReport,
    pub books: usize,
    pub terms: usize,
    pub genres: Vec<String>,
    pub preset: VectorizerPreset,
    pub k: usize,
    pub inertia: f64,
    pub cluster_sizes: Vec<usize>,
    pub path: PathBuf,
}

/// Clean, featurize and cluster `raw`, then write the dataset to `path`.
///
/// A configured k larger than the number of books is lowered to the book
/// count.
pub fn build_dataset(raw: &[RawRecord], config: &AppConfig, path: &Path) -> Result<(Dataset, BuildReport)> {
    let cleaned = clean_records(raw)?;
    let features = FeatureMatrix::build(&cleaned.dataset, &config.features)?;

    let mut kmeans = KMeans::from_config(&config.clustering);
    if kmeans.k > cleaned.dataset.len() {
        warn!(
            configured = kmeans.k,
            books = cleaned.dataset.len(),
            "fewer books than clusters, lowering k"
        );
        kmeans.k = cleaned.dataset.len();
    }
    let (dataset, assignment) = assign_clusters(&cleaned.dataset, &features, &kmeans)?;

    save_dataset(path, &dataset, &features, Some(assignment.k))?;

    let report = BuildReport {
        clean: cleaned.report,
        books: dataset.len(),
        terms: features.tfidf.len(),
        genres: features.vocabulary.tags().to_vec(),
        preset: features.preset,
        k: assignment.k,
        inertia: assignment.inertia,
        cluster_sizes: assignment.sizes(),
        path: path.to_path_buf(),
    };
    info!(books = report.books, k = report.k, path = %path.display(), "dataset built");
    Ok((dataset, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BookrecError;
    use crate::models::SourceKind;
    use crate::storage::load_dataset;
    use tempfile::TempDir;

    fn raw() -> Vec<RawRecord> {
        vec![
            RawRecord::new(SourceKind::Listing)
                .with_title("The Hobbit")
                .with_author("J.R.R. Tolkien")
                .with_genres("Fantasy, Fiction")
                .with_rating(4.3),
            RawRecord::new(SourceKind::OpenLibrary)
                .with_title("  the HOBBIT ")
                .with_author("j.r.r.   tolkien")
                .with_genres(vec!["Fantasy".to_string()])
                .with_year(1937_i64),
            RawRecord::new(SourceKind::Listing)
                .with_title("Dune")
                .with_author("Frank Herbert")
                .with_genres("Sci-Fi; Classics")
                .with_rating("4.27")
                .with_rating_count("1,234,567 ratings"),
            RawRecord::new(SourceKind::GoogleBooks)
                .with_title("Emma")
                .with_author("Jane Austen")
                .with_genres("Fiction / Romance"),
            RawRecord::new(SourceKind::Listing).with_author("Nobody"),
        ]
    }

    #[test]
    fn test_build_writes_clustered_dataset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.db");

        let (dataset, report) = build_dataset(&raw(), &AppConfig::default(), &path).unwrap();
        assert_eq!(report.books, 3);
        assert_eq!(report.clean.skipped_missing_title, 1);
        assert_eq!(report.clean.duplicates_merged, 1);
        assert_eq!(report.k, 3);
        assert!(dataset.books().iter().all(|b| b.cluster.is_some_and(|c| c < 3)));

        let hobbit = &dataset.books()[0];
        assert_eq!(hobbit.genres, vec!["fantasy", "fiction"]);
        assert_eq!(hobbit.rating, Some(4.3));
        assert_eq!(hobbit.year, Some(1937));

        let stored = load_dataset(&path).unwrap();
        assert_eq!(stored.dataset.books(), dataset.books());
        assert_eq!(stored.meta.k, Some(3));
    }

    #[test]
    fn test_build_with_no_usable_rows() {
        let dir = TempDir::new().unwrap();
        let rows = vec![RawRecord::new(SourceKind::Listing)];
        assert!(matches!(
            build_dataset(&rows, &AppConfig::default(), &dir.path().join("books.db")),
            Err(BookrecError::EmptyDataset)
        ));
    }
}
