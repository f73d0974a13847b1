use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{BookrecError, Result};
use crate::features::{FeatureMatrix, GenreVocabulary, VectorizerPreset, feature_text};
use crate::models::{BookKey, BookRecord, Dataset, SourceKind};

const SCHEMA_VERSION: i64 = 1;

/// Build parameters recorded alongside the table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetMeta {
    pub created_at: Option<DateTime<Utc>>,
    pub k: Option<usize>,
    pub preset: VectorizerPreset,
}

/// Everything read back from a dataset file.
#[derive(Debug, Clone)]
pub struct StoredDataset {
    pub dataset: Dataset,
    pub vocabulary: GenreVocabulary,
    pub meta: DatasetMeta,
}

fn genre_column(i: usize) -> String {
    format!("genre_{i}")
}

fn create_schema(conn: &Connection, vocabulary: &GenreVocabulary) -> Result<()> {
    let genre_columns: String = (0..vocabulary.len())
        .map(|i| format!(",\n    {} INTEGER NOT NULL DEFAULT 0", genre_column(i)))
        .collect();

    conn.execute_batch(&format!(
        "
        CREATE TABLE books (
            id           INTEGER PRIMARY KEY,
            title        TEXT NOT NULL,
            author       TEXT NOT NULL,
            title_key    TEXT NOT NULL,
            author_key   TEXT NOT NULL,
            raw_genres   TEXT NOT NULL DEFAULT '[]',
            genres       TEXT NOT NULL DEFAULT '[]',
            rating       REAL,
            rating_count INTEGER NOT NULL DEFAULT 0,
            year         INTEGER,
            source_url   TEXT,
            sources      TEXT NOT NULL DEFAULT '[]',
            feature_text TEXT NOT NULL,
            cluster      INTEGER{genre_columns}
        );

        CREATE UNIQUE INDEX idx_books_key ON books(title_key, author_key);

        CREATE TABLE genre_vocabulary (
            idx INTEGER PRIMARY KEY,
            tag TEXT NOT NULL UNIQUE
        );

        CREATE TABLE dataset_meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "
    ))?;
    Ok(())
}

/// Persist a dataset and its one-hot genre columns.
///
/// The file is written next to `path` and renamed into place, so readers
/// never observe a partial dataset.
pub fn save_dataset(path: &Path, dataset: &Dataset, features: &FeatureMatrix, k: Option<usize>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    if tmp.exists() {
        fs::remove_file(&tmp)?;
    }

    {
        let mut conn = Connection::open(&tmp)?;
        create_schema(&conn, &features.vocabulary)?;
        let tx = conn.transaction()?;

        for (i, tag) in features.vocabulary.tags().iter().enumerate() {
            tx.execute(
                "INSERT INTO genre_vocabulary (idx, tag) VALUES (?1, ?2)",
                params![i as i64, tag],
            )?;
        }

        let genre_names: Vec<String> = (0..features.vocabulary.len()).map(genre_column).collect();
        let mut columns = vec![
            "id", "title", "author", "title_key", "author_key", "raw_genres", "genres", "rating",
            "rating_count", "year", "source_url", "sources", "feature_text", "cluster",
        ];
        columns.extend(genre_names.iter().map(String::as_str));
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO books ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );

        {
            let mut stmt = tx.prepare(&sql)?;
            for (id, book) in dataset.iter() {
                let mut values = vec![
                    Value::Integer(id.0 as i64),
                    Value::Text(book.title.clone()),
                    Value::Text(book.author.clone()),
                    Value::Text(book.key.title.clone()),
                    Value::Text(book.key.author.clone()),
                    Value::Text(serde_json::to_string(&book.raw_genres)?),
                    Value::Text(serde_json::to_string(&book.genres)?),
                    book.rating.map_or(Value::Null, Value::Real),
                    Value::Integer(book.rating_count as i64),
                    book.year.map_or(Value::Null, |y| Value::Integer(y as i64)),
                    book.source_url.clone().map_or(Value::Null, Value::Text),
                    Value::Text(serde_json::to_string(&book.sources)?),
                    Value::Text(feature_text(book)),
                    book.cluster.map_or(Value::Null, |c| Value::Integer(c as i64)),
                ];
                values.extend(
                    features
                        .vocabulary
                        .vector(book)
                        .into_iter()
                        .map(|v| Value::Integer(v as i64)),
                );
                stmt.execute(params_from_iter(values))?;
            }
        }

        let created_at = dataset.created_at.unwrap_or_else(Utc::now).to_rfc3339();
        let meta = [
            ("schema_version", SCHEMA_VERSION.to_string()),
            ("created_at", created_at),
            ("preset", features.preset.to_string()),
            ("k", k.map(|k| k.to_string()).unwrap_or_default()),
            ("books", dataset.len().to_string()),
        ];
        for (key, value) in meta {
            tx.execute(
                "INSERT INTO dataset_meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }
        tx.commit()?;
    }

    fs::rename(&tmp, path)?;
    info!(books = dataset.len(), path = %path.display(), "saved dataset");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn meta_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM dataset_meta WHERE key = ?1", params![key], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(value.filter(|v| !v.is_empty()))
}

fn json_column<T: serde::de::DeserializeOwned>(raw: String) -> Result<T> {
    Ok(serde_json::from_str(&raw)?)
}

/// Load a dataset written by [`save_dataset`].
pub fn load_dataset(path: &Path) -> Result<StoredDataset> {
    if !path.exists() {
        return Err(BookrecError::DatasetNotFound(path.display().to_string()));
    }
    let conn = Connection::open(path)?;

    let version = meta_value(&conn, "schema_version")?;
    if version.as_deref() != Some(SCHEMA_VERSION.to_string().as_str()) {
        return Err(BookrecError::SchemaMismatch(format!(
            "unsupported schema version {}",
            version.unwrap_or_else(|| "(none)".to_string())
        )));
    }

    let tags: Vec<String> = conn
        .prepare("SELECT tag FROM genre_vocabulary ORDER BY idx")?
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<_, _>>()?;
    let vocabulary = GenreVocabulary::from_tags(tags);

    let genre_names: Vec<String> = (0..vocabulary.len()).map(genre_column).collect();
    for name in &genre_names {
        let exists = conn
            .prepare("SELECT 1 FROM pragma_table_info('books') WHERE name = ?1")?
            .exists(params![name])?;
        if !exists {
            return Err(BookrecError::SchemaMismatch(format!("missing column {name}")));
        }
    }

    let mut stmt = conn.prepare("SELECT * FROM books ORDER BY id")?;
    let mut rows = stmt.query([])?;
    let mut books = Vec::new();
    while let Some(row) = rows.next()? {
        let title: String = row.get("title")?;
        let author: String = row.get("author")?;
        let sources: Vec<SourceKind> = json_column(row.get("sources")?)?;
        let book = BookRecord {
            key: BookKey {
                title: row.get("title_key")?,
                author: row.get("author_key")?,
            },
            title,
            author,
            raw_genres: json_column(row.get("raw_genres")?)?,
            genres: json_column(row.get("genres")?)?,
            rating: row.get("rating")?,
            rating_count: row.get::<_, i64>("rating_count")?.max(0) as u64,
            year: row.get("year")?,
            source_url: row.get("source_url")?,
            sources,
            cluster: row.get::<_, Option<i64>>("cluster")?.map(|c| c as usize),
        };

        let one_hot = genre_names
            .iter()
            .map(|name| row.get::<_, i64>(name.as_str()).map(|v| v as f32))
            .collect::<std::result::Result<Vec<f32>, _>>()?;
        if one_hot != vocabulary.vector(&book) {
            return Err(BookrecError::SchemaMismatch(format!(
                "genre columns disagree with tags for '{}'",
                book.title
            )));
        }
        books.push(book);
    }

    let created_at = meta_value(&conn, "created_at")?
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|d| d.with_timezone(&Utc));
    let preset = match meta_value(&conn, "preset")? {
        Some(v) => v.parse()?,
        None => VectorizerPreset::default(),
    };
    let k = meta_value(&conn, "k")?.and_then(|v| v.parse().ok());

    let mut dataset = Dataset::new(books)?;
    dataset.created_at = created_at;
    debug!(books = dataset.len(), genres = vocabulary.len(), "loaded dataset");

    Ok(StoredDataset {
        dataset,
        vocabulary,
        meta: DatasetMeta { created_at, k, preset },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureConfig;
    use tempfile::TempDir;

    fn sample() -> Dataset {
        let mut hobbit = BookRecord::new("The Hobbit", "J.R.R. Tolkien");
        hobbit.genres = vec!["fantasy".into(), "fiction".into()];
        hobbit.raw_genres = vec!["Fantasy".into(), "Fiction".into()];
        hobbit.rating = Some(4.28);
        hobbit.rating_count = 3_800_000;
        hobbit.year = Some(1937);
        hobbit.source_url = Some("https://example.org/hobbit".into());
        hobbit.sources = vec![SourceKind::Listing, SourceKind::OpenLibrary];

        let mut dune = BookRecord::new("Dune", "Frank Herbert");
        dune.genres = vec!["science fiction".into()];

        let notes = BookRecord::new("Field Notes", "Anon");
        Dataset::new(vec![hobbit, dune, notes])
            .unwrap()
            .with_clusters(&[0, 1, 1])
            .unwrap()
    }

    #[test]
    fn test_save_then_load_preserves_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.db");
        let ds = sample();
        let features = FeatureMatrix::build(&ds, &FeatureConfig::default()).unwrap();

        save_dataset(&path, &ds, &features, Some(2)).unwrap();
        assert!(!temp_path(&path).exists());

        let stored = load_dataset(&path).unwrap();
        assert_eq!(stored.dataset.books(), ds.books());
        assert_eq!(stored.vocabulary, features.vocabulary);
        assert_eq!(stored.meta.k, Some(2));
        assert_eq!(stored.meta.preset, VectorizerPreset::Analysis);
        assert!(stored.meta.created_at.is_some());
    }

    #[test]
    fn test_one_hot_columns_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.db");
        let ds = sample();
        let features = FeatureMatrix::build(&ds, &FeatureConfig::default()).unwrap();
        save_dataset(&path, &ds, &features, None).unwrap();

        let conn = Connection::open(&path).unwrap();
        let idx = features.vocabulary.index_of("fantasy").unwrap();
        let flag: i64 = conn
            .query_row(
                &format!("SELECT {} FROM books WHERE id = 0", genre_column(idx)),
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(flag, 1);
    }

    #[test]
    fn test_overwrite_existing_dataset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.db");
        let ds = sample();
        let features = FeatureMatrix::build(&ds, &FeatureConfig::default()).unwrap();
        save_dataset(&path, &ds, &features, Some(2)).unwrap();
        save_dataset(&path, &ds, &features, Some(3)).unwrap();
        assert_eq!(load_dataset(&path).unwrap().meta.k, Some(3));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_dataset(&dir.path().join("books.db")),
            Err(BookrecError::DatasetNotFound(_))
        ));
    }

    #[test]
    fn test_foreign_database_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("books.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE dataset_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);")
            .unwrap();
        drop(conn);
        assert!(matches!(
            load_dataset(&path),
            Err(BookrecError::SchemaMismatch(_))
        ));
    }
}
