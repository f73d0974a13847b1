use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{BookrecError, Result};
use crate::models::RawRecord;

/// Write raw records as a pretty-printed JSON array.
pub fn save_raw(path: &Path, records: &[RawRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json)?;
    info!(records = records.len(), path = %path.display(), "saved raw records");
    Ok(())
}

pub fn load_raw(path: &Path) -> Result<Vec<RawRecord>> {
    if !path.exists() {
        return Err(BookrecError::RawDataNotFound(path.display().to_string()));
    }
    let contents = fs::read_to_string(path)?;
    let records: Vec<RawRecord> = serde_json::from_str(&contents)?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_raw() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("raw.json");

        let records = vec![
            RawRecord::new(SourceKind::Listing)
                .with_title("The Hobbit")
                .with_author("J.R.R. Tolkien")
                .with_genres("Fantasy, Fiction")
                .with_rating("4.28"),
            RawRecord::new(SourceKind::OpenLibrary).with_title("Dune").with_year(1965_i64),
        ];
        save_raw(&path, &records).unwrap();

        let loaded = load_raw(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].title.as_deref(), Some("The Hobbit"));
        assert_eq!(loaded[1].source, SourceKind::OpenLibrary);
    }

    #[test]
    fn test_missing_raw_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_raw(&dir.path().join("raw.json")),
            Err(BookrecError::RawDataNotFound(_))
        ));
    }
}
