use thiserror::Error;

/// All errors that can occur in bookrec-core.
#[derive(Debug, Error)]
pub enum BookrecError {
    #[error("Book not found: {0}")]
    BookNotFound(usize),

    #[error("No book matches query: {0}")]
    NoMatch(String),

    #[error("Dataset is empty")]
    EmptyDataset,

    #[error("Dataset not found at {0}. Run 'bookrec build' first.")]
    DatasetNotFound(String),

    #[error("Raw records not found at {0}. Run 'bookrec collect' first.")]
    RawDataNotFound(String),

    #[error("Dataset schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid cluster count {k} for {rows} books")]
    InvalidClusterCount { k: usize, rows: usize },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Exit codes used by the `bookrec` binary.
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    FileSystemError = 4,
    NetworkError = 6,
}

impl BookrecError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::BookNotFound(_)
            | Self::NoMatch(_)
            | Self::DatasetNotFound(_)
            | Self::RawDataNotFound(_) => ExitCode::NotFound,
            Self::InvalidClusterCount { .. } | Self::ConfigError(_) => ExitCode::InvalidArgs,
            Self::Io(_) | Self::Database(_) => ExitCode::FileSystemError,
            _ => ExitCode::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, BookrecError>;
