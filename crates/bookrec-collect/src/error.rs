use bookrec_core::BookrecError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid selector {0}")]
    Selector(String),

    #[error(transparent)]
    Core(#[from] BookrecError),
}

impl CollectError {
    /// Exit code for the `bookrec` binary.
    pub fn exit_code(&self) -> bookrec_core::ExitCode {
        match self {
            Self::Core(e) => e.exit_code(),
            Self::Http(_) | Self::ApiError(..) | Self::RateLimit(..) => {
                bookrec_core::ExitCode::NetworkError
            }
            _ => bookrec_core::ExitCode::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectError>;
