//! bookrec collect: paginated listing scraper plus Open Library and Google
//! Books enrichment, emitting raw records for the cleaner.

pub mod collector;
pub mod error;
pub mod http;
pub mod sources;

pub use collector::{CollectOutput, CollectReport, Collector};
pub use error::{CollectError, Result};
pub use sources::MetadataSource;
