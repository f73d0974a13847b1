pub mod clean;
pub mod cluster;
pub mod config;
pub mod error;
pub mod features;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod similarity;
pub mod storage;

pub use config::AppConfig;
pub use error::{BookrecError, ExitCode, Result};
pub use models::*;

pub use clean::{CleanOutput, CleanReport, clean_records};
pub use cluster::{ClusterAssignment, ClusterScore, KMeans};
pub use features::{FeatureMatrix, GenreVocabulary, VectorizerPreset};
pub use pipeline::{BuildReport, build_dataset};
pub use query::{BookQuery, BookView, Catalog, CatalogStats, RecommendationSet, RecommendationView, SearchHit};
pub use similarity::{HybridWeights, SimilarityEngine, SimilarityMode};
