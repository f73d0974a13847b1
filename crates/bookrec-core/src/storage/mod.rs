//! On-disk artifacts: collected raw records and the persisted dataset.

pub mod dataset;
pub mod raw;

pub use dataset::{DatasetMeta, StoredDataset, load_dataset, save_dataset};
pub use raw::{load_raw, save_raw};
