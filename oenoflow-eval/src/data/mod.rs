//! Test data loading and feature/target separation.

pub mod dataset;
pub mod source;

pub use dataset::{Dataset, FeatureMatrix};
pub use source::CsvSource;
