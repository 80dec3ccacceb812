//! Preprocessing: categorical encoding, schema alignment, scaling.

mod pipeline;

pub use pipeline::{FittedDataset, Preprocessor};

use serde::{Deserialize, Serialize};

/// One sample reindexed to the feature schema, before scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    /// Schema order, one value per schema column
    pub values: Vec<f64>,
    /// Schema columns absent from the sample, filled with 0
    pub filled: Vec<String>,
    /// (column, value) pairs outside the trained vocabulary
    pub unseen: Vec<(String, String)>,
    /// Sample columns not in the schema, dropped
    pub dropped: Vec<String>,
}

/// Scaled model input for one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub sample_id: String,
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}
