//! Training-time artifacts and their on-disk store.
//!
//! An [`ArtifactSet`] is the explicit value threaded through every pipeline
//! call; nothing about it lives in process-wide state.

mod encoder;
mod scaler;
mod schema;
mod store;

pub use encoder::{CategoricalEncoder, Encoded, EncoderSet, UNSEEN_CODE};
pub use scaler::Scaler;
pub use schema::FeatureSchema;
pub use store::{
    ArtifactManifest, ArtifactStore, ENCODERS_FILE, FORMAT_VERSION, MANIFEST_FILE, MODEL_FILE,
    ONNX_MODEL_FILE, SCALER_FILE, SCHEMA_FILE,
};

use serde::{Deserialize, Serialize};

/// Scaler, encoders and schema produced by one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub scaler: Scaler,
    pub encoders: EncoderSet,
    pub schema: FeatureSchema,
}

impl ArtifactSet {
    pub fn new(scaler: Scaler, encoders: EncoderSet, schema: FeatureSchema) -> Self {
        Self {
            scaler,
            encoders,
            schema,
        }
    }

    /// Scaler width agrees with the schema.
    pub fn is_coherent(&self) -> bool {
        self.scaler.n_features() == self.schema.len()
    }

    pub fn label_encoder(&self) -> Option<&CategoricalEncoder> {
        self.encoders.label.as_ref()
    }
}
