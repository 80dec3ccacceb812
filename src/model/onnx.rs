//! ONNX Runtime backend for an externally exported classifier.
//! Input: [N, n_features] f32. Output: [N, n_classes] class probabilities.

use super::Classifier;
use crate::error::{IdsError, Result};
use ndarray::{Array2, ArrayView2};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;
use std::sync::Mutex;

pub struct OnnxClassifier {
    session: Mutex<Session>,
    output_name: String,
    n_features: usize,
    n_classes: usize,
}

impl OnnxClassifier {
    /// Load the model at `path`. Unlike the built-in MLP, the file carries no
    /// shape metadata we trust, so the expected widths are passed in.
    pub fn load(path: &Path, n_features: usize, n_classes: usize) -> Result<Self> {
        if !path.exists() {
            return Err(IdsError::ArtifactMissing(path.to_path_buf()));
        }
        let session = Session::builder()
            .map_err(|e| IdsError::Model(format!("session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| IdsError::Model(format!("optimization level: {}", e)))?
            .commit_from_file(path)
            .map_err(|e| IdsError::corrupt(path, e))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| IdsError::corrupt(path, "model defines no outputs"))?;
        tracing::info!(path = %path.display(), n_features, n_classes, "ONNX model loaded");
        Ok(Self {
            session: Mutex::new(session),
            output_name,
            n_features,
            n_classes,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.n_features {
            return Err(IdsError::FeatureMismatch {
                sample: "model input".to_string(),
                expected: self.n_features,
                found: x.ncols(),
            });
        }
        let rows = x.nrows();
        let input = Value::from_array(x.to_owned())
            .map_err(|e| IdsError::Model(format!("tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| IdsError::Model("session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| IdsError::Model(format!("inference: {}", e)))?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| IdsError::Model("no output tensor".into()))?;
        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| IdsError::Model(format!("extract: {}", e)))?;

        Array2::from_shape_vec((rows, self.n_classes), data.to_vec())
            .map_err(|e| IdsError::Model(format!("output shape: {}", e)))
    }
}
