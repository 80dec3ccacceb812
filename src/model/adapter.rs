//! Uniform predict contract over any [`Classifier`] plus label decoding.

use super::Classifier;
use crate::artifacts::CategoricalEncoder;
use crate::error::{IdsError, Result};
use crate::features::FeatureVector;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class_index: usize,
    pub probabilities: Vec<f32>,
}

/// Index of the largest probability; ties go to the lowest index. NaN never wins.
pub fn argmax(p: &[f32]) -> Option<usize> {
    p.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            _ if v.is_nan() => best,
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Everything except the literal `normal` (any ASCII case) is an attack.
pub fn is_attack_label(label: &str) -> bool {
    !label.eq_ignore_ascii_case("normal")
}

#[derive(Clone)]
pub struct ClassifierAdapter {
    model: Arc<dyn Classifier>,
    label_encoder: Option<CategoricalEncoder>,
}

impl ClassifierAdapter {
    pub fn new(model: Arc<dyn Classifier>, label_encoder: Option<CategoricalEncoder>) -> Self {
        Self {
            model,
            label_encoder,
        }
    }

    pub fn model(&self) -> &dyn Classifier {
        self.model.as_ref()
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<Prediction> {
        if features.dim() != self.model.n_features() {
            return Err(IdsError::FeatureMismatch {
                sample: features.sample_id.clone(),
                expected: self.model.n_features(),
                found: features.dim(),
            });
        }
        let x = ArrayView2::from_shape((1, features.dim()), features.as_slice())
            .map_err(|e| IdsError::Model(format!("input shape: {}", e)))?;
        let probs = self.model.predict_proba(x)?;
        if probs.nrows() != 1 {
            return Err(IdsError::Model(format!(
                "model returned {} rows for one sample",
                probs.nrows()
            )));
        }
        let probabilities = probs.row(0).to_vec();
        let class_index = argmax(&probabilities).ok_or_else(|| {
            IdsError::Model(format!(
                "{}: no finite class probability",
                features.sample_id
            ))
        })?;
        Ok(Prediction {
            class_index,
            probabilities,
        })
    }

    /// Class name for `class_index`, or its decimal form when no label
    /// encoder is loaded or the index is outside its vocabulary.
    pub fn decode_label(&self, class_index: usize) -> String {
        self.label_encoder
            .as_ref()
            .and_then(|e| e.decode(class_index))
            .map(str::to_string)
            .unwrap_or_else(|| class_index.to_string())
    }
}
