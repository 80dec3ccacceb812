//! Classifier contract, the built-in MLP, and label decoding.

mod adapter;
mod evaluate;
mod mlp;
#[cfg(feature = "onnx")]
mod onnx;

pub use adapter::{argmax, is_attack_label, ClassifierAdapter, Prediction};
pub use evaluate::{evaluate, ClassMetrics, Evaluation};
pub use mlp::{MlpClassifier, MlpTrainer};
#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;

use crate::error::Result;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Trained multi-class model. Implementations are read-only after load and
/// shared across detection workers.
pub trait Classifier: Send + Sync {
    fn n_features(&self) -> usize;

    fn n_classes(&self) -> usize;

    /// Rows of class probabilities, one row per input row.
    fn predict_proba(&self, x: ArrayView2<f32>) -> Result<Array2<f32>>;
}

/// Fits a [`Classifier`] with a held-out validation set.
pub trait Trainer {
    type Model: Classifier;

    fn fit(
        &self,
        x: ArrayView2<f32>,
        y: &[usize],
        val_x: ArrayView2<f32>,
        val_y: &[usize],
        n_classes: usize,
    ) -> Result<(Self::Model, TrainingHistory)>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    /// Epoch whose weights were kept
    pub best_epoch: usize,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn best(&self) -> Option<&EpochMetrics> {
        self.epochs.iter().find(|e| e.epoch == self.best_epoch)
    }
}
