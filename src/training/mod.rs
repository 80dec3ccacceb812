//! Training run: preprocess, split, fit, evaluate, then persist.
//!
//! Nothing reaches disk until every earlier step has succeeded, so a failed
//! run leaves any previous artifact set untouched.

use crate::artifacts::{ArtifactManifest, ArtifactStore};
use crate::config::IdsConfig;
use crate::dataset::{train_test_split, Dataset};
use crate::error::Result;
use crate::features::Preprocessor;
use crate::model::{evaluate, Evaluation, MlpClassifier, MlpTrainer, Trainer, TrainingHistory};
use ndarray::Axis;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub history: TrainingHistory,
    pub evaluation: Evaluation,
    pub manifest: ArtifactManifest,
    pub train_rows: usize,
    pub test_rows: usize,
    pub model: MlpClassifier,
}

pub fn train_from_csv(path: &Path, config: &IdsConfig) -> Result<TrainingOutcome> {
    let dataset = Dataset::from_csv_path(path)?;
    info!(path = %path.display(), rows = dataset.len(), "training data loaded");
    let store = ArtifactStore::new(config.artifacts_dir());
    train(&dataset, config, &store)
}

pub fn train(
    dataset: &Dataset,
    config: &IdsConfig,
    store: &ArtifactStore,
) -> Result<TrainingOutcome> {
    let fitted = Preprocessor::new(&config.label_column).fit(dataset)?;
    let t = &config.training;
    let (train_idx, test_idx) = train_test_split(fitted.labels.len(), t.test_size, t.seed)?;

    let x_train = fitted.features.select(Axis(0), &train_idx);
    let x_test = fitted.features.select(Axis(0), &test_idx);
    let y_train: Vec<usize> = train_idx.iter().map(|&i| fitted.labels[i]).collect();
    let y_test: Vec<usize> = test_idx.iter().map(|&i| fitted.labels[i]).collect();
    info!(
        train = train_idx.len(),
        test = test_idx.len(),
        features = x_train.ncols(),
        classes = fitted.n_classes(),
        "training model"
    );

    let (model, history) = MlpTrainer::new(t.clone()).fit(
        x_train.view(),
        &y_train,
        x_test.view(),
        &y_test,
        fitted.n_classes(),
    )?;

    let labels: Vec<String> = fitted
        .artifacts
        .label_encoder()
        .map(|e| e.classes().to_vec())
        .unwrap_or_default();
    let evaluation = evaluate(&model, x_test.view(), &y_test, &labels)?;
    info!(
        accuracy = evaluation.accuracy,
        best_epoch = history.best_epoch,
        epochs_run = history.epochs.len(),
        "model evaluated"
    );

    let manifest = store.save(&fitted.artifacts, &model)?;

    Ok(TrainingOutcome {
        history,
        evaluation,
        manifest,
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
        model,
    })
}
