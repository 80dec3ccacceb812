//! MLP training, early stopping, label decoding and evaluation.

use ndarray::{Array2, ArrayView2};
use retro_ids::{
    artifacts::CategoricalEncoder,
    config::TrainingConfig,
    features::FeatureVector,
    model::{evaluate, Classifier, ClassifierAdapter, MlpClassifier, MlpTrainer, Trainer},
    IdsError,
};
use std::sync::Arc;

/// Two well separated blobs; class 1 iff x0 + x1 > 0.
fn blobs(n: usize, offset: usize) -> (Array2<f32>, Vec<usize>) {
    let mut x = Array2::<f32>::zeros((n, 2));
    let mut y = Vec::with_capacity(n);
    for i in 0..n {
        let k = (i + offset) as f32;
        let jitter = ((k * 0.37).sin(), (k * 0.73).cos());
        let class = i % 2;
        let centre = if class == 1 { 2.0 } else { -2.0 };
        x[[i, 0]] = centre + 0.5 * jitter.0;
        x[[i, 1]] = centre + 0.5 * jitter.1;
        y.push(class);
    }
    (x, y)
}

fn small_config() -> TrainingConfig {
    TrainingConfig {
        epochs: 60,
        batch_size: 16,
        learning_rate: 0.02,
        hidden_layers: vec![8],
        dropout: vec![0.0],
        patience: 60,
        test_size: 0.3,
        seed: 7,
    }
}

/// Fixed probabilities for every row.
struct Fixed(Vec<f32>);

impl Classifier for Fixed {
    fn n_features(&self) -> usize {
        2
    }

    fn n_classes(&self) -> usize {
        self.0.len()
    }

    fn predict_proba(&self, x: ArrayView2<f32>) -> retro_ids::Result<Array2<f32>> {
        let mut out = Array2::zeros((x.nrows(), self.0.len()));
        for mut row in out.rows_mut() {
            row.assign(&ndarray::ArrayView1::from(&self.0[..]));
        }
        Ok(out)
    }
}

fn fv(values: Vec<f32>) -> FeatureVector {
    FeatureVector {
        sample_id: "t".into(),
        values,
    }
}

#[test]
fn mlp_learns_separable_data() {
    let (x, y) = blobs(200, 0);
    let (vx, vy) = blobs(60, 1000);
    let (model, history) = MlpTrainer::new(small_config())
        .fit(x.view(), &y, vx.view(), &vy, 2)
        .unwrap();

    assert!(history.best_epoch >= 1);
    let best = history.best().unwrap();
    assert!(best.val_accuracy > 0.95, "val accuracy {}", best.val_accuracy);

    let eval = evaluate(&model, vx.view(), &vy, &["a".into(), "b".into()]).unwrap();
    assert!(eval.accuracy > 0.95);
    assert_eq!(eval.support(), 60);
    assert_eq!(eval.classes.len(), 2);
}

#[test]
fn probabilities_sum_to_one() {
    let model = MlpClassifier::new(3, &[4, 4], 5, 1).unwrap();
    let x = Array2::<f32>::from_elem((7, 3), 0.25);
    let p = model.predict_proba(x.view()).unwrap();
    assert_eq!(p.dim(), (7, 5));
    for row in p.rows() {
        assert!((row.sum() - 1.0).abs() < 1e-5);
    }
}

#[test]
fn wrong_width_is_feature_mismatch() {
    let model = MlpClassifier::new(3, &[4], 2, 1).unwrap();
    let x = Array2::<f32>::zeros((1, 4));
    assert!(matches!(
        model.predict_proba(x.view()),
        Err(IdsError::FeatureMismatch {
            expected: 3,
            found: 4,
            ..
        })
    ));

    let adapter = ClassifierAdapter::new(Arc::new(model), None);
    match adapter.predict(&fv(vec![0.0; 2])) {
        Err(IdsError::FeatureMismatch { sample, .. }) => assert_eq!(sample, "t"),
        other => panic!("expected feature mismatch, got {:?}", other),
    }
}

#[test]
fn early_stopping_keeps_best_epoch() {
    let (x, y) = blobs(40, 0);
    // Labels flipped on validation: val loss rises as training fits.
    let (vx, vy) = blobs(20, 500);
    let vy: Vec<usize> = vy.into_iter().map(|c| 1 - c).collect();
    let mut config = small_config();
    config.patience = 2;
    config.epochs = 50;

    let (_, history) = MlpTrainer::new(config)
        .fit(x.view(), &y, vx.view(), &vy, 2)
        .unwrap();
    assert!(history.stopped_early);
    assert!(history.epochs.len() < 50);
    let best = history.best().unwrap();
    assert!(history
        .epochs
        .iter()
        .all(|e| e.val_loss >= best.val_loss));
}

#[test]
fn invalid_training_config_is_rejected() {
    let (x, y) = blobs(10, 0);
    let mut config = small_config();
    config.dropout = vec![1.0];
    assert!(matches!(
        MlpTrainer::new(config).fit(x.view(), &y, x.view(), &y, 2),
        Err(IdsError::Model(_))
    ));

    for lr in [f32::NAN, 0.0, -0.1] {
        let mut config = small_config();
        config.learning_rate = lr;
        assert!(matches!(
            MlpTrainer::new(config).fit(x.view(), &y, x.view(), &y, 2),
            Err(IdsError::Model(_))
        ));
    }

    let bad_labels = vec![3; 10];
    assert!(MlpTrainer::new(small_config())
        .fit(x.view(), &bad_labels, x.view(), &y, 2)
        .is_err());
}

#[test]
fn ties_decode_to_first_class() {
    let enc = CategoricalEncoder::fit("label", ["dos", "normal", "probe"]).unwrap();
    let adapter = ClassifierAdapter::new(Arc::new(Fixed(vec![0.5, 0.5, 0.0])), Some(enc));
    let p = adapter.predict(&fv(vec![1.0, 2.0])).unwrap();
    assert_eq!(p.class_index, 0);
    assert_eq!(adapter.decode_label(p.class_index), "dos");
}

#[test]
fn decode_falls_back_to_index() {
    let enc = CategoricalEncoder::fit("label", ["dos", "normal"]).unwrap();
    let with = ClassifierAdapter::new(Arc::new(Fixed(vec![1.0, 0.0])), Some(enc));
    assert_eq!(with.decode_label(1), "normal");
    assert_eq!(with.decode_label(7), "7");

    let without = ClassifierAdapter::new(Arc::new(Fixed(vec![1.0, 0.0])), None);
    assert_eq!(without.decode_label(1), "1");
}

#[test]
fn model_survives_json() {
    let model = MlpClassifier::new(4, &[6], 3, 9).unwrap();
    let json = serde_json::to_string(&model).unwrap();
    let back: MlpClassifier = serde_json::from_str(&json).unwrap();
    let x = Array2::<f32>::from_elem((2, 4), 0.5);
    let a = model.predict_proba(x.view()).unwrap();
    let b = back.predict_proba(x.view()).unwrap();
    for (p, q) in a.iter().zip(b.iter()) {
        assert!((p - q).abs() < 1e-6);
    }
}
