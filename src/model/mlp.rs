//! Dense feed-forward classifier: ReLU hidden layers, softmax output,
//! cross-entropy loss, Adam, early stopping on validation loss.

use super::{argmax, Classifier, EpochMetrics, Trainer, TrainingHistory};
use crate::config::TrainingConfig;
use crate::error::{IdsError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPSILON: f32 = 1e-7;
const PROB_FLOOR: f32 = 1e-7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Dense {
    /// fan_in x fan_out
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl Dense {
    /// Glorot-uniform weights, zero bias.
    fn init(fan_in: usize, fan_out: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
        Self {
            weights: Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-limit..limit)),
            bias: Array1::zeros(fan_out),
        }
    }

    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weights) + &self.bias
    }
}

fn softmax_rows(z: &mut Array2<f32>) {
    for mut row in z.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

/// Summed cross-entropy and number of correct arg-max predictions.
fn score(probs: &Array2<f32>, y: &[usize]) -> (f32, usize) {
    let mut loss = 0.0;
    let mut correct = 0;
    for (row, &target) in probs.rows().into_iter().zip(y) {
        loss -= row[target].max(PROB_FLOOR).ln();
        if argmax(&row.to_vec()) == Some(target) {
            correct += 1;
        }
    }
    (loss, correct)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpClassifier {
    layers: Vec<Dense>,
    n_features: usize,
    n_classes: usize,
}

impl MlpClassifier {
    /// Randomly initialised network, `hidden` widths between input and output.
    pub fn new(n_features: usize, hidden: &[usize], n_classes: usize, seed: u64) -> Result<Self> {
        if n_features == 0 || n_classes == 0 || hidden.contains(&0) {
            return Err(IdsError::Model(format!(
                "invalid layer sizes: {} -> {:?} -> {}",
                n_features, hidden, n_classes
            )));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut sizes = Vec::with_capacity(hidden.len() + 2);
        sizes.push(n_features);
        sizes.extend_from_slice(hidden);
        sizes.push(n_classes);
        let layers = sizes
            .windows(2)
            .map(|w| Dense::init(w[0], w[1], &mut rng))
            .collect();
        Ok(Self {
            layers,
            n_features,
            n_classes,
        })
    }

    /// Widths of every layer, input first.
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![self.n_features];
        sizes.extend(self.layers.iter().map(|l| l.bias.len()));
        sizes
    }

    /// Layer shapes chain from `n_features` to `n_classes`.
    fn check_shapes(&self) -> std::result::Result<(), String> {
        if self.layers.is_empty() {
            return Err("model has no layers".into());
        }
        let mut width = self.n_features;
        for (l, layer) in self.layers.iter().enumerate() {
            let (fan_in, fan_out) = layer.weights.dim();
            if fan_in != width {
                return Err(format!(
                    "layer {} takes {} inputs, previous width is {}",
                    l, fan_in, width
                ));
            }
            if layer.bias.len() != fan_out {
                return Err(format!(
                    "layer {} has {} outputs but {} biases",
                    l,
                    fan_out,
                    layer.bias.len()
                ));
            }
            width = fan_out;
        }
        if width != self.n_classes {
            return Err(format!(
                "output width {} differs from {} classes",
                width, self.n_classes
            ));
        }
        Ok(())
    }

    /// Validate a deserialized model: shapes chain and every parameter is finite.
    pub fn check(&self) -> std::result::Result<(), String> {
        self.check_shapes()?;
        let finite = self
            .layers
            .iter()
            .all(|l| l.weights.iter().chain(l.bias.iter()).all(|v| v.is_finite()));
        if !finite {
            return Err("non-finite weight or bias".into());
        }
        Ok(())
    }

    fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let last = self.layers.len().saturating_sub(1);
        let mut a = x.to_owned();
        for (l, layer) in self.layers.iter().enumerate() {
            let mut z = layer.forward(&a);
            if l < last {
                z.mapv_inplace(|v| v.max(0.0));
            } else {
                softmax_rows(&mut z);
            }
            a = z;
        }
        a
    }

    /// One forward/backward pass over a mini-batch. Returns summed loss,
    /// correct count and per-layer (weight, bias) gradients.
    fn backprop(
        &self,
        x: &Array2<f32>,
        y: &[usize],
        dropout: &[f32],
        rng: &mut StdRng,
    ) -> (f32, usize, Vec<(Array2<f32>, Array1<f32>)>) {
        let last = self.layers.len() - 1;
        let mut inputs: Vec<Array2<f32>> = Vec::with_capacity(self.layers.len());
        // relu derivative times the dropout mask, per hidden layer
        let mut gates: Vec<Array2<f32>> = Vec::with_capacity(last);
        let mut a = x.clone();
        for (l, layer) in self.layers.iter().enumerate() {
            let mut z = layer.forward(&a);
            inputs.push(a);
            if l < last {
                let p = dropout.get(l).copied().unwrap_or(0.0);
                let keep = 1.0 - p;
                let gate = Array2::from_shape_fn(z.dim(), |(i, j)| {
                    if z[[i, j]] <= 0.0 {
                        0.0
                    } else if p > 0.0 {
                        if rng.gen::<f32>() < keep {
                            1.0 / keep
                        } else {
                            0.0
                        }
                    } else {
                        1.0
                    }
                });
                a = &z * &gate;
                gates.push(gate);
            } else {
                softmax_rows(&mut z);
                a = z;
            }
        }

        let (loss, correct) = score(&a, y);
        let batch = x.nrows() as f32;
        let mut delta = a;
        for (i, &target) in y.iter().enumerate() {
            delta[[i, target]] -= 1.0;
        }
        delta.mapv_inplace(|v| v / batch);

        let mut grads = Vec::with_capacity(self.layers.len());
        for l in (0..=last).rev() {
            let gw = inputs[l].t().dot(&delta);
            let gb = delta.sum_axis(Axis(0));
            if l > 0 {
                delta = delta.dot(&self.layers[l].weights.t()) * &gates[l - 1];
            }
            grads.push((gw, gb));
        }
        grads.reverse();
        (loss, correct, grads)
    }
}

impl Classifier for MlpClassifier {
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
        self.check_shapes().map_err(IdsError::Model)?;
        Ok(self.forward(x))
    }
}

struct Adam {
    lr: f32,
    t: i32,
    m: Vec<(Array2<f32>, Array1<f32>)>,
    v: Vec<(Array2<f32>, Array1<f32>)>,
}

impl Adam {
    fn new(layers: &[Dense], lr: f32) -> Self {
        let zeros: Vec<(Array2<f32>, Array1<f32>)> = layers
            .iter()
            .map(|l| (Array2::zeros(l.weights.dim()), Array1::zeros(l.bias.len())))
            .collect();
        Self {
            lr,
            t: 0,
            m: zeros.clone(),
            v: zeros,
        }
    }

    fn step(&mut self, layers: &mut [Dense], grads: &[(Array2<f32>, Array1<f32>)]) {
        self.t += 1;
        let lr_t = self.lr * (1.0 - BETA2.powi(self.t)).sqrt() / (1.0 - BETA1.powi(self.t));
        let update = |p: &mut f32, m: &mut f32, v: &mut f32, g: &f32| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + EPSILON);
        };
        for (((layer, (gw, gb)), (mw, mb)), (vw, vb)) in layers
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            Zip::from(&mut layer.weights)
                .and(mw)
                .and(vw)
                .and(gw)
                .for_each(update);
            Zip::from(&mut layer.bias)
                .and(mb)
                .and(vb)
                .and(gb)
                .for_each(update);
        }
    }
}

/// Fits [`MlpClassifier`] from a [`TrainingConfig`].
#[derive(Debug, Clone)]
pub struct MlpTrainer {
    config: TrainingConfig,
}

impl MlpTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    fn check(
        &self,
        x: &ArrayView2<f32>,
        y: &[usize],
        val_x: &ArrayView2<f32>,
        val_y: &[usize],
        n_classes: usize,
    ) -> Result<()> {
        let c = &self.config;
        if c.epochs == 0 || c.batch_size == 0 {
            return Err(IdsError::Model("epochs and batch_size must be positive".into()));
        }
        if c.learning_rate.is_nan() || c.learning_rate <= 0.0 {
            return Err(IdsError::Model("learning_rate must be positive".into()));
        }
        if c.dropout.iter().any(|p| !(0.0..1.0).contains(p)) {
            return Err(IdsError::Model("dropout rates must be in [0, 1)".into()));
        }
        if x.nrows() == 0 || x.nrows() != y.len() || val_x.nrows() != val_y.len() {
            return Err(IdsError::Model(format!(
                "shape mismatch: x {} rows / y {}, val_x {} rows / val_y {}",
                x.nrows(),
                y.len(),
                val_x.nrows(),
                val_y.len()
            )));
        }
        if val_x.ncols() != x.ncols() {
            return Err(IdsError::Model(format!(
                "validation width {} differs from training width {}",
                val_x.ncols(),
                x.ncols()
            )));
        }
        if let Some(&bad) = y.iter().chain(val_y).find(|&&label| label >= n_classes) {
            return Err(IdsError::Model(format!(
                "label {} out of range for {} classes",
                bad, n_classes
            )));
        }
        Ok(())
    }
}

impl Trainer for MlpTrainer {
    type Model = MlpClassifier;

    fn fit(
        &self,
        x: ArrayView2<f32>,
        y: &[usize],
        val_x: ArrayView2<f32>,
        val_y: &[usize],
        n_classes: usize,
    ) -> Result<(MlpClassifier, TrainingHistory)> {
        self.check(&x, y, &val_x, val_y, n_classes)?;
        let c = &self.config;
        let mut rng = StdRng::seed_from_u64(c.seed);
        let mut model = MlpClassifier::new(x.ncols(), &c.hidden_layers, n_classes, c.seed)?;
        let mut adam = Adam::new(&model.layers, c.learning_rate);

        let mut order: Vec<usize> = (0..x.nrows()).collect();
        let mut history = TrainingHistory::default();
        let mut best = (f32::INFINITY, model.clone());
        let mut wait = 0;

        for epoch in 1..=c.epochs {
            order.shuffle(&mut rng);
            let (mut loss_sum, mut correct) = (0.0f32, 0usize);
            for batch in order.chunks(c.batch_size) {
                let xb = x.select(Axis(0), batch);
                let yb: Vec<usize> = batch.iter().map(|&i| y[i]).collect();
                let (loss, hits, grads) = model.backprop(&xb, &yb, &c.dropout, &mut rng);
                adam.step(&mut model.layers, &grads);
                loss_sum += loss;
                correct += hits;
            }
            let n = x.nrows() as f32;
            let (loss, accuracy) = (loss_sum / n, correct as f32 / n);
            let (val_loss, val_accuracy) = if val_x.nrows() > 0 {
                let (l, hits) = score(&model.forward(val_x), val_y);
                let m = val_x.nrows() as f32;
                (l / m, hits as f32 / m)
            } else {
                (loss, accuracy)
            };
            debug!(epoch, loss, accuracy, val_loss, val_accuracy, "epoch finished");
            history.epochs.push(EpochMetrics {
                epoch,
                loss,
                accuracy,
                val_loss,
                val_accuracy,
            });

            if val_loss < best.0 {
                best = (val_loss, model.clone());
                history.best_epoch = epoch;
                wait = 0;
            } else {
                wait += 1;
                if wait >= c.patience {
                    history.stopped_early = true;
                    info!(epoch, best_epoch = history.best_epoch, "early stopping");
                    break;
                }
            }
        }

        if history.best_epoch == 0 {
            return Err(IdsError::Model("validation loss never became finite".into()));
        }
        Ok((best.1, history))
    }
}
