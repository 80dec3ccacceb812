//! Hold-out evaluation: accuracy, per-class precision/recall/F1, confusion.

use super::{argmax, Classifier};
use crate::error::{IdsError, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub accuracy: f32,
    pub classes: Vec<ClassMetrics>,
    /// `confusion[actual][predicted]`
    pub confusion: Vec<Vec<usize>>,
}

fn ratio(num: usize, den: usize) -> f32 {
    if den == 0 {
        0.0
    } else {
        num as f32 / den as f32
    }
}

pub fn evaluate(
    model: &dyn Classifier,
    x: ArrayView2<f32>,
    y: &[usize],
    labels: &[String],
) -> Result<Evaluation> {
    if y.is_empty() || x.nrows() != y.len() {
        return Err(IdsError::Dataset(format!(
            "cannot evaluate {} rows against {} labels",
            x.nrows(),
            y.len()
        )));
    }
    let probs = model.predict_proba(x)?;
    let n_classes = model
        .n_classes()
        .max(labels.len())
        .max(y.iter().max().map_or(0, |m| m + 1));

    let mut confusion = vec![vec![0usize; n_classes]; n_classes];
    for (row, &actual) in probs.rows().into_iter().zip(y) {
        let predicted = argmax(&row.to_vec()).unwrap_or(0).min(n_classes - 1);
        confusion[actual][predicted] += 1;
    }

    let correct: usize = (0..n_classes).map(|k| confusion[k][k]).sum();
    let classes = (0..n_classes)
        .map(|k| {
            let tp = confusion[k][k];
            let support: usize = confusion[k].iter().sum();
            let predicted: usize = confusion.iter().map(|r| r[k]).sum();
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                label: labels.get(k).cloned().unwrap_or_else(|| k.to_string()),
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect();

    Ok(Evaluation {
        accuracy: ratio(correct, y.len()),
        classes,
        confusion,
    })
}

impl Evaluation {
    pub fn support(&self) -> usize {
        self.classes.iter().map(|c| c.support).sum()
    }

    /// Unweighted mean of (precision, recall, f1).
    pub fn macro_avg(&self) -> (f32, f32, f32) {
        let n = self.classes.len().max(1) as f32;
        let sum = self.classes.iter().fold((0.0, 0.0, 0.0), |a, c| {
            (a.0 + c.precision, a.1 + c.recall, a.2 + c.f1)
        });
        (sum.0 / n, sum.1 / n, sum.2 / n)
    }

    /// Support-weighted mean of (precision, recall, f1).
    pub fn weighted_avg(&self) -> (f32, f32, f32) {
        let total = self.support().max(1) as f32;
        let sum = self.classes.iter().fold((0.0, 0.0, 0.0), |a, c| {
            let w = c.support as f32;
            (a.0 + w * c.precision, a.1 + w * c.recall, a.2 + w * c.f1)
        });
        (sum.0 / total, sum.1 / total, sum.2 / total)
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(12);
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.support()
        )?;
        let averages = [
            ("macro avg", self.macro_avg()),
            ("weighted avg", self.weighted_avg()),
        ];
        for (name, (p, r, f1)) in averages {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name,
                p,
                r,
                f1,
                self.support()
            )?;
        }
        Ok(())
    }
}
