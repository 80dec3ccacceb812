//! Column-wise standardization fitted once on the encoded training matrix.

use crate::error::{IdsError, Result};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Scaler {
    /// Population mean and std per column. Zero-variance columns get scale 1.0.
    pub fn fit(x: ArrayView2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(IdsError::Dataset("cannot fit scaler on zero rows".into()));
        }
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| IdsError::Dataset("cannot fit scaler on zero rows".into()))?;
        let std = x.std_axis(Axis(0), 0.0);
        let scale = std
            .iter()
            .map(|&s| if s.is_finite() && s > 0.0 { s } else { 1.0 })
            .collect();
        Ok(Self {
            mean: mean.to_vec(),
            scale,
        })
    }

    pub fn from_parts(mean: Vec<f64>, scale: Vec<f64>) -> Self {
        Self { mean, scale }
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// `(x - mean) / scale`; `sample` names the row in a mismatch error.
    pub fn transform_row(&self, row: &[f64], sample: &str) -> Result<Vec<f64>> {
        if row.len() != self.n_features() {
            return Err(IdsError::FeatureMismatch {
                sample: sample.to_string(),
                expected: self.n_features(),
                found: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(IdsError::FeatureMismatch {
                sample: "matrix".to_string(),
                expected: self.n_features(),
                found: x.ncols(),
            });
        }
        let mut out = x.to_owned();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (self.mean[j], self.scale[j]);
            col.mapv_inplace(|v| (v - m) / s);
        }
        Ok(out)
    }

    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        if self.mean.len() != self.scale.len() {
            return Err(format!(
                "mean has {} entries, scale has {}",
                self.mean.len(),
                self.scale.len()
            ));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err("non-finite mean".into());
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("scale must be finite and positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn standardizes_columns() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let s = Scaler::fit(x.view()).unwrap();
        assert_eq!(s.mean(), [2.0, 5.0]);
        assert_eq!(s.scale(), [1.0, 1.0]);
        let t = s.transform(x.view()).unwrap();
        assert_eq!(t, array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn row_width_is_checked() {
        let s = Scaler::from_parts(vec![0.0; 3], vec![1.0; 3]);
        match s.transform_row(&[1.0, 2.0], "row 4") {
            Err(IdsError::FeatureMismatch { sample, expected, found }) => {
                assert_eq!(sample, "row 4");
                assert_eq!((expected, found), (3, 2));
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }
}
