//! Fit path (training) and transform-only path (detection).

use super::{Alignment, FeatureVector};
use crate::artifacts::{
    ArtifactSet, CategoricalEncoder, Encoded, EncoderSet, FeatureSchema, Scaler, UNSEEN_CODE,
};
use crate::dataset::{ColumnKind, Dataset, Sample, Value};
use crate::error::{IdsError, Result};
use ndarray::Array2;
use std::collections::HashSet;
use tracing::{debug, info};

/// Output of the fit path.
#[derive(Debug, Clone)]
pub struct FittedDataset {
    /// Encoded and scaled, rows x schema
    pub features: Array2<f32>,
    /// Label codes from the label encoder
    pub labels: Vec<usize>,
    pub artifacts: ArtifactSet,
}

impl FittedDataset {
    pub fn n_classes(&self) -> usize {
        self.artifacts.label_encoder().map(|e| e.len()).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    label_column: String,
}

impl Preprocessor {
    pub fn new(label_column: impl Into<String>) -> Self {
        Self {
            label_column: label_column.into(),
        }
    }

    pub fn label_column(&self) -> &str {
        &self.label_column
    }

    /// Drop incomplete rows, encode categoricals and the label, fit the scaler.
    ///
    /// Column kinds are decided over the whole dataset, before incomplete
    /// rows are dropped.
    pub fn fit(&self, dataset: &Dataset) -> Result<FittedDataset> {
        let label_idx = dataset
            .column_index(&self.label_column)
            .ok_or_else(|| IdsError::MissingLabelColumn(self.label_column.clone()))?;
        let columns = dataset.columns();
        let kinds: Vec<ColumnKind> = (0..columns.len()).map(|i| dataset.column_kind(i)).collect();

        let complete = dataset.drop_incomplete();
        if complete.is_empty() {
            return Err(IdsError::Dataset(
                "no rows left after dropping rows with missing values".into(),
            ));
        }
        let rows = complete.rows();

        let feature_idx: Vec<usize> = (0..columns.len()).filter(|&i| i != label_idx).collect();
        if feature_idx.is_empty() {
            return Err(IdsError::Dataset("dataset has no feature columns".into()));
        }

        let mut encoders = Vec::new();
        let mut encoder_of: Vec<Option<usize>> = vec![None; columns.len()];
        for &i in &feature_idx {
            if kinds[i] == ColumnKind::Categorical {
                let enc = CategoricalEncoder::fit(
                    columns[i].clone(),
                    rows.iter().map(|r| r[i].category_key()),
                )?;
                encoder_of[i] = Some(encoders.len());
                encoders.push(enc);
            }
        }
        let label_encoder = CategoricalEncoder::fit(
            self.label_column.clone(),
            rows.iter().map(|r| r[label_idx].category_key()),
        )?;

        let mut x = Array2::<f64>::zeros((rows.len(), feature_idx.len()));
        for (r, row) in rows.iter().enumerate() {
            for (j, &i) in feature_idx.iter().enumerate() {
                x[[r, j]] = match encoder_of[i] {
                    Some(e) => encoders[e].encode(&row[i].category_key()) as f64,
                    None => row[i].as_number().ok_or_else(|| {
                        IdsError::Dataset(format!("row {}: '{}' is not numeric", r, columns[i]))
                    })?,
                };
            }
        }
        let labels: Vec<usize> = rows
            .iter()
            .map(|r| label_encoder.encode(&r[label_idx].category_key()))
            .collect();

        let scaler = Scaler::fit(x.view())?;
        let features = scaler.transform(x.view())?.mapv(|v| v as f32);
        let schema = FeatureSchema::new(feature_idx.iter().map(|&i| columns[i].clone()).collect());

        info!(
            rows = rows.len(),
            dropped = dataset.len() - rows.len(),
            features = schema.len(),
            categorical = encoders.len(),
            classes = label_encoder.len(),
            "preprocessing fitted"
        );

        Ok(FittedDataset {
            features,
            labels,
            artifacts: ArtifactSet::new(
                scaler,
                EncoderSet {
                    features: encoders,
                    label: Some(label_encoder),
                },
                schema,
            ),
        })
    }

    /// Reindex a sample to the schema and encode categoricals, without scaling.
    ///
    /// The label column is never read. Absent schema columns and missing
    /// numeric cells become 0; extra columns are dropped; unseen categories
    /// take [`UNSEEN_CODE`].
    pub fn align(&self, sample: &Sample, artifacts: &ArtifactSet) -> Result<Alignment> {
        self.align_as(sample, artifacts, sample.id.as_deref().unwrap_or("sample"))
    }

    fn align_as(
        &self,
        sample: &Sample,
        artifacts: &ArtifactSet,
        sample_id: &str,
    ) -> Result<Alignment> {
        let schema = &artifacts.schema;
        let mut values = Vec::with_capacity(schema.len());
        let mut filled = Vec::new();
        let mut unseen = Vec::new();

        for name in schema.names() {
            let cell = if *name == self.label_column {
                None
            } else {
                sample.get(name)
            };
            let v = match (artifacts.encoders.get(name), cell) {
                (_, None) | (None, Some(Value::Missing)) => {
                    filled.push(name.clone());
                    0.0
                }
                (Some(enc), Some(v)) => {
                    let key = v.category_key();
                    match enc.lookup(&key) {
                        Encoded::Known(code) => code as f64,
                        Encoded::Unseen => {
                            unseen.push((name.clone(), key));
                            UNSEEN_CODE as f64
                        }
                    }
                }
                (None, Some(v)) => v.as_number().ok_or_else(|| IdsError::InvalidValue {
                    sample: sample_id.to_string(),
                    column: name.clone(),
                    value: v.category_key(),
                })?,
            };
            values.push(v);
        }

        let known: HashSet<&str> = schema.names().iter().map(String::as_str).collect();
        let mut dropped: Vec<String> = sample
            .columns()
            .filter(|c| *c != self.label_column && !known.contains(c))
            .map(str::to_string)
            .collect();
        dropped.sort();

        Ok(Alignment {
            values,
            filled,
            unseen,
            dropped,
        })
    }

    /// Transform-only path for one sample: align, then scale.
    pub fn transform_one(&self, sample: &Sample, artifacts: &ArtifactSet) -> Result<FeatureVector> {
        self.transform_as(sample, artifacts, sample.id.as_deref().unwrap_or("sample"))
    }

    /// As [`Preprocessor::transform_one`], reporting errors under `sample_id`.
    pub fn transform_as(
        &self,
        sample: &Sample,
        artifacts: &ArtifactSet,
        sample_id: &str,
    ) -> Result<FeatureVector> {
        let alignment = self.align_as(sample, artifacts, sample_id)?;
        if !alignment.filled.is_empty()
            || !alignment.unseen.is_empty()
            || !alignment.dropped.is_empty()
        {
            debug!(
                sample = %sample_id,
                filled = ?alignment.filled,
                unseen = ?alignment.unseen,
                dropped = ?alignment.dropped,
                "sample reconciled to schema"
            );
        }
        let scaled = artifacts.scaler.transform_row(&alignment.values, sample_id)?;
        Ok(FeatureVector {
            sample_id: sample_id.to_string(),
            values: scaled.into_iter().map(|v| v as f32).collect(),
        })
    }

    /// Transform-only path for many samples; the first failing sample aborts.
    pub fn transform(&self, samples: &[Sample], artifacts: &ArtifactSet) -> Result<Array2<f32>> {
        let width = artifacts.scaler.n_features();
        let mut data = Vec::with_capacity(samples.len() * width);
        for s in samples {
            data.extend(self.transform_one(s, artifacts)?.values);
        }
        Array2::from_shape_vec((samples.len(), width), data)
            .map_err(|e| IdsError::Model(format!("feature matrix shape: {}", e)))
    }
}
