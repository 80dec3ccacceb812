//! Detection orchestration.
//!
//! Each sample moves `Received -> Transformed -> Classified -> Logged`. A
//! failure at any step stops that sample only: nothing is appended to the
//! audit log for it, and batch processing moves on to the next sample.

use crate::artifacts::{ArtifactSet, ArtifactStore, MODEL_FILE};
use crate::audit::AuditLog;
use crate::config::IdsConfig;
use crate::dataset::Sample;
use crate::error::{IdsError, Result};
use crate::features::Preprocessor;
use crate::model::{is_attack_label, Classifier, ClassifierAdapter, MlpClassifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Attack,
    Normal,
}

impl Verdict {
    pub fn from_label(label: &str) -> Self {
        if is_attack_label(label) {
            Verdict::Attack
        } else {
            Verdict::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Attack => "attack",
            Verdict::Normal => "normal",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one classified sample. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub connection_id: String,
    pub predicted_label: String,
    pub is_attack: bool,
    pub class_index: usize,
    pub class_probabilities: Vec<f32>,
    pub timestamp: DateTime<Utc>,
}

impl DetectionRecord {
    pub fn verdict(&self) -> Verdict {
        if self.is_attack {
            Verdict::Attack
        } else {
            Verdict::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStage {
    Received,
    Transformed,
    Classified,
    Logged,
}

impl fmt::Display for DetectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DetectionStage::Received => "received",
            DetectionStage::Transformed => "transformed",
            DetectionStage::Classified => "classified",
            DetectionStage::Logged => "logged",
        };
        f.write_str(s)
    }
}

/// A sample that did not reach `Logged`.
#[derive(Debug)]
pub struct SampleFailure {
    /// Position in the submitted batch
    pub index: usize,
    /// Sample identity used in the error
    pub sample: String,
    /// Last stage reached before the failure
    pub stage: DetectionStage,
    pub error: IdsError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub records: Vec<DetectionRecord>,
    pub failures: Vec<SampleFailure>,
    /// Stop was requested before every sample was processed
    pub stopped: bool,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.records.len() + self.failures.len()
    }

    pub fn attacks(&self) -> usize {
        self.records.iter().filter(|r| r.is_attack).count()
    }

    fn push(&mut self, index: usize, sample: String, outcome: Outcome) {
        match outcome {
            Ok(record) => self.records.push(record),
            Err((stage, error)) => self.failures.push(SampleFailure {
                index,
                sample,
                stage,
                error,
            }),
        }
    }
}

type Outcome = std::result::Result<DetectionRecord, (DetectionStage, IdsError)>;

/// Loaded artifacts, model and audit log shared by every detection in a
/// session. Read-only after construction; safe to share across threads.
pub struct DetectionSession {
    artifacts: Arc<ArtifactSet>,
    preprocessor: Preprocessor,
    classifier: ClassifierAdapter,
    audit: Arc<AuditLog>,
}

impl DetectionSession {
    pub fn new(
        artifacts: ArtifactSet,
        model: Arc<dyn Classifier>,
        audit: AuditLog,
        label_column: &str,
    ) -> Self {
        let label_encoder = artifacts.label_encoder().cloned();
        Self {
            artifacts: Arc::new(artifacts),
            preprocessor: Preprocessor::new(label_column),
            classifier: ClassifierAdapter::new(model, label_encoder),
            audit: Arc::new(audit),
        }
    }

    /// Load artifacts and model from `config.data_dir`; fails fast on any
    /// missing or corrupt artifact.
    pub fn open(config: &IdsConfig) -> Result<Self> {
        let store = ArtifactStore::new(config.artifacts_dir());
        let artifacts = store.load()?;
        let model = Self::load_model(&store, &artifacts)?;
        let audit = AuditLog::open(config.audit_log_path())?;
        info!(
            artifacts = %store.dir().display(),
            audit_log = %audit.path().display(),
            features = artifacts.schema.len(),
            classes = model.n_classes(),
            "detection session opened"
        );
        Ok(Self::new(artifacts, model, audit, &config.label_column))
    }

    /// An exported ONNX model, when present and the backend is compiled in,
    /// takes precedence over the built-in MLP.
    fn load_model(
        store: &ArtifactStore,
        artifacts: &ArtifactSet,
    ) -> Result<Arc<dyn Classifier>> {
        #[cfg(feature = "onnx")]
        {
            let path = store.path(crate::artifacts::ONNX_MODEL_FILE);
            if path.is_file() {
                let n_classes = artifacts.label_encoder().map(|e| e.len()).unwrap_or(0);
                let model =
                    crate::model::OnnxClassifier::load(&path, artifacts.schema.len(), n_classes)?;
                return Ok(Arc::new(model));
            }
        }
        let model: MlpClassifier = store.load_model()?;
        model
            .check()
            .map_err(|e| IdsError::corrupt(store.path(MODEL_FILE), e))?;
        if model.n_features() != artifacts.schema.len() {
            warn!(
                model = model.n_features(),
                schema = artifacts.schema.len(),
                "model width differs from feature schema"
            );
        }
        Ok(Arc::new(model))
    }

    pub fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn classifier(&self) -> &ClassifierAdapter {
        &self.classifier
    }

    /// Trained categorical columns absent from `columns`.
    pub fn missing_columns(&self, columns: &[String]) -> Vec<String> {
        self.artifacts
            .encoders
            .feature_columns()
            .filter(|c| !columns.iter().any(|h| h.as_str() == *c))
            .map(str::to_string)
            .collect()
    }

    /// Classify one sample and append it to the audit log.
    pub fn detect(&self, sample: &Sample) -> Result<DetectionRecord> {
        self.run(sample, None).map_err(|(_, e)| e)
    }

    fn run(&self, sample: &Sample, index: Option<usize>) -> Outcome {
        let connection_id = Uuid::new_v4().to_string();
        let sample_id = match (&sample.id, index) {
            (Some(id), _) => id.clone(),
            (None, Some(i)) => format!("sample {}", i),
            (None, None) => connection_id.clone(),
        };
        let span = info_span!("detect", connection_id = %connection_id, sample = %sample_id);
        let _enter = span.enter();

        let features = self
            .preprocessor
            .transform_as(sample, &self.artifacts, &sample_id)
            .map_err(|e| (DetectionStage::Received, e))?;

        let prediction = self
            .classifier
            .predict(&features)
            .map_err(|e| (DetectionStage::Transformed, e))?;
        let predicted_label = self.classifier.decode_label(prediction.class_index);
        let record = DetectionRecord {
            connection_id,
            is_attack: is_attack_label(&predicted_label),
            predicted_label,
            class_index: prediction.class_index,
            class_probabilities: prediction.probabilities,
            timestamp: Utc::now(),
        };

        self.audit
            .append(&record)
            .map_err(|e| (DetectionStage::Classified, e))?;
        debug!(stage = %DetectionStage::Logged, "audit row written");
        info!(
            label = %record.predicted_label,
            result = %record.verdict(),
            "detection"
        );
        Ok(record)
    }

    fn sample_name(sample: &Sample, index: usize) -> String {
        sample.id.clone().unwrap_or_else(|| format!("sample {}", index))
    }

    /// Classify samples in order. Checks `stop` before each sample.
    pub fn detect_batch(&self, samples: &[Sample], stop: &AtomicBool) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, sample) in samples.iter().enumerate() {
            if stop.load(Ordering::Relaxed) {
                report.stopped = true;
                break;
            }
            let outcome = self.run(sample, Some(index));
            if let Err((stage, e)) = &outcome {
                warn!(index, stage = %stage, error = %e, "sample failed");
            }
            report.push(index, Self::sample_name(sample, index), outcome);
        }
        info!(
            processed = report.processed(),
            failed = report.failures.len(),
            stopped = report.stopped,
            "batch finished"
        );
        report
    }

    /// Classify samples on `workers` scoped threads sharing this session.
    /// Records and failures come back in input order.
    pub fn detect_parallel(
        &self,
        samples: &[Sample],
        workers: usize,
        stop: &AtomicBool,
    ) -> BatchReport {
        if workers <= 1 || samples.len() < 2 {
            return self.detect_batch(samples, stop);
        }
        let next = AtomicUsize::new(0);
        let results: Mutex<Vec<(usize, Outcome)>> = Mutex::new(Vec::with_capacity(samples.len()));

        std::thread::scope(|s| {
            for _ in 0..workers.min(samples.len()) {
                s.spawn(|| loop {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(sample) = samples.get(index) else {
                        break;
                    };
                    let outcome = self.run(sample, Some(index));
                    if let Err((stage, e)) = &outcome {
                        warn!(index, stage = %stage, error = %e, "sample failed");
                    }
                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((index, outcome));
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        results.sort_by_key(|(i, _)| *i);
        let mut report = BatchReport::default();
        for (index, outcome) in results {
            report.push(index, Self::sample_name(&samples[index], index), outcome);
        }
        report.stopped = report.processed() < samples.len();
        info!(
            workers,
            processed = report.processed(),
            failed = report.failures.len(),
            stopped = report.stopped,
            "parallel batch finished"
        );
        report
    }
}
