//! retro-ids: retrospective network intrusion detection over tabular
//! connection records.
//!
//! Modules:
//! - [`dataset`]: CSV loading, missing-value handling, train/test split
//! - [`artifacts`]: encoders, scaler and feature schema, persisted with checksums
//! - [`features`]: fit and transform-only preprocessing paths
//! - [`model`]: classifier seam, MLP trainer, evaluation
//! - [`training`]: end-to-end training run
//! - [`detect`]: per-sample detection lifecycle and batch runners
//! - [`audit`]: append-only CSV audit log
//! - [`logging`]: tracing subscriber setup and JSON line output

pub mod artifacts;
pub mod audit;
pub mod config;
pub mod dataset;
pub mod detect;
pub mod error;
pub mod features;
pub mod logging;
pub mod model;
pub mod training;

pub use artifacts::{ArtifactSet, ArtifactStore};
pub use audit::{AuditLog, AuditSummary};
pub use config::IdsConfig;
pub use dataset::{Dataset, Sample, Value};
pub use detect::{BatchReport, DetectionRecord, DetectionSession, Verdict};
pub use error::{IdsError, Result};
pub use features::{FeatureVector, Preprocessor};
pub use logging::StructuredLogger;
pub use model::{Classifier, MlpClassifier};
pub use training::{train, train_from_csv, TrainingOutcome};
