//! Versioned JSON persistence for the artifact set and the model.
//!
//! Every file is an envelope `{format_version, kind, payload}`. The manifest,
//! written last, pins the SHA-256 of the three artifact files and the model
//! so a partially overwritten set is detected on load.

use super::{ArtifactSet, EncoderSet, FeatureSchema, Scaler};
use crate::error::{IdsError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const FORMAT_VERSION: u32 = 1;

pub const SCALER_FILE: &str = "scaler.json";
pub const ENCODERS_FILE: &str = "encoders.json";
pub const SCHEMA_FILE: &str = "feature_names.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const MODEL_FILE: &str = "ids_model.json";
/// Optional externally exported model, used by the `onnx` backend.
pub const ONNX_MODEL_FILE: &str = "ids_model.onnx";

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    format_version: u32,
    kind: String,
    payload: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub feature_count: usize,
    pub schema_fingerprint: String,
    /// File name -> SHA-256 hex of its bytes
    pub files: BTreeMap<String, String>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Owns the artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// All three artifacts, the manifest and the model are present.
    pub fn exists(&self) -> bool {
        [SCALER_FILE, ENCODERS_FILE, SCHEMA_FILE, MANIFEST_FILE, MODEL_FILE]
            .iter()
            .all(|f| self.path(f).is_file())
    }

    /// Persist scaler, encoders, schema and model, then the manifest that
    /// pins all four. A failure before the manifest is replaced leaves the
    /// previous manifest in place, and it no longer matches what was
    /// overwritten, so the mixed set is refused on load.
    pub fn save<M: Serialize>(&self, set: &ArtifactSet, model: &M) -> Result<ArtifactManifest> {
        fs::create_dir_all(&self.dir)?;
        let mut files = BTreeMap::new();
        files.insert(
            SCALER_FILE.to_string(),
            self.write_envelope(SCALER_FILE, "scaler", &set.scaler)?,
        );
        files.insert(
            ENCODERS_FILE.to_string(),
            self.write_envelope(ENCODERS_FILE, "encoders", &set.encoders)?,
        );
        files.insert(
            SCHEMA_FILE.to_string(),
            self.write_envelope(SCHEMA_FILE, "feature_schema", &set.schema)?,
        );
        files.insert(
            MODEL_FILE.to_string(),
            self.write_envelope(MODEL_FILE, "model", model)?,
        );
        let manifest = ArtifactManifest {
            format_version: FORMAT_VERSION,
            created_at: Utc::now(),
            feature_count: set.schema.len(),
            schema_fingerprint: set.schema.fingerprint(),
            files,
        };
        self.write_envelope(MANIFEST_FILE, "manifest", &manifest)?;
        info!(dir = %self.dir.display(), features = manifest.feature_count, "artifacts saved");
        Ok(manifest)
    }

    /// Load and verify the set. Fails fast; never returns partial state.
    pub fn load(&self) -> Result<ArtifactSet> {
        let manifest: ArtifactManifest = self.read_envelope(MANIFEST_FILE, "manifest", None)?;
        let scaler: Scaler = self.read_envelope(
            SCALER_FILE,
            "scaler",
            Some(self.pinned_digest(&manifest, SCALER_FILE)?),
        )?;
        let encoders: EncoderSet = self.read_envelope(
            ENCODERS_FILE,
            "encoders",
            Some(self.pinned_digest(&manifest, ENCODERS_FILE)?),
        )?;
        let schema: FeatureSchema = self.read_envelope(
            SCHEMA_FILE,
            "feature_schema",
            Some(self.pinned_digest(&manifest, SCHEMA_FILE)?),
        )?;

        scaler
            .check()
            .map_err(|e| IdsError::corrupt(self.path(SCALER_FILE), e))?;
        encoders
            .check()
            .map_err(|e| IdsError::corrupt(self.path(ENCODERS_FILE), e))?;
        schema
            .check()
            .map_err(|e| IdsError::corrupt(self.path(SCHEMA_FILE), e))?;
        if schema.fingerprint() != manifest.schema_fingerprint {
            return Err(IdsError::corrupt(
                self.path(SCHEMA_FILE),
                "schema fingerprint differs from manifest",
            ));
        }

        let set = ArtifactSet::new(scaler, encoders, schema);
        if !set.is_coherent() {
            warn!(
                scaler = set.scaler.n_features(),
                schema = set.schema.len(),
                "scaler width differs from feature schema; every sample will fail alignment"
            );
        }
        debug!(dir = %self.dir.display(), features = set.schema.len(), "artifacts loaded");
        Ok(set)
    }

    pub fn manifest(&self) -> Result<ArtifactManifest> {
        self.read_envelope(MANIFEST_FILE, "manifest", None)
    }

    /// Load the model pinned by the manifest. Shape validation is left to
    /// the caller, which knows the concrete model type.
    pub fn load_model<M: DeserializeOwned>(&self) -> Result<M> {
        let manifest: ArtifactManifest = self.read_envelope(MANIFEST_FILE, "manifest", None)?;
        self.read_envelope(
            MODEL_FILE,
            "model",
            Some(self.pinned_digest(&manifest, MODEL_FILE)?),
        )
    }

    fn pinned_digest<'m>(&self, manifest: &'m ArtifactManifest, file: &str) -> Result<&'m str> {
        manifest
            .files
            .get(file)
            .map(String::as_str)
            .ok_or_else(|| {
                IdsError::corrupt(self.path(MANIFEST_FILE), format!("no checksum for {}", file))
            })
    }

    /// Write via temp file + rename. Returns the SHA-256 of the written bytes.
    fn write_envelope<T: Serialize>(&self, file: &str, kind: &str, payload: &T) -> Result<String> {
        let envelope = Envelope {
            format_version: FORMAT_VERSION,
            kind: kind.to_string(),
            payload,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        let path = self.path(file);
        let tmp = self.dir.join(format!(".{}.tmp", file));
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(sha256_hex(&bytes))
    }

    fn read_envelope<T: DeserializeOwned>(
        &self,
        file: &str,
        kind: &str,
        expected_sha: Option<&str>,
    ) -> Result<T> {
        let path = self.path(file);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IdsError::ArtifactMissing(path))
            }
            Err(e) => return Err(IdsError::corrupt(path, e)),
        };
        if let Some(expected) = expected_sha {
            let actual = sha256_hex(&bytes);
            if actual != expected {
                return Err(IdsError::corrupt(path, "checksum differs from manifest"));
            }
        }
        let envelope: Envelope<T> =
            serde_json::from_slice(&bytes).map_err(|e| IdsError::corrupt(&path, e))?;
        if envelope.kind != kind {
            return Err(IdsError::corrupt(
                path,
                format!("expected kind '{}', found '{}'", kind, envelope.kind),
            ));
        }
        if envelope.format_version != FORMAT_VERSION {
            return Err(IdsError::corrupt(
                path,
                format!("unsupported format version {}", envelope.format_version),
            ));
        }
        Ok(envelope.payload)
    }
}
