//! Append-only CSV audit log of detection verdicts.
//!
//! Columns are fixed: `timestamp, connection_id, label, result`. Each append
//! encodes the full row in memory and writes it with a single call while
//! holding the log's mutex, so concurrent workers never interleave rows.

use crate::detect::{DetectionRecord, Verdict};
use crate::error::{IdsError, Result};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub const AUDIT_HEADER: [&str; 4] = ["timestamp", "connection_id", "label", "result"];

/// One row read back from the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub connection_id: String,
    pub label: String,
    pub result: Verdict,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total: usize,
    pub attacks: usize,
    pub normal: usize,
    /// Rows per predicted label
    pub by_label: BTreeMap<String, usize>,
}

pub struct AuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLog {
    /// Prepare the log at `path`; the file itself is created on first append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is absent or empty.
    pub fn append(&self, record: &DetectionRecord) -> Result<()> {
        let timestamp = record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);
        let row = encode_row(&[
            timestamp.as_str(),
            record.connection_id.as_str(),
            record.predicted_label.as_str(),
            record.verdict().as_str(),
        ])?;

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let bytes = if file.metadata()?.len() == 0 {
            let mut b = encode_row(&AUDIT_HEADER)?;
            b.extend_from_slice(&row);
            b
        } else {
            row
        };
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(())
    }

    /// All rows in write order. An absent log reads as empty.
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::Reader::from_path(&self.path)?;
        let mut out = Vec::new();
        for row in rdr.deserialize() {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn summary(&self) -> Result<AuditSummary> {
        let mut s = AuditSummary::default();
        for e in self.entries()? {
            s.total += 1;
            match e.result {
                Verdict::Attack => s.attacks += 1,
                Verdict::Normal => s.normal += 1,
            }
            *s.by_label.entry(e.label).or_default() += 1;
        }
        Ok(s)
    }
}

fn encode_row(fields: &[&str]) -> Result<Vec<u8>> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(fields)?;
    w.into_inner()
        .map_err(|e| IdsError::Io(e.into_error()))
}
