//! Ordered feature names fixed at training time.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// SHA-256 over the ordered names; changes with any add, drop or reorder.
    pub fn fingerprint(&self) -> String {
        let mut h = Sha256::new();
        for n in &self.names {
            h.update(n.as_bytes());
            h.update([0u8]);
        }
        format!("{:x}", h.finalize())
    }

    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        if self.names.is_empty() {
            return Err("feature schema is empty".into());
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(format!("duplicate feature '{}'", dup));
        }
        Ok(())
    }
}
