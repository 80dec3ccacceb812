//! Per-column categorical code tables.

use crate::error::{IdsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Code substituted for values outside a trained vocabulary.
///
/// Collides with the first trained category; kept for compatibility with
/// models trained against this fallback.
pub const UNSEEN_CODE: usize = 0;

/// Outcome of a vocabulary lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded {
    Known(usize),
    Unseen,
}

impl Encoded {
    pub fn code(self) -> usize {
        match self {
            Encoded::Known(c) => c,
            Encoded::Unseen => UNSEEN_CODE,
        }
    }
}

/// Maps category name to a dense code. Classes are sorted; code = position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    column: String,
    classes: Vec<String>,
}

impl CategoricalEncoder {
    pub fn fit<I, S>(column: impl Into<String>, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let column = column.into();
        let classes: Vec<String> = values
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if classes.is_empty() {
            return Err(IdsError::Dataset(format!(
                "column '{}' has no values to encode",
                column
            )));
        }
        Ok(Self { column, classes })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn lookup(&self, value: &str) -> Encoded {
        match self.classes.binary_search_by(|c| c.as_str().cmp(value)) {
            Ok(code) => Encoded::Known(code),
            Err(_) => Encoded::Unseen,
        }
    }

    /// Code for `value`; unseen values map to [`UNSEEN_CODE`].
    pub fn encode(&self, value: &str) -> usize {
        self.lookup(value).code()
    }

    pub fn decode(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }

    /// Binary search relies on strictly ascending classes.
    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        if self.classes.is_empty() {
            return Err(format!("encoder '{}' has no classes", self.column));
        }
        if self.classes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(format!(
                "encoder '{}' classes are not strictly sorted",
                self.column
            ));
        }
        Ok(())
    }
}

/// Encoders for every categorical feature column plus the label column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSet {
    /// In training column order
    pub features: Vec<CategoricalEncoder>,
    pub label: Option<CategoricalEncoder>,
}

impl EncoderSet {
    pub fn get(&self, column: &str) -> Option<&CategoricalEncoder> {
        self.features.iter().find(|e| e.column == column)
    }

    pub fn feature_columns(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|e| e.column.as_str())
    }

    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        for e in &self.features {
            e.check()?;
        }
        if let Some(l) = &self.label {
            l.check()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_sorted_vocabulary() {
        let enc = CategoricalEncoder::fit("protocol", ["udp", "tcp", "udp", "icmp"]).unwrap();
        assert_eq!(enc.classes(), ["icmp", "tcp", "udp"]);
        assert_eq!(enc.encode("icmp"), 0);
        assert_eq!(enc.encode("tcp"), 1);
        assert_eq!(enc.encode("udp"), 2);
        assert_eq!(enc.decode(2), Some("udp"));
        assert_eq!(enc.decode(3), None);
    }

    #[test]
    fn unseen_maps_to_zero() {
        let enc = CategoricalEncoder::fit("protocol", ["tcp", "udp"]).unwrap();
        assert_eq!(enc.lookup("gre"), Encoded::Unseen);
        assert_eq!(enc.encode("gre"), UNSEEN_CODE);
        assert_eq!(enc.encode("gre"), enc.encode("gre"));
    }

    #[test]
    fn unsorted_classes_fail_check() {
        let enc: CategoricalEncoder =
            serde_json::from_str(r#"{"column":"c","classes":["b","a"]}"#).unwrap();
        assert!(enc.check().is_err());
    }
}
