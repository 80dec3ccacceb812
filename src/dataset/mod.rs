//! Tabular connection records: raw values, samples, CSV-backed datasets.

mod split;

pub use split::train_test_split;

use crate::error::{IdsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

/// Tokens read as a missing value.
pub const MISSING_TOKENS: &[&str] = &[
    "", "NA", "N/A", "NaN", "nan", "null", "NULL", "None", "?",
];

/// A single raw cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

impl Value {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if MISSING_TOKENS.contains(&raw) {
            return Value::Missing;
        }
        match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Text(raw.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Numeric coercion. Text that parses as a finite number coerces too.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(t) => t.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Value::Missing => None,
        }
    }

    /// String form used as an encoder key. Integral numbers drop the fraction.
    pub fn category_key(&self) -> String {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Value::Number(n) => n.to_string(),
            Value::Text(t) => t.clone(),
            Value::Missing => "nan".to_string(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// One connection record: feature name to raw value, optionally labeled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Caller-side identity (e.g. `row 12`) used in error reports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub fields: HashMap<String, Value>,
}

impl Sample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.fields.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// Header plus rows, all rows the same width.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for c in &columns {
            if !seen.insert(c.as_str()) {
                return Err(IdsError::Dataset(format!("duplicate column '{}'", c)));
            }
        }
        if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(IdsError::Dataset(format!(
                "row {} has {} fields, header has {}",
                i,
                r.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let ds = Self::from_reader(file)?;
        tracing::debug!(
            path = %path.display(),
            rows = ds.len(),
            columns = ds.columns.len(),
            "dataset loaded"
        );
        Ok(ds)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let columns: Vec<String> = rdr.headers()?.iter().map(|s| s.to_string()).collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(Value::parse).collect());
        }
        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Numeric iff every non-missing cell is a number.
    pub fn column_kind(&self, idx: usize) -> ColumnKind {
        let numeric = self
            .rows
            .iter()
            .map(|r| &r[idx])
            .all(|v| matches!(v, Value::Number(_) | Value::Missing));
        if numeric {
            ColumnKind::Numeric
        } else {
            ColumnKind::Categorical
        }
    }

    /// Copy without any row holding a missing value.
    pub fn drop_incomplete(&self) -> Dataset {
        Dataset {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|r| !r.iter().any(Value::is_missing))
                .cloned()
                .collect(),
        }
    }

    pub fn sample(&self, index: usize) -> Option<Sample> {
        let row = self.rows.get(index)?;
        Some(Sample {
            id: Some(format!("row {}", index)),
            fields: self
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect(),
        })
    }

    pub fn samples(&self) -> Vec<Sample> {
        (0..self.rows.len()).filter_map(|i| self.sample(i)).collect()
    }

    /// Class counts for `label`, most frequent first (ties by name).
    pub fn label_distribution(&self, label: &str) -> Result<Vec<(String, usize)>> {
        let idx = self
            .column_index(label)
            .ok_or_else(|| IdsError::MissingLabelColumn(label.to_string()))?;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for row in &self.rows {
            if row[idx].is_missing() {
                continue;
            }
            *counts.entry(row[idx].category_key()).or_default() += 1;
        }
        let mut out: Vec<(String, usize)> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(out)
    }
}
