//! Survey dataset loading and encoding
//!
//! Reads a headered CSV whose columns are declared up front in a schema,
//! applies the configured missing-value policy to the outcome and
//! predictors, and keeps an encoded feature matrix (categorical levels as
//! codes) next to the raw columns. A `Dataset` is never mutated; splits and
//! resamples build new values from row indices.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use survey_tree_core::{hash_canonical_hex, FeatureInfo, FeatureKind};
use tracing::{debug, warn};

use crate::errors::TuningError;

/// Tokens treated as a missing answer (compared case-insensitively)
const MISSING_TOKENS: [&str; 4] = ["", "na", "n/a", "nan"];

/// Declared type of a schema column
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Numeric, ordinal, Likert or ranked answers
    Numeric,
    Categorical,
}

/// One schema entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Numeric,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical,
        }
    }
}

/// What to do with rows whose outcome or predictors are missing
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Drop the row and log how many were dropped
    DropRows,
    /// Fail on the first missing value
    Reject,
}

/// A single answer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Numeric(f64),
    Categorical(String),
    Missing,
}

/// One respondent's answers keyed by field name
pub type Record = BTreeMap<String, Value>;

/// Column storage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Column {
    Numeric {
        values: Vec<Option<f64>>,
    },
    /// `levels` is sorted; `codes` index into it
    Categorical {
        levels: Vec<String>,
        codes: Vec<Option<u32>>,
    },
}

impl Column {
    fn is_missing(&self, row: usize) -> bool {
        match self {
            Column::Numeric { values } => values[row].is_none(),
            Column::Categorical { codes, .. } => codes[row].is_none(),
        }
    }

    fn value(&self, row: usize) -> Value {
        match self {
            Column::Numeric { values } => values[row].map_or(Value::Missing, Value::Numeric),
            Column::Categorical { levels, codes } => codes[row]
                .map_or(Value::Missing, |c| Value::Categorical(levels[c as usize].clone())),
        }
    }

    fn encoded(&self, row: usize) -> Option<f64> {
        match self {
            Column::Numeric { values } => values[row],
            Column::Categorical { codes, .. } => codes[row].map(|c| c as f64),
        }
    }

    fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Numeric { values } => Column::Numeric {
                values: rows.iter().map(|&r| values[r]).collect(),
            },
            Column::Categorical { levels, codes } => Column::Categorical {
                levels: levels.clone(),
                codes: rows.iter().map(|&r| codes[r]).collect(),
            },
        }
    }

    fn len(&self) -> usize {
        match self {
            Column::Numeric { values } => values.len(),
            Column::Categorical { codes, .. } => codes.len(),
        }
    }
}

/// Immutable survey dataset with an encoded model frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    schema: Vec<ColumnSpec>,
    columns: Vec<Column>,
    outcome: usize,
    predictors: Vec<usize>,
    /// Encoded predictor rows (categorical levels as codes)
    pub features: Vec<Vec<f64>>,
    /// Outcome per row
    pub targets: Vec<f64>,
    pub feature_count: usize,
}

impl Dataset {
    /// Load a dataset from a headered CSV file.
    ///
    /// Every schema column must appear in the header; other columns are ignored.
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        schema: &[ColumnSpec],
        outcome: &str,
        predictors: &[String],
        missing: MissingPolicy,
    ) -> Result<Self, TuningError> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| TuningError::Dataset(format!("{}: {}", path.display(), e)))?;

        let headers = reader
            .headers()
            .map_err(|e| TuningError::Dataset(format!("{}: {}", path.display(), e)))?
            .clone();

        let mut positions = Vec::with_capacity(schema.len());
        for spec in schema {
            let pos = headers.iter().position(|h| h == spec.name).ok_or_else(|| {
                TuningError::Dataset(format!("column '{}' not found in CSV header", spec.name))
            })?;
            positions.push(pos);
        }
        for header in headers.iter() {
            if !schema.iter().any(|s| s.name == header) {
                debug!("Ignoring undeclared column '{}'", header);
            }
        }

        let mut rows = Vec::new();
        for (line_idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| TuningError::Dataset(e.to_string()))?;
            let mut row = Vec::with_capacity(schema.len());

            for (spec, &pos) in schema.iter().zip(&positions) {
                let raw = record.get(pos).unwrap_or("");
                row.push(parse_cell(raw, spec, line_idx + 2)?);
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(TuningError::Dataset(format!(
                "{}: dataset is empty",
                path.display()
            )));
        }

        Self::from_rows(schema.to_vec(), rows, outcome, predictors, missing)
    }

    /// Build a dataset from rows whose values follow schema order.
    pub fn from_rows(
        schema: Vec<ColumnSpec>,
        rows: Vec<Vec<Value>>,
        outcome: &str,
        predictors: &[String],
        missing: MissingPolicy,
    ) -> Result<Self, TuningError> {
        let index_of = |name: &str| {
            schema.iter().position(|s| s.name == name).ok_or_else(|| {
                TuningError::Dataset(format!("column '{}' is not declared in the schema", name))
            })
        };

        let outcome_idx = index_of(outcome)?;
        if schema[outcome_idx].kind != ColumnKind::Numeric {
            return Err(TuningError::Dataset(format!(
                "outcome '{}' must be numeric",
                outcome
            )));
        }
        let predictor_idx = predictors
            .iter()
            .map(|p| index_of(p))
            .collect::<Result<Vec<_>, _>>()?;
        if predictor_idx.contains(&outcome_idx) {
            return Err(TuningError::Dataset(format!(
                "outcome '{}' cannot also be a predictor",
                outcome
            )));
        }

        let columns = build_columns(&schema, &rows)?;
        let mut dataset = Self {
            schema,
            columns,
            outcome: outcome_idx,
            predictors: predictor_idx,
            features: Vec::new(),
            targets: Vec::new(),
            feature_count: 0,
        };

        let keep = dataset.apply_missing_policy(missing)?;
        if keep.len() != dataset.column_len() {
            dataset.columns = dataset.columns.iter().map(|c| c.take(&keep)).collect();
        }
        if dataset.column_len() == 0 {
            return Err(TuningError::Dataset(
                "no complete rows left after applying the missing-value policy".to_string(),
            ));
        }

        dataset.encode();
        Ok(dataset)
    }

    /// Rows to keep under the policy (all rows when nothing is missing)
    fn apply_missing_policy(&self, policy: MissingPolicy) -> Result<Vec<usize>, TuningError> {
        let roles: Vec<usize> = std::iter::once(self.outcome)
            .chain(self.predictors.iter().copied())
            .collect();

        let mut keep = Vec::with_capacity(self.column_len());
        for row in 0..self.column_len() {
            match roles.iter().find(|&&c| self.columns[c].is_missing(row)) {
                None => keep.push(row),
                Some(&col) => {
                    if policy == MissingPolicy::Reject {
                        return Err(TuningError::Dataset(format!(
                            "missing value in column '{}' at row {}",
                            self.schema[col].name, row
                        )));
                    }
                }
            }
        }

        let dropped = self.column_len() - keep.len();
        if dropped > 0 {
            warn!("Dropped {} row(s) with missing outcome or predictor values", dropped);
        }
        Ok(keep)
    }

    fn encode(&mut self) {
        let n = self.column_len();
        self.targets = (0..n)
            .map(|r| self.columns[self.outcome].encoded(r).unwrap_or(f64::NAN))
            .collect();
        self.features = (0..n)
            .map(|r| {
                self.predictors
                    .iter()
                    .map(|&c| self.columns[c].encoded(r).unwrap_or(f64::NAN))
                    .collect()
            })
            .collect();
        self.feature_count = self.predictors.len();
    }

    fn column_len(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn schema(&self) -> &[ColumnSpec] {
        &self.schema
    }

    pub fn outcome_name(&self) -> &str {
        &self.schema[self.outcome].name
    }

    pub fn predictor_names(&self) -> Vec<&str> {
        self.predictors
            .iter()
            .map(|&c| self.schema[c].name.as_str())
            .collect()
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<(&ColumnSpec, &Column)> {
        self.schema
            .iter()
            .position(|s| s.name == name)
            .map(|i| (&self.schema[i], &self.columns[i]))
    }

    /// Materialise one respondent's answers
    pub fn record(&self, row: usize) -> Record {
        self.schema
            .iter()
            .zip(&self.columns)
            .map(|(spec, col)| (spec.name.clone(), col.value(row)))
            .collect()
    }

    /// Feature layout for fitted models
    pub fn feature_info(&self) -> Vec<FeatureInfo> {
        self.predictors
            .iter()
            .map(|&c| FeatureInfo {
                name: self.schema[c].name.clone(),
                kind: match &self.columns[c] {
                    Column::Numeric { .. } => FeatureKind::Numeric,
                    Column::Categorical { levels, .. } => FeatureKind::Categorical {
                        levels: levels.clone(),
                    },
                },
            })
            .collect()
    }

    /// New dataset holding `rows` in the given order; level dictionaries are kept
    pub fn subset(&self, rows: &[usize]) -> Self {
        Self {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            outcome: self.outcome,
            predictors: self.predictors.clone(),
            features: rows.iter().map(|&r| self.features[r].clone()).collect(),
            targets: rows.iter().map(|&r| self.targets[r]).collect(),
            feature_count: self.feature_count,
        }
    }

    /// BLAKE3 hex digest of the canonical JSON form
    pub fn fingerprint(&self) -> Result<String, TuningError> {
        Ok(hash_canonical_hex(self)?)
    }

    /// (name, min, max) of each numeric predictor, for logging
    pub fn feature_stats(&self) -> Vec<(String, f64, f64)> {
        self.predictors
            .iter()
            .enumerate()
            .filter(|(_, c)| self.schema[**c].kind == ColumnKind::Numeric)
            .map(|(i, &c)| {
                let (min, max) = self
                    .features
                    .iter()
                    .map(|row| row[i])
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                        (lo.min(v), hi.max(v))
                    });
                (self.schema[c].name.clone(), min, max)
            })
            .collect()
    }
}

fn parse_cell(raw: &str, spec: &ColumnSpec, line: usize) -> Result<Value, TuningError> {
    if MISSING_TOKENS.iter().any(|t| raw.eq_ignore_ascii_case(t)) {
        return Ok(Value::Missing);
    }

    match spec.kind {
        ColumnKind::Numeric => match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Value::Numeric(v)),
            Ok(_) => Err(TuningError::Dataset(format!(
                "line {}, column '{}': non-finite number '{}'",
                line, spec.name, raw
            ))),
            Err(_) => Err(TuningError::Dataset(format!(
                "line {}, column '{}': invalid number '{}'",
                line, spec.name, raw
            ))),
        },
        ColumnKind::Categorical => Ok(Value::Categorical(raw.to_string())),
    }
}

fn build_columns(schema: &[ColumnSpec], rows: &[Vec<Value>]) -> Result<Vec<Column>, TuningError> {
    for (i, row) in rows.iter().enumerate() {
        if row.len() != schema.len() {
            return Err(TuningError::Dataset(format!(
                "row {}: expected {} values, got {}",
                i,
                schema.len(),
                row.len()
            )));
        }
    }

    schema
        .iter()
        .enumerate()
        .map(|(c, spec)| match spec.kind {
            ColumnKind::Numeric => {
                let values = rows
                    .iter()
                    .enumerate()
                    .map(|(r, row)| match &row[c] {
                        Value::Numeric(v) if v.is_finite() => Ok(Some(*v)),
                        Value::Numeric(v) => Err(TuningError::Dataset(format!(
                            "row {}, column '{}': non-finite number {}",
                            r, spec.name, v
                        ))),
                        Value::Missing => Ok(None),
                        Value::Categorical(s) => Err(TuningError::Dataset(format!(
                            "row {}, column '{}': expected a number, got '{}'",
                            r, spec.name, s
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Column::Numeric { values })
            }
            ColumnKind::Categorical => {
                let mut levels = BTreeSet::new();
                for row in rows {
                    match &row[c] {
                        Value::Categorical(s) => {
                            levels.insert(s.clone());
                        }
                        Value::Numeric(v) => {
                            levels.insert(v.to_string());
                        }
                        Value::Missing => {}
                    }
                }
                let levels: Vec<String> = levels.into_iter().collect();
                let codes = rows
                    .iter()
                    .map(|row| {
                        let label = match &row[c] {
                            Value::Categorical(s) => s.clone(),
                            Value::Numeric(v) => v.to_string(),
                            Value::Missing => return None,
                        };
                        levels.binary_search(&label).ok().map(|i| i as u32)
                    })
                    .collect();
                Ok(Column::Categorical { levels, codes })
            }
        })
        .collect()
}
