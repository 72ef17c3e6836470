//! Feature vector construction
//!
//! This module builds the classifier input from a validated sample:
//! - every known column starts at zero
//! - `hrv` carries the raw reading
//! - `emg_level_<value>` and `posture_<value>` one-hot indicators, when the
//!   schema knows those columns

use crate::error::{ClassifierError, ConfigError};
use crate::types::{EmgLevel, Posture, SignalSample};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Name of the numeric HRV feature column
pub const HRV_COLUMN: &str = "hrv";

/// Prefix of EMG one-hot columns
pub const EMG_COLUMN_PREFIX: &str = "emg_level_";

/// Prefix of posture one-hot columns
pub const POSTURE_COLUMN_PREFIX: &str = "posture_";

/// Fixed, ordered set of feature columns the classifier was trained on.
///
/// Loaded once at startup and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::standard()
    }
}

impl FeatureSchema {
    /// Schema with `hrv` and a one-hot column for every known category
    pub fn standard() -> Self {
        let mut columns = vec![HRV_COLUMN.to_string()];
        columns.extend(EmgLevel::ALL.iter().map(|l| emg_column(*l)));
        columns.extend(Posture::ALL.iter().map(|p| posture_column(*p)));
        Self { columns }
    }

    /// Build a schema from explicit column names
    pub fn from_columns<I, S>(columns: I) -> Result<Self, ClassifierError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(ClassifierError::EmptySchema);
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(ClassifierError::DuplicateColumn(column.clone()));
            }
        }

        Ok(Self { columns })
    }

    /// Parse the header record of a CSV file listing the training columns.
    /// Data rows are ignored.
    pub fn from_csv_header(text: &str) -> Result<Self, ClassifierError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(text.as_bytes());
        let header = reader
            .headers()
            .map_err(|e| ClassifierError::InvalidHeader(e.to_string()))?;
        let columns = header
            .iter()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        Self::from_columns(columns)
    }

    /// Load the schema from a CSV file on disk
    pub fn from_csv_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(Self::from_csv_header(&text)?)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Named feature values, ordered as in the schema
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(String, f64)>,
}

impl FeatureVector {
    pub fn get(&self, column: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| *value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn set_if_present(&mut self, column: &str, value: f64) -> bool {
        match self.entries.iter_mut().find(|(name, _)| name == column) {
            Some(entry) => {
                entry.1 = value;
                true
            }
            None => false,
        }
    }
}

/// Builder for classifier feature vectors
pub struct FeatureBuilder;

impl FeatureBuilder {
    /// Build the feature vector for a sample.
    ///
    /// Columns the schema does not know are skipped silently; a model trained
    /// with a dropped reference category simply sees all indicators at zero.
    pub fn build(schema: &FeatureSchema, sample: &SignalSample) -> FeatureVector {
        let mut features = FeatureVector {
            entries: schema.columns.iter().map(|c| (c.clone(), 0.0)).collect(),
        };

        features.set_if_present(HRV_COLUMN, sample.hrv());

        let emg = emg_column(sample.emg_level());
        if !features.set_if_present(&emg, 1.0) {
            log::debug!("feature schema has no column {emg}, indicator left unset");
        }

        let posture = posture_column(sample.posture());
        if !features.set_if_present(&posture, 1.0) {
            log::debug!("feature schema has no column {posture}, indicator left unset");
        }

        features
    }
}

fn emg_column(level: EmgLevel) -> String {
    format!("{EMG_COLUMN_PREFIX}{}", level.as_str())
}

fn posture_column(posture: Posture) -> String {
    format!("{POSTURE_COLUMN_PREFIX}{}", posture.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawSignalInput;
    use crate::validator::SignalValidator;
    use pretty_assertions::assert_eq;

    fn sample(hrv: f64, emg: &str, posture: &str) -> SignalSample {
        SignalValidator::validate(&RawSignalInput::new(hrv, emg, posture)).unwrap()
    }

    #[test]
    fn test_standard_schema_one_hot() {
        let schema = FeatureSchema::standard();
        let features = FeatureBuilder::build(&schema, &sample(45.0, "overactive", "slouched"));

        assert_eq!(features.len(), 8);
        assert_eq!(features.get("hrv"), Some(45.0));
        assert_eq!(features.get("emg_level_overactive"), Some(1.0));
        assert_eq!(features.get("emg_level_normal"), Some(0.0));
        assert_eq!(features.get("posture_slouched"), Some(1.0));
        assert_eq!(features.get("posture_aligned"), Some(0.0));

        let hot: f64 = features.iter().filter(|(n, _)| *n != "hrv").map(|(_, v)| v).sum();
        assert_eq!(hot, 2.0);
    }

    #[test]
    fn test_missing_columns_are_skipped() {
        // Reference categories dropped, as a drop-first encoding would produce
        let schema = FeatureSchema::from_columns([
            "hrv",
            "emg_level_overactive",
            "emg_level_underactive",
            "posture_lean_left",
        ])
        .unwrap();

        let features = FeatureBuilder::build(&schema, &sample(80.0, "normal", "aligned"));
        let values: Vec<(&str, f64)> = features.iter().collect();
        assert_eq!(
            values,
            vec![
                ("hrv", 80.0),
                ("emg_level_overactive", 0.0),
                ("emg_level_underactive", 0.0),
                ("posture_lean_left", 0.0),
            ]
        );
    }

    #[test]
    fn test_csv_header_parsing() {
        let schema =
            FeatureSchema::from_csv_header("\"hrv\", emg_level_normal,posture_aligned\n1,2,3\n")
                .unwrap();
        assert_eq!(
            schema.columns(),
            &["hrv", "emg_level_normal", "posture_aligned"]
        );
        assert!(schema.contains("posture_aligned"));
        assert!(!schema.contains("posture_slouched"));
    }

    #[test]
    fn test_csv_header_keeps_quoted_commas() {
        let schema = FeatureSchema::from_csv_header("hrv,\"posture_lean,left\"\n").unwrap();
        assert_eq!(schema.columns(), &["hrv", "posture_lean,left"]);
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_invalid_schemas() {
        assert_eq!(FeatureSchema::from_csv_header(""), Err(ClassifierError::EmptySchema));
        assert_eq!(
            FeatureSchema::from_columns(["hrv", "hrv"]),
            Err(ClassifierError::DuplicateColumn("hrv".to_string()))
        );
    }
}
