//! Stage classification boundary
//!
//! The trained model is a black box to the loop. It is consumed through
//! [`StageClassifier`], which takes a feature vector and returns an integer
//! stage. [`LinearStageModel`] is a JSON-defined ordinal model used by the CLI.

use crate::error::{ClassifierError, ConfigError};
use crate::features::{FeatureSchema, FeatureVector};
use crate::types::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Trait for stage classifiers.
///
/// Implementations must be deterministic and free of side effects.
pub trait StageClassifier {
    /// Predict the raw stage for a feature vector
    fn predict(&self, features: &FeatureVector) -> Result<i64, ClassifierError>;
}

impl<C: StageClassifier + ?Sized> StageClassifier for Box<C> {
    fn predict(&self, features: &FeatureVector) -> Result<i64, ClassifierError> {
        (**self).predict(features)
    }
}

/// Run the classifier and range-check its output
pub fn predict_stage(
    classifier: &dyn StageClassifier,
    features: &FeatureVector,
) -> Result<Stage, ClassifierError> {
    let raw = classifier.predict(features)?;
    Stage::try_from(raw)
}

/// Ordinal linear model.
///
/// `score = intercept + sum(weight * feature)`, and the stage is the number of
/// cutpoints at or below the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearStageModel {
    /// Per-column weights
    pub weights: BTreeMap<String, f64>,
    /// Constant term
    #[serde(default)]
    pub intercept: f64,
    /// Ascending thresholds separating stages 0|1, 1|2 and 2|3
    pub cutpoints: [f64; 3],
}

impl LinearStageModel {
    /// Parse a model definition from JSON and check it is well formed
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let model: Self = serde_json::from_str(json)?;
        model.check_well_formed()?;
        Ok(model)
    }

    /// Load a model definition from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Ensure every weighted column exists in the schema
    pub fn check_schema(&self, schema: &FeatureSchema) -> Result<(), ClassifierError> {
        match self.weights.keys().find(|column| !schema.contains(column)) {
            Some(column) => Err(ClassifierError::UnknownColumn(column.clone())),
            None => Ok(()),
        }
    }

    fn check_well_formed(&self) -> Result<(), ClassifierError> {
        let finite = self.intercept.is_finite()
            && self.weights.values().all(|w| w.is_finite())
            && self.cutpoints.iter().all(|c| c.is_finite());
        if !finite {
            return Err(ClassifierError::Model(
                "weights, intercept and cutpoints must be finite".to_string(),
            ));
        }

        if self.cutpoints.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(ClassifierError::Model(format!(
                "cutpoints must be ascending, got {:?}",
                self.cutpoints
            )));
        }

        Ok(())
    }

    fn linear_score(&self, features: &FeatureVector) -> Result<f64, ClassifierError> {
        let mut score = self.intercept;
        for (column, weight) in &self.weights {
            let value = features
                .get(column)
                .ok_or_else(|| ClassifierError::MissingFeature(column.clone()))?;
            score += weight * value;
        }
        Ok(score)
    }
}

impl StageClassifier for LinearStageModel {
    fn predict(&self, features: &FeatureVector) -> Result<i64, ClassifierError> {
        let score = self.linear_score(features)?;
        if !score.is_finite() {
            return Err(ClassifierError::Model(format!("non-finite score {score}")));
        }

        let stage = self.cutpoints.iter().filter(|&&c| score >= c).count();
        Ok(stage as i64)
    }
}
