//! Linear score combination
//!
//! ```json
//! {
//!   "entries": [
//!     { "programme_item": "clapping", "fold": 0,
//!       "intercept": 41.2,
//!       "weights": { "colouration": 12.0, "flutter_echo": 9.5, ... } }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::{Features, RegressionModel};
use crate::error::{AnalysisError, Result};

/// `intercept + sum(weight * feature)`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    /// Weight per feature name; absent features do not contribute
    pub weights: BTreeMap<String, f64>,
}

impl RegressionModel for LinearModel {
    fn predict(&self, features: &Features) -> Result<f64> {
        let names: Vec<String> = self.weights.keys().cloned().collect();
        let values = features.select(&names)?;
        Ok(self.intercept
            + self
                .weights
                .values()
                .zip(values)
                .map(|(w, v)| w * v)
                .sum::<f64>())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientEntry {
    /// Stimulus type the model was fitted on (e.g. "clapping")
    pub programme_item: String,
    /// Cross-validation fold index
    pub fold: usize,
    #[serde(flatten)]
    pub model: LinearModel,
}

/// Linear models for every programme item and fold
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoefficientTable {
    pub entries: Vec<CoefficientEntry>,
}

impl CoefficientTable {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let table: CoefficientTable = serde_json::from_str(&text).map_err(|e| {
            AnalysisError::config(format!(
                "invalid coefficient table {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!(entries = table.entries.len(), "loaded coefficient table");
        Ok(table)
    }

    pub fn programme_items(&self) -> Vec<&str> {
        let mut items: Vec<&str> = self
            .entries
            .iter()
            .map(|e| e.programme_item.as_str())
            .collect();
        items.sort_unstable();
        items.dedup();
        items
    }

    pub fn lookup(&self, programme_item: &str, fold: usize) -> Result<&LinearModel> {
        self.entries
            .iter()
            .find(|e| e.programme_item == programme_item && e.fold == fold)
            .map(|e| &e.model)
            .ok_or_else(|| {
                AnalysisError::config(format!(
                    "no coefficients for programme item '{}' fold {}",
                    programme_item, fold
                ))
            })
    }

    /// Mean prediction over every fold of a programme item
    pub fn predict_mean(&self, programme_item: &str, features: &Features) -> Result<f64> {
        let predictions = self
            .entries
            .iter()
            .filter(|e| e.programme_item == programme_item)
            .map(|e| e.model.predict(features))
            .collect::<Result<Vec<f64>>>()?;
        if predictions.is_empty() {
            return Err(AnalysisError::config(format!(
                "no coefficients for programme item '{}'",
                programme_item
            )));
        }
        Ok(predictions.iter().sum::<f64>() / predictions.len() as f64)
    }
}
