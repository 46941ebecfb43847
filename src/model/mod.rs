//! Score combination
//!
//! The five feature scores are mapped to one unpleasantness rating by a
//! regression model loaded from JSON:
//!
//! - [`linear`]: intercept plus one weight per feature, stored in a
//!   [`CoefficientTable`] keyed by programme item and cross-validation fold
//! - [`mlp`]: a small feed-forward network evaluated in inference mode
//!
//! Models never live in the library itself; every coefficient comes from a
//! data file.

pub mod linear;
pub mod mlp;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{AnalysisError, Result};

pub use linear::{CoefficientEntry, CoefficientTable, LinearModel};
pub use mlp::{Layer, MlpModel};

/// Feature names in the order they are reported
pub const FEATURE_NAMES: [&str; 5] = [
    "colouration",
    "flutter_echo",
    "asymmetry",
    "curvature",
    "hf_damping",
];

/// Feature vector of one response
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Features {
    pub colouration: f64,
    pub flutter_echo: f64,
    /// Only available for four-channel responses
    pub asymmetry: Option<f64>,
    pub curvature: f64,
    /// Spectral-evolution score
    pub hf_damping: f64,
}

impl Features {
    /// Value of a feature by name; `None` for unknown names or a missing
    /// asymmetry score
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "colouration" => Some(self.colouration),
            "flutter_echo" => Some(self.flutter_echo),
            "asymmetry" => self.asymmetry,
            "curvature" => Some(self.curvature),
            "hf_damping" => Some(self.hf_damping),
            _ => None,
        }
    }

    /// Values for `names`, failing on the first one that is not available
    pub fn select(&self, names: &[String]) -> Result<Vec<f64>> {
        names
            .iter()
            .map(|name| {
                if !FEATURE_NAMES.contains(&name.as_str()) {
                    return Err(AnalysisError::config(format!("unknown feature '{}'", name)));
                }
                self.get(name).ok_or_else(|| {
                    AnalysisError::invalid(format!("feature '{}' was not computed", name))
                })
            })
            .collect()
    }
}

/// Anything that turns features into a rating
pub trait RegressionModel {
    fn predict(&self, features: &Features) -> Result<f64>;
}

/// Model file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreModel {
    Linear(LinearModel),
    Mlp(MlpModel),
}

impl ScoreModel {
    /// Read a model from a JSON file and check its shape
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let model: ScoreModel = serde_json::from_str(&text).map_err(|e| {
            AnalysisError::config(format!("invalid model file {}: {}", path.display(), e))
        })?;
        if let ScoreModel::Mlp(mlp) = &model {
            mlp.validate()?;
        }
        info!(path = %path.display(), kind = model.kind(), "loaded score model");
        Ok(model)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScoreModel::Linear(_) => "linear",
            ScoreModel::Mlp(_) => "mlp",
        }
    }
}

impl RegressionModel for ScoreModel {
    fn predict(&self, features: &Features) -> Result<f64> {
        match self {
            ScoreModel::Linear(m) => m.predict(features),
            ScoreModel::Mlp(m) => m.predict(features),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> Features {
        Features {
            colouration: 0.5,
            flutter_echo: 1.0,
            asymmetry: None,
            curvature: -0.2,
            hf_damping: -0.8,
        }
    }

    #[test]
    fn test_get_by_name() {
        let f = features();
        assert_eq!(f.get("flutter_echo"), Some(1.0));
        assert_eq!(f.get("asymmetry"), None);
        assert_eq!(f.get("loudness"), None);
    }

    #[test]
    fn test_select_errors() {
        let f = features();
        let ok = f
            .select(&["hf_damping".to_string(), "colouration".to_string()])
            .unwrap();
        assert_eq!(ok, vec![-0.8, 0.5]);

        assert!(matches!(
            f.select(&["asymmetry".to_string()]),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(matches!(
            f.select(&["loudness".to_string()]),
            Err(AnalysisError::Configuration(_))
        ));
    }

    #[test]
    fn test_model_file_kinds() {
        let json = r#"{
            "kind": "linear",
            "intercept": 10.0,
            "weights": { "colouration": 2.0 }
        }"#;
        let model: ScoreModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.kind(), "linear");
        assert!((model.predict(&features()).unwrap() - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("no_such_model.json");
        assert!(matches!(ScoreModel::load(&path), Err(AnalysisError::Io(_))));
    }
}
