//! Per-file analysis
//!
//! An [`Analyzer`] decodes one recording, runs every feature extractor on it
//! and, when a score model is attached, combines the features into a rating.
//! A failing feature never aborts the others: its score is left empty, the
//! failure is logged and recorded as a `feature:kind` flag.

use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::decode::{decode_file, RoomResponse};
use crate::error::{AnalysisError, Result};
use crate::features::{
    colouration, decay_curvature, flutter_echo, spatial_asymmetry, spectral_evolution,
    AsymmetryResult, ColourationResult, CurvatureResult, FlutterResult, SpectralEvolutionResult,
};
use crate::model::{Features, RegressionModel, ScoreModel};

/// Outcome of analysing one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Every applicable feature was computed
    Ok,
    /// Some features failed
    Partial,
    /// Nothing could be computed
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Ok => write!(f, "OK"),
            Verdict::Partial => write!(f, "PARTIAL"),
            Verdict::Error => write!(f, "ERROR"),
        }
    }
}

/// Full per-feature results, kept only on request
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeatureDetails {
    pub colouration: Option<ColourationResult>,
    pub flutter_echo: Option<FlutterResult>,
    pub asymmetry: Option<AsymmetryResult>,
    pub curvature: Option<CurvatureResult>,
    pub spectral_evolution: Option<SpectralEvolutionResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub file_path: String,
    pub file_name: String,
    pub channels: usize,
    pub sample_rate: f64,
    pub duration_secs: f64,
    pub colouration: Option<f64>,
    pub flutter_echo: Option<f64>,
    pub asymmetry: Option<f64>,
    pub curvature: Option<f64>,
    pub hf_damping: Option<f64>,
    /// Model output, when a model is attached and its inputs are available
    pub rating: Option<f64>,
    pub verdict: Verdict,
    pub flags: Vec<String>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<FeatureDetails>,
}

impl AnalysisResult {
    fn failed(path: &Path, error: &AnalysisError) -> Self {
        Self {
            file_path: path.display().to_string(),
            file_name: file_name(path),
            channels: 0,
            sample_rate: 0.0,
            duration_secs: 0.0,
            colouration: None,
            flutter_echo: None,
            asymmetry: None,
            curvature: None,
            hf_damping: None,
            rating: None,
            verdict: Verdict::Error,
            flags: vec![format!("decode:{}", error.kind())],
            error: Some(error.to_string()),
            details: None,
        }
    }

    /// Feature vector for the score model; `None` unless every mono feature
    /// was computed
    pub fn features(&self) -> Option<Features> {
        Some(Features {
            colouration: self.colouration?,
            flutter_echo: self.flutter_echo?,
            asymmetry: self.asymmetry,
            curvature: self.curvature?,
            hf_damping: self.hf_damping?,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Keeps the value of a feature, or records why it failed
struct Recorder {
    flags: Vec<String>,
    errors: Vec<String>,
    attempted: usize,
}

impl Recorder {
    fn new() -> Self {
        Self {
            flags: Vec::new(),
            errors: Vec::new(),
            attempted: 0,
        }
    }

    fn record<T>(&mut self, feature: &str, result: Result<T>) -> Option<T> {
        self.attempted += 1;
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(feature, error = %e, "feature failed");
                self.flags.push(format!("{}:{}", feature, e.kind()));
                self.errors.push(format!("{}: {}", feature, e));
                None
            }
        }
    }

    fn verdict(&self) -> Verdict {
        match self.errors.len() {
            0 => Verdict::Ok,
            n if n >= self.attempted => Verdict::Error,
            _ => Verdict::Partial,
        }
    }
}

pub struct Analyzer {
    config: AnalysisConfig,
    model: Option<ScoreModel>,
    skip_spatial: bool,
    keep_details: bool,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig::default(),
            model: None,
            skip_spatial: false,
            keep_details: false,
        }
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_model(mut self, model: ScoreModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Skip the asymmetry feature even for four-channel files
    pub fn with_skip_spatial(mut self, skip: bool) -> Self {
        self.skip_spatial = skip;
        self
    }

    /// Keep the full per-feature results in `AnalysisResult::details`
    pub fn with_details(mut self, keep: bool) -> Self {
        self.keep_details = keep;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Decode and analyse one file
    pub fn analyze<P: AsRef<Path>>(&self, path: P) -> AnalysisResult {
        let path = path.as_ref();
        match decode_file(path) {
            Ok(response) => {
                let mut result = self.analyze_response(&response);
                result.file_path = path.display().to_string();
                result.file_name = file_name(path);
                result
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not decode");
                AnalysisResult::failed(path, &e)
            }
        }
    }

    /// Analyse an already decoded response
    pub fn analyze_response(&self, response: &RoomResponse) -> AnalysisResult {
        let rir = response.omni();
        let sr = response.sample_rate;
        let cfg = &self.config;
        let mut rec = Recorder::new();

        let colour = rec.record("colouration", colouration(rir, sr, &cfg.colouration));
        let flutter = rec.record("flutter_echo", flutter_echo(rir, sr, &cfg.flutter));
        let curve = rec.record("curvature", decay_curvature(rir, sr, &cfg.curvature));
        let evolution = rec.record(
            "hf_damping",
            spectral_evolution(rir, sr, &cfg.spectral_evolution),
        );

        let asymmetry = if response.is_spatial() && !self.skip_spatial {
            let result = response
                .spatial()
                .and_then(|s| spatial_asymmetry(&s, sr, &cfg.asymmetry, cfg.doa_window));
            rec.record("asymmetry", result)
        } else {
            None
        };

        let mut result = AnalysisResult {
            file_path: String::new(),
            file_name: String::new(),
            channels: response.num_channels(),
            sample_rate: sr,
            duration_secs: response.duration_s(),
            colouration: colour.as_ref().map(|r| r.score),
            flutter_echo: flutter.as_ref().map(|r| r.score),
            asymmetry: asymmetry.as_ref().map(|r| r.score),
            curvature: curve.map(|r| r.curvature),
            hf_damping: evolution.as_ref().map(|r| r.score),
            rating: None,
            verdict: Verdict::Ok,
            flags: Vec::new(),
            error: None,
            details: None,
        };

        if let Some(model) = &self.model {
            match result.features() {
                Some(features) => {
                    result.rating = rec.record("rating", model.predict(&features));
                }
                None => rec.flags.push("rating:missing_features".to_string()),
            }
        }
        result.verdict = rec.verdict();

        if self.keep_details {
            result.details = Some(FeatureDetails {
                colouration: colour,
                flutter_echo: flutter,
                asymmetry,
                curvature: curve,
                spectral_evolution: evolution,
            });
        }
        if !rec.errors.is_empty() {
            result.error = Some(rec.errors.join("; "));
        }
        result.flags = rec.flags;
        debug!(verdict = %result.verdict, flags = result.flags.len(), "analysis finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlutterConfig;
    use crate::model::LinearModel;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    const FS: f64 = 48000.0;

    fn decay(seed: u64, rt: f64, seconds: f64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        (0..(FS * seconds) as usize)
            .map(|i| normal.sample(&mut rng) * (-6.91 * i as f64 / FS / rt).exp())
            .collect()
    }

    fn mono(seed: u64) -> RoomResponse {
        RoomResponse::new(vec![decay(seed, 0.8, 2.0)], FS).unwrap()
    }

    // ==========================================================================
    // VERDICTS
    // ==========================================================================

    #[test]
    fn test_mono_response_is_ok() {
        let result = Analyzer::new().analyze_response(&mono(1));

        assert_eq!(result.verdict, Verdict::Ok, "{:?}", result.error);
        assert!(result.flags.is_empty());
        assert!(result.colouration.is_some());
        assert!(result.flutter_echo.is_some());
        assert!(result.curvature.is_some());
        assert!(result.hf_damping.is_some());
        assert!(result.asymmetry.is_none());
        assert!(result.rating.is_none());
        assert!(result.details.is_none());
        assert_eq!(result.channels, 1);
    }

    #[test]
    fn test_failed_feature_is_partial() {
        let config = AnalysisConfig {
            flutter: FlutterConfig {
                min_hz: 2.0,
                max_hz: 2.05,
                ..FlutterConfig::default()
            },
            ..AnalysisConfig::default()
        };
        let result = Analyzer::new().with_config(config).analyze_response(&mono(2));

        assert_eq!(result.verdict, Verdict::Partial);
        assert!(result.flutter_echo.is_none());
        assert!(result.colouration.is_some());
        assert_eq!(result.flags, vec!["flutter_echo:configuration".to_string()]);
        assert!(result.error.unwrap().starts_with("flutter_echo: "));
    }

    #[test]
    fn test_silence_is_error() {
        let response = RoomResponse::new(vec![vec![0.0; 48000]], FS).unwrap();
        let result = Analyzer::new().analyze_response(&response);
        assert_eq!(result.verdict, Verdict::Error);
        assert_eq!(result.flags.len(), 4);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = Analyzer::new().analyze("/definitely/not/here.wav");
        assert_eq!(result.verdict, Verdict::Error);
        assert_eq!(result.file_name, "here.wav");
        assert_eq!(result.flags, vec!["decode:io".to_string()]);
    }

    // ==========================================================================
    // MODEL AND DETAILS
    // ==========================================================================

    #[test]
    fn test_linear_model_rating() {
        let model = LinearModel {
            intercept: 50.0,
            weights: [("curvature".to_string(), 10.0)].into_iter().collect(),
        };
        let result = Analyzer::new()
            .with_model(ScoreModel::Linear(model))
            .analyze_response(&mono(3));

        let curvature = result.curvature.unwrap();
        let rating = result.rating.unwrap();
        assert!((rating - (50.0 + 10.0 * curvature)).abs() < 1e-12);
    }

    #[test]
    fn test_model_needing_asymmetry_on_mono_is_partial() {
        let model = LinearModel {
            intercept: 0.0,
            weights: [("asymmetry".to_string(), 1.0)].into_iter().collect(),
        };
        let result = Analyzer::new()
            .with_model(ScoreModel::Linear(model))
            .analyze_response(&mono(4));

        assert_eq!(result.verdict, Verdict::Partial);
        assert!(result.rating.is_none());
        assert_eq!(result.flags, vec!["rating:invalid_input".to_string()]);
    }

    #[test]
    fn test_details_on_request() {
        let result = Analyzer::new().with_details(true).analyze_response(&mono(5));
        let details = result.details.unwrap();
        assert!(details.colouration.is_some());
        assert!(details.spectral_evolution.is_some());
        assert!(details.asymmetry.is_none());
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Ok.to_string(), "OK");
        assert_eq!(Verdict::Partial.to_string(), "PARTIAL");
        assert_eq!(Verdict::Error.to_string(), "ERROR");
    }
}
