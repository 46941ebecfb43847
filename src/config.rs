//! Tunable analysis parameters
//!
//! Every constant the feature extractors depend on lives here so that it can
//! be changed from a TOML file instead of in code. Missing keys fall back to
//! the defaults below, so a file only needs the values it changes:
//!
//! ```toml
//! [colouration]
//! room_volume_m3 = 1200.0
//!
//! [flutter.mode]
//! kind = "octave_bands"
//! aggregate = "mean"
//! ```
//!
//! The calibration constants and the assumed room volume were tuned by ear
//! against one listening-test set. Treat them as placeholders to re-derive,
//! not as physical quantities.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AnalysisError, Result};
use crate::spatial::doa::MIN_WINDOW;

/// Affine rescale `(raw - offset) / scale`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub offset: f64,
    pub scale: f64,
}

impl Calibration {
    pub const IDENTITY: Calibration = Calibration {
        offset: 0.0,
        scale: 1.0,
    };

    pub fn apply(&self, raw: f64) -> f64 {
        (raw - self.offset) / self.scale
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.scale == 0.0 || !self.scale.is_finite() || !self.offset.is_finite() {
            return Err(AnalysisError::config(format!(
                "{} calibration needs a finite non-zero scale",
                name
            )));
        }
        Ok(())
    }
}

/// Colouration algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColourationVariant {
    /// Whole-band decay compensation with notch clipping and peakedness
    #[default]
    CompensatedDecay,
    /// Per-octave compensation, ratio to smoothed spectrum
    BandCompensated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColourationConfig {
    pub variant: ColourationVariant,
    pub rt_start_db: f64,
    pub rt_end_db: f64,
    pub window_start_db: f64,
    pub window_end_db: f64,
    pub fft_size: usize,
    /// Placeholder volume for the Schroeder frequency estimate
    pub room_volume_m3: f64,
    pub upper_frequency_hz: f64,
    pub smoothing_octaves: f64,
    pub calibration: Calibration,
    /// Per-band RT and window levels of the band-compensated variant
    pub band_start_db: f64,
    pub band_end_db: f64,
}

impl Default for ColourationConfig {
    fn default() -> Self {
        Self {
            variant: ColourationVariant::CompensatedDecay,
            rt_start_db: -5.0,
            rt_end_db: -40.0,
            window_start_db: 0.0,
            window_end_db: -40.0,
            fft_size: 131_072,
            room_volume_m3: 5000.0,
            upper_frequency_hz: 4000.0,
            smoothing_octaves: 0.15,
            calibration: Calibration {
                offset: 2.0,
                scale: 4.0,
            },
            band_start_db: -15.0,
            band_end_db: -30.0,
        }
    }
}

/// How per-band flutter scores are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandAggregate {
    #[default]
    Max,
    Mean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlutterMode {
    /// Single high-passed band, mean level of the modulation spectrum
    #[default]
    HighPass,
    /// Octave bands, `(max - mean) / std` of each modulation spectrum
    OctaveBands { aggregate: BandAggregate },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlutterConfig {
    pub mode: FlutterMode,
    pub highpass_hz: f64,
    pub highpass_order: usize,
    pub etc_window_ms: f64,
    pub floor_db: f64,
    pub fft_size: usize,
    pub min_hz: f64,
    pub max_hz: f64,
    pub calibration: Calibration,
}

impl Default for FlutterConfig {
    fn default() -> Self {
        Self {
            mode: FlutterMode::HighPass,
            highpass_hz: 7000.0,
            highpass_order: 4,
            etc_window_ms: 10.0,
            floor_db: -60.0,
            fft_size: 512,
            min_hz: 2.0,
            max_hz: 20.0,
            calibration: Calibration::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsymmetryConfig {
    pub highpass_hz: f64,
    pub highpass_order: usize,
    /// EDC levels at which the late-energy windows start
    pub start_levels_db: Vec<f64>,
    /// EDC level where late energy ends; the signal is cut there
    pub end_level_db: f64,
    pub lateral_window_ms: f64,
    pub median_window_ms: f64,
    pub transverse_window_ms: f64,
    pub num_bins: usize,
    pub smoothing: usize,
}

impl Default for AsymmetryConfig {
    fn default() -> Self {
        Self {
            highpass_hz: 500.0,
            highpass_order: 4,
            start_levels_db: vec![-10.0, -20.0, -30.0, -40.0],
            end_level_db: -45.0,
            lateral_window_ms: 100.0,
            median_window_ms: 50.0,
            transverse_window_ms: 50.0,
            num_bins: 300,
            smoothing: 3,
        }
    }
}

/// Pre-filter applied before the curvature EDC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurvatureFilter {
    #[default]
    None,
    HighPass,
    BandLimited,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurvatureConfig {
    pub filter: CurvatureFilter,
    pub highpass_hz: f64,
    pub filter_order: usize,
    pub band_centre_hz: f64,
    pub early_start_db: f64,
    pub early_end_db: f64,
    pub late_start_db: f64,
    pub late_end_db: f64,
}

impl Default for CurvatureConfig {
    fn default() -> Self {
        Self {
            filter: CurvatureFilter::None,
            highpass_hz: 500.0,
            filter_order: 4,
            band_centre_hz: 1000.0,
            early_start_db: -5.0,
            early_end_db: -10.0,
            late_start_db: -35.0,
            late_end_db: -40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralEvolutionConfig {
    pub early_start_db: f64,
    pub early_end_db: f64,
    pub late_start_db: f64,
    pub late_end_db: f64,
    pub min_hz: f64,
    /// Upper end of the log axis; Nyquist when unset
    pub max_hz: Option<f64>,
    /// Smoothing window as a fraction of the spectrum length
    pub smoothing_fraction: f64,
    pub smoothing_order: usize,
    pub delta_bands: usize,
    pub calibration: Calibration,
}

impl Default for SpectralEvolutionConfig {
    fn default() -> Self {
        Self {
            early_start_db: -1.0,
            early_end_db: -15.0,
            late_start_db: -35.0,
            late_end_db: -40.0,
            min_hz: 2000.0,
            max_hz: None,
            smoothing_fraction: 0.5,
            smoothing_order: 1,
            delta_bands: 10,
            calibration: Calibration {
                offset: 0.0,
                scale: 10.0,
            },
        }
    }
}

/// Parameters of every feature extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Hann window length of the DOA smoothing (>= 5)
    pub doa_window: usize,
    pub colouration: ColourationConfig,
    pub flutter: FlutterConfig,
    pub asymmetry: AsymmetryConfig,
    pub curvature: CurvatureConfig,
    pub spectral_evolution: SpectralEvolutionConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            doa_window: MIN_WINDOW,
            colouration: ColourationConfig::default(),
            flutter: FlutterConfig::default(),
            asymmetry: AsymmetryConfig::default(),
            curvature: CurvatureConfig::default(),
            spectral_evolution: SpectralEvolutionConfig::default(),
        }
    }
}

fn require(ok: bool, msg: impl FnOnce() -> String) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(AnalysisError::config(msg()))
    }
}

/// `start` must be a strictly higher level than `end`
fn check_levels(name: &str, start: f64, end: f64) -> Result<()> {
    require(start > end && start <= 0.0, || {
        format!(
            "{}: start level {} dB must be <= 0 and above end level {} dB",
            name, start, end
        )
    })
}

impl AnalysisConfig {
    /// Load from a TOML file; absent keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AnalysisConfig = toml::from_str(&content)
            .map_err(|e| AnalysisError::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AnalysisError::config(format!("cannot serialise config: {}", e)))?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Reject values that would make an extractor meaningless
    pub fn validate(&self) -> Result<()> {
        require(self.doa_window >= MIN_WINDOW, || {
            format!("doa_window must be at least {}", MIN_WINDOW)
        })?;

        let c = &self.colouration;
        check_levels("colouration RT", c.rt_start_db, c.rt_end_db)?;
        check_levels("colouration window", c.window_start_db, c.window_end_db)?;
        check_levels("colouration band", c.band_start_db, c.band_end_db)?;
        require(c.fft_size >= 16, || "colouration fft_size must be at least 16".into())?;
        require(c.room_volume_m3 > 0.0, || "room_volume_m3 must be positive".into())?;
        require(c.upper_frequency_hz > 0.0, || {
            "colouration upper_frequency_hz must be positive".into()
        })?;
        require(c.smoothing_octaves > 0.0, || {
            "colouration smoothing_octaves must be positive".into()
        })?;
        c.calibration.validate("colouration")?;

        let f = &self.flutter;
        require(f.highpass_hz > 0.0 && (1..=24).contains(&f.highpass_order), || {
            "flutter high-pass needs a positive cutoff and order 1-24".into()
        })?;
        require(f.etc_window_ms > 0.0, || "flutter etc_window_ms must be positive".into())?;
        require(f.fft_size >= 16, || "flutter fft_size must be at least 16".into())?;
        require(f.min_hz >= 0.0 && f.max_hz > f.min_hz, || {
            format!("flutter band {}-{} Hz is empty", f.min_hz, f.max_hz)
        })?;
        f.calibration.validate("flutter")?;

        let a = &self.asymmetry;
        require(!a.start_levels_db.is_empty(), || {
            "asymmetry needs at least one start level".into()
        })?;
        for &start in &a.start_levels_db {
            check_levels("asymmetry", start, a.end_level_db)?;
        }
        require(
            a.lateral_window_ms > 0.0 && a.median_window_ms > 0.0 && a.transverse_window_ms > 0.0,
            || "asymmetry window durations must be positive".into(),
        )?;
        require(a.num_bins > 0, || "asymmetry num_bins must be positive".into())?;
        require(a.highpass_hz > 0.0 && (1..=24).contains(&a.highpass_order), || {
            "asymmetry high-pass needs a positive cutoff and order 1-24".into()
        })?;

        let k = &self.curvature;
        check_levels("curvature early", k.early_start_db, k.early_end_db)?;
        check_levels("curvature late", k.late_start_db, k.late_end_db)?;
        require((1..=24).contains(&k.filter_order), || {
            "curvature filter_order must be 1-24".into()
        })?;
        require(k.highpass_hz > 0.0 && k.band_centre_hz > 0.0, || {
            "curvature filter frequencies must be positive".into()
        })?;

        let s = &self.spectral_evolution;
        check_levels("spectral evolution early", s.early_start_db, s.early_end_db)?;
        check_levels("spectral evolution late", s.late_start_db, s.late_end_db)?;
        require(s.min_hz > 0.0, || "spectral evolution min_hz must be positive".into())?;
        if let Some(max) = s.max_hz {
            require(max > s.min_hz, || {
                format!("spectral evolution max_hz {} below min_hz {}", max, s.min_hz)
            })?;
        }
        require(s.smoothing_fraction > 0.0 && s.smoothing_fraction <= 1.0, || {
            "spectral evolution smoothing_fraction must be in (0, 1]".into()
        })?;
        require(s.delta_bands > 0, || "spectral evolution delta_bands must be positive".into())?;
        s.calibration.validate("spectral evolution")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        config.validate().unwrap();

        assert_eq!(config.colouration.fft_size, 131_072);
        assert_eq!(config.asymmetry.num_bins, 300);
        assert_eq!(config.flutter.mode, FlutterMode::HighPass);
        assert_eq!(config.doa_window, 5);
    }

    #[test]
    fn test_calibration_apply() {
        let c = ColourationConfig::default().calibration;
        assert_eq!(c.apply(2.0), 0.0);
        assert_eq!(c.apply(6.0), 1.0);
        assert_eq!(Calibration::IDENTITY.apply(3.5), 3.5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let text = r#"
            doa_window = 7

            [colouration]
            room_volume_m3 = 1200.0

            [flutter.mode]
            kind = "octave_bands"
            aggregate = "mean"
        "#;
        let config: AnalysisConfig = toml::from_str(text).unwrap();

        assert_eq!(config.doa_window, 7);
        assert_eq!(config.colouration.room_volume_m3, 1200.0);
        assert_eq!(config.colouration.fft_size, 131_072);
        assert_eq!(
            config.flutter.mode,
            FlutterMode::OctaveBands {
                aggregate: BandAggregate::Mean
            }
        );
        assert_eq!(config.curvature, CurvatureConfig::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = AnalysisConfig::default();
        config.curvature.filter = CurvatureFilter::BandLimited;
        config.spectral_evolution.max_hz = Some(16000.0);

        let text = toml::to_string_pretty(&config).unwrap();
        let back: AnalysisConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AnalysisConfig::default();
        config.doa_window = 3;
        assert!(matches!(config.validate(), Err(AnalysisError::Configuration(_))));

        let mut config = AnalysisConfig::default();
        config.colouration.rt_start_db = -50.0;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.asymmetry.start_levels_db.push(-50.0);
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.flutter.calibration.scale = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("params.toml");
        let mut config = AnalysisConfig::default();
        config.asymmetry.num_bins = 120;
        config.save(&path).unwrap();

        let loaded = AnalysisConfig::load(&path).unwrap();
        assert_eq!(loaded.asymmetry.num_bins, 120);

        assert!(matches!(
            AnalysisConfig::load(Path::new("/nonexistent/config.toml")),
            Err(AnalysisError::Io(_))
        ));
    }
}
