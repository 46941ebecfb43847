//! Decay-shape curvature
//!
//! Compares the slope of the late decay (-35 to -40 dB) with the slope of the
//! early decay (-5 to -10 dB). A single exponential gives equal slopes and a
//! curvature of zero; coupled volumes or non-diffuse rooms bend the curve.

use serde::Serialize;
use std::f64::consts::SQRT_2;
use tracing::debug;

use crate::config::{CurvatureConfig, CurvatureFilter};
use crate::dsp::edc::EnergyDecayCurve;
use crate::dsp::filter::SosFilter;
use crate::error::{check_signal, AnalysisError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvatureResult {
    /// `late_gradient / early_gradient - 1`
    pub curvature: f64,
    /// dB/s
    pub early_gradient: f64,
    /// dB/s
    pub late_gradient: f64,
}

fn prefilter(rir: &[f64], sample_rate: f64, config: &CurvatureConfig) -> Result<Vec<f64>> {
    let filter = match config.filter {
        CurvatureFilter::None => return Ok(rir.to_vec()),
        CurvatureFilter::HighPass => {
            SosFilter::highpass(config.filter_order, config.highpass_hz, sample_rate)?
        }
        CurvatureFilter::BandLimited => SosFilter::bandpass(
            config.filter_order,
            config.band_centre_hz / SQRT_2,
            config.band_centre_hz * SQRT_2,
            sample_rate,
        )?,
    };
    Ok(filter.filter(rir))
}

/// Curvature of the decay with the pre-filter selected in `config`
pub fn decay_curvature(
    rir: &[f64],
    sample_rate: f64,
    config: &CurvatureConfig,
) -> Result<CurvatureResult> {
    check_signal(rir, sample_rate)?;
    let filtered = prefilter(rir, sample_rate, config)?;
    let edc = EnergyDecayCurve::compute(&filtered, sample_rate)?;

    let early_gradient = edc.gradient(config.early_start_db, config.early_end_db, "early decay")?;
    let late_gradient = edc.gradient(config.late_start_db, config.late_end_db, "late decay")?;
    if early_gradient == 0.0 {
        return Err(AnalysisError::invalid("early decay has zero slope"));
    }

    let curvature = late_gradient / early_gradient - 1.0;
    debug!(early_gradient, late_gradient, curvature, "decay curvature");
    Ok(CurvatureResult {
        curvature,
        early_gradient,
        late_gradient,
    })
}

/// Curvature with the default levels, optionally high-passed at 500 Hz
pub fn curvature(rir: &[f64], sample_rate: f64, high_pass: bool) -> Result<f64> {
    let config = CurvatureConfig {
        filter: if high_pass {
            CurvatureFilter::HighPass
        } else {
            CurvatureFilter::None
        },
        ..CurvatureConfig::default()
    };
    Ok(decay_curvature(rir, sample_rate, &config)?.curvature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    const FS: f64 = 48000.0;

    /// Noise under a sum of exponential envelopes `(amplitude, rt)`
    fn noise_decay(seed: u64, seconds: f64, slopes: &[(f64, f64)]) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        (0..(FS * seconds) as usize)
            .map(|i| {
                let t = i as f64 / FS;
                let envelope: f64 = slopes
                    .iter()
                    .map(|&(a, rt)| a * (-6.91 * t / rt).exp())
                    .sum();
                normal.sample(&mut rng) * envelope
            })
            .collect()
    }

    #[test]
    fn test_single_slope_is_straight() {
        let rir = noise_decay(1, 2.5, &[(1.0, 1.0)]);
        let c = curvature(&rir, FS, false).unwrap();
        assert!(c.abs() < 0.1, "curvature {}", c);

        let result = decay_curvature(&rir, FS, &CurvatureConfig::default()).unwrap();
        assert!((result.early_gradient + 60.0).abs() < 6.0, "{:?}", result);
    }

    #[test]
    fn test_high_passed_single_slope_is_straight() {
        let rir = noise_decay(2, 2.5, &[(1.0, 1.0)]);
        let c = curvature(&rir, FS, true).unwrap();
        assert!(c.abs() < 0.15, "curvature {}", c);
    }

    #[test]
    fn test_double_slope_bends() {
        // Fast early decay with a quiet, slow tail
        let rir = noise_decay(3, 3.0, &[(1.0, 0.3), (0.1, 2.0)]);
        let result = decay_curvature(&rir, FS, &CurvatureConfig::default()).unwrap();
        assert!(result.curvature < -0.5, "{:?}", result);
        assert!(result.late_gradient > result.early_gradient);
    }

    #[test]
    fn test_band_limited_mode() {
        let config = CurvatureConfig {
            filter: CurvatureFilter::BandLimited,
            ..CurvatureConfig::default()
        };
        let rir = noise_decay(4, 2.5, &[(1.0, 1.0)]);
        let result = decay_curvature(&rir, FS, &config).unwrap();
        // Narrow band: fewer independent samples, looser bound
        assert!(result.curvature.abs() < 0.5, "{:?}", result);
    }

    #[test]
    fn test_short_decay_is_degenerate() {
        // Never reaches -35 dB: both late levels snap to the last sample
        let rir: Vec<f64> = (0..1000).map(|i| (-(i as f64) / 5000.0).exp()).collect();
        assert!(matches!(
            curvature(&rir, FS, false),
            Err(AnalysisError::DegenerateWindow { .. })
        ));
    }
}
