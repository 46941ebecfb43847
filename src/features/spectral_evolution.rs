//! Spectral evolution: high-frequency damping over the decay
//!
//! An early part (-1 to -15 dB on the EDC) and a late part (-35 to -40 dB) of
//! the response are cut out and zero-padded to the same length. Their
//! spectra are resampled onto a log axis above 2 kHz, smoothed heavily and
//! shifted so each peaks at 0 dB. When high frequencies die out faster than
//! low ones, the late spectrum tilts down and its mean falls below the early
//! mean.

use serde::Serialize;
use tracing::debug;

use crate::config::SpectralEvolutionConfig;
use crate::dsp::edc::EnergyDecayCurve;
use crate::dsp::spectrum::{
    linear_to_log, magnitude_spectrum, max, mean, odd_at_most, power_db, smooth_mirrored,
    LogSpectrum, SmoothingKernel,
};
use crate::error::{check_signal, AnalysisError, Result};

/// Mean late-minus-early level over one contiguous run of log bins
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeltaBand {
    /// Frequency of the first bin in the run
    pub start_hz: f64,
    /// Relative to the largest delta (0 dB)
    pub delta_db: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpectralEvolutionResult {
    pub score: f64,
    /// `mean(late) - mean(early)` in dB
    pub raw: f64,
    pub frequencies: Vec<f64>,
    /// Smoothed early spectrum, peak at 0 dB
    pub early_db: Vec<f64>,
    /// Smoothed late spectrum, peak at 0 dB
    pub late_db: Vec<f64>,
    pub deltas: Vec<DeltaBand>,
}

/// Log-axis spectrum of a segment zero-padded to `fft_size`, smoothed and
/// shifted to a 0 dB peak
fn smoothed_log_spectrum(
    segment: &[f64],
    fft_size: usize,
    sample_rate: f64,
    config: &SpectralEvolutionConfig,
) -> Result<LogSpectrum> {
    let spectrum = power_db(&magnitude_spectrum(segment, fft_size));
    let max_hz = config.max_hz.unwrap_or(sample_rate / 2.0);
    let log = linear_to_log(&spectrum, sample_rate, config.min_hz, max_hz)?;

    let window = odd_at_most((log.len() as f64 * config.smoothing_fraction) as usize).max(1);
    let kernel = SmoothingKernel::SavitzkyGolay {
        order: config.smoothing_order,
    };
    let smoothed = smooth_mirrored(&log.magnitudes, window, kernel)?;
    let peak = max(&smoothed);

    Ok(LogSpectrum {
        magnitudes: smoothed.iter().map(|v| v - peak).collect(),
        frequencies: log.frequencies,
    })
}

/// Average `deltas` over contiguous runs of `ceil(len / count)` bins, each
/// re-referenced to the largest run.
///
/// The table always has `count` rows. When the runs run out early the
/// remaining rows are empty (0 Hz, 0 dB before re-referencing) and take part
/// in the reference like any other row.
fn delta_bands(deltas: &[f64], frequencies: &[f64], count: usize) -> Vec<DeltaBand> {
    if deltas.is_empty() || count == 0 {
        return Vec::new();
    }
    let step = deltas.len().div_ceil(count);
    let mut bands: Vec<DeltaBand> = deltas
        .chunks(step)
        .zip(frequencies.iter().step_by(step))
        .map(|(chunk, &start_hz)| DeltaBand {
            start_hz,
            delta_db: mean(chunk),
        })
        .collect();
    bands.resize(
        count,
        DeltaBand {
            start_hz: 0.0,
            delta_db: 0.0,
        },
    );

    let top = bands
        .iter()
        .map(|b| b.delta_db)
        .fold(f64::NEG_INFINITY, f64::max);
    for band in &mut bands {
        band.delta_db -= top;
    }
    bands
}

pub fn spectral_evolution(
    rir: &[f64],
    sample_rate: f64,
    config: &SpectralEvolutionConfig,
) -> Result<SpectralEvolutionResult> {
    check_signal(rir, sample_rate)?;
    if config.max_hz.is_some_and(|f| f > sample_rate / 2.0) {
        return Err(AnalysisError::config(format!(
            "spectral evolution upper frequency {:?} Hz is above Nyquist",
            config.max_hz
        )));
    }

    let edc = EnergyDecayCurve::compute(rir, sample_rate)?;
    let early = edc.window(config.early_start_db, config.early_end_db, "early spectrum")?;
    let late = edc.window(config.late_start_db, config.late_end_db, "late spectrum")?;
    let fft_size = early.len().max(late.len());
    debug!(?early, ?late, fft_size, "spectral evolution segments");

    let early_spec = smoothed_log_spectrum(&rir[early], fft_size, sample_rate, config)?;
    let late_spec = smoothed_log_spectrum(&rir[late], fft_size, sample_rate, config)?;

    let raw = mean(&late_spec.magnitudes) - mean(&early_spec.magnitudes);
    let score = config.calibration.apply(raw);

    let deltas: Vec<f64> = late_spec
        .magnitudes
        .iter()
        .zip(&early_spec.magnitudes)
        .map(|(l, e)| l - e)
        .collect();
    let deltas = delta_bands(&deltas, &early_spec.frequencies, config.delta_bands);

    debug!(raw, score, "spectral evolution");
    Ok(SpectralEvolutionResult {
        score,
        raw,
        frequencies: early_spec.frequencies,
        early_db: early_spec.magnitudes,
        late_db: late_spec.magnitudes,
        deltas,
    })
}

/// Calibrated spectral-evolution score with default parameters
pub fn spectral_evolution_score(rir: &[f64], sample_rate: f64) -> Result<f64> {
    Ok(spectral_evolution(rir, sample_rate, &SpectralEvolutionConfig::default())?.score)
}
