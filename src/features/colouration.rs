//! Spectral colouration
//!
//! Resonances and comb filtering show up as narrow peaks in the spectrum of
//! a reverberant tail once its exponential decay has been flattened out. The
//! canonical algorithm works as follows:
//!
//! 1. Normalise the RIR to unit peak and estimate RT between -5 and -40 dB.
//! 2. Keep the samples between the 0 dB and -40 dB points of the EDC and
//!    multiply each by `exp(6.91 t / RT)`.
//! 3. Take the magnitude of a zero-padded FFT of 131072 points (or the next
//!    power of two above a longer window) and resample it to log frequency
//!    between the Schroeder frequency `2000 sqrt(RT / V)` and 4 kHz, in dB.
//! 4. Smooth over 0.15 octave with mirrored edges; the positive part of
//!    `raw - smoothed` is the ripple (notches are clipped away).
//! 5. `raw = std(ripple) + 10 log10(max - mean - std) / 10`, then
//!    `score = (raw - 2) / 4`.
//!
//! The room volume `V` is an assumption, so the lower frequency bound is
//! only approximate.

use tracing::{debug, warn};

use super::compensate_decay;
use crate::config::{ColourationConfig, ColourationVariant};
use crate::dsp::edc::EnergyDecayCurve;
use crate::dsp::octave::{octave_bands, BandResolution};
use crate::dsp::spectrum::{
    amplitude_db, linear_to_log, magnitude_spectrum, max, mean, normalise_peak,
    smooth_mirrored, std_dev, LogSpectrum, SmoothingKernel,
};
use crate::error::{check_signal, AnalysisError, Result};

/// Floor of the peakedness term before its log
const PEAKEDNESS_FLOOR_DB: f64 = 1e-3;

/// Colouration result with intermediate quantities
#[derive(Debug, Clone, serde::Serialize)]
pub struct ColourationResult {
    /// Calibrated score, roughly 0-1
    pub score: f64,
    /// Uncalibrated combination
    pub raw: f64,
    /// Reverberation time used for the compensation (mean over bands for the
    /// band-compensated variant)
    pub rt_s: f64,
    /// Lower bound of the analysed band
    pub schroeder_hz: f64,
    /// Standard deviation of the ripple
    pub spread: f64,
    /// Peakedness term in dB (zero for the band-compensated variant)
    pub peakedness_db: f64,
}

/// A colouration estimator
pub trait ColourationAlgorithm {
    fn name(&self) -> &'static str;

    fn compute(&self, rir: &[f64], sample_rate: f64) -> Result<ColourationResult>;
}

/// Whole-band decay compensation with notch clipping and peakedness
#[derive(Debug, Clone, Default)]
pub struct CompensatedDecayColouration {
    config: ColourationConfig,
}

/// Per-octave decay compensation, standard deviation of the spectrum over
/// its smoothed version. Kept for comparison with older results.
#[derive(Debug, Clone, Default)]
pub struct BandCompensatedColouration {
    config: ColourationConfig,
}

impl CompensatedDecayColouration {
    pub fn new(config: ColourationConfig) -> Self {
        Self { config }
    }
}

impl BandCompensatedColouration {
    pub fn new(config: ColourationConfig) -> Self {
        Self { config }
    }
}

/// Lower analysis bound for a given RT and assumed room volume
pub fn schroeder_frequency(rt_s: f64, room_volume_m3: f64) -> f64 {
    2000.0 * (rt_s / room_volume_m3).sqrt()
}

fn check_rt(rt: f64, context: &str) -> Result<f64> {
    if rt.is_finite() && rt > 0.0 {
        Ok(rt)
    } else {
        Err(AnalysisError::invalid(format!(
            "{}: reverberation time {} s is not a positive decay",
            context, rt
        )))
    }
}

/// Log-frequency spectrum between the Schroeder frequency and the upper limit
fn band_limited_log_spectrum(
    magnitudes: &[f64],
    sample_rate: f64,
    schroeder_hz: f64,
    config: &ColourationConfig,
) -> Result<LogSpectrum> {
    let upper = config.upper_frequency_hz.min(sample_rate / 2.0);
    if schroeder_hz >= upper {
        return Err(AnalysisError::invalid(format!(
            "Schroeder frequency {:.0} Hz is above the {:.0} Hz upper limit",
            schroeder_hz, upper
        )));
    }
    linear_to_log(magnitudes, sample_rate, schroeder_hz, upper)
}

/// Odd window covering `octaves` worth of a log spectrum
fn smoothing_window(spectrum: &LogSpectrum, octaves: f64) -> usize {
    let span = spectrum.octaves();
    if span <= 0.0 {
        return 1;
    }
    let window = (spectrum.len() as f64 / span * octaves) as usize;
    window.max(1) | 1
}

impl ColourationAlgorithm for CompensatedDecayColouration {
    fn name(&self) -> &'static str {
        "compensated_decay"
    }

    fn compute(&self, rir: &[f64], sample_rate: f64) -> Result<ColourationResult> {
        let cfg = &self.config;
        check_signal(rir, sample_rate)?;
        let rir = normalise_peak(rir)?;

        let edc = EnergyDecayCurve::compute(&rir, sample_rate)?;
        let rt = check_rt(
            edc.reverberation_time(cfg.rt_start_db, cfg.rt_end_db)?,
            "colouration",
        )?;
        let window = edc.window(cfg.window_start_db, cfg.window_end_db, "colouration window")?;
        debug!(rt, start = window.start, end = window.end, "colouration window");

        let compensated = compensate_decay(&rir, window, sample_rate, rt);
        // Zero-pad only; a window longer than the configured size grows the FFT
        let fft_size = cfg.fft_size.max(compensated.len().next_power_of_two());
        if fft_size > cfg.fft_size {
            debug!(window = compensated.len(), fft_size, "colouration FFT enlarged");
        }
        let magnitudes = magnitude_spectrum(&compensated, fft_size);

        let schroeder_hz = schroeder_frequency(rt, cfg.room_volume_m3);
        let log = band_limited_log_spectrum(&magnitudes, sample_rate, schroeder_hz, cfg)?;
        let levels = amplitude_db(&log.magnitudes);

        let smoothing = smoothing_window(&log, cfg.smoothing_octaves);
        let smoothed = smooth_mirrored(&levels, smoothing, SmoothingKernel::Hamming)?;

        let ripple: Vec<f64> = levels
            .iter()
            .zip(&smoothed)
            .map(|(l, s)| (l - s).max(0.0))
            .collect();
        let spread = std_dev(&ripple);
        let excess = max(&ripple) - mean(&ripple) - spread;
        let peakedness_db = 10.0 * excess.max(PEAKEDNESS_FLOOR_DB).log10();

        let raw = spread + peakedness_db / 10.0;
        let score = cfg.calibration.apply(raw);
        debug!(schroeder_hz, smoothing, spread, peakedness_db, score, "colouration");

        Ok(ColourationResult {
            score,
            raw,
            rt_s: rt,
            schroeder_hz,
            spread,
            peakedness_db,
        })
    }
}

impl ColourationAlgorithm for BandCompensatedColouration {
    fn name(&self) -> &'static str {
        "band_compensated"
    }

    fn compute(&self, rir: &[f64], sample_rate: f64) -> Result<ColourationResult> {
        let cfg = &self.config;
        check_signal(rir, sample_rate)?;
        let rir = normalise_peak(rir)?;
        let bands = octave_bands(&rir, sample_rate, BandResolution::Full)?;

        let mut summed = vec![0.0; rir.len()];
        let mut rts = Vec::with_capacity(bands.len());
        for (centre, band) in bands.iter() {
            let compensated = EnergyDecayCurve::compute(band, sample_rate).and_then(|edc| {
                let context = format!("{} Hz band", centre);
                let rt = edc.reverberation_time(cfg.band_start_db, cfg.band_end_db)?;
                let rt = check_rt(rt, &context)?;
                let window = edc.window(cfg.band_start_db, cfg.band_end_db, &context)?;
                let compensated = compensate_decay(band, window, sample_rate, rt);
                let flat = normalise_peak(&compensated)?;
                Ok((rt, flat))
            });
            match compensated {
                Ok((rt, flat)) => {
                    for (acc, v) in summed.iter_mut().zip(&flat) {
                        *acc += v;
                    }
                    rts.push(rt);
                }
                Err(e) => warn!(centre_hz = centre, error = %e, "skipping band in colouration"),
            }
        }
        if rts.is_empty() {
            return Err(AnalysisError::invalid(
                "no octave band produced a usable decay for colouration",
            ));
        }

        // Drop leading and trailing zeros left by the band windows
        let first = summed.iter().position(|&v| v != 0.0).unwrap_or(0);
        let last = summed.iter().rposition(|&v| v != 0.0).map_or(first, |i| i + 1);
        let trimmed = &summed[first..last.max(first)];
        if trimmed.len() < 2 {
            return Err(AnalysisError::invalid("compensated band sum is empty"));
        }

        let rt = mean(&rts);
        let magnitudes = magnitude_spectrum(trimmed, trimmed.len());
        let schroeder_hz = schroeder_frequency(rt, cfg.room_volume_m3);
        let log = band_limited_log_spectrum(&magnitudes, sample_rate, schroeder_hz, cfg)?;

        let smoothing = smoothing_window(&log, cfg.smoothing_octaves);
        let smoothed = smooth_mirrored(&log.magnitudes, smoothing, SmoothingKernel::Hamming)?;
        let ratio: Vec<f64> = log
            .magnitudes
            .iter()
            .zip(&smoothed)
            .filter(|(_, s)| **s > 0.0)
            .map(|(m, s)| m / s)
            .collect();
        if ratio.is_empty() {
            return Err(AnalysisError::invalid("smoothed colouration spectrum is empty"));
        }
        let spread = std_dev(&ratio);
        debug!(bands = rts.len(), rt, schroeder_hz, spread, "band-compensated colouration");

        Ok(ColourationResult {
            score: spread,
            raw: spread,
            rt_s: rt,
            schroeder_hz,
            spread,
            peakedness_db: 0.0,
        })
    }
}

/// Colouration with the algorithm selected in `config`
pub fn colouration(rir: &[f64], sample_rate: f64, config: &ColourationConfig) -> Result<ColourationResult> {
    match config.variant {
        ColourationVariant::CompensatedDecay => {
            CompensatedDecayColouration::new(config.clone()).compute(rir, sample_rate)
        }
        ColourationVariant::BandCompensated => {
            BandCompensatedColouration::new(config.clone()).compute(rir, sample_rate)
        }
    }
}

/// Calibrated colouration score with default parameters
pub fn colouration_score(rir: &[f64], sample_rate: f64) -> Result<f64> {
    Ok(colouration(rir, sample_rate, &ColourationConfig::default())?.score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use std::f64::consts::PI;

    const FS: f64 = 48000.0;

    /// White noise under an exponential envelope with the given RT
    fn noise_decay(seed: u64, rt: f64, seconds: f64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let n = (FS * seconds) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / FS;
                normal.sample(&mut rng) * (-6.91 * t / rt).exp()
            })
            .collect()
    }

    fn with_resonance(rir: &[f64], freq: f64, amplitude: f64, rt: f64) -> Vec<f64> {
        rir.iter()
            .enumerate()
            .map(|(i, &x)| {
                let t = i as f64 / FS;
                x + amplitude * (2.0 * PI * freq * t).sin() * (-6.91 * t / rt).exp()
            })
            .collect()
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    #[test]
    fn test_schroeder_frequency() {
        assert!((schroeder_frequency(1.0, 5000.0) - 28.284).abs() < 1e-3);
        assert!((schroeder_frequency(2.0, 200.0) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_smoothing_window_is_odd() {
        let log = LogSpectrum {
            magnitudes: vec![0.0; 1000],
            frequencies: crate::dsp::spectrum::logspace(100.0, 1600.0, 1000),
        };
        // 1000 points over 4 octaves: 250 per octave, 0.15 octave = 37
        assert_eq!(smoothing_window(&log, 0.15), 37);
        assert_eq!(smoothing_window(&log, 0.2), 51);
    }

    // ==========================================================================
    // SCORES
    // ==========================================================================

    #[test]
    fn test_resonance_raises_colouration() {
        let rt = 0.8;
        let plain = noise_decay(11, rt, 1.5);
        let resonant = with_resonance(&plain, 1000.0, 0.5, rt);

        let config = ColourationConfig::default();
        let a = colouration(&plain, FS, &config).unwrap();
        let b = colouration(&resonant, FS, &config).unwrap();

        assert!(b.score > a.score, "resonant {} vs plain {}", b.score, a.score);
        assert!(b.peakedness_db > a.peakedness_db);
        assert!((a.rt_s - rt).abs() / rt < 0.1, "rt {}", a.rt_s);
    }

    #[test]
    fn test_long_window_is_not_truncated() {
        let plain = noise_decay(13, 0.8, 1.5);
        let small = ColourationConfig {
            fft_size: 4096,
            ..ColourationConfig::default()
        };
        let a = colouration(&plain, FS, &small).unwrap();

        // The 0 to -40 dB window is roughly 25000 samples, so both run at 32768
        let fitted = ColourationConfig {
            fft_size: 32768,
            ..ColourationConfig::default()
        };
        let b = colouration(&plain, FS, &fitted).unwrap();
        assert!((a.score - b.score).abs() < 1e-12, "{} vs {}", a.score, b.score);
    }

    #[test]
    fn test_band_variant_runs() {
        let rt = 0.8;
        let plain = noise_decay(12, rt, 1.5);
        let result = BandCompensatedColouration::default().compute(&plain, FS).unwrap();

        assert!(result.score.is_finite() && result.score > 0.0);
        assert!(result.rt_s > 0.0);
        assert_eq!(result.peakedness_db, 0.0);
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(CompensatedDecayColouration::default().name(), "compensated_decay");
        assert_eq!(BandCompensatedColouration::default().name(), "band_compensated");
    }

    #[test]
    fn test_rejects_silence_and_short_decay() {
        assert!(colouration_score(&[0.0; 4800], FS).is_err());
        // A lone impulse never decays through the RT levels
        let mut impulse = vec![0.0; 4800];
        impulse[0] = 1.0;
        assert!(colouration_score(&impulse, FS).is_err());
    }
}
