//! Octave and third-octave band decomposition
//!
//! Band centres follow the base-2 series around 1 kHz:
//!
//! ```text
//! Full octave:   f = 1000 * 2^n           crossovers at f / sqrt(2), f * sqrt(2)
//! Third octave:  f = 1000 * 2^(n / 3)     crossovers at f / 2^(1/6), f * 2^(1/6)
//! ```
//!
//! Only centres strictly between 70 Hz and Nyquist are kept. The lowest band
//! is a lowpass at its upper crossover (it keeps everything down to DC), the
//! highest band a highpass at its lower crossover, and every band in between
//! a bandpass, so the set covers the whole spectrum.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::filter::SosFilter;
use crate::error::{check_signal, AnalysisError, Result};

const REFERENCE_HZ: f64 = 1000.0;
const MIN_CENTRE_HZ: f64 = 70.0;
const BANDPASS_ORDER: usize = 5;
const SHELF_ORDER: usize = 2 * BANDPASS_ORDER;

/// Band spacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandResolution {
    #[default]
    Full,
    Third,
}

impl BandResolution {
    /// Bands per octave
    fn bands_per_octave(self) -> i32 {
        match self {
            Self::Full => 1,
            Self::Third => 3,
        }
    }

    /// Ratio between a centre frequency and its crossovers
    pub fn crossover_factor(self) -> f64 {
        2f64.powf(0.5 / self.bands_per_octave() as f64)
    }
}

/// Band-limited copies of one signal
#[derive(Debug, Clone)]
pub struct OctaveBands {
    /// Centre frequencies in Hz, strictly increasing
    pub centres: Vec<f64>,
    /// One filtered signal per centre, each as long as the input
    pub signals: Vec<Vec<f64>>,
}

impl OctaveBands {
    pub fn len(&self) -> usize {
        self.centres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centres.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64])> {
        self.centres
            .iter()
            .copied()
            .zip(self.signals.iter().map(|s| s.as_slice()))
    }
}

/// Centre frequencies in `(70 Hz, Nyquist)` for the given resolution
pub fn band_centres(sample_rate: f64, resolution: BandResolution) -> Vec<f64> {
    let per_octave = resolution.bands_per_octave();
    // 1000 * 2^-6 = 15.6 Hz up to 1000 * 2^6 = 64 kHz covers every audio rate
    (-6 * per_octave..=6 * per_octave)
        .map(|n| REFERENCE_HZ * 2f64.powf(n as f64 / per_octave as f64))
        .filter(|&f| f > MIN_CENTRE_HZ && f < 0.5 * sample_rate)
        .collect()
}

/// Third-octave centres between two frequencies (inclusive where they land on the series)
pub fn third_octave_centres(min_hz: f64, max_hz: f64) -> Vec<f64> {
    if !(min_hz > 0.0 && max_hz >= min_hz) {
        return Vec::new();
    }
    let step = 2f64.powf(1.0 / 3.0);
    let first = ((min_hz / REFERENCE_HZ).log10() / step.log10()).ceil() as i32;
    let last = ((max_hz / REFERENCE_HZ).log10() / step.log10()).floor() as i32;
    (first..=last)
        .map(|n| REFERENCE_HZ * step.powi(n))
        .collect()
}

/// Split a signal into octave or third-octave bands
pub fn octave_bands(
    signal: &[f64],
    sample_rate: f64,
    resolution: BandResolution,
) -> Result<OctaveBands> {
    check_signal(signal, sample_rate)?;

    let centres = band_centres(sample_rate, resolution);
    if centres.len() < 2 {
        return Err(AnalysisError::invalid(format!(
            "sample rate {} Hz leaves fewer than two bands above {} Hz",
            sample_rate, MIN_CENTRE_HZ
        )));
    }

    let factor = resolution.crossover_factor();
    let last = centres.len() - 1;
    let mut signals = Vec::with_capacity(centres.len());
    for (i, &centre) in centres.iter().enumerate() {
        let lower = centre / factor;
        let upper = centre * factor;
        let filter = if i == 0 {
            SosFilter::lowpass(SHELF_ORDER, upper, sample_rate)?
        } else if i == last {
            SosFilter::highpass(SHELF_ORDER, lower, sample_rate)?
        } else {
            SosFilter::bandpass(BANDPASS_ORDER, lower, upper, sample_rate)?
        };
        signals.push(filter.filter(signal));
    }

    debug!(bands = centres.len(), ?resolution, "split signal into bands");
    Ok(OctaveBands { centres, signals })
}
