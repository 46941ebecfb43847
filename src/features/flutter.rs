//! Flutter echo
//!
//! Repeated reflections between parallel surfaces modulate the energy decay
//! periodically. The modulation is measured on the energy-time curve (ETC):
//!
//! ```text
//! RIR from its peak -> high-pass 7 kHz (forward-backward)
//!     -> unit peak -> ETC, 10 ms windows, dB
//!     -> everything before the first point at or below -60 dB set to -60 dB
//!     -> 10 log10 |FFT_512(ETC)|
//!     -> bins between 2 and 20 Hz
//!     -> mean level = score
//! ```
//!
//! The octave-band mode runs the same chain per octave band (no high-pass)
//! and scores each band by how far its largest modulation peak stands out,
//! `(max - mean) / std`.

use serde::Serialize;
use tracing::debug;

use crate::config::{BandAggregate, FlutterConfig, FlutterMode};
use crate::dsp::edc::first_at_or_below;
use crate::dsp::filter::SosFilter;
use crate::dsp::octave::{octave_bands, BandResolution};
use crate::dsp::spectrum::{
    argmax_abs, magnitude_spectrum, max, mean, normalise_peak, power_db, std_dev,
    EnergyTimeCurve,
};
use crate::error::{check_signal, AnalysisError, Result};

/// Flutter score of one octave band
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandScore {
    pub centre_hz: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlutterResult {
    /// Calibrated score
    pub score: f64,
    pub raw: f64,
    /// Per-band scores (octave-band mode only)
    pub bands: Vec<BandScore>,
}

/// Modulation spectrum (dB) of a signal's ETC, restricted to the flutter band.
///
/// The signal is scaled to unit peak first, so the floor is relative to its
/// loudest sample.
pub fn modulation_spectrum(
    signal: &[f64],
    sample_rate: f64,
    config: &FlutterConfig,
) -> Result<Vec<f64>> {
    check_signal(signal, sample_rate)?;
    let signal = normalise_peak(signal)?;
    let mut etc = EnergyTimeCurve::compute(&signal, sample_rate, config.etc_window_ms)?;

    let onset = first_at_or_below(&etc.levels_db, config.floor_db);
    for level in &mut etc.levels_db[..onset] {
        *level = config.floor_db;
    }

    let spectrum = power_db(&magnitude_spectrum(&etc.levels_db, config.fft_size));

    // Index = floor(f * bins / (frame_rate / 2))
    let bins = spectrum.len() as f64;
    let nyquist = etc.frame_rate / 2.0;
    let index = |f: f64| ((f * bins / nyquist).floor() as usize).min(spectrum.len());
    let (lo, hi) = (index(config.min_hz), index(config.max_hz));
    if hi <= lo {
        return Err(AnalysisError::config(format!(
            "flutter band {}-{} Hz has no bins at an ETC rate of {} Hz",
            config.min_hz, config.max_hz, etc.frame_rate
        )));
    }
    debug!(onset, lo, hi, etc_len = etc.levels_db.len(), "modulation spectrum");
    Ok(spectrum[lo..hi].to_vec())
}

/// Signal from its loudest sample on, normalised to unit peak
fn from_peak(rir: &[f64], sample_rate: f64) -> Result<Vec<f64>> {
    check_signal(rir, sample_rate)?;
    normalise_peak(&rir[argmax_abs(rir)..])
}

/// Flutter echo with the mode selected in `config`
pub fn flutter_echo(rir: &[f64], sample_rate: f64, config: &FlutterConfig) -> Result<FlutterResult> {
    let rir = from_peak(rir, sample_rate)?;

    let (raw, bands) = match config.mode {
        FlutterMode::HighPass => {
            let filter = SosFilter::highpass(config.highpass_order, config.highpass_hz, sample_rate)?;
            let filtered = filter.filtfilt(&rir);
            (mean(&modulation_spectrum(&filtered, sample_rate, config)?), Vec::new())
        }
        FlutterMode::OctaveBands { aggregate } => {
            let split = octave_bands(&rir, sample_rate, BandResolution::Full)?;
            let mut bands = Vec::with_capacity(split.len());
            for (centre_hz, band) in split.iter() {
                let spectrum = modulation_spectrum(band, sample_rate, config)?;
                let spread = std_dev(&spectrum);
                let score = if spread > 0.0 {
                    (max(&spectrum) - mean(&spectrum)) / spread
                } else {
                    0.0
                };
                bands.push(BandScore { centre_hz, score });
            }
            let scores: Vec<f64> = bands.iter().map(|b| b.score).collect();
            let raw = match aggregate {
                BandAggregate::Max => max(&scores),
                BandAggregate::Mean => mean(&scores),
            };
            (raw, bands)
        }
    };

    let score = config.calibration.apply(raw);
    debug!(raw, score, bands = bands.len(), "flutter echo");
    Ok(FlutterResult { score, raw, bands })
}

/// Calibrated flutter score with default parameters
pub fn flutter_echo_score(rir: &[f64], sample_rate: f64) -> Result<f64> {
    Ok(flutter_echo(rir, sample_rate, &FlutterConfig::default())?.score)
}
