//! Perceptual feature extractors
//!
//! Each extractor is a pure function of a room impulse response and its
//! sample rate (plus a config section), returning a detailed result whose
//! `score` is the number fed to the score combiner.
//!
//! | Feature | Reads | Score |
//! |---------|-------|-------|
//! | Colouration | omni | spread + peakedness of the decay-compensated spectrum ripple |
//! | Flutter echo | omni | level of the 2-20 Hz modulation spectrum of the energy-time curve |
//! | Spatial asymmetry | 4-channel | median-plane minus lateral-plane narrowness of late energy |
//! | Curvature | omni | late / early decay gradient minus one |
//! | Spectral evolution | omni | late minus early mean level of the smoothed high-frequency spectrum |

pub mod asymmetry;
pub mod colouration;
pub mod curvature;
pub mod flutter;
pub mod spectral_evolution;

use std::ops::Range;

pub use asymmetry::{spatial_asymmetry, spatial_asymmetry_score, AsymmetryResult};
pub use colouration::{
    colouration, colouration_score, BandCompensatedColouration, ColourationAlgorithm,
    ColourationResult, CompensatedDecayColouration,
};
pub use curvature::{curvature, decay_curvature, CurvatureResult};
pub use flutter::{flutter_echo, flutter_echo_score, FlutterResult};
pub use spectral_evolution::{spectral_evolution, spectral_evolution_score, SpectralEvolutionResult};

/// Exponent of the decay compensation, `ln(10^3)`: a 60 dB amplitude decay
/// over one RT
pub const DECAY_EXPONENT: f64 = 6.91;

/// Multiply `signal[range]` by `exp(6.91 * t / rt)` with `t` the absolute
/// sample time, flattening an exponential decay of reverberation time `rt`
pub(crate) fn compensate_decay(
    signal: &[f64],
    range: Range<usize>,
    sample_rate: f64,
    rt: f64,
) -> Vec<f64> {
    signal[range.clone()]
        .iter()
        .zip(range)
        .map(|(&x, i)| x * (DECAY_EXPONENT * (i as f64 / sample_rate) / rt).exp())
        .collect()
}
