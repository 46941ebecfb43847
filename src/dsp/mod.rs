//! Signal-processing building blocks shared by the feature extractors

pub mod edc;
pub mod filter;
pub mod octave;
pub mod spectrum;

pub use edc::{compute_edc, estimate_rt, index_of_closest, EnergyDecayCurve};
pub use filter::{FilterKind, SosFilter};
pub use octave::{band_centres, octave_bands, third_octave_centres, BandResolution, OctaveBands};
pub use spectrum::{linear_to_log, log_to_linear, smooth_circular, smooth_mirrored, LogSpectrum, SmoothingKernel};
