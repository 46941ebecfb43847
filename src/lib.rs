//! rir-unpleasantness - Rate how unpleasant a room sounds from its impulse response
//!
//! A room impulse response (RIR) carries everything a listener will hear of
//! the room. This crate extracts five hand-engineered features from it and,
//! given a fitted model, combines them into one rating that tracks
//! listening-test results.
//!
//! # Features
//!
//! 1. **Colouration**: ripple of the decay-compensated spectrum, high where
//!    narrow resonances or comb filtering stand out.
//! 2. **Flutter echo**: periodic modulation (2-20 Hz) of the high-frequency
//!    energy-time curve, caused by parallel reflecting surfaces.
//! 3. **Spatial asymmetry**: how one-sided the late energy is, from the
//!    direction of arrival of a four-channel first-order response.
//! 4. **Curvature**: late versus early decay slope; zero for a single
//!    exponential decay.
//! 5. **Spectral evolution** (HF damping): how much faster high frequencies
//!    die away than low ones.
//!
//! # Quick Start
//!
//! ```no_run
//! use rir_unpleasantness::{Analyzer, Verdict};
//!
//! let analyzer = Analyzer::new();
//! let result = analyzer.analyze("hall.wav");
//!
//! match result.verdict {
//!     Verdict::Ok => println!("All features computed"),
//!     Verdict::Partial => println!("Some features failed: {:?}", result.flags),
//!     Verdict::Error => println!("Couldn't analyze: {:?}", result.error),
//! }
//!
//! println!("Colouration: {:?}", result.colouration);
//! println!("Flutter echo: {:?}", result.flutter_echo);
//! ```
//!
//! The extractors can also be called directly on a sample buffer:
//!
//! ```
//! use rir_unpleasantness::dsp::estimate_rt;
//!
//! let fs = 1000.0;
//! let rir: Vec<f64> = (0..3000).map(|i| (-(i as f64) / fs / 0.1).exp()).collect();
//! let rt = estimate_rt(&rir, fs, -5.0, -25.0).unwrap();
//! assert!((rt - 0.691).abs() < 0.01);
//! ```
//!
//! # Modules
//!
//! - [`dsp`]: decay curves, Butterworth filters, octave bands, spectra
//! - [`spatial`]: direction of arrival and spatio-temporal maps
//! - [`features`]: the five feature extractors
//! - [`model`]: linear and MLP score combination from JSON files
//! - [`config`]: every tunable parameter, loadable from TOML
//! - [`decode`]: reading recordings with symphonia
//! - [`analyzer`]: per-file orchestration
//! - [`report`]: Output formatters (JSON, CSV)

pub mod analyzer;
pub mod config;
pub mod decode;
pub mod dsp;
pub mod error;
pub mod features;
pub mod model;
pub mod report;
pub mod spatial;

pub use analyzer::{AnalysisResult, Analyzer, FeatureDetails, Verdict};
pub use config::AnalysisConfig;
pub use decode::{decode_file, RoomResponse};
pub use error::{AnalysisError, Result};
pub use model::{Features, RegressionModel, ScoreModel};
pub use spatial::SpatialSignal;
