//! First-order spatial room responses
//!
//! A first-order (B-format-like) response has four channels: an
//! omnidirectional pressure channel followed by three figure-of-eight
//! channels along X, Y and Z. [`doa`] turns those into a per-sample
//! direction of arrival and [`map`] bins the directions into angular
//! energy maps on a chosen plane.

pub mod doa;
pub mod map;

pub use doa::{cartesian_to_spherical, doa_trajectory, hann_window, DoaTrajectory};
pub use map::{spatio_temporal_map, MapWindow, Plane, SpatioTemporalMap};

use crate::error::{AnalysisError, Result};

/// Number of channels in a first-order spatial response
pub const SPATIAL_CHANNELS: usize = 4;

/// Omni channel plus X, Y, Z components, all the same length
#[derive(Debug, Clone)]
pub struct SpatialSignal {
    channels: [Vec<f64>; SPATIAL_CHANNELS],
}

impl SpatialSignal {
    pub fn new(omni: Vec<f64>, x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Result<Self> {
        let len = omni.len();
        if len == 0 {
            return Err(AnalysisError::invalid("spatial signal is empty"));
        }
        for (name, ch) in [("X", &x), ("Y", &y), ("Z", &z)] {
            if ch.len() != len {
                return Err(AnalysisError::invalid(format!(
                    "{} channel has {} samples, omni has {}",
                    name,
                    ch.len(),
                    len
                )));
            }
        }
        Ok(Self {
            channels: [omni, x, y, z],
        })
    }

    /// Build from planar channels; exactly four are required
    pub fn from_channels(channels: &[Vec<f64>]) -> Result<Self> {
        match channels {
            [w, x, y, z] => Self::new(w.clone(), x.clone(), y.clone(), z.clone()),
            _ => Err(AnalysisError::invalid(format!(
                "first-order spatial signal needs {} channels, got {}",
                SPATIAL_CHANNELS,
                channels.len()
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels[0].is_empty()
    }

    pub fn omni(&self) -> &[f64] {
        &self.channels[0]
    }

    /// Directional channel for axis 0 (X), 1 (Y) or 2 (Z)
    pub fn axis(&self, axis: usize) -> &[f64] {
        &self.channels[1 + axis.min(2)]
    }

    /// Copy cut to `len` samples, zero-padded if the signal is shorter
    pub fn resized(&self, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(AnalysisError::invalid("cannot resize spatial signal to zero length"));
        }
        let resize = |ch: &Vec<f64>| {
            let mut out: Vec<f64> = ch.iter().take(len).copied().collect();
            out.resize(len, 0.0);
            out
        };
        Ok(Self {
            channels: [
                resize(&self.channels[0]),
                resize(&self.channels[1]),
                resize(&self.channels[2]),
                resize(&self.channels[3]),
            ],
        })
    }
}
