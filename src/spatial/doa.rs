//! Per-sample direction of arrival
//!
//! The active intensity along each axis is approximated by the product of the
//! omni channel with that axis's figure-of-eight channel. Each product is
//! smoothed with a short Hann window (centred, same length) and the resulting
//! 3-vector is scaled to unit length.
//!
//! Where all three smoothed products are zero (silence, exact cancellation)
//! there is no direction. Those samples are returned as NaN and every
//! consumer in this crate skips non-finite directions.

use tracing::debug;

use super::SpatialSignal;
use crate::error::{AnalysisError, Result};

/// Shortest smoothing window accepted
pub const MIN_WINDOW: usize = 5;

/// Unit direction vectors, one per sample
#[derive(Debug, Clone)]
pub struct DoaTrajectory {
    pub directions: Vec<[f64; 3]>,
}

impl DoaTrajectory {
    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    /// Number of samples without a defined direction
    pub fn undefined_count(&self) -> usize {
        self.directions
            .iter()
            .filter(|d| d.iter().any(|v| !v.is_finite()))
            .count()
    }
}

/// Symmetric Hann window with zero end points, `0.5 - 0.5 cos(2 pi n / (N - 1))`
pub fn hann_window(len: usize) -> Vec<f64> {
    if len < 2 {
        return vec![1.0; len];
    }
    let m = (len - 1) as f64;
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * n as f64 / m).cos())
        .collect()
}

/// Centred convolution returning `signal.len()` samples (zero outside)
fn convolve_same(signal: &[f64], window: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let half = window.len() / 2;
    (0..n)
        .map(|i| {
            // out[i] = full[i + half] = sum_k signal[i + half - k] * window[k]
            window
                .iter()
                .enumerate()
                .filter_map(|(k, &w)| {
                    let j = (i + half).checked_sub(k)?;
                    signal.get(j).map(|&s| s * w)
                })
                .sum()
        })
        .collect()
}

/// Direction of arrival of every sample of a first-order spatial response
pub fn doa_trajectory(signal: &SpatialSignal, window_len: usize) -> Result<DoaTrajectory> {
    if window_len < MIN_WINDOW {
        return Err(AnalysisError::config(format!(
            "DOA smoothing window must be at least {} samples, got {}",
            MIN_WINDOW, window_len
        )));
    }
    let window = hann_window(window_len);
    let omni = signal.omni();

    let axes: Vec<Vec<f64>> = (0..3)
        .map(|axis| {
            let product: Vec<f64> = omni
                .iter()
                .zip(signal.axis(axis))
                .map(|(w, d)| w * d)
                .collect();
            convolve_same(&product, &window)
        })
        .collect();

    let directions: Vec<[f64; 3]> = (0..signal.len())
        .map(|i| normalise([axes[0][i], axes[1][i], axes[2][i]]))
        .collect();

    let trajectory = DoaTrajectory { directions };
    debug!(
        samples = trajectory.len(),
        undefined = trajectory.undefined_count(),
        "computed DOA trajectory"
    );
    Ok(trajectory)
}

/// Scale to unit length; a zero vector has no direction and becomes NaN
fn normalise(v: [f64; 3]) -> [f64; 3] {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm > 0.0 && norm.is_finite() {
        [v[0] / norm, v[1] / norm, v[2] / norm]
    } else {
        [f64::NAN; 3]
    }
}

/// `(radius, azimuth, elevation)` with azimuth measured in the XY plane from
/// +X and elevation from that plane towards +Z
pub fn cartesian_to_spherical(v: [f64; 3]) -> (f64, f64, f64) {
    let [x, y, z] = v;
    let horizontal = x.hypot(y);
    (horizontal.hypot(z), y.atan2(x), z.atan2(horizontal))
}
