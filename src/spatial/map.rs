//! Spatio-temporal energy maps
//!
//! For a time window of a spatial response, each sample's direction is
//! rotated into a viewing plane, its azimuth quantised into one of `N`
//! equal bins and its omni energy (weighted by `|cos(elevation)|`) added to
//! that bin:
//!
//! ```text
//! plane        (x, y, z) used for the spherical conversion   azimuth offset
//! lateral      ( x,  y,  z)                                  pi
//! median       ( x,  z, -y)                                  pi
//! transverse   ( z,  y, -x)                                  pi + pi/2
//! ```
//!
//! Bins are smoothed circularly and converted to dB with a floor of 1e-6
//! (-60 dB). The angle axis runs `pi - linspace(-pi, pi - 2pi/N, N)`.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::doa::{cartesian_to_spherical, doa_trajectory, DoaTrajectory};
use super::SpatialSignal;
use crate::dsp::spectrum::{smooth_circular, SmoothingKernel};
use crate::error::{AnalysisError, Result};

/// Linear floor before converting bin energy to dB
pub const ENERGY_FLOOR: f64 = 1e-6;

const AZIMUTH_OFFSET: f64 = PI;

/// Viewing plane for a spatio-temporal map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plane {
    Lateral,
    Median,
    Transverse,
}

impl Plane {
    pub const ALL: [Plane; 3] = [Plane::Lateral, Plane::Median, Plane::Transverse];

    /// Rotate a direction into this plane's frame, returning
    /// `(azimuth, elevation)` before the common azimuth offset
    fn project(self, d: [f64; 3]) -> (f64, f64) {
        let [x, y, z] = d;
        match self {
            Self::Lateral => {
                let (_, az, el) = cartesian_to_spherical([x, y, z]);
                (az, el)
            }
            Self::Median => {
                let (_, az, el) = cartesian_to_spherical([x, z, -y]);
                (az, el)
            }
            Self::Transverse => {
                let (_, az, el) = cartesian_to_spherical([z, y, -x]);
                (az + PI / 2.0, el)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lateral => "lateral",
            Self::Median => "median",
            Self::Transverse => "transverse",
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plane {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lateral" => Ok(Self::Lateral),
            "median" => Ok(Self::Median),
            "transverse" => Ok(Self::Transverse),
            other => Err(AnalysisError::config(format!(
                "unknown plane '{}' (expected lateral, median or transverse)",
                other
            ))),
        }
    }
}

/// Time window of a map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapWindow {
    pub start_ms: f64,
    pub duration_ms: f64,
    /// Measure `start_ms` from the direct sound (loudest omni sample)
    /// instead of from the first sample
    pub relative_to_direct: bool,
}

impl MapWindow {
    /// Window starting exactly at an absolute sample index
    pub fn at_sample(start: usize, duration_ms: f64, sample_rate: f64) -> Self {
        // Half a sample keeps the floor in `resolve` from landing one short
        Self {
            start_ms: (start as f64 + 0.5) * 1000.0 / sample_rate,
            duration_ms,
            relative_to_direct: false,
        }
    }

    /// Sample range `[start, end)` of this window in a signal of `len`
    /// samples whose direct sound sits at `direct`
    pub fn resolve(&self, len: usize, direct: usize, sample_rate: f64) -> Result<(usize, usize)> {
        if len == 0 {
            return Err(AnalysisError::invalid("cannot window an empty signal"));
        }
        let offset = (sample_rate * self.start_ms / 1000.0).floor() as i64;
        let origin = if self.relative_to_direct { direct as i64 } else { 0 };
        let last = len as i64 - 1;
        let start = (origin + offset).clamp(0, last) as usize;

        let duration = (sample_rate * self.duration_ms / 1000.0).floor().max(0.0) as usize;
        let end = (start + duration).min(len - 1);
        if end <= start {
            return Err(AnalysisError::degenerate(start, end, "spatio-temporal map window"));
        }
        Ok((start, end))
    }
}

/// Angular energy distribution of one time window
#[derive(Debug, Clone, Serialize)]
pub struct SpatioTemporalMap {
    pub plane: Plane,
    /// Presentation angles in radians, one per bin
    pub angles: Vec<f64>,
    /// Bin levels in dB (floored at -60 dB)
    pub levels_db: Vec<f64>,
    pub start_sample: usize,
    pub end_sample: usize,
}

/// Polar summary of a normalised map
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OffCentre {
    pub radius: f64,
    pub angle: f64,
}

impl SpatioTemporalMap {
    /// Levels shifted so the loudest bin sits at 0 dB
    pub fn normalised_levels(&self) -> Vec<f64> {
        let peak = self
            .levels_db
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        self.levels_db.iter().map(|l| l - peak).collect()
    }

    fn normalised_linear(&self) -> Vec<f64> {
        self.normalised_levels()
            .into_iter()
            .map(|l| 10f64.powf(l / 10.0))
            .collect()
    }

    /// `1 - mean(linear normalised energy)`: 0 for an even spread, close to 1
    /// when one direction dominates
    pub fn narrowness(&self) -> f64 {
        let linear = self.normalised_linear();
        if linear.is_empty() {
            return 0.0;
        }
        1.0 - linear.iter().sum::<f64>() / linear.len() as f64
    }

    /// Mean of the bins as Cartesian points (radius = normalised linear
    /// energy), converted back to polar
    pub fn off_centre(&self) -> OffCentre {
        let linear = self.normalised_linear();
        let n = linear.len().max(1) as f64;
        let (sx, sy) = linear
            .iter()
            .zip(&self.angles)
            .fold((0.0, 0.0), |(sx, sy), (r, a)| (sx + r * a.cos(), sy + r * a.sin()));
        let (x, y) = (sx / n, sy / n);
        OffCentre {
            radius: x.hypot(y),
            angle: y.atan2(x),
        }
    }
}

/// Build a map directly from a spatial signal
pub fn spatio_temporal_map(
    signal: &SpatialSignal,
    sample_rate: f64,
    window: &MapWindow,
    plane: Plane,
    num_bins: usize,
    smoothing: usize,
    doa_window: usize,
) -> Result<SpatioTemporalMap> {
    let trajectory = doa_trajectory(signal, doa_window)?;
    map_from_trajectory(signal, &trajectory, sample_rate, window, plane, num_bins, smoothing)
}

/// Build a map from a precomputed trajectory of the same signal
pub fn map_from_trajectory(
    signal: &SpatialSignal,
    trajectory: &DoaTrajectory,
    sample_rate: f64,
    window: &MapWindow,
    plane: Plane,
    num_bins: usize,
    smoothing: usize,
) -> Result<SpatioTemporalMap> {
    if num_bins == 0 {
        return Err(AnalysisError::config("map needs at least one angle bin"));
    }
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(AnalysisError::invalid(format!(
            "sample rate must be positive, got {}",
            sample_rate
        )));
    }
    if trajectory.len() != signal.len() {
        return Err(AnalysisError::invalid(format!(
            "trajectory has {} samples, signal has {}",
            trajectory.len(),
            signal.len()
        )));
    }

    let omni = signal.omni();
    let direct = crate::dsp::spectrum::argmax_abs(omni);
    let (start, end) = window.resolve(signal.len(), direct, sample_rate)?;

    let mut bins = vec![0.0; num_bins];
    for i in start..end {
        let (azimuth, elevation) = plane.project(trajectory.directions[i]);
        let azimuth = azimuth + AZIMUTH_OFFSET;
        let contribution = omni[i] * omni[i] * elevation.cos().abs();
        if !(azimuth.is_finite() && contribution.is_finite()) {
            continue;
        }
        let position = ((azimuth + PI) / (2.0 * PI) * num_bins as f64).round_ties_even();
        let bin = (position as i64).rem_euclid(num_bins as i64) as usize;
        bins[bin] += contribution;
    }

    let smoothed = if smoothing > 1 {
        smooth_circular(&bins, smoothing, SmoothingKernel::Boxcar)?
    } else {
        bins
    };
    let levels_db = smoothed
        .iter()
        .map(|&e| 10.0 * e.max(ENERGY_FLOOR).log10())
        .collect();

    let step = 2.0 * PI / num_bins as f64;
    let angles = (0..num_bins).map(|k| PI - (-PI + step * k as f64)).collect();

    debug!(%plane, start, end, num_bins, "built spatio-temporal map");
    Ok(SpatioTemporalMap {
        plane,
        angles,
        levels_db,
        start_sample: start,
        end_sample: end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f64 = 48000.0;

    /// Decaying clicks arriving from a single direction
    fn plane_wave(direction: [f64; 3], len: usize) -> SpatialSignal {
        let omni: Vec<f64> = (0..len)
            .map(|i| (-(i as f64) / 2000.0).exp() * if i % 3 == 0 { 1.0 } else { 0.3 })
            .collect();
        let axis = |k: usize| omni.iter().map(|w| w * direction[k]).collect::<Vec<_>>();
        SpatialSignal::new(omni.clone(), axis(0), axis(1), axis(2)).unwrap()
    }

    fn loudest_bin(map: &SpatioTemporalMap) -> usize {
        map.levels_db
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (i, &l)| if l > acc.1 { (i, l) } else { acc })
            .0
    }

    fn whole_signal() -> MapWindow {
        MapWindow {
            start_ms: 0.0,
            duration_ms: 100.0,
            relative_to_direct: true,
        }
    }

    // ==========================================================================
    // PLANES
    // ==========================================================================

    #[test]
    fn test_plane_parsing_is_strict() {
        assert_eq!("median".parse::<Plane>().unwrap(), Plane::Median);
        assert_eq!(" Lateral ".parse::<Plane>().unwrap(), Plane::Lateral);
        assert!(matches!(
            "sagittal".parse::<Plane>(),
            Err(AnalysisError::Configuration(_))
        ));
        assert_eq!(Plane::Transverse.to_string(), "transverse");
    }

    #[test]
    fn test_plane_projections() {
        let (az, el) = Plane::Lateral.project([0.0, 1.0, 0.0]);
        assert!((az - PI / 2.0).abs() < 1e-12 && el.abs() < 1e-12);

        // Median maps +Z onto the azimuthal axis
        let (az, el) = Plane::Median.project([0.0, 0.0, 1.0]);
        assert!((az - PI / 2.0).abs() < 1e-12 && el.abs() < 1e-12);

        // Transverse maps +Z onto x and adds a quarter turn
        let (az, _) = Plane::Transverse.project([0.0, 0.0, 1.0]);
        assert!((az - PI / 2.0).abs() < 1e-12);
    }

    // ==========================================================================
    // WINDOW RESOLUTION
    // ==========================================================================

    #[test]
    fn test_window_relative_to_direct() {
        let w = MapWindow {
            start_ms: -1.0,
            duration_ms: 10.0,
            relative_to_direct: true,
        };
        assert_eq!(w.resolve(10000, 1000, FS).unwrap(), (952, 1432));
        // Clamped at the signal start
        assert_eq!(w.resolve(10000, 10, FS).unwrap(), (0, 480));
    }

    #[test]
    fn test_window_absolute_and_clamped_end() {
        let w = MapWindow {
            start_ms: 100.0,
            duration_ms: 1000.0,
            relative_to_direct: false,
        };
        assert_eq!(w.resolve(10000, 500, FS).unwrap(), (4800, 9999));
    }

    #[test]
    fn test_window_at_sample_is_exact() {
        for start in [0, 1, 47, 4799, 123_457] {
            let w = MapWindow::at_sample(start, 10.0, FS);
            assert_eq!(w.resolve(1_000_000, 0, FS).unwrap(), (start, start + 480));
        }
    }

    #[test]
    fn test_window_past_end_is_degenerate() {
        let w = MapWindow {
            start_ms: 500.0,
            duration_ms: 10.0,
            relative_to_direct: false,
        };
        assert!(matches!(
            w.resolve(1000, 0, FS),
            Err(AnalysisError::DegenerateWindow { .. })
        ));
    }

    // ==========================================================================
    // MAPS
    // ==========================================================================

    #[test]
    fn test_angle_axis() {
        let signal = plane_wave([1.0, 0.0, 0.0], 9600);
        let map = spatio_temporal_map(&signal, FS, &whole_signal(), Plane::Lateral, 4, 1, 5)
            .unwrap();

        let expected = [2.0 * PI, 1.5 * PI, PI, 0.5 * PI];
        for (a, e) in map.angles.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{} vs {}", a, e);
        }
    }

    #[test]
    fn test_single_direction_fills_one_bin() {
        let signal = plane_wave([0.0, 1.0, 0.0], 9600);
        let map = spatio_temporal_map(&signal, FS, &whole_signal(), Plane::Lateral, 8, 1, 5)
            .unwrap();

        // azimuth pi/2 + pi -> (3pi/2 + pi) / 2pi * 8 = 10 -> bin 2
        assert_eq!(loudest_bin(&map), 2);
        let floor_bins = map.levels_db.iter().filter(|&&l| (l + 60.0).abs() < 1e-9).count();
        assert_eq!(floor_bins, 7);
        assert!(map.narrowness() > 0.8, "narrowness {}", map.narrowness());
    }

    #[test]
    fn test_smoothing_spreads_to_neighbours() {
        let signal = plane_wave([0.0, 1.0, 0.0], 9600);
        let map = spatio_temporal_map(&signal, FS, &whole_signal(), Plane::Lateral, 8, 3, 5)
            .unwrap();

        let levels = map.normalised_levels();
        assert!(levels[1].abs() < 1e-9 && levels[2].abs() < 1e-9 && levels[3].abs() < 1e-9);
    }

    #[test]
    fn test_vertical_arrivals_carry_no_weight() {
        // Straight up in the lateral plane: |cos(elevation)| = 0
        let signal = plane_wave([0.0, 0.0, 1.0], 4800);
        let map = spatio_temporal_map(&signal, FS, &whole_signal(), Plane::Lateral, 16, 1, 5)
            .unwrap();

        assert!(map.levels_db.iter().all(|&l| l < -59.0));
    }

    #[test]
    fn test_undefined_directions_are_skipped() {
        let zeros = vec![0.0; 4800];
        let mut omni = vec![0.0; 4800];
        omni[0] = 1.0;
        omni[100] = 0.5;
        let signal = SpatialSignal::new(omni, zeros.clone(), zeros.clone(), zeros).unwrap();
        let map = spatio_temporal_map(&signal, FS, &whole_signal(), Plane::Median, 16, 3, 5)
            .unwrap();

        assert!(map.levels_db.iter().all(|l| l.is_finite()));
        assert!(map.levels_db.iter().all(|&l| (l + 60.0).abs() < 1e-9));
    }

    #[test]
    fn test_even_spread_is_not_narrow() {
        let map = SpatioTemporalMap {
            plane: Plane::Lateral,
            angles: vec![0.0, PI / 2.0, PI, 1.5 * PI],
            levels_db: vec![-3.0; 4],
            start_sample: 0,
            end_sample: 1,
        };
        assert!(map.narrowness().abs() < 1e-12);
        assert!(map.off_centre().radius < 1e-12);
    }

    #[test]
    fn test_off_centre_points_at_the_loud_side() {
        let map = SpatioTemporalMap {
            plane: Plane::Lateral,
            angles: vec![0.0, PI / 2.0, PI, 1.5 * PI],
            levels_db: vec![0.0, -60.0, -60.0, -60.0],
            start_sample: 0,
            end_sample: 1,
        };
        let oc = map.off_centre();
        assert!(oc.angle.abs() < 1e-3, "angle {}", oc.angle);
        assert!((oc.radius - 0.25).abs() < 1e-3);
    }
}
