//! Spatial asymmetry of the late reverberation
//!
//! The omni channel (high-passed at 500 Hz) gives the decay curve. The points
//! where it crosses -10, -20, -30 and -40 dB start one late-energy window
//! each, and the -45 dB point bounds the analysed signal. For every start
//! and every plane a spatio-temporal map is built, normalised to a 0 dB peak
//! and reduced to
//!
//! - narrowness: `1 - mean(10^(L / 10))`
//! - off-centre vector: mean of the bins as Cartesian points, back in polar
//!
//! The score is `mean(median narrowness) - max(lateral narrowness)`. Both the
//! sign and the aggregation were picked empirically and have not been
//! validated on held-out data.

use serde::Serialize;
use tracing::debug;

use crate::config::AsymmetryConfig;
use crate::dsp::edc::EnergyDecayCurve;
use crate::dsp::filter::SosFilter;
use crate::dsp::spectrum::{max, mean};
use crate::error::{AnalysisError, Result};
use crate::spatial::doa::doa_trajectory;
use crate::spatial::map::{map_from_trajectory, MapWindow, OffCentre, Plane};
use crate::spatial::SpatialSignal;

/// Narrowness and direction of one map
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlaneWindowScore {
    pub plane: Plane,
    pub start_level_db: f64,
    pub start_sample: usize,
    pub narrowness: f64,
    pub off_centre: OffCentre,
}

#[derive(Debug, Clone, Serialize)]
pub struct AsymmetryResult {
    pub score: f64,
    /// Sample where the late-energy region ends (the end-level crossing)
    pub end_sample: usize,
    pub maps: Vec<PlaneWindowScore>,
}

impl AsymmetryResult {
    pub fn narrowness(&self, plane: Plane) -> Vec<f64> {
        self.maps
            .iter()
            .filter(|m| m.plane == plane)
            .map(|m| m.narrowness)
            .collect()
    }
}

fn window_ms(config: &AsymmetryConfig, plane: Plane) -> f64 {
    match plane {
        Plane::Lateral => config.lateral_window_ms,
        Plane::Median => config.median_window_ms,
        Plane::Transverse => config.transverse_window_ms,
    }
}

/// Spatial asymmetry of a first-order spatial response
pub fn spatial_asymmetry(
    signal: &SpatialSignal,
    sample_rate: f64,
    config: &AsymmetryConfig,
    doa_window: usize,
) -> Result<AsymmetryResult> {
    let filter = SosFilter::highpass(config.highpass_order, config.highpass_hz, sample_rate)?;
    let omni = filter.filter(signal.omni());
    let edc = EnergyDecayCurve::compute(&omni, sample_rate)?;

    let end_sample = edc.index_of_closest(config.end_level_db);
    let starts: Vec<(f64, usize)> = config
        .start_levels_db
        .iter()
        .map(|&level| (level, edc.index_of_closest(level)))
        .collect();
    if let Some(&(level, start)) = starts.iter().find(|(_, s)| *s >= end_sample) {
        return Err(AnalysisError::degenerate(
            start,
            end_sample,
            format!("asymmetry window from {} dB", level),
        ));
    }

    // Nothing below the end level reaches a map: cut there, then zero-pad so
    // the longest window still fits
    let longest_ms = Plane::ALL
        .iter()
        .map(|&p| window_ms(config, p))
        .fold(0.0, f64::max);
    let padding = (sample_rate * longest_ms / 1000.0).ceil() as usize;
    let late = signal
        .resized(end_sample + 1)?
        .resized(end_sample + padding + 1)?;
    let trajectory = doa_trajectory(&late, doa_window)?;
    debug!(end_sample, padding, "asymmetry late-energy region");

    let mut maps = Vec::with_capacity(starts.len() * Plane::ALL.len());
    for &(level, start) in &starts {
        for plane in Plane::ALL {
            let window = MapWindow::at_sample(start, window_ms(config, plane), sample_rate);
            let map = map_from_trajectory(
                &late,
                &trajectory,
                sample_rate,
                &window,
                plane,
                config.num_bins,
                config.smoothing,
            )?;
            maps.push(PlaneWindowScore {
                plane,
                start_level_db: level,
                start_sample: start,
                narrowness: map.narrowness(),
                off_centre: map.off_centre(),
            });
        }
    }

    let mut result = AsymmetryResult {
        score: 0.0,
        end_sample,
        maps,
    };
    let median = result.narrowness(Plane::Median);
    let lateral = result.narrowness(Plane::Lateral);
    result.score = mean(&median) - max(&lateral);
    debug!(score = result.score, "spatial asymmetry");
    Ok(result)
}

/// Asymmetry score of planar channels with default parameters
pub fn spatial_asymmetry_score(channels: &[Vec<f64>], sample_rate: f64) -> Result<f64> {
    let signal = SpatialSignal::from_channels(channels)?;
    let config = AsymmetryConfig::default();
    Ok(spatial_asymmetry(&signal, sample_rate, &config, crate::spatial::doa::MIN_WINDOW)?.score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    const FS: f64 = 48000.0;

    /// Decaying noise; every sample arrives from `direction(i)`
    fn spatial_decay(seed: u64, direction: impl Fn(usize) -> [f64; 3]) -> SpatialSignal {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let n = (FS * 1.0) as usize;
        let omni: Vec<f64> = (0..n)
            .map(|i| normal.sample(&mut rng) * (-6.91 * i as f64 / FS / 0.4).exp())
            .collect();
        let axis = |k: usize| -> Vec<f64> {
            omni.iter()
                .enumerate()
                .map(|(i, w)| w * direction(i)[k])
                .collect()
        };
        SpatialSignal::new(omni.clone(), axis(0), axis(1), axis(2)).unwrap()
    }

    #[test]
    fn test_produces_every_plane_and_window() {
        let signal = spatial_decay(1, |_| [1.0, 0.0, 0.0]);
        let result = spatial_asymmetry(&signal, FS, &AsymmetryConfig::default(), 5).unwrap();

        assert_eq!(result.maps.len(), 12);
        for plane in Plane::ALL {
            assert_eq!(result.narrowness(plane).len(), 4);
        }
        let starts: Vec<usize> = result.maps.iter().step_by(3).map(|m| m.start_sample).collect();
        assert!(starts.windows(2).all(|w| w[1] > w[0]), "{:?}", starts);
        assert!(result.maps.iter().all(|m| m.narrowness >= 0.0 && m.narrowness <= 1.0));
    }

    #[test]
    fn test_single_direction_is_narrow() {
        // Everything from +X: one bin in the lateral and median planes
        let signal = spatial_decay(2, |_| [1.0, 0.0, 0.0]);
        let result = spatial_asymmetry(&signal, FS, &AsymmetryConfig::default(), 5).unwrap();

        for n in result.narrowness(Plane::Lateral) {
            assert!(n > 0.95, "lateral narrowness {}", n);
        }
        // Median narrowness equals lateral here, so the score is not positive
        assert!(result.score <= 1e-9, "score {}", result.score);
    }

    #[test]
    fn test_scattered_arrivals_are_wide() {
        let mut rng = StdRng::seed_from_u64(99);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let directions: Vec<[f64; 3]> = (0..48000)
            .map(|_| {
                let v: [f64; 3] = [
                    normal.sample(&mut rng),
                    normal.sample(&mut rng),
                    normal.sample(&mut rng),
                ];
                let n = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
                [v[0] / n, v[1] / n, v[2] / n]
            })
            .collect();
        let diffuse = spatial_decay(3, |i| directions[i]);
        let focused = spatial_decay(3, |_| [0.0, 1.0, 0.0]);

        let config = AsymmetryConfig::default();
        let wide = spatial_asymmetry(&diffuse, FS, &config, 5).unwrap();
        let narrow = spatial_asymmetry(&focused, FS, &config, 5).unwrap();

        let wide_lateral = mean(&wide.narrowness(Plane::Lateral));
        let narrow_lateral = mean(&narrow.narrowness(Plane::Lateral));
        assert!(
            wide_lateral < narrow_lateral,
            "diffuse {} vs focused {}",
            wide_lateral,
            narrow_lateral
        );
    }

    #[test]
    fn test_late_energy_stops_at_end_level() {
        // Arrivals alternate between +X and +Y every 10 ms
        let signal = spatial_decay(4, |i| {
            if (i / 480) % 2 == 0 {
                [1.0, 0.0, 0.0]
            } else {
                [0.0, 1.0, 0.0]
            }
        });
        let config = AsymmetryConfig::default();
        let result = spatial_asymmetry(&signal, FS, &config, 5).unwrap();

        // Rebuild every map from a copy silenced after the end point
        let silenced = signal
            .resized(result.end_sample + 1)
            .unwrap()
            .resized(signal.len())
            .unwrap();
        let trajectory = doa_trajectory(&silenced, 5).unwrap();
        for m in &result.maps {
            let window = MapWindow::at_sample(m.start_sample, window_ms(&config, m.plane), FS);
            let map = map_from_trajectory(
                &silenced,
                &trajectory,
                FS,
                &window,
                m.plane,
                config.num_bins,
                config.smoothing,
            )
            .unwrap();
            assert!(
                (map.narrowness() - m.narrowness).abs() < 1e-12,
                "{} at {} dB: {} vs {}",
                m.plane,
                m.start_level_db,
                map.narrowness(),
                m.narrowness
            );
        }
    }

    #[test]
    fn test_requires_four_channels() {
        let channels = vec![vec![1.0; 100]; 2];
        assert!(matches!(
            spatial_asymmetry_score(&channels, FS),
            Err(AnalysisError::InvalidInput(_))
        ));
    }
}
