//! Energy decay curve (Schroeder integration) and reverberation time
//!
//! The energy decay curve (EDC) is the backwards-integrated energy of an
//! impulse response, normalised by the total energy and expressed in dB:
//!
//! ```text
//! EDC[i] = 10 * log10( sum(x[i..]^2) / sum(x^2) )
//! ```
//!
//! It starts at 0 dB and falls as the tail of the response runs out of
//! energy. Every feature in this crate picks its analysis windows by finding
//! where the EDC crosses a given level, so the "closest level" lookup below
//! is the workhorse of the whole pipeline.
//!
//! Trailing digital silence integrates to zero and shows up as `-inf`; no
//! clipping is applied here, consumers clip as needed.

use std::ops::Range;

use tracing::debug;

use crate::error::{check_signal, AnalysisError, Result};

/// Energy decay curve with its time axis
#[derive(Debug, Clone)]
pub struct EnergyDecayCurve {
    /// Level in dB relative to the total energy, one per input sample
    pub levels_db: Vec<f64>,
    /// Time of each level in seconds (`index / sample_rate`)
    pub times_s: Vec<f64>,
    sample_rate: f64,
}

impl EnergyDecayCurve {
    /// Compute the Schroeder decay of a mono signal
    pub fn compute(signal: &[f64], sample_rate: f64) -> Result<Self> {
        check_signal(signal, sample_rate)?;

        let total: f64 = signal.iter().map(|&x| x * x).sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(AnalysisError::invalid(
                "signal has zero total energy, decay curve is undefined",
            ));
        }

        let mut levels_db = vec![0.0; signal.len()];
        let mut acc = 0.0;
        for (i, &x) in signal.iter().enumerate().rev() {
            acc += x * x;
            levels_db[i] = 10.0 * (acc / total).log10();
        }

        let times_s = (0..signal.len())
            .map(|i| i as f64 / sample_rate)
            .collect();

        Ok(Self {
            levels_db,
            times_s,
            sample_rate,
        })
    }

    pub fn len(&self) -> usize {
        self.levels_db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels_db.is_empty()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Index whose level is closest to `level_db`
    pub fn index_of_closest(&self, level_db: f64) -> usize {
        index_of_closest(&self.levels_db, level_db)
    }

    /// Time in seconds at which the curve is closest to `level_db`
    pub fn time_of_closest(&self, level_db: f64) -> f64 {
        self.times_s[self.index_of_closest(level_db)]
    }

    /// Sample range between the points closest to two levels.
    ///
    /// Fails with `DegenerateWindow` when the end does not come strictly
    /// after the start, e.g. when the decay never reaches `end_db`.
    pub fn window(&self, start_db: f64, end_db: f64, context: &str) -> Result<Range<usize>> {
        let start = self.index_of_closest(start_db);
        let end = self.index_of_closest(end_db);
        if end <= start {
            return Err(AnalysisError::degenerate(start, end, context));
        }
        Ok(start..end)
    }

    /// Decay gradient in dB/s between the points closest to two levels.
    ///
    /// Uses the nominal levels over the time between their closest points,
    /// so the result is independent of how finely the curve is sampled.
    pub fn gradient(&self, start_db: f64, end_db: f64, context: &str) -> Result<f64> {
        let start = self.index_of_closest(start_db);
        let end = self.index_of_closest(end_db);
        if start == end {
            return Err(AnalysisError::degenerate(start, end, context));
        }
        let dt = self.times_s[end] - self.times_s[start];
        Ok((end_db - start_db) / dt)
    }

    /// Time for a 60 dB decay extrapolated from the slope between two levels
    pub fn reverberation_time(&self, start_db: f64, end_db: f64) -> Result<f64> {
        let gradient = self.gradient(start_db, end_db, "reverberation time")?;
        let rt = -60.0 / gradient;
        debug!(start_db, end_db, rt, "estimated reverberation time");
        Ok(rt)
    }
}

/// Index of the element closest to `target`.
///
/// Ties resolve to the earliest index. NaN entries never win; an input made
/// only of NaN (or empty) returns 0.
pub fn index_of_closest(values: &[f64], target: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &v) in values.iter().enumerate() {
        let dist = (v - target).abs();
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

/// Index of the first element at or below `level`, or the closest one if the
/// values never get that low
pub fn first_at_or_below(values: &[f64], level: f64) -> usize {
    values
        .iter()
        .position(|&v| v <= level)
        .unwrap_or_else(|| index_of_closest(values, level))
}

/// Convenience wrapper returning `(levels_db, times_s)`
pub fn compute_edc(signal: &[f64], sample_rate: f64) -> Result<(Vec<f64>, Vec<f64>)> {
    let edc = EnergyDecayCurve::compute(signal, sample_rate)?;
    Ok((edc.levels_db, edc.times_s))
}

/// Estimate RT60 from the EDC slope between `start_db` and `end_db`.
///
/// The two levels may be given in either order. Fails when both land on the
/// same sample.
pub fn estimate_rt(signal: &[f64], sample_rate: f64, start_db: f64, end_db: f64) -> Result<f64> {
    EnergyDecayCurve::compute(signal, sample_rate)?.reverberation_time(start_db, end_db)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // SYNTHETIC DECAYS
    // ==========================================================================
    //
    // exp(-t / tau) has energy exp(-2t / tau), i.e. a decay of
    // 20 * log10(e) / tau = 8.686 / tau dB per second. A 60 dB drop therefore
    // takes 60 * tau / 8.686 = 6.908 * tau seconds.
    // ==========================================================================

    fn exponential(tau: f64, sample_rate: f64, seconds: f64) -> Vec<f64> {
        let n = (sample_rate * seconds) as usize;
        (0..n)
            .map(|i| (-(i as f64 / sample_rate) / tau).exp())
            .collect()
    }

    #[test]
    fn test_constant_signal_starts_at_zero_db() {
        let signal = vec![0.5; 1000];
        let edc = EnergyDecayCurve::compute(&signal, 1000.0).unwrap();

        assert!(edc.levels_db[0].abs() < 1e-12, "got {}", edc.levels_db[0]);
        assert_eq!(edc.len(), signal.len());
        assert_eq!(edc.times_s[500], 0.5);
    }

    #[test]
    fn test_front_loaded_energy_is_non_increasing() {
        let signal = exponential(0.1, 8000.0, 1.0);
        let edc = EnergyDecayCurve::compute(&signal, 8000.0).unwrap();

        for pair in edc.levels_db.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12, "EDC increased: {:?}", pair);
        }
    }

    #[test]
    fn test_constant_signal_matches_closed_form() {
        // Remaining energy fraction at i is (N - i) / N
        let n = 100;
        let signal = vec![1.0; n];
        let edc = EnergyDecayCurve::compute(&signal, 100.0).unwrap();

        let expected = 10.0 * (50.0f64 / 100.0).log10();
        assert!((edc.levels_db[50] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_silence_is_negative_infinity() {
        let signal = vec![1.0, 0.5, 0.0, 0.0];
        let edc = EnergyDecayCurve::compute(&signal, 4.0).unwrap();

        assert!(edc.levels_db[3].is_infinite() && edc.levels_db[3] < 0.0);
        // The lookup still works around -inf entries
        assert_eq!(edc.index_of_closest(0.0), 0);
    }

    #[test]
    fn test_rejects_empty_and_silent_input() {
        assert!(matches!(
            EnergyDecayCurve::compute(&[], 48000.0),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(matches!(
            EnergyDecayCurve::compute(&[0.0; 64], 48000.0),
            Err(AnalysisError::InvalidInput(_))
        ));
        assert!(EnergyDecayCurve::compute(&[1.0], -1.0).is_err());
    }

    // ==========================================================================
    // CLOSEST-LEVEL LOOKUP
    // ==========================================================================

    #[test]
    fn test_index_of_closest() {
        let values = [0.0, -3.0, -6.0, -9.0];
        assert_eq!(index_of_closest(&values, -5.0), 2);
        assert_eq!(index_of_closest(&values, 10.0), 0);
        assert_eq!(index_of_closest(&values, -100.0), 3);
    }

    #[test]
    fn test_index_of_closest_ties_pick_first() {
        let values = [1.0, -1.0, 1.0];
        assert_eq!(index_of_closest(&values, 0.0), 0);
    }

    #[test]
    fn test_index_of_closest_skips_nan() {
        let values = [f64::NAN, -2.0, f64::NAN];
        assert_eq!(index_of_closest(&values, -2.0), 1);
    }

    #[test]
    fn test_first_at_or_below() {
        let values = [-10.0, -40.0, -70.0, -50.0];
        assert_eq!(first_at_or_below(&values, -60.0), 2);
        // Never reached: fall back to the closest value
        assert_eq!(first_at_or_below(&values, -80.0), 2);
    }

    // ==========================================================================
    // REVERBERATION TIME
    // ==========================================================================

    #[test]
    fn test_rt_recovers_exponential_decay() {
        let tau = 0.1;
        let sample_rate = 16000.0;
        let signal = exponential(tau, sample_rate, 2.0);

        for (start, end) in [(-5.0, -35.0), (-5.0, -25.0), (-10.0, -40.0)] {
            let rt = estimate_rt(&signal, sample_rate, start, end).unwrap();
            let expected = 6.908 * tau;
            assert!(
                (rt - expected).abs() / expected < 0.01,
                "RT between {} and {} dB: {} vs {}",
                start,
                end,
                rt,
                expected
            );
        }
    }

    #[test]
    fn test_rt_accepts_swapped_levels() {
        let signal = exponential(0.1, 16000.0, 2.0);
        let forward = estimate_rt(&signal, 16000.0, -5.0, -35.0).unwrap();
        let swapped = estimate_rt(&signal, 16000.0, -35.0, -5.0).unwrap();

        assert!((forward - swapped).abs() < 1e-9);
    }

    #[test]
    fn test_rt_degenerate_when_points_coincide() {
        // A single impulse: every finite level sits on sample 0, the rest is -inf
        let signal = vec![1.0, 0.0, 0.0, 0.0];
        let result = estimate_rt(&signal, 4.0, -5.0, -35.0);

        assert!(matches!(result, Err(AnalysisError::DegenerateWindow { .. })));
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        let signal = exponential(0.05, 8000.0, 1.0);
        let edc = EnergyDecayCurve::compute(&signal, 8000.0).unwrap();

        assert!(edc.window(-5.0, -20.0, "forward").is_ok());
        assert!(matches!(
            edc.window(-20.0, -5.0, "inverted"),
            Err(AnalysisError::DegenerateWindow { .. })
        ));
    }
}
