//! Spectra, log-frequency resampling and edge-aware smoothing
//!
//! ## Log-frequency resampling
//!
//! A half spectrum of `n` bins is taken to span `linspace(0, nyquist, n)`.
//! The DC bin is dropped and the remaining `n - 1` points are linearly
//! interpolated onto `n` log-spaced frequencies between `min_hz` and
//! `max_hz`. Queries outside the linear axis read as `0.0`.
//!
//! ## Mirrored smoothing
//!
//! A plain windowed filter drags the ends of a spectrum towards zero. Before
//! filtering, `window` samples are mirrored onto each end:
//!
//! ```text
//! [x_w .. x_1] [x_0 x_1 .. x_{n-1}] [x_{n-1} .. x_{n-w}]
//! ```
//!
//! the padded array is convolved (centred, same length) and the padding is
//! stripped again. Circular smoothing instead wraps the other end around,
//! which suits angular data.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::error::{check_signal, AnalysisError, Result};

/// Floor applied to magnitudes before taking logarithms
pub const MAGNITUDE_FLOOR: f64 = 1e-12;

// ============================================================================
// FFT
// ============================================================================

/// Magnitude of the real FFT of `signal`, zero-padded or truncated to
/// `fft_size` samples. Returns `fft_size / 2 + 1` bins from DC to Nyquist.
pub fn magnitude_spectrum(signal: &[f64], fft_size: usize) -> Vec<f64> {
    if fft_size == 0 {
        return Vec::new();
    }
    let mut buffer: Vec<Complex<f64>> = signal
        .iter()
        .take(fft_size)
        .map(|&x| Complex::new(x, 0.0))
        .collect();
    buffer.resize(fft_size, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut buffer);

    buffer[..fft_size / 2 + 1].iter().map(|c| c.norm()).collect()
}

/// Bin frequencies of a `fft_size`-point real FFT
pub fn rfft_frequencies(fft_size: usize, sample_rate: f64) -> Vec<f64> {
    (0..fft_size / 2 + 1)
        .map(|k| k as f64 * sample_rate / fft_size as f64)
        .collect()
}

/// `20 * log10(|x|)` with the magnitude floored at [`MAGNITUDE_FLOOR`]
pub fn amplitude_db(magnitudes: &[f64]) -> Vec<f64> {
    magnitudes
        .iter()
        .map(|&m| 20.0 * m.abs().max(MAGNITUDE_FLOOR).log10())
        .collect()
}

/// `10 * log10(|x|)` with the magnitude floored at [`MAGNITUDE_FLOOR`]
pub fn power_db(magnitudes: &[f64]) -> Vec<f64> {
    magnitudes
        .iter()
        .map(|&m| 10.0 * m.abs().max(MAGNITUDE_FLOOR).log10())
        .collect()
}

// ============================================================================
// INTERPOLATION AND RESAMPLING
// ============================================================================

/// Spectrum sampled on a log-spaced frequency axis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSpectrum {
    pub magnitudes: Vec<f64>,
    pub frequencies: Vec<f64>,
}

impl LogSpectrum {
    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Number of octaves between the first and last frequency
    pub fn octaves(&self) -> f64 {
        match (self.frequencies.first(), self.frequencies.last()) {
            (Some(&lo), Some(&hi)) if lo > 0.0 => (hi / lo).log2(),
            _ => 0.0,
        }
    }
}

/// `n` evenly spaced points from `start` to `end` inclusive
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// `n` log-spaced points from `start` to `end` inclusive (both positive).
/// The end points are exact so an axis ending at Nyquist stays in range.
pub fn logspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    let mut points: Vec<f64> = linspace(start.log10(), end.log10(), n)
        .into_iter()
        .map(|e| 10f64.powf(e))
        .collect();
    if let Some(first) = points.first_mut() {
        *first = start;
    }
    if n > 1 {
        if let Some(last) = points.last_mut() {
            *last = end;
        }
    }
    points
}

/// Piecewise-linear interpolation of `(xs, ys)` at `x`.
///
/// `xs` must be increasing. Queries outside `[xs[0], xs[last]]` return `fill`.
pub fn interpolate(xs: &[f64], ys: &[f64], x: f64, fill: f64) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 || !(x >= xs[0] && x <= xs[n - 1]) {
        return fill;
    }
    // First index with xs[i] >= x
    let upper = xs[..n].partition_point(|&v| v < x);
    if upper == 0 {
        return ys[0];
    }
    let lower = upper - 1;
    let span = xs[upper] - xs[lower];
    if span <= 0.0 {
        return ys[upper];
    }
    let t = (x - xs[lower]) / span;
    ys[lower] + t * (ys[upper] - ys[lower])
}

/// Stretch or squeeze a sequence to `new_len` points by linear interpolation
/// over its index
pub fn resample(values: &[f64], new_len: usize) -> Vec<f64> {
    match (values.len(), new_len) {
        (_, 0) => Vec::new(),
        (0, _) => vec![0.0; new_len],
        (1, _) => vec![values[0]; new_len],
        (_, 1) => vec![values[0]],
        (len, _) => {
            let delta = (len - 1) as f64 / (new_len - 1) as f64;
            (0..new_len)
                .map(|i| {
                    let pos = i as f64 * delta;
                    let whole = (pos.floor() as usize).min(len - 1);
                    let frac = pos - whole as f64;
                    let next = (whole + 1).min(len - 1);
                    (1.0 - frac) * values[whole] + frac * values[next]
                })
                .collect()
        }
    }
}

/// Resample a DC-to-Nyquist half spectrum onto log-spaced frequencies
pub fn linear_to_log(
    magnitudes: &[f64],
    sample_rate: f64,
    min_hz: f64,
    max_hz: f64,
) -> Result<LogSpectrum> {
    if magnitudes.len() < 2 {
        return Err(AnalysisError::invalid(format!(
            "need at least two spectrum bins, got {}",
            magnitudes.len()
        )));
    }
    check_signal(magnitudes, sample_rate)?;
    if !(min_hz > 0.0 && max_hz > min_hz) {
        return Err(AnalysisError::config(format!(
            "log axis needs 0 < min < max, got {} to {} Hz",
            min_hz, max_hz
        )));
    }

    let n = magnitudes.len();
    let linear_freqs = linspace(0.0, sample_rate / 2.0, n);
    let (xs, ys) = (&linear_freqs[1..], &magnitudes[1..]);

    let frequencies = logspace(min_hz, max_hz, n);
    let magnitudes = frequencies
        .iter()
        .map(|&f| interpolate(xs, ys, f, 0.0))
        .collect();

    Ok(LogSpectrum {
        magnitudes,
        frequencies,
    })
}

/// Resample a log-spaced spectrum back onto `num_bins` linear bins from DC to
/// Nyquist. Bins outside the log axis read as `0.0`.
pub fn log_to_linear(spectrum: &LogSpectrum, num_bins: usize, sample_rate: f64) -> Vec<f64> {
    linspace(0.0, sample_rate / 2.0, num_bins)
        .into_iter()
        .map(|f| interpolate(&spectrum.frequencies, &spectrum.magnitudes, f, 0.0))
        .collect()
}

/// Bins of a half spectrum between two frequencies.
///
/// Bin width is taken as `nyquist / len`, so indices are
/// `floor(f / bin_width)`, clamped to the spectrum.
pub fn truncate_spectrum(spectrum: &[f64], sample_rate: f64, min_hz: f64, max_hz: f64) -> &[f64] {
    let n = spectrum.len();
    if n == 0 {
        return spectrum;
    }
    let bin_width = sample_rate / 2.0 / n as f64;
    let index = |f: f64| ((f / bin_width).floor().max(0.0) as usize).min(n);
    let lo = index(min_hz);
    let hi = index(max_hz).max(lo);
    &spectrum[lo..hi]
}

/// Mean of the half-spectrum bins between two frequencies
pub fn mean_magnitude_between(
    spectrum: &[f64],
    sample_rate: f64,
    min_hz: f64,
    max_hz: f64,
) -> Result<f64> {
    let band = truncate_spectrum(spectrum, sample_rate, min_hz, max_hz);
    if band.is_empty() {
        return Err(AnalysisError::invalid(format!(
            "no spectrum bins between {} and {} Hz",
            min_hz, max_hz
        )));
    }
    Ok(mean(band))
}

// ============================================================================
// SMOOTHING
// ============================================================================

/// Smoothing kernel shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SmoothingKernel {
    /// Hamming window normalised to unit DC gain
    Hamming,
    /// Moving average
    Boxcar,
    /// Local least-squares polynomial of the given order
    SavitzkyGolay { order: usize },
}

impl SmoothingKernel {
    /// Convolution taps for an odd window length
    pub fn taps(&self, window: usize) -> Result<Vec<f64>> {
        if window == 0 || window % 2 == 0 {
            return Err(AnalysisError::config(format!(
                "smoothing window must be odd and positive, got {}",
                window
            )));
        }
        match *self {
            Self::Hamming => {
                if window == 1 {
                    return Ok(vec![1.0]);
                }
                let m = (window - 1) as f64;
                let w: Vec<f64> = (0..window)
                    .map(|i| 0.54 - 0.46 * (2.0 * std::f64::consts::PI * i as f64 / m).cos())
                    .collect();
                let sum: f64 = w.iter().sum();
                Ok(w.into_iter().map(|v| v / sum).collect())
            }
            Self::Boxcar => Ok(vec![1.0 / window as f64; window]),
            Self::SavitzkyGolay { order } => savgol_coefficients(window, order),
        }
    }
}

/// Largest odd number not above `n` (at least 1)
pub fn odd_at_most(n: usize) -> usize {
    match n {
        0 | 1 => 1,
        _ if n % 2 == 0 => n - 1,
        _ => n,
    }
}

/// Savitzky-Golay smoothing taps (centre point of a local polynomial fit).
///
/// Solves the normal equations of the Vandermonde system over
/// `-m..=m` and returns the row that evaluates the fit at 0.
pub fn savgol_coefficients(window: usize, order: usize) -> Result<Vec<f64>> {
    if window == 0 || window % 2 == 0 {
        return Err(AnalysisError::config(format!(
            "Savitzky-Golay window must be odd, got {}",
            window
        )));
    }
    if order >= window {
        return Err(AnalysisError::config(format!(
            "Savitzky-Golay order {} must be below window {}",
            order, window
        )));
    }

    let m = (window / 2) as f64;
    let p = order + 1;
    let powers = |x: f64| -> Vec<f64> {
        let mut out = Vec::with_capacity(p);
        let mut xk = 1.0;
        for _ in 0..p {
            out.push(xk);
            xk *= x;
        }
        out
    };

    // J^T J, augmented with the identity for Gauss-Jordan inversion
    let mut aug = vec![vec![0.0; 2 * p]; p];
    for i in 0..window {
        let row = powers(i as f64 - m);
        for r in 0..p {
            for c in 0..p {
                aug[r][c] += row[r] * row[c];
            }
        }
    }
    for (i, row) in aug.iter_mut().enumerate() {
        row[p + i] = 1.0;
    }

    for col in 0..p {
        let pivot_row = (col..p)
            .max_by(|&a, &b| aug[a][col].abs().total_cmp(&aug[b][col].abs()))
            .unwrap_or(col);
        aug.swap(col, pivot_row);
        let pivot = aug[col][col];
        if pivot.abs() < 1e-15 {
            return Err(AnalysisError::config(format!(
                "Savitzky-Golay system singular for window {} order {}",
                window, order
            )));
        }
        for v in aug[col].iter_mut() {
            *v /= pivot;
        }
        for r in 0..p {
            if r != col {
                let factor = aug[r][col];
                if factor != 0.0 {
                    for c in 0..2 * p {
                        aug[r][c] -= factor * aug[col][c];
                    }
                }
            }
        }
    }

    // Row 0 of (J^T J)^-1 J^T
    let coeffs = (0..window)
        .map(|i| {
            let row = powers(i as f64 - m);
            (0..p).map(|k| aug[0][p + k] * row[k]).sum()
        })
        .collect();
    Ok(coeffs)
}

/// Centred convolution of `data` with symmetric odd-length `taps`, only
/// producing outputs whose full support lies inside `data`
fn convolve_valid(data: &[f64], taps: &[f64]) -> Vec<f64> {
    if data.len() < taps.len() {
        return Vec::new();
    }
    data.windows(taps.len())
        .map(|w| w.iter().zip(taps.iter().rev()).map(|(x, t)| x * t).sum())
        .collect()
}

/// Smooth with mirrored edges.
///
/// `window` is forced odd and capped to the data length. The data is
/// extended by `window` mirrored samples at each end (fewer if the data is
/// shorter), filtered, and cut back to its original length.
pub fn smooth_mirrored(data: &[f64], window: usize, kernel: SmoothingKernel) -> Result<Vec<f64>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let n = data.len();
    let window = odd_at_most(window.min(n));
    let taps = kernel.taps(window)?;
    if window == 1 {
        return Ok(data.iter().map(|&x| x * taps[0]).collect());
    }

    let pad = window.min(n - 1);
    let half = window / 2;
    let mut padded = Vec::with_capacity(n + 2 * pad);
    padded.extend((1..=pad).rev().map(|i| data[i]));
    padded.extend_from_slice(data);
    padded.extend(data.iter().rev().take(pad));

    // `same`-mode convolution is the valid part shifted by half a window;
    // pad >= half keeps every kept output inside the padded data.
    let valid = convolve_valid(&padded, &taps);
    Ok(valid[pad - half..pad - half + n].to_vec())
}

/// Smooth data that wraps around (e.g. angular bins)
pub fn smooth_circular(data: &[f64], window: usize, kernel: SmoothingKernel) -> Result<Vec<f64>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let n = data.len();
    let window = odd_at_most(window.min(n));
    let taps = kernel.taps(window)?;
    let half = window / 2;

    let mut padded = Vec::with_capacity(n + 2 * half);
    padded.extend_from_slice(&data[n - half..]);
    padded.extend_from_slice(data);
    padded.extend_from_slice(&data[..half]);

    Ok(convolve_valid(&padded, &taps))
}

// ============================================================================
// STATISTICS
// ============================================================================

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    let mu = mean(values);
    let var = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

/// Index of the largest absolute value (first on ties)
pub fn argmax_abs(values: &[f64]) -> usize {
    let mut best = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, v) in values.iter().enumerate() {
        if v.abs() > best_val {
            best_val = v.abs();
            best = i;
        }
    }
    best
}

/// Copy of `signal` divided by its peak absolute value
pub fn normalise_peak(signal: &[f64]) -> Result<Vec<f64>> {
    let peak = signal.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
    if !(peak.is_finite() && peak > 0.0) {
        return Err(AnalysisError::invalid("cannot normalise a silent signal"));
    }
    Ok(signal.iter().map(|x| x / peak).collect())
}

// ============================================================================
// ENERGY-TIME CURVE
// ============================================================================

/// Mean-square energy in consecutive non-overlapping windows, in dB
#[derive(Debug, Clone)]
pub struct EnergyTimeCurve {
    pub levels_db: Vec<f64>,
    pub times_s: Vec<f64>,
    /// Rate of the curve itself: one value per window
    pub frame_rate: f64,
}

impl EnergyTimeCurve {
    /// Every complete window of `window_ms` contributes one value. Silent
    /// windows floor at [`MAGNITUDE_FLOOR`] before the log.
    pub fn compute(signal: &[f64], sample_rate: f64, window_ms: f64) -> Result<Self> {
        check_signal(signal, sample_rate)?;
        let window = (sample_rate * window_ms / 1000.0) as usize;
        if window == 0 {
            return Err(AnalysisError::config(format!(
                "energy window of {} ms is shorter than one sample",
                window_ms
            )));
        }
        if signal.len() < window {
            return Err(AnalysisError::invalid(format!(
                "signal of {} samples shorter than one {} ms window",
                signal.len(),
                window_ms
            )));
        }

        let levels_db: Vec<f64> = signal
            .chunks_exact(window)
            .map(|chunk| {
                let energy = chunk.iter().map(|x| x * x).sum::<f64>() / window as f64;
                10.0 * energy.max(MAGNITUDE_FLOOR).log10()
            })
            .collect();
        let times_s = (0..levels_db.len())
            .map(|i| (i * window) as f64 / sample_rate)
            .collect();

        Ok(Self {
            levels_db,
            times_s,
            frame_rate: sample_rate / window as f64,
        })
    }
}

/// Spectrum of the fluctuations of the energy-time curve around its trend.
///
/// The curve (of the peak-normalised signal) is divided by its
/// Savitzky-Golay trend (window 101, order 2), the mean is removed and the
/// magnitude of an `fft_size`-point FFT is returned.
pub fn energy_spectrum(
    signal: &[f64],
    sample_rate: f64,
    fft_size: usize,
    window_ms: f64,
) -> Result<Vec<f64>> {
    let normalised = normalise_peak(signal)?;
    let etc = EnergyTimeCurve::compute(&normalised, sample_rate, window_ms)?;
    let trend = smooth_mirrored(
        &etc.levels_db,
        101,
        SmoothingKernel::SavitzkyGolay { order: 2 },
    )?;

    let ratio: Vec<f64> = etc
        .levels_db
        .iter()
        .zip(&trend)
        .map(|(&l, &t)| if t != 0.0 { l / t } else { 0.0 })
        .collect();
    let mu = mean(&ratio);
    let centred: Vec<f64> = ratio.iter().map(|r| r - mu).collect();

    Ok(magnitude_spectrum(&centred, fft_size))
}
