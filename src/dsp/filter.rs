//! Butterworth filters as cascaded second-order sections
//!
//! High-order IIR filters are numerically fragile in direct form, so every
//! filter here is designed in zero-pole-gain form, mapped to the z-plane with
//! the bilinear transform (frequencies pre-warped) and then split into
//! biquads that run one after the other.
//!
//! ```text
//! analog prototype poles  ->  lowpass / highpass / bandpass transform
//!                         ->  bilinear (s -> z)
//!                         ->  conjugate pairs  ->  biquad cascade
//! ```
//!
//! Filtering is causal by default. `filtfilt` runs the cascade forwards and
//! then backwards for a zero-phase response with squared magnitude.

use rustfft::num_complex::Complex;
use std::f64::consts::PI;

use crate::error::{AnalysisError, Result};

type Complex64 = Complex<f64>;

/// Filter response type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterKind {
    Lowpass(f64),
    Highpass(f64),
    Bandpass(f64, f64),
}

/// One second-order section, `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b: [f64; 3],
    pub a: [f64; 2],
}

impl Biquad {
    /// Transposed direct form II over a whole buffer
    fn process(&self, data: &mut [f64]) {
        let [b0, b1, b2] = self.b;
        let [a1, a2] = self.a;
        let mut s1 = 0.0;
        let mut s2 = 0.0;
        for x in data.iter_mut() {
            let input = *x;
            let y = b0 * input + s1;
            s1 = b1 * input - a1 * y + s2;
            s2 = b2 * input - a2 * y;
            *x = y;
        }
    }

    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z_inv2 = z_inv * z_inv;
        let num = self.b[0] + z_inv * self.b[1] + z_inv2 * self.b[2];
        let den = Complex64::new(1.0, 0.0) + z_inv * self.a[0] + z_inv2 * self.a[1];
        num / den
    }
}

/// Digital Butterworth filter as a biquad cascade
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<Biquad>,
    kind: FilterKind,
    order: usize,
}

impl SosFilter {
    /// Design a Butterworth filter.
    ///
    /// `order` is the prototype order; a bandpass ends up with twice as many
    /// poles. Cutoffs must lie strictly between 0 and Nyquist.
    pub fn butterworth(order: usize, kind: FilterKind, sample_rate: f64) -> Result<Self> {
        if order == 0 || order > 24 {
            return Err(AnalysisError::config(format!(
                "filter order must be 1-24, got {}",
                order
            )));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(AnalysisError::invalid(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }

        let nyquist = sample_rate / 2.0;
        let check = |f: f64| -> Result<()> {
            if f > 0.0 && f < nyquist {
                Ok(())
            } else {
                Err(AnalysisError::config(format!(
                    "cutoff {:.1} Hz outside (0, {:.1}) Hz",
                    f, nyquist
                )))
            }
        };

        let fs2 = 2.0 * sample_rate;
        let warp = |f: f64| fs2 * (PI * f / sample_rate).tan();
        let prototype = butterworth_prototype(order);

        // Analog zeros, poles and gain
        let (zeros, poles, gain) = match kind {
            FilterKind::Lowpass(fc) => {
                check(fc)?;
                let wc = warp(fc);
                let poles: Vec<Complex64> = prototype.iter().map(|&p| p * wc).collect();
                (Vec::new(), poles, wc.powi(order as i32))
            }
            FilterKind::Highpass(fc) => {
                check(fc)?;
                let wc = warp(fc);
                let poles: Vec<Complex64> = prototype.iter().map(|&p| wc / p).collect();
                let zeros = vec![Complex64::new(0.0, 0.0); order];
                // prod(-p) of the prototype is 1
                (zeros, poles, 1.0)
            }
            FilterKind::Bandpass(lo, hi) => {
                check(lo)?;
                check(hi)?;
                if lo >= hi {
                    return Err(AnalysisError::config(format!(
                        "bandpass edges inverted: {:.1} >= {:.1} Hz",
                        lo, hi
                    )));
                }
                let (w1, w2) = (warp(lo), warp(hi));
                let bw = w2 - w1;
                let w0_sq = w1 * w2;
                let mut poles = Vec::with_capacity(2 * order);
                for &p in &prototype {
                    let p_lp = p * (bw / 2.0);
                    let root = (p_lp * p_lp - w0_sq).sqrt();
                    poles.push(p_lp + root);
                    poles.push(p_lp - root);
                }
                let zeros = vec![Complex64::new(0.0, 0.0); order];
                (zeros, poles, bw.powi(order as i32))
            }
        };

        let sections = bilinear_to_sections(&zeros, &poles, gain, fs2);
        Ok(Self {
            sections,
            kind,
            order,
        })
    }

    pub fn lowpass(order: usize, cutoff_hz: f64, sample_rate: f64) -> Result<Self> {
        Self::butterworth(order, FilterKind::Lowpass(cutoff_hz), sample_rate)
    }

    pub fn highpass(order: usize, cutoff_hz: f64, sample_rate: f64) -> Result<Self> {
        Self::butterworth(order, FilterKind::Highpass(cutoff_hz), sample_rate)
    }

    pub fn bandpass(order: usize, low_hz: f64, high_hz: f64, sample_rate: f64) -> Result<Self> {
        Self::butterworth(order, FilterKind::Bandpass(low_hz, high_hz), sample_rate)
    }

    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Causal filtering, returns a new buffer of the same length
    pub fn filter(&self, signal: &[f64]) -> Vec<f64> {
        let mut out = signal.to_vec();
        for section in &self.sections {
            section.process(&mut out);
        }
        out
    }

    /// Forward-backward filtering.
    ///
    /// The signal is extended at both ends by odd reflection before the two
    /// passes to reduce start-up transients, and the extension is removed
    /// afterwards.
    pub fn filtfilt(&self, signal: &[f64]) -> Vec<f64> {
        if signal.len() < 2 {
            return self.filter(signal);
        }
        let pad = (3 * (2 * self.sections.len() + 1)).min(signal.len() - 1);
        let first = signal[0];
        let last = signal[signal.len() - 1];

        let mut extended = Vec::with_capacity(signal.len() + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        extended.extend_from_slice(signal);
        extended.extend((1..=pad).map(|i| 2.0 * last - signal[signal.len() - 1 - i]));

        for section in &self.sections {
            section.process(&mut extended);
        }
        extended.reverse();
        for section in &self.sections {
            section.process(&mut extended);
        }
        extended.reverse();

        extended[pad..pad + signal.len()].to_vec()
    }

    /// Complex frequency response at `freq_hz`
    pub fn frequency_response(&self, freq_hz: f64, sample_rate: f64) -> Complex64 {
        let omega = 2.0 * PI * freq_hz / sample_rate;
        let z_inv = Complex64::from_polar(1.0, -omega);
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(z_inv))
    }

    /// Magnitude response in dB at `freq_hz`
    pub fn magnitude_db(&self, freq_hz: f64, sample_rate: f64) -> f64 {
        20.0 * self.frequency_response(freq_hz, sample_rate).norm().max(1e-300).log10()
    }
}

/// Normalised analog Butterworth poles on the left half of the unit circle
fn butterworth_prototype(order: usize) -> Vec<Complex64> {
    (0..order)
        .map(|k| {
            let theta = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
            Complex64::from_polar(1.0, theta)
        })
        .collect()
}

/// Bilinear transform of an analog zpk description, then pairing into biquads.
///
/// All digital zeros of the filters built here are real (at z = 1 for analog
/// zeros at the origin, at z = -1 for zeros at infinity), which keeps the
/// pairing simple: every section gets as many zeros as it has poles.
fn bilinear_to_sections(
    zeros: &[Complex64],
    poles: &[Complex64],
    gain: f64,
    fs2: f64,
) -> Vec<Biquad> {
    let to_z = |s: Complex64| (fs2 + s) / (fs2 - s);

    let num = zeros
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, &z| acc * (fs2 - z));
    let den = poles
        .iter()
        .fold(Complex64::new(1.0, 0.0), |acc, &p| acc * (fs2 - p));
    let digital_gain = gain * (num / den).re;

    // Digital zeros: origin -> +1, infinity -> -1. Interleave so bandpass
    // sections get one of each.
    let n_at_one = zeros.len();
    let n_at_minus_one = poles.len() - zeros.len();
    let mut digital_zeros = Vec::with_capacity(poles.len());
    let (mut ones, mut minus_ones) = (n_at_one, n_at_minus_one);
    while ones + minus_ones > 0 {
        if ones > 0 {
            digital_zeros.push(1.0);
            ones -= 1;
        }
        if minus_ones > 0 {
            digital_zeros.push(-1.0);
            minus_ones -= 1;
        }
    }

    // Poles: complex ones with positive imaginary part stand for their
    // conjugate pair, real ones are paired among themselves.
    let digital_poles: Vec<Complex64> = poles.iter().map(|&p| to_z(p)).collect();
    // (denominator, number of poles in the section)
    let mut denominators: Vec<([f64; 2], usize)> = Vec::new();
    let mut real_poles: Vec<f64> = Vec::new();
    for p in &digital_poles {
        if p.im.abs() <= 1e-12 * p.norm().max(1.0) {
            real_poles.push(p.re);
        } else if p.im > 0.0 {
            denominators.push(([-2.0 * p.re, p.norm_sqr()], 2));
        }
    }
    for pair in real_poles.chunks(2) {
        match *pair {
            [r1, r2] => denominators.push(([-(r1 + r2), r1 * r2], 2)),
            [r] => denominators.push(([-r, 0.0], 1)),
            _ => {}
        }
    }

    let mut zero_iter = digital_zeros.into_iter();
    let mut sections = Vec::with_capacity(denominators.len());
    for (a, pole_count) in denominators {
        let second_order = pole_count == 2;
        let z1 = zero_iter.next().unwrap_or(-1.0);
        let b = if second_order {
            let z2 = zero_iter.next().unwrap_or(-1.0);
            [1.0, -(z1 + z2), z1 * z2]
        } else {
            [1.0, -z1, 0.0]
        };
        sections.push(Biquad { b, a });
    }

    if let Some(first) = sections.first_mut() {
        for coeff in first.b.iter_mut() {
            *coeff *= digital_gain;
        }
    }
    sections
}
