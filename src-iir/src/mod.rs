//! IIR filter design and execution.
//!
//! Provides a digital Butterworth low-pass designer (analog prototype,
//! frequency pre-warping and bilinear transform) and a direct form II
//! transposed filter routine operating on whole blocks of samples.

use num_complex::Complex64;
use std::f64::consts::PI;
use std::fmt;

/// Errors raised while designing a filter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IirError {
    #[error("filter order must be at least 1")]
    InvalidOrder,

    #[error("cutoff {cutoff} Hz must lie strictly between 0 and Nyquist ({nyquist} Hz)")]
    InvalidCutoff { cutoff: f64, nyquist: f64 },

    #[error("denominator must start with a non-zero coefficient")]
    InvalidDenominator,
}

/// Digital filter in transfer-function form.
///
/// `b` holds the numerator (feed-forward) coefficients and `a` the
/// denominator (feedback) coefficients, highest power of z^-1 last.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

impl TransferFunction {
    /// Build a transfer function, normalising so that `a[0] == 1`
    pub fn new(b: Vec<f64>, a: Vec<f64>) -> Result<Self, IirError> {
        let a0 = *a.first().ok_or(IirError::InvalidDenominator)?;
        if a0 == 0.0 || !a0.is_finite() {
            return Err(IirError::InvalidDenominator);
        }
        Ok(Self {
            b: b.iter().map(|c| c / a0).collect(),
            a: a.iter().map(|c| c / a0).collect(),
        })
    }

    /// Filter order (number of poles)
    pub fn order(&self) -> usize {
        self.a.len().saturating_sub(1)
    }

    /// Run a block of samples through the filter with zero initial state
    pub fn filter(&self, x: &[f64]) -> Vec<f64> {
        lfilter(&self.b, &self.a, x)
    }

    /// Magnitude response |H(e^jw)| at `freq` Hz for a given sample rate
    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let eval = |coeffs: &[f64]| -> Complex64 {
            coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| Complex64::from_polar(*c, -w * k as f64))
                .sum()
        };
        (eval(&self.b) / eval(&self.a)).norm()
    }

    /// Gain at 0 Hz
    pub fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }
}

impl fmt::Display for TransferFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b={:?} a={:?}", self.b, self.a)
    }
}

/// Design a digital Butterworth low-pass filter.
///
/// # Arguments
/// * `order` - Number of poles
/// * `cutoff` - -3 dB frequency in Hz
/// * `sample_rate` - Sample rate in Hz
pub fn butter_lowpass(
    order: usize,
    cutoff: f64,
    sample_rate: f64,
) -> Result<TransferFunction, IirError> {
    if order == 0 {
        return Err(IirError::InvalidOrder);
    }
    let nyquist = 0.5 * sample_rate;
    if !(cutoff > 0.0 && cutoff < nyquist) {
        return Err(IirError::InvalidCutoff { cutoff, nyquist });
    }

    // Work on the normalised frequency axis where Nyquist == 1
    let normal_cutoff = cutoff / nyquist;
    let fs = 2.0;
    let fs2 = Complex64::new(2.0 * fs, 0.0);
    let warped = 2.0 * fs * (PI * normal_cutoff / fs).tan();

    // Analog prototype poles on the left half of the unit circle, scaled to the cutoff
    let n = order as f64;
    let analog_poles: Vec<Complex64> = (0..order)
        .map(|k| {
            let m = -n + 1.0 + 2.0 * k as f64;
            -Complex64::from_polar(1.0, PI * m / (2.0 * n)) * warped
        })
        .collect();
    let analog_gain = warped.powi(order as i32);

    // Bilinear transform: every analog zero at infinity lands on z = -1
    let digital_poles: Vec<Complex64> = analog_poles
        .iter()
        .map(|p| (fs2 + p) / (fs2 - p))
        .collect();
    let digital_zeros = vec![Complex64::new(-1.0, 0.0); order];
    let denominator: Complex64 = analog_poles.iter().map(|p| fs2 - p).product();
    let gain = analog_gain * (Complex64::new(1.0, 0.0) / denominator).re;

    let b = poly(&digital_zeros).iter().map(|c| gain * c.re).collect();
    let a = poly(&digital_poles).iter().map(|c| c.re).collect();
    TransferFunction::new(b, a)
}

/// Expand the monic polynomial whose roots are `roots`
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for root in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, c) in coeffs.iter().enumerate() {
            next[i] += *c;
            next[i + 1] -= *c * *root;
        }
        coeffs = next;
    }
    coeffs
}

/// Filter a block with an IIR/FIR filter (direct form II transposed).
///
/// Coefficients are normalised by `a[0]`. An empty or zero-led `a`
/// returns the input unchanged.
pub fn lfilter(b: &[f64], a: &[f64], x: &[f64]) -> Vec<f64> {
    let a0 = match a.first() {
        Some(&a0) if a0 != 0.0 => a0,
        _ => return x.to_vec(),
    };
    let taps = a.len().max(b.len());
    let coeff = |c: &[f64], i: usize| c.get(i).copied().unwrap_or(0.0) / a0;

    let mut state = vec![0.0; taps.saturating_sub(1)];
    let mut y = Vec::with_capacity(x.len());

    for &xn in x {
        let yn = coeff(b, 0) * xn + state.first().copied().unwrap_or(0.0);
        for i in 0..state.len() {
            let carry = state.get(i + 1).copied().unwrap_or(0.0);
            state[i] = coeff(b, i + 1) * xn + carry - coeff(a, i + 1) * yn;
        }
        y.push(yn);
    }

    y
}
