// ============================================================================
// Graphic Equalizer - 9-band FFT gain shaping
// ============================================================================
//
// Each chunk is transformed per channel, every bin inside a band's one-octave
// passband [fc/√2, fc·√2] receives that band's gain (overlapping bands add
// up in dB), and the chunk is transformed back. There is no overlap-add, so
// chunk edges are not smoothed.

use super::{REFERENCE_SAMPLE_RATE, saturate_i16};
use crate::settings::EQ_BAND_COUNT;
use rustfft::{FftPlanner, num_complex::Complex};
use std::f32::consts::SQRT_2;

/// Band center frequencies in Hz
pub const CENTER_FREQUENCIES: [f32; EQ_BAND_COUNT] = [
    62.0, 125.0, 250.0, 500.0, 1_000.0, 2_500.0, 4_000.0, 8_000.0, 16_000.0,
];

/// Summed dB response for the non-negative frequency bins of an `fft_len` point FFT.
///
/// Returns `fft_len / 2 + 1` values, bin `k` sitting at `k * sample_rate / fft_len` Hz.
pub fn band_response_db(
    fft_len: usize,
    sample_rate: f32,
    gains_db: &[f32; EQ_BAND_COUNT],
) -> Vec<f32> {
    if fft_len == 0 {
        return Vec::new();
    }

    let bin_width = sample_rate / fft_len as f32;
    (0..=fft_len / 2)
        .map(|k| {
            let freq = k as f32 * bin_width;
            CENTER_FREQUENCIES
                .iter()
                .zip(gains_db.iter())
                .filter(|(fc, _)| freq >= *fc / SQRT_2 && freq <= *fc * SQRT_2)
                .map(|(_, gain)| gain)
                .sum()
        })
        .collect()
}

/// FFT-domain graphic equalizer
pub struct Equalizer {
    planner: FftPlanner<f32>,
    sample_rate: f32,
}

impl Equalizer {
    /// Equalizer working at the fixed reference rate
    pub fn new() -> Self {
        Self::with_sample_rate(REFERENCE_SAMPLE_RATE)
    }

    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            planner: FftPlanner::new(),
            sample_rate: sample_rate as f32,
        }
    }

    /// Equalize one interleaved chunk, returning the same number of samples
    pub fn process(
        &mut self,
        interleaved: &[i16],
        channels: usize,
        gains_db: &[f32; EQ_BAND_COUNT],
    ) -> Vec<i16> {
        let channels = channels.max(1);
        let frames = interleaved.len() / channels;
        if frames == 0 {
            return interleaved.to_vec();
        }

        let linear: Vec<f32> = band_response_db(frames, self.sample_rate, gains_db)
            .iter()
            .map(|db| 10.0_f32.powf(db / 20.0))
            .collect();

        let fft = self.planner.plan_fft_forward(frames);
        let ifft = self.planner.plan_fft_inverse(frames);
        let scale = 1.0 / frames as f32;

        let mut output = interleaved.to_vec();
        let mut buffer = vec![Complex::new(0.0f32, 0.0); frames];

        for ch in 0..channels {
            for (frame, bin) in buffer.iter_mut().enumerate() {
                *bin = Complex::new(interleaved[frame * channels + ch] as f32, 0.0);
            }

            fft.process(&mut buffer);

            // Negative-frequency bins mirror the positive ones to keep the signal real
            for (k, bin) in buffer.iter_mut().enumerate() {
                let mirrored = if k <= frames / 2 { k } else { frames - k };
                *bin *= linear[mirrored];
            }

            ifft.process(&mut buffer);

            for (frame, bin) in buffer.iter().enumerate() {
                output[frame * channels + ch] = saturate_i16((bin.re * scale) as f64);
            }
        }

        output
    }
}

impl Default for Equalizer {
    fn default() -> Self {
        Self::new()
    }
}
