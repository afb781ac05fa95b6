// ============================================================================
// Effect Chain - speed, pitch, reverb and bass boost
// ============================================================================
//
// All effects are chunk-local approximations operating on a mono downmix.
// Speed and pitch both resample by linear interpolation, so they change the
// chunk length (and therefore its playback duration).

use super::{REFERENCE_SAMPLE_RATE, saturate_i16};
use crate::settings::{EffectParameters, clamp_factor};
use misst_iir::{IirError, TransferFunction, butter_lowpass, lfilter};

/// Low-pass cutoff separating the boosted bass band
pub const BASS_CUTOFF_HZ: f64 = 300.0;
/// Butterworth order of the bass low-pass
pub const BASS_FILTER_ORDER: usize = 5;

/// Linear interpolation of `samples` at fractional index `x`.
///
/// Positions outside the sample grid hold the nearest edge value.
fn interpolate(samples: &[f64], x: f64) -> f64 {
    let last = samples.len() - 1;
    if x <= 0.0 {
        return samples[0];
    }
    if x >= last as f64 {
        return samples[last];
    }
    let i = x.floor() as usize;
    let frac = x - i as f64;
    samples[i] + (samples[i + 1] - samples[i]) * frac
}

/// Resample to `len / factor` samples on a uniform grid.
///
/// `factor` is clamped to 0.5..=2.0 (non-finite means 1.0); above 1.0 the chunk gets shorter
/// (faster playback), below 1.0 longer.
pub fn modify_speed(samples: &[f64], factor: f32) -> Vec<f64> {
    let factor = clamp_factor(
        factor,
        EffectParameters::SPEED_RANGE,
        EffectParameters::NEUTRAL.speed,
    ) as f64;
    let len = samples.len();
    let out_len = (len as f64 / factor) as usize;
    if len == 0 || out_len == 0 {
        return Vec::new();
    }

    let step = len as f64 / out_len as f64;
    (0..out_len)
        .map(|i| interpolate(samples, i as f64 * step))
        .collect()
}

/// Read the chunk with a stride of `factor` samples.
///
/// `factor` is clamped to 0.5..=2.0 (non-finite means 1.0). Pitch and duration change together;
/// no time-stretch step restores the original length.
pub fn modify_pitch(samples: &[f64], factor: f32) -> Vec<f64> {
    let factor = clamp_factor(
        factor,
        EffectParameters::PITCH_RANGE,
        EffectParameters::NEUTRAL.pitch,
    ) as f64;
    let len = samples.len() as f64;

    let mut out = Vec::with_capacity((len / factor).ceil() as usize);
    let mut i = 0usize;
    loop {
        let x = i as f64 * factor;
        if x >= len {
            break;
        }
        out.push(interpolate(samples, x));
        i += 1;
    }
    out
}

/// Feedback reverb followed by a chunk-length decay envelope.
///
/// `y[n] = x[n] + f * y[n-1]`, then convolution with an envelope that is 1.0
/// at the first tap, `f` at the last tap and zero in between. `factor` is
/// clamped to 0.0..=1.0; 0.0 is the identity.
pub fn apply_reverb(samples: &[f64], factor: f32) -> Vec<f64> {
    let factor = clamp_factor(
        factor,
        EffectParameters::REVERB_RANGE,
        EffectParameters::NEUTRAL.reverb,
    ) as f64;
    if factor == 0.0 {
        return samples.to_vec();
    }

    let fed = lfilter(&[1.0], &[1.0, -factor], samples);

    // Within the chunk the last envelope tap only reaches the final sample.
    // A single-sample chunk has no separate last tap and keeps the feedback output.
    let mut out = fed.clone();
    if fed.len() > 1 {
        let last = fed.len() - 1;
        out[last] += factor * fed[0];
    }
    out
}

/// Bass boost around a fixed Butterworth low-pass
#[derive(Debug, Clone)]
pub struct BassBoost {
    lowpass: TransferFunction,
}

impl BassBoost {
    /// Design the 300 Hz low-pass at the reference sample rate
    pub fn new() -> Result<Self, IirError> {
        let lowpass = butter_lowpass(
            BASS_FILTER_ORDER,
            BASS_CUTOFF_HZ,
            REFERENCE_SAMPLE_RATE as f64,
        )?;
        Ok(Self { lowpass })
    }

    /// `out = x + factor * (x - lowpass(x))`, `factor` clamped to 0.0..=1.0
    pub fn process(&self, samples: &[f64], factor: f32) -> Vec<f64> {
        adjust_bass(samples, factor, &self.lowpass)
    }
}

/// Apply the bass boost formula with a caller-supplied low-pass
pub fn adjust_bass(samples: &[f64], factor: f32, lowpass: &TransferFunction) -> Vec<f64> {
    let factor = clamp_factor(
        factor,
        EffectParameters::BASS_RANGE,
        EffectParameters::NEUTRAL.bass,
    ) as f64;
    if factor == 0.0 {
        return samples.to_vec();
    }

    let filtered = lowpass.filter(samples);
    samples
        .iter()
        .zip(filtered.iter())
        .map(|(x, lp)| x + factor * (x - lp))
        .collect()
}

/// Average interleaved channels into one float channel
pub fn downmix_to_mono(interleaved: &[i16], channels: usize) -> Vec<f64> {
    let channels = channels.max(1);
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().map(|&s| s as f64).sum::<f64>() / channels as f64)
        .collect()
}

/// Round mono samples to 16 bits and duplicate them onto every channel
pub fn expand_from_mono(mono: &[f64], channels: usize) -> Vec<i16> {
    let channels = channels.max(1);
    let mut out = Vec::with_capacity(mono.len() * channels);
    for &sample in mono {
        let value = saturate_i16(sample);
        out.extend(std::iter::repeat_n(value, channels));
    }
    out
}

/// The full effect chain: speed → pitch → reverb → bass
#[derive(Debug, Clone)]
pub struct EffectChain {
    bass: BassBoost,
}

impl EffectChain {
    pub fn new() -> Result<Self, IirError> {
        Ok(Self {
            bass: BassBoost::new()?,
        })
    }

    /// Process mono float samples
    pub fn process_mono(&self, mono: &[f64], params: &EffectParameters) -> Vec<f64> {
        let params = params.clamped();
        let samples = modify_speed(mono, params.speed);
        let samples = modify_pitch(&samples, params.pitch);
        let samples = apply_reverb(&samples, params.reverb);
        self.bass.process(&samples, params.bass)
    }

    /// Process an interleaved 16-bit chunk.
    ///
    /// The chunk is downmixed to mono, processed, and every output sample is
    /// duplicated back onto `channels` channels. The frame count of the
    /// result generally differs from the input.
    pub fn apply(
        &self,
        interleaved: &[i16],
        channels: usize,
        params: &EffectParameters,
    ) -> Vec<i16> {
        let mono = downmix_to_mono(interleaved, channels);
        let processed = self.process_mono(&mono, params);
        expand_from_mono(&processed, channels)
    }
}
