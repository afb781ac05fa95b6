// ============================================================================
// DSP - Per-chunk signal processing
// ============================================================================
//
// Stages applied to every streamed chunk, in order:
//   1. volume     - integer scaling of the interleaved 16-bit samples
//   2. effects    - speed, pitch, reverb, bass on a mono downmix
//   3. equalizer  - 9-band FFT gain shaping
//
// Effects and equalizer work on one chunk at a time with no state carried
// across chunk boundaries.

pub mod effects;
pub mod equalizer;
pub mod pipeline;
pub mod volume;

pub use effects::{
    BassBoost, EffectChain, adjust_bass, apply_reverb, downmix_to_mono, expand_from_mono,
    modify_pitch, modify_speed,
};
pub use equalizer::{CENTER_FREQUENCIES, Equalizer, band_response_db};
pub use pipeline::ChunkProcessor;
pub use volume::apply_volume;

/// Fixed sample rate assumed by the effect and equalizer maths
pub const REFERENCE_SAMPLE_RATE: u32 = 44_100;

/// Round and saturate a float sample into the 16-bit range
pub(crate) fn saturate_i16(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}
