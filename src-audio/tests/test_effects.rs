// ============================================================================
// Effect Chain Integration Tests
// ============================================================================

use misst_audio::dsp::{
    BassBoost, EffectChain, apply_reverb, apply_volume, modify_pitch, modify_speed,
};
use misst_audio::{ChunkProcessor, ChunkSettings, EffectParameters, InMemorySettings};

fn sine(freq: f64, frames: usize, amplitude: f64) -> Vec<f64> {
    (0..frames)
        .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / 44100.0).sin() * amplitude)
        .collect()
}

#[test]
fn test_volume_scenario() {
    let mut samples = vec![100i16, -100, 100, -100];
    apply_volume(&mut samples, 0.5);
    assert_eq!(samples, vec![50, -50, 50, -50]);
}

#[test]
fn test_volume_unity_is_identity() {
    let original: Vec<i16> = vec![i16::MIN, -1, 0, 1, 12345, i16::MAX];
    let mut samples = original.clone();
    apply_volume(&mut samples, 1.0);
    assert_eq!(samples, original);
}

#[test]
fn test_volume_never_wraps() {
    let mut samples = vec![30000i16, -30000];
    apply_volume(&mut samples, 4.0);
    assert_eq!(samples, vec![i16::MAX, i16::MIN]);
}

#[test]
fn test_speed_and_pitch_factors_are_clamped() {
    let samples = sine(440.0, 1000, 1000.0);
    for factor in [0.0f32, 0.1, 0.49, 2.01, 5.0, 100.0] {
        let speed_len = modify_speed(&samples, factor).len();
        let pitch_len = modify_pitch(&samples, factor).len();
        let expected = if factor < 0.5 { 2000 } else { 500 };
        assert_eq!(speed_len, expected, "speed factor {}", factor);
        assert_eq!(pitch_len, expected, "pitch factor {}", factor);
    }
}

#[test]
fn test_reverb_zero_leaves_samples_unchanged() {
    let samples = sine(1000.0, 512, 8000.0);
    assert_eq!(apply_reverb(&samples, 0.0), samples);
}

#[test]
fn test_reverb_adds_tail_energy() {
    let mut impulse = vec![0.0; 256];
    impulse[0] = 1000.0;
    let out = apply_reverb(&impulse, 0.8);
    assert!(out[10] > 0.0);
    assert!(out[1] > out[10]);
}

#[test]
fn test_bass_boost_residual_grows_with_frequency() {
    let bass = BassBoost::new().unwrap();
    let rms = |s: &[f64]| (s[4096..].iter().map(|x| x * x).sum::<f64>() / 4096.0).sqrt();
    let gain = |freq: f64| {
        let input = sine(freq, 8192, 1000.0);
        rms(&bass.process(&input, 1.0)) / rms(&input)
    };

    // Below the cutoff only the low-pass phase lag leaves a residual
    let low = gain(50.0);
    let high = gain(5000.0);
    assert!(low < 1.5, "low band gain {}", low);
    assert!(high > 1.9, "high band gain {}", high);
}

#[test]
fn test_chain_expands_back_to_channel_layout() {
    let chain = EffectChain::new().unwrap();
    let stereo: Vec<i16> = (0..1024).flat_map(|i| [i as i16, -(i as i16)]).collect();
    let params = EffectParameters {
        speed: 0.5,
        pitch: 1.0,
        reverb: 0.3,
        bass: 0.5,
    };
    let out = chain.apply(&stereo, 2, &params);
    assert_eq!(out.len(), 2048 * 2);
    // Mono processing duplicates every sample onto both channels
    assert!(out.chunks_exact(2).all(|frame| frame[0] == frame[1]));
}

#[test]
fn test_nan_parameters_terminate_with_neutral_chain() {
    let chain = EffectChain::new().unwrap();
    let stereo: Vec<i16> = (0..512).flat_map(|i| [i as i16, i as i16]).collect();
    let params = EffectParameters {
        speed: f32::NAN,
        pitch: f32::NAN,
        reverb: f32::NAN,
        bass: f32::NAN,
    };
    let out = chain.apply(&stereo, 2, &params);
    assert_eq!(out, stereo);
}

#[test]
fn test_missing_settings_bypass_effects() {
    let store = InMemorySettings::new();
    store.set("speed", 2.0);
    store.set("pitch", 1.0);
    store.set("reverb", 0.0);
    // "bass" missing

    let settings = ChunkSettings::snapshot(&store);
    assert!(settings.effects.is_passthrough());

    let mut processor = ChunkProcessor::new().unwrap();
    let chunk = vec![500i16; 2048];
    let out = processor.process(chunk.clone(), 2, 1.0, true, &settings);
    assert_eq!(out, chunk);

    store.set("bass", 0.0);
    let settings = ChunkSettings::snapshot(&store);
    let out = processor.process(chunk, 2, 1.0, true, &settings);
    assert_eq!(out.len(), 1024);
}
