// ============================================================================
// Chunk Pipeline - volume → effect chain → equalizer
// ============================================================================

use super::effects::EffectChain;
use super::equalizer::Equalizer;
use super::volume::apply_volume;
use crate::settings::{ChunkSettings, Setting};
use misst_iir::IirError;

/// Per-worker processing state for one streaming session
pub struct ChunkProcessor {
    effects: EffectChain,
    equalizer: Equalizer,
}

impl ChunkProcessor {
    pub fn new() -> Result<Self, IirError> {
        Ok(Self {
            effects: EffectChain::new()?,
            equalizer: Equalizer::new(),
        })
    }

    /// Run one interleaved chunk through every enabled stage.
    ///
    /// Volume is always applied. The effect chain runs only when
    /// `effects_enabled` is set and the snapshot carries parameters; the
    /// equalizer runs when the snapshot enables it with non-zero gains.
    pub fn process(
        &mut self,
        mut chunk: Vec<i16>,
        channels: usize,
        volume: f32,
        effects_enabled: bool,
        settings: &ChunkSettings,
    ) -> Vec<i16> {
        apply_volume(&mut chunk, volume);

        if effects_enabled {
            match &settings.effects {
                Setting::Value(params) => {
                    chunk = self.effects.apply(&chunk, channels, params);
                }
                Setting::UsePassthrough => {
                    log::debug!("[Pipeline] Effect parameters unavailable, passing chunk through");
                }
            }
        }

        if settings.equalizer.enabled && !settings.equalizer.is_flat() {
            chunk = self
                .equalizer
                .process(&chunk, channels, &settings.equalizer.gains_db);
        }

        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{EQ_BAND_COUNT, EffectParameters, EqualizerSettings};

    fn settings(effects: Setting<EffectParameters>, eq_gain: Option<f32>) -> ChunkSettings {
        ChunkSettings {
            effects,
            equalizer: EqualizerSettings {
                gains_db: [eq_gain.unwrap_or(0.0); EQ_BAND_COUNT],
                enabled: eq_gain.is_some(),
            },
        }
    }

    #[test]
    fn test_volume_only() {
        let mut processor = ChunkProcessor::new().unwrap();
        let out = processor.process(
            vec![100, -100, 100, -100],
            1,
            0.5,
            false,
            &ChunkSettings::passthrough(),
        );
        assert_eq!(out, vec![50, -50, 50, -50]);
    }

    #[test]
    fn test_effects_flag_gates_chain() {
        let mut processor = ChunkProcessor::new().unwrap();
        let fast = Setting::Value(EffectParameters {
            speed: 2.0,
            ..EffectParameters::NEUTRAL
        });
        let chunk = vec![1000i16; 256];

        let off = processor.process(chunk.clone(), 2, 1.0, false, &settings(fast, None));
        assert_eq!(off.len(), 256);

        let on = processor.process(chunk.clone(), 2, 1.0, true, &settings(fast, None));
        assert_eq!(on.len(), 128);
    }

    #[test]
    fn test_passthrough_skips_chain() {
        let mut processor = ChunkProcessor::new().unwrap();
        let chunk: Vec<i16> = (0..128).map(|i| i * 3).collect();
        let out = processor.process(
            chunk.clone(),
            1,
            1.0,
            true,
            &settings(Setting::UsePassthrough, None),
        );
        assert_eq!(out, chunk);
    }

    #[test]
    fn test_flat_equalizer_is_skipped() {
        let mut processor = ChunkProcessor::new().unwrap();
        let chunk: Vec<i16> = (0..512).map(|i| (i * 37 % 2000 - 1000) as i16).collect();
        let out = processor.process(
            chunk.clone(),
            2,
            1.0,
            false,
            &settings(Setting::UsePassthrough, Some(0.0)),
        );
        assert_eq!(out, chunk);
    }

    #[test]
    fn test_equalizer_applied_last() {
        let mut processor = ChunkProcessor::new().unwrap();
        // 1 kHz tone, exactly periodic in the 441-frame chunk
        let chunk: Vec<i16> = (0..441)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 44100.0;
                (phase.sin() * 4000.0) as i16
            })
            .collect();
        let out = processor.process(
            chunk.clone(),
            1,
            1.0,
            false,
            &settings(Setting::UsePassthrough, Some(6.0)),
        );

        let peak = |s: &[i16]| s.iter().map(|x| (*x as i32).abs()).max().unwrap_or(0);
        let ratio = peak(&out) as f32 / peak(&chunk) as f32;
        assert!((ratio - 2.0).abs() < 0.05, "gain ratio {}", ratio);
    }
}
