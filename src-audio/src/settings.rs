// ============================================================================
// Settings - Live effect/EQ parameters read from an external store
// ============================================================================
//
// The streaming loop takes one `ChunkSettings` snapshot per chunk and hands
// it to the chunk pipeline. Missing or malformed values never propagate as
// errors: they turn into `Setting::UsePassthrough` (effects) or neutral 0 dB
// gains (equalizer).

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Number of graphic equalizer bands
pub const EQ_BAND_COUNT: usize = 9;

/// Read-only string-keyed parameter store
pub trait SettingsStore: Send + Sync {
    /// Raw value for `key`, `None` when absent
    fn get_setting(&self, key: &str) -> Option<String>;
}

/// Outcome of reading a typed parameter group from the store
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting<T> {
    /// Every value was present and well-formed
    Value(T),
    /// Something was missing or malformed, skip the stage for this chunk
    UsePassthrough,
}

impl<T> Setting<T> {
    /// Convert into an `Option`, dropping the pass-through marker
    pub fn value(self) -> Option<T> {
        match self {
            Setting::Value(v) => Some(v),
            Setting::UsePassthrough => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Setting::UsePassthrough)
    }
}

/// Parse a finite float setting
fn read_float(store: &dyn SettingsStore, key: &str) -> Setting<f32> {
    match store
        .get_setting(key)
        .and_then(|raw| raw.trim().parse::<f32>().ok())
    {
        Some(v) if v.is_finite() => Setting::Value(v),
        _ => Setting::UsePassthrough,
    }
}

// ============================================================================
// Effect parameters
// ============================================================================

/// Speed/pitch/reverb/bass values driving the effect chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParameters {
    /// Playback speed factor, 0.5..=2.0
    pub speed: f32,
    /// Pitch factor, 0.5..=2.0
    pub pitch: f32,
    /// Reverb amount, 0.0..=1.0
    pub reverb: f32,
    /// Bass boost amount, 0.0..=1.0
    pub bass: f32,
}

impl EffectParameters {
    pub const SPEED_RANGE: (f32, f32) = (0.5, 2.0);
    pub const PITCH_RANGE: (f32, f32) = (0.5, 2.0);
    pub const REVERB_RANGE: (f32, f32) = (0.0, 1.0);
    pub const BASS_RANGE: (f32, f32) = (0.0, 1.0);

    /// Parameters that leave the signal (nearly) untouched
    pub const NEUTRAL: Self = Self {
        speed: 1.0,
        pitch: 1.0,
        reverb: 0.0,
        bass: 0.0,
    };

    /// Clamp every field into its documented range.
    ///
    /// Non-finite fields fall back to their neutral value.
    pub fn clamped(self) -> Self {
        Self {
            speed: clamp_factor(self.speed, Self::SPEED_RANGE, Self::NEUTRAL.speed),
            pitch: clamp_factor(self.pitch, Self::PITCH_RANGE, Self::NEUTRAL.pitch),
            reverb: clamp_factor(self.reverb, Self::REVERB_RANGE, Self::NEUTRAL.reverb),
            bass: clamp_factor(self.bass, Self::BASS_RANGE, Self::NEUTRAL.bass),
        }
    }

    /// Read `speed`, `pitch`, `reverb` and `bass` from the store.
    ///
    /// Any missing or unparseable key makes the whole chain pass through.
    pub fn from_store(store: &dyn SettingsStore) -> Setting<Self> {
        let (
            Setting::Value(speed),
            Setting::Value(pitch),
            Setting::Value(reverb),
            Setting::Value(bass),
        ) = (
            read_float(store, "speed"),
            read_float(store, "pitch"),
            read_float(store, "reverb"),
            read_float(store, "bass"),
        )
        else {
            return Setting::UsePassthrough;
        };

        Setting::Value(
            Self {
                speed,
                pitch,
                reverb,
                bass,
            }
            .clamped(),
        )
    }
}

/// Clamp `value` into `range`; NaN and infinities map to `neutral`
pub(crate) fn clamp_factor(value: f32, (min, max): (f32, f32), neutral: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        neutral
    }
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

// ============================================================================
// Equalizer settings
// ============================================================================

/// Graphic equalizer gains (dB per band) and on/off flag
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EqualizerSettings {
    pub gains_db: [f32; EQ_BAND_COUNT],
    pub enabled: bool,
}

impl EqualizerSettings {
    /// Read `eq` and `eq_1`..`eq_9` from the store.
    ///
    /// A missing or malformed `eq` flag disables the equalizer; if any band
    /// gain is unavailable all gains fall back to 0 dB.
    pub fn from_store(store: &dyn SettingsStore) -> Self {
        let enabled = store
            .get_setting("eq")
            .is_some_and(|raw| raw.trim().eq_ignore_ascii_case("true"));

        let mut gains_db = [0.0; EQ_BAND_COUNT];
        for (i, gain) in gains_db.iter_mut().enumerate() {
            match read_float(store, &format!("eq_{}", i + 1)) {
                Setting::Value(v) => *gain = v,
                Setting::UsePassthrough => {
                    log::debug!("[Settings] eq_{} unavailable, using flat gains", i + 1);
                    return Self {
                        gains_db: [0.0; EQ_BAND_COUNT],
                        enabled,
                    };
                }
            }
        }

        Self { gains_db, enabled }
    }

    /// True when every band sits at 0 dB
    pub fn is_flat(&self) -> bool {
        self.gains_db.iter().all(|g| *g == 0.0)
    }
}

/// Per-chunk snapshot of everything the chunk pipeline reads from the store
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkSettings {
    pub effects: Setting<EffectParameters>,
    pub equalizer: EqualizerSettings,
}

impl ChunkSettings {
    /// Read a fresh snapshot from the store
    pub fn snapshot(store: &dyn SettingsStore) -> Self {
        Self {
            effects: EffectParameters::from_store(store),
            equalizer: EqualizerSettings::from_store(store),
        }
    }

    /// Snapshot that disables every optional stage
    pub fn passthrough() -> Self {
        Self {
            effects: Setting::UsePassthrough,
            equalizer: EqualizerSettings::default(),
        }
    }
}

// ============================================================================
// Store implementations
// ============================================================================

/// Settings held in memory, safe to update from any thread
#[derive(Debug, Default)]
pub struct InMemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any previous one
    pub fn set(&self, key: &str, value: impl ToString) {
        self.values.write().insert(key.to_string(), value.to_string());
    }

    /// Remove a value
    pub fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

impl SettingsStore for InMemorySettings {
    fn get_setting(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }
}

/// Settings backed by a flat JSON object on disk.
///
/// The file is re-read whenever its modification time changes. An unreadable
/// or malformed file behaves like an empty store.
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    cache: RwLock<JsonCache>,
}

#[derive(Debug, Default)]
struct JsonCache {
    modified: Option<SystemTime>,
    values: HashMap<String, String>,
}

impl JsonFileSettings {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache: RwLock::new(JsonCache::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn refresh(&self) {
        let modified = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok();
        if modified.is_some() && self.cache.read().modified == modified {
            return;
        }

        let values = match Self::load(&self.path) {
            Ok(values) => values,
            Err(e) => {
                log::debug!("[Settings] Cannot read {}: {}", self.path.display(), e);
                HashMap::new()
            }
        };

        let mut cache = self.cache.write();
        cache.modified = modified;
        cache.values = values;
    }

    fn load(path: &Path) -> Result<HashMap<String, String>, String> {
        let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let root: Value = serde_json::from_str(&text).map_err(|e| e.to_string())?;
        let Value::Object(map) = root else {
            return Err("settings file is not a JSON object".to_string());
        };

        Ok(map
            .into_iter()
            .filter_map(|(key, value)| {
                let raw = match value {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((key, raw))
            })
            .collect())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get_setting(&self, key: &str) -> Option<String> {
        self.refresh();
        self.cache.read().values.get(key).cloned()
    }
}
